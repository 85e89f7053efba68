//! Competitor selection: the top-ranked candidate that is not the target.

use regex::Regex;

use localrank_common::types::{attr, CandidateRecord, CompetitorOutcome};

use crate::matcher::{IdentityMatcher, MatcherConfig, SetStats, Signature};

/// Scan the basis set in position order, skip every record the identity
/// matcher accepts as the target, and return the first remaining record.
/// Degenerate cases (empty set, all records match the target) yield
/// `{rank: None, record: None}`.
pub fn select_competitor(
    basis: &[CandidateRecord],
    signature: &Signature,
    config: &MatcherConfig,
) -> CompetitorOutcome {
    let matcher = IdentityMatcher::new(signature, config);
    let stats = SetStats::compute(basis, signature, config);

    basis
        .iter()
        .find(|r| !matcher.matches(r, &stats))
        .map(|r| CompetitorOutcome {
            rank: Some(r.position),
            record: Some(r.clone()),
        })
        .unwrap_or_else(CompetitorOutcome::none)
}

/// Best-effort phone number pulled from the record's snippet/address text,
/// for when the collaborator saw no call affordance. Returns digits with an
/// optional leading `+`.
pub fn phone_hint(record: &CandidateRecord) -> Option<String> {
    let blob = format!(
        "{} {}",
        record.attribute(attr::DESCRIPTION).unwrap_or_default(),
        record.attribute(attr::ADDRESS).unwrap_or_default()
    );

    let re = Regex::new(r"\+?\d[\d\s-]{7,}\d").expect("valid regex");
    re.find(&blob).map(|m| {
        m.as_str()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::matcher::SignatureInputs;

    fn record(position: u32, title: &str) -> CandidateRecord {
        CandidateRecord {
            position,
            title: title.to_string(),
            url: String::new(),
            attributes: HashMap::new(),
        }
    }

    fn signature(name: &str) -> Signature {
        Signature::build(&SignatureInputs::new(name), &MatcherConfig::default()).unwrap()
    }

    #[test]
    fn first_non_target_record_wins() {
        let sig = signature("Sunrise Dental Clinic");
        let basis = vec![
            record(1, "Sunrise Dental Clinic - Park St"),
            record(2, "Bright Smiles Dental"),
            record(3, "City Dental Care"),
        ];
        let outcome = select_competitor(&basis, &sig, &MatcherConfig::default());
        assert_eq!(outcome.rank, Some(2));
        assert_eq!(outcome.record.unwrap().title, "Bright Smiles Dental");
    }

    #[test]
    fn competitor_ahead_of_target_keeps_its_position() {
        let sig = signature("Sunrise Dental Clinic");
        let basis = vec![
            record(1, "Bright Smiles Dental"),
            record(2, "Sunrise Dental Clinic"),
        ];
        let outcome = select_competitor(&basis, &sig, &MatcherConfig::default());
        assert_eq!(outcome.rank, Some(1));
    }

    #[test]
    fn empty_set_yields_no_competitor() {
        let sig = signature("Sunrise Dental Clinic");
        let outcome = select_competitor(&[], &sig, &MatcherConfig::default());
        assert_eq!(outcome, CompetitorOutcome::none());
    }

    #[test]
    fn all_target_records_yield_no_competitor() {
        let sig = signature("Sunrise Dental Clinic");
        let basis = vec![
            record(1, "Sunrise Dental Clinic"),
            record(2, "Sunrise Dental Clinic - Park St"),
        ];
        let outcome = select_competitor(&basis, &sig, &MatcherConfig::default());
        assert_eq!(outcome, CompetitorOutcome::none());
    }

    #[test]
    fn phone_hint_extracted_from_description() {
        let mut r = record(1, "Bright Smiles Dental");
        r.attributes.insert(
            attr::DESCRIPTION.to_string(),
            "Open 9-5 weekdays. Call +91 755 123-4567 for appointments.".to_string(),
        );
        assert_eq!(phone_hint(&r).as_deref(), Some("+917551234567"));
    }

    #[test]
    fn phone_hint_falls_back_to_address_text() {
        let mut r = record(1, "Bright Smiles Dental");
        r.attributes.insert(
            attr::ADDRESS.to_string(),
            "12 Park St, Bhopal 0755 246 8100".to_string(),
        );
        assert_eq!(phone_hint(&r).as_deref(), Some("07552468100"));
    }

    #[test]
    fn phone_hint_absent_when_no_number() {
        let mut r = record(1, "Bright Smiles Dental");
        r.attributes.insert(
            attr::DESCRIPTION.to_string(),
            "Family dentistry since 1998".to_string(),
        );
        assert_eq!(phone_hint(&r), None);
    }
}
