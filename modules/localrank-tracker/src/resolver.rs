//! Rank resolution: primary-surface scan plus bounded extended discovery.
//!
//! `SCAN_PRIMARY → (found | SCAN_EXTENDED) → (found | EXHAUSTED)`. The
//! extended loop consumes successive cumulative scroll states from the
//! collaborator and terminates on a round cap or when the surface stops
//! yielding new records.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use localrank_common::types::{CandidateRecord, CandidateSet, Rank, RankOutcome, Surface};
use localrank_common::LocalRankError;

use crate::matcher::{normalize, IdentityMatcher, MatcherConfig, SetStats, Signature};
use crate::pacing::{Fetched, PacedGateway};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Hard cap on extended discovery rounds.
    pub max_rounds: u32,
    /// Consecutive no-growth rounds after which the surface is considered
    /// drained.
    pub stability_threshold: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            stability_threshold: 3,
        }
    }
}

/// The outcome of resolving one keyword, together with the ordered record
/// list the outcome was drawn from. Competitor selection scans that basis.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcome: RankOutcome,
    pub basis: Vec<CandidateRecord>,
}

pub struct RankResolver {
    signature: Signature,
    matcher_config: MatcherConfig,
    discovery: DiscoveryConfig,
}

impl RankResolver {
    pub fn new(
        signature: Signature,
        matcher_config: MatcherConfig,
        discovery: DiscoveryConfig,
    ) -> Self {
        Self {
            signature,
            matcher_config,
            discovery,
        }
    }

    /// Resolve the target's rank for one query, given the already-fetched
    /// primary candidate set. Drives extended discovery through the gateway
    /// when the primary scan comes up empty.
    pub async fn resolve(
        &self,
        gateway: &mut PacedGateway<'_>,
        query: &str,
        primary: CandidateSet,
    ) -> Result<Resolution, LocalRankError> {
        let primary_source = prefer_local(primary.records);

        let matcher = IdentityMatcher::new(&self.signature, &self.matcher_config);
        let stats = SetStats::compute(&primary_source, &self.signature, &self.matcher_config);
        if let Some(hit) = primary_source.iter().find(|r| matcher.matches(r, &stats)) {
            info!(
                query,
                rank = hit.position,
                title = hit.title.as_str(),
                "Matched target on primary surface"
            );
            gateway.stats.primary_hits += 1;
            let matched = hit.clone();
            return Ok(Resolution {
                outcome: RankOutcome {
                    rank: Rank::Found(matched.position),
                    matched: Some(matched),
                },
                basis: primary_source,
            });
        }

        self.scan_extended(gateway, query, primary_source).await
    }

    async fn scan_extended(
        &self,
        gateway: &mut PacedGateway<'_>,
        query: &str,
        primary_source: Vec<CandidateRecord>,
    ) -> Result<Resolution, LocalRankError> {
        let matcher = IdentityMatcher::new(&self.signature, &self.matcher_config);

        // Cumulative distinct records in first-seen order.
        let mut seen: Vec<CandidateRecord> = Vec::new();
        let mut seen_keys: HashSet<(String, String)> = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut last_count: Option<usize> = None;
        let mut stable_rounds: u32 = 0;

        for round in 0..self.discovery.max_rounds {
            let set = match gateway
                .fetch(query, Surface::Extended, cursor.as_deref())
                .await?
            {
                Fetched::Candidates(set) => set,
                Fetched::Unavailable => {
                    debug!(query, round = round + 1, "No extended surface for this query");
                    break;
                }
                Fetched::Failed => CandidateSet::empty(query),
            };

            cursor = set.cursor.clone();
            for record in set.records {
                let key = (normalize(&record.title), record.url.clone());
                if seen_keys.insert(key) {
                    seen.push(record);
                }
            }

            let stats = SetStats::compute(&seen, &self.signature, &self.matcher_config);
            if let Some(hit) = seen.iter().find(|r| matcher.matches(r, &stats)) {
                let hit = hit.clone();
                if self.verify(gateway, &hit).await {
                    info!(
                        query,
                        rank = hit.position,
                        title = hit.title.as_str(),
                        round = round + 1,
                        "Matched target via extended discovery"
                    );
                    gateway.stats.extended_hits += 1;
                    return Ok(Resolution {
                        outcome: RankOutcome {
                            rank: Rank::Found(hit.position),
                            matched: Some(hit),
                        },
                        basis: seen,
                    });
                }
                debug!(
                    query,
                    title = hit.title.as_str(),
                    "Detail verification failed, continuing scan"
                );
            }

            let count = seen.len();
            if last_count == Some(count) {
                stable_rounds += 1;
            } else {
                stable_rounds = 0;
            }
            last_count = Some(count);
            debug!(
                query,
                round = round + 1,
                records = count,
                stable_rounds,
                "Extended discovery round complete"
            );

            if stable_rounds >= self.discovery.stability_threshold {
                info!(
                    query,
                    rounds = round + 1,
                    records = count,
                    "Extended surface stopped yielding new records"
                );
                break;
            }
        }

        info!(query, "Target not found after extended discovery");
        Ok(Resolution {
            outcome: RankOutcome::not_found(),
            basis: primary_source,
        })
    }

    /// Secondary verification: the record's detail view must carry the core
    /// prefix too before an extended-discovery match is accepted.
    async fn verify(&self, gateway: &mut PacedGateway<'_>, record: &CandidateRecord) -> bool {
        match gateway.detail(record).await {
            Ok(detail) => normalize(&detail.title).contains(&self.signature.core_prefix),
            Err(e) => {
                warn!(
                    title = record.title.as_str(),
                    error = %e,
                    "Detail verification fetch failed"
                );
                false
            }
        }
    }
}

/// The primary scan prefers records the collaborator flagged as map/local
/// results; generic organic results are the fallback.
fn prefer_local(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let local: Vec<CandidateRecord> = records.iter().filter(|r| r.is_local()).cloned().collect();
    if local.is_empty() {
        records
    } else {
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use localrank_common::types::{attr, DetailView};

    use crate::matcher::SignatureInputs;
    use crate::pacing::PacingConfig;
    use crate::traits::{BlockSurface, CandidateSource, Rendered};

    fn record(position: u32, title: &str) -> CandidateRecord {
        CandidateRecord {
            position,
            title: title.to_string(),
            url: format!("https://example.com/{position}"),
            attributes: HashMap::new(),
        }
    }

    fn local_record(position: u32, title: &str) -> CandidateRecord {
        let mut r = record(position, title);
        r.attributes
            .insert(attr::RESULT_TYPE.to_string(), "local".to_string());
        r
    }

    fn set(records: Vec<CandidateRecord>) -> CandidateSet {
        CandidateSet {
            query: "Best dentist in Bhopal".to_string(),
            records,
            cursor: None,
        }
    }

    fn resolver(name: &str) -> RankResolver {
        let sig = Signature::build(&SignatureInputs::new(name), &MatcherConfig::default()).unwrap();
        RankResolver::new(sig, MatcherConfig::default(), DiscoveryConfig::default())
    }

    /// Scripted collaborator: extended fetches pop from a queue; when the
    /// queue is empty the last set repeats (a drained surface).
    struct MockSource {
        extended: Mutex<VecDeque<CandidateSet>>,
        last: Mutex<Option<CandidateSet>>,
        extended_calls: AtomicU32,
        detail_calls: AtomicU32,
        detail_title: Option<String>,
        /// When set, extended sets are generated on demand: call n yields
        /// `n * growth_step` never-matching records.
        growth_step: Option<u32>,
        extended_available: bool,
    }

    impl MockSource {
        fn with_extended(sets: Vec<CandidateSet>, detail_title: Option<&str>) -> Self {
            Self {
                extended: Mutex::new(sets.into_iter().collect()),
                last: Mutex::new(None),
                extended_calls: AtomicU32::new(0),
                detail_calls: AtomicU32::new(0),
                detail_title: detail_title.map(String::from),
                growth_step: None,
                extended_available: true,
            }
        }

        fn unavailable() -> Self {
            let mut s = Self::with_extended(Vec::new(), None);
            s.extended_available = false;
            s
        }

        fn ever_growing(step: u32) -> Self {
            let mut s = Self::with_extended(Vec::new(), None);
            s.growth_step = Some(step);
            s
        }
    }

    #[async_trait]
    impl CandidateSource for MockSource {
        async fn render_candidates(
            &self,
            query: &str,
            surface: Surface,
            _cursor: Option<&str>,
        ) -> Result<Rendered> {
            assert_eq!(surface, Surface::Extended, "resolver only fetches extended");
            if !self.extended_available {
                return Ok(Rendered::ExtendedUnavailable);
            }
            let call = self.extended_calls.fetch_add(1, Ordering::SeqCst) + 1;

            if let Some(step) = self.growth_step {
                let count = call * step;
                let records = (1..=count)
                    .map(|i| record(i, &format!("Competitor Number {i}")))
                    .collect();
                return Ok(Rendered::Candidates(set(records)));
            }

            let mut queue = self.extended.lock().unwrap();
            let next = match queue.pop_front() {
                Some(s) => {
                    *self.last.lock().unwrap() = Some(s.clone());
                    s
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| CandidateSet::empty(query)),
            };
            Ok(Rendered::Candidates(next))
        }

        async fn render_detail(&self, _record: &CandidateRecord) -> Result<DetailView> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            Ok(DetailView {
                title: self.detail_title.clone().unwrap_or_default(),
            })
        }
    }

    struct NoopBlock;

    #[async_trait]
    impl BlockSurface for NoopBlock {
        async fn interstitial_cleared(&self) -> Result<bool> {
            Ok(true)
        }
        async fn visit_neutral_page(&self) -> Result<()> {
            Ok(())
        }
        async fn reset_session(&self) -> Result<()> {
            Ok(())
        }
    }

    fn gateway<'a>(source: &'a MockSource, block: &'a NoopBlock) -> PacedGateway<'a> {
        let pacing = PacingConfig {
            base_jitter: std::time::Duration::ZERO,
            backoff_jitter: std::time::Duration::ZERO,
            ..PacingConfig::default()
        };
        PacedGateway::new(source, block, pacing, 3)
    }

    #[tokio::test(start_paused = true)]
    async fn primary_match_wins_without_discovery() {
        let source = MockSource::with_extended(Vec::new(), None);
        let block = NoopBlock;
        let mut gw = gateway(&source, &block);
        let r = resolver("Sunrise Dental Clinic");

        let primary = set(vec![
            record(1, "Sunrise Dental Clinic - Park St"),
            record(2, "Bright Smiles Dental"),
        ]);
        let resolution = r.resolve(&mut gw, "q", primary).await.unwrap();

        assert_eq!(resolution.outcome.rank, Rank::Found(1));
        assert_eq!(source.extended_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gw.stats.primary_hits, 1);
        assert_eq!(resolution.basis.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn primary_scan_prefers_local_subset() {
        let source = MockSource::with_extended(Vec::new(), None);
        let block = NoopBlock;
        let mut gw = gateway(&source, &block);
        let r = resolver("Sunrise Dental Clinic");

        // Organic result at position 1 mentions the target; the local pack
        // carries it at position 3. Local results win.
        let primary = set(vec![
            record(1, "Sunrise Dental Clinic reviews and opening hours"),
            local_record(2, "Bright Smiles Dental"),
            local_record(3, "Sunrise Dental Clinic"),
        ]);
        let resolution = r.resolve(&mut gw, "q", primary).await.unwrap();

        assert_eq!(resolution.outcome.rank, Rank::Found(3));
        assert_eq!(resolution.basis.len(), 2, "basis is the local subset");
    }

    #[tokio::test(start_paused = true)]
    async fn extended_discovery_finds_target_with_verification() {
        let page1: Vec<CandidateRecord> =
            (1..=20).map(|i| record(i, &format!("Competitor Number {i}"))).collect();
        let mut page2 = page1.clone();
        page2.extend((21..=40).map(|i| {
            if i == 34 {
                record(i, "Sunrise Dental Clinic - Park St")
            } else {
                record(i, &format!("Competitor Number {i}"))
            }
        }));

        let source = MockSource::with_extended(
            vec![set(page1.clone()), set(page2)],
            Some("Sunrise Dental Clinic"),
        );
        let block = NoopBlock;
        let mut gw = gateway(&source, &block);
        let r = resolver("Sunrise Dental Clinic");

        let primary = set(page1);
        let resolution = r.resolve(&mut gw, "q", primary).await.unwrap();

        assert_eq!(resolution.outcome.rank, Rank::Found(34));
        assert_eq!(source.extended_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.stats.extended_hits, 1);
        assert_eq!(resolution.basis.len(), 40, "basis is the cumulative list");
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_terminates_at_round_cap_on_growing_sets() {
        let source = MockSource::ever_growing(10);
        let block = NoopBlock;
        let mut gw = gateway(&source, &block);
        let r = resolver("Sunrise Dental Clinic");

        let resolution = r.resolve(&mut gw, "q", set(Vec::new())).await.unwrap();

        assert_eq!(resolution.outcome.rank, Rank::NotFound);
        assert_eq!(
            source.extended_calls.load(Ordering::SeqCst),
            DiscoveryConfig::default().max_rounds
        );
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_terminates_when_surface_stops_growing() {
        let page: Vec<CandidateRecord> =
            (1..=10).map(|i| record(i, &format!("Competitor Number {i}"))).collect();
        // One real page, then the drained surface repeats it.
        let source = MockSource::with_extended(vec![set(page)], None);
        let block = NoopBlock;
        let mut gw = gateway(&source, &block);
        let r = resolver("Sunrise Dental Clinic");

        let resolution = r.resolve(&mut gw, "q", set(Vec::new())).await.unwrap();

        assert_eq!(resolution.outcome.rank, Rank::NotFound);
        // Round 1 grows to 10, rounds 2-4 are stable → 4 fetches total.
        assert_eq!(source.extended_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_verification_keeps_scanning_to_exhaustion() {
        let page = vec![
            record(1, "Sunrise Dental Clinic"),
            record(2, "Bright Smiles Dental"),
        ];
        // Detail view reports a different business: never verifies.
        let source =
            MockSource::with_extended(vec![set(page)], Some("Totally Different Dentist"));
        let block = NoopBlock;
        let mut gw = gateway(&source, &block);
        let r = resolver("Sunrise Dental Clinic");

        let resolution = r.resolve(&mut gw, "q", set(Vec::new())).await.unwrap();

        assert_eq!(resolution.outcome.rank, Rank::NotFound);
        assert!(source.detail_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_extended_surface_exhausts_immediately() {
        let source = MockSource::unavailable();
        let block = NoopBlock;
        let mut gw = gateway(&source, &block);
        let r = resolver("Sunrise Dental Clinic");

        let primary = set(vec![record(1, "Bright Smiles Dental")]);
        let resolution = r.resolve(&mut gw, "q", primary).await.unwrap();

        assert_eq!(resolution.outcome.rank, Rank::NotFound);
        assert_eq!(resolution.basis.len(), 1, "basis falls back to the primary set");
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_is_idempotent_for_fixed_inputs() {
        let primary = set(vec![
            record(1, "Sunrise Dental Clinic - Park St"),
            record(2, "Bright Smiles Dental"),
        ]);

        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let source = MockSource::with_extended(Vec::new(), None);
            let block = NoopBlock;
            let mut gw = gateway(&source, &block);
            let r = resolver("Sunrise Dental Clinic");
            let resolution = r.resolve(&mut gw, "q", primary.clone()).await.unwrap();
            outcomes.push(resolution.outcome);
        }
        assert_eq!(outcomes[0], outcomes[1]);
    }
}
