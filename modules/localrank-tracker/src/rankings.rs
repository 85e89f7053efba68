//! Keyword orchestration: resolves every keyword strictly sequentially
//! through one paced gateway, retains partial results on abort, and reports
//! run-level status and stats.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use localrank_common::types::{CompetitorOutcome, Rank, RankingRow, RunStatus, Surface};
use localrank_common::LocalRankError;

use crate::competitor::select_competitor;
use crate::matcher::{MatcherConfig, Signature, SignatureInputs};
use crate::pacing::{Fetched, PacedGateway, PacingConfig};
use crate::resolver::{DiscoveryConfig, RankResolver};
use crate::stats::RunStats;
use crate::traits::{BlockSurface, CandidateSource};

/// Run-level policy knobs that are the caller's to set, not the core's.
#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Backoff rounds per interstitial before the run is abandoned.
    pub interstitial_max_attempts: u32,
    /// Consecutive keywords with no producible candidate set tolerated
    /// before the run is abandoned.
    pub max_consecutive_failures: u32,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            interstitial_max_attempts: 3,
            max_consecutive_failures: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    pub matcher: MatcherConfig,
    pub discovery: DiscoveryConfig,
    pub pacing: PacingConfig,
    pub policy: RunPolicy,
}

/// The product of one run: per-keyword rows plus run-level accounting.
/// Rows resolved before an abort are always retained.
#[derive(Debug, Clone, Serialize)]
pub struct RankingRun {
    pub run_id: Uuid,
    pub business: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: Vec<RankingRow>,
    pub status: RunStatus,
    pub stats: RunStats,
}

pub struct RankTracker<'a> {
    source: &'a dyn CandidateSource,
    block: &'a dyn BlockSurface,
    config: TrackerConfig,
}

impl<'a> RankTracker<'a> {
    pub fn new(source: &'a dyn CandidateSource, block: &'a dyn BlockSurface) -> Self {
        Self::with_config(source, block, TrackerConfig::default())
    }

    pub fn with_config(
        source: &'a dyn CandidateSource,
        block: &'a dyn BlockSurface,
        config: TrackerConfig,
    ) -> Self {
        Self {
            source,
            block,
            config,
        }
    }

    /// Resolve rank and leading competitor for each keyword, in order.
    pub async fn resolve_keyword_rankings(
        &self,
        inputs: &SignatureInputs,
        city: &str,
        keywords: &[String],
    ) -> RankingRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            business = inputs.display_name.as_str(),
            city,
            keywords = keywords.len(),
            "Starting ranking run"
        );

        let signature = match Signature::build(inputs, &self.config.matcher) {
            Ok(sig) => sig,
            Err(e) => {
                // Too-short core prefix: refuse to match rather than risk
                // false positives. Every keyword reports NOT_FOUND and no
                // competitor is inferred.
                warn!(error = %e, "Refusing resolution for this business");
                let rows = keywords
                    .iter()
                    .map(|k| RankingRow {
                        keyword: k.clone(),
                        rank: Rank::NotFound,
                        competitor: CompetitorOutcome::none(),
                    })
                    .collect();
                return RankingRun {
                    run_id,
                    business: inputs.display_name.clone(),
                    started_at,
                    finished_at: Utc::now(),
                    rows,
                    status: RunStatus::Completed,
                    stats: RunStats::default(),
                };
            }
        };

        let resolver = RankResolver::new(
            signature.clone(),
            self.config.matcher.clone(),
            self.config.discovery.clone(),
        );
        let mut gateway = PacedGateway::new(
            self.source,
            self.block,
            self.config.pacing.clone(),
            self.config.policy.interstitial_max_attempts,
        );

        let mut rows: Vec<RankingRow> = Vec::new();
        let mut status = RunStatus::Completed;
        let mut consecutive_failures: u32 = 0;

        for (index, keyword) in keywords.iter().enumerate() {
            let query = canonical_query(keyword, city);
            info!(
                keyword = keyword.as_str(),
                query = query.as_str(),
                position = index + 1,
                total = keywords.len(),
                "Resolving keyword"
            );

            if gateway.pacer.should_take_break() {
                warn!("Session limits reached; a longer pause would lower block risk");
            }

            let primary = match gateway.fetch(&query, Surface::Primary, None).await {
                Ok(Fetched::Candidates(set)) => {
                    consecutive_failures = 0;
                    set
                }
                Ok(Fetched::Unavailable) | Ok(Fetched::Failed) => {
                    consecutive_failures += 1;
                    localrank_common::types::CandidateSet::empty(&query)
                }
                Err(LocalRankError::BackoffExhausted { attempts }) => {
                    status = RunStatus::Aborted {
                        reason: format!("interstitial backoff exhausted after {attempts} attempts"),
                    };
                    break;
                }
                Err(e) => {
                    status = RunStatus::Aborted {
                        reason: e.to_string(),
                    };
                    break;
                }
            };

            let resolution = match resolver.resolve(&mut gateway, &query, primary).await {
                Ok(r) => r,
                Err(LocalRankError::BackoffExhausted { attempts }) => {
                    status = RunStatus::Aborted {
                        reason: format!("interstitial backoff exhausted after {attempts} attempts"),
                    };
                    break;
                }
                Err(e) => {
                    status = RunStatus::Aborted {
                        reason: e.to_string(),
                    };
                    break;
                }
            };

            let competitor =
                select_competitor(&resolution.basis, &signature, &self.config.matcher);
            if !resolution.outcome.rank.is_found() {
                gateway.stats.keywords_not_found += 1;
            }
            rows.push(RankingRow {
                keyword: keyword.clone(),
                rank: resolution.outcome.rank,
                competitor,
            });

            if consecutive_failures > self.config.policy.max_consecutive_failures {
                status = RunStatus::Aborted {
                    reason: format!(
                        "collaborator failed on {consecutive_failures} consecutive keywords"
                    ),
                };
                break;
            }
        }

        let stats = gateway.stats.clone();
        info!(%run_id, resolved = rows.len(), status = ?status, "{stats}");

        RankingRun {
            run_id,
            business: inputs.display_name.clone(),
            started_at,
            finished_at: Utc::now(),
            rows,
            status,
            stats,
        }
    }
}

/// Canonical query form: a leading "best" is normalized to "Best …" and the
/// city is appended when the keyword does not already name it.
fn canonical_query(keyword: &str, city: &str) -> String {
    let trimmed = keyword.trim();
    let stripped = match trimmed.get(..5) {
        Some(head) if head.eq_ignore_ascii_case("best ") => trimmed[5..].trim_start(),
        _ => trimmed,
    };
    let mut query = format!("Best {stripped}");

    let in_city = format!(" in {}", city.to_lowercase());
    if !query.to_lowercase().contains(&in_city) {
        query = format!("{query} in {city}");
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_query_prefixes_best_and_city() {
        assert_eq!(
            canonical_query("dentist near me", "Bhopal"),
            "Best dentist near me in Bhopal"
        );
    }

    #[test]
    fn canonical_query_strips_duplicate_best() {
        assert_eq!(
            canonical_query("BEST dentist", "Bhopal"),
            "Best dentist in Bhopal"
        );
    }

    #[test]
    fn canonical_query_keeps_existing_city_mention() {
        assert_eq!(
            canonical_query("dentist in bhopal", "Bhopal"),
            "Best dentist in bhopal"
        );
    }

    #[test]
    fn canonical_query_trims_whitespace() {
        assert_eq!(
            canonical_query("  best   dentist  ", "Bhopal"),
            "Best dentist in Bhopal"
        );
    }
}
