//! Request pacing and interstitial backoff.
//!
//! Anti-automation risk is cumulative across the whole session, so pacing
//! state lives for the run and every external call goes through the
//! controller. The interstitial handler runs escalating remediation rounds:
//! passive wait, neutral re-entry, session reset.

use std::cmp::min;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use localrank_common::types::{CandidateRecord, CandidateSet, DetailView, Surface};
use localrank_common::LocalRankError;

use crate::stats::RunStats;
use crate::traits::{BlockSurface, CandidateSource, Rendered};

#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Base inter-request interval.
    pub base_interval: Duration,
    /// Random addition to the base interval, drawn per request.
    pub base_jitter: Duration,
    /// Interval growth per cumulative request.
    pub growth_per_request: Duration,
    /// Upper bound on the growth term.
    pub growth_cap: Duration,
    /// Hard lower bound on any pacing wait.
    pub floor: Duration,
    /// Session duration after which `should_take_break` can fire.
    pub session_break_after: Duration,
    /// Minimum request count before `should_take_break` can fire.
    pub session_break_min_requests: u64,
    /// Backoff delay for the first interstitial round.
    pub backoff_base: Duration,
    /// Backoff delay increase per round.
    pub backoff_step: Duration,
    /// Random addition to each round's delay.
    pub backoff_jitter: Duration,
    /// Slice between clearance rechecks while waiting out a round.
    pub recheck_slice: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1200),
            base_jitter: Duration::from_millis(800),
            growth_per_request: Duration::from_millis(150),
            growth_cap: Duration::from_millis(2000),
            floor: Duration::from_millis(400),
            session_break_after: Duration::from_secs(20 * 60),
            session_break_min_requests: 5,
            backoff_base: Duration::from_secs(20),
            backoff_step: Duration::from_secs(15),
            backoff_jitter: Duration::from_secs(20),
            recheck_slice: Duration::from_secs(5),
        }
    }
}

/// Process-lifetime pacing state, mutated solely by the controller.
#[derive(Debug)]
pub struct PacingState {
    pub request_count: u64,
    pub session_start: Instant,
    pub last_request_at: Option<Instant>,
}

/// Outcome of an interstitial backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffOutcome {
    Resolved,
    Exhausted,
}

pub struct PacingController {
    config: PacingConfig,
    state: PacingState,
}

impl PacingController {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            state: PacingState {
                request_count: 0,
                session_start: Instant::now(),
                last_request_at: None,
            },
        }
    }

    pub fn state(&self) -> &PacingState {
        &self.state
    }

    /// Suspend until the pacing interval since the previous request has
    /// elapsed. The interval grows with cumulative request count, bounded
    /// above; the wait never drops below the configured floor.
    pub async fn pace_request(&mut self) {
        self.state.request_count += 1;

        let growth = min(
            self.config.growth_cap,
            self.config.growth_per_request * self.state.request_count.min(u32::MAX as u64) as u32,
        );
        let target = self.config.base_interval + jitter(self.config.base_jitter) + growth;

        let wait = match self.state.last_request_at {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= target {
                    self.config.floor
                } else {
                    (target - elapsed).max(self.config.floor)
                }
            }
            None => self.config.floor,
        };

        sleep(wait).await;
        self.state.last_request_at = Some(Instant::now());
    }

    /// Hint that the session has been running long enough to warrant a
    /// longer pause or a stop. Report-only; nothing is enforced here.
    pub fn should_take_break(&self) -> bool {
        self.state.session_start.elapsed() > self.config.session_break_after
            && self.state.request_count > self.config.session_break_min_requests
    }

    /// Delay window for one backoff round, before jitter. Strictly
    /// increases with the round index.
    pub fn round_delay(&self, round: u32) -> Duration {
        self.config.backoff_base + self.config.backoff_step * round
    }

    /// Wait out an interstitial with up to `max_attempts` rounds of
    /// escalating remediation: passive wait, then neutral re-entry, then a
    /// session reset. Returns as soon as a clearance recheck succeeds;
    /// `Exhausted` is fatal for the current run.
    pub async fn handle_interstitial(
        &mut self,
        surface: &dyn BlockSurface,
        max_attempts: u32,
    ) -> BackoffOutcome {
        for round in 0..max_attempts {
            let delay = self.round_delay(round) + jitter(self.config.backoff_jitter);
            warn!(
                round = round + 1,
                max_attempts,
                delay_secs = delay.as_secs(),
                "Interstitial detected, backing off"
            );

            let slices = (delay.as_millis() / self.config.recheck_slice.as_millis()).max(1);
            for _ in 0..slices {
                sleep(self.config.recheck_slice).await;
                if surface.interstitial_cleared().await.unwrap_or(false) {
                    info!(round = round + 1, "Interstitial cleared during wait");
                    return BackoffOutcome::Resolved;
                }
            }

            let remedy = match round {
                0 => Ok(()),
                1 => surface.visit_neutral_page().await,
                _ => surface.reset_session().await,
            };
            if let Err(e) = remedy {
                warn!(round = round + 1, error = %e, "Backoff remediation failed");
            }

            if surface.interstitial_cleared().await.unwrap_or(false) {
                info!(round = round + 1, "Interstitial cleared after remediation");
                return BackoffOutcome::Resolved;
            }
        }

        warn!(max_attempts, "Interstitial backoff exhausted");
        BackoffOutcome::Exhausted
    }
}

fn jitter(cap: Duration) -> Duration {
    let cap_ms = cap.as_millis() as u64;
    if cap_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..cap_ms))
}

// ---------------------------------------------------------------------------
// PacedGateway — every collaborator call goes through here
// ---------------------------------------------------------------------------

/// What a paced fetch produced, with collaborator failures degraded to a
/// recoverable outcome (an unproducible set is reported, not thrown).
#[derive(Debug, Clone)]
pub enum Fetched {
    Candidates(CandidateSet),
    /// The requested extended surface does not exist for this query.
    Unavailable,
    /// The collaborator could not produce a candidate set at all.
    Failed,
}

/// Wraps a [`CandidateSource`] so that every call is paced and interstitial
/// responses trigger backoff plus a single retry of the triggering fetch.
pub struct PacedGateway<'a> {
    source: &'a dyn CandidateSource,
    block: &'a dyn BlockSurface,
    pub pacer: PacingController,
    pub stats: RunStats,
    max_backoff_attempts: u32,
}

impl<'a> PacedGateway<'a> {
    pub fn new(
        source: &'a dyn CandidateSource,
        block: &'a dyn BlockSurface,
        pacing: PacingConfig,
        max_backoff_attempts: u32,
    ) -> Self {
        Self {
            source,
            block,
            pacer: PacingController::new(pacing),
            stats: RunStats::default(),
            max_backoff_attempts,
        }
    }

    pub async fn fetch(
        &mut self,
        query: &str,
        surface: Surface,
        cursor: Option<&str>,
    ) -> Result<Fetched, LocalRankError> {
        match self.render_once(query, surface, cursor).await {
            Outcome::Feed(fetched) => Ok(fetched),
            Outcome::Interstitial => {
                match self
                    .pacer
                    .handle_interstitial(self.block, self.max_backoff_attempts)
                    .await
                {
                    BackoffOutcome::Resolved => {
                        // Retry the triggering fetch once; a second
                        // interstitial in a row means the block is holding.
                        match self.render_once(query, surface, cursor).await {
                            Outcome::Feed(fetched) => Ok(fetched),
                            Outcome::Interstitial => Err(LocalRankError::BackoffExhausted {
                                attempts: self.max_backoff_attempts,
                            }),
                        }
                    }
                    BackoffOutcome::Exhausted => Err(LocalRankError::BackoffExhausted {
                        attempts: self.max_backoff_attempts,
                    }),
                }
            }
        }
    }

    pub async fn detail(&mut self, record: &CandidateRecord) -> anyhow::Result<DetailView> {
        self.pacer.pace_request().await;
        self.stats.requests_issued += 1;
        self.stats.detail_verifications += 1;
        self.source.render_detail(record).await
    }

    async fn render_once(
        &mut self,
        query: &str,
        surface: Surface,
        cursor: Option<&str>,
    ) -> Outcome {
        self.pacer.pace_request().await;
        self.stats.requests_issued += 1;

        match self.source.render_candidates(query, surface, cursor).await {
            Ok(Rendered::Candidates(set)) => Outcome::Feed(Fetched::Candidates(set)),
            Ok(Rendered::ExtendedUnavailable) => Outcome::Feed(Fetched::Unavailable),
            Ok(Rendered::Interstitial) => {
                self.stats.interstitials += 1;
                Outcome::Interstitial
            }
            Err(e) => {
                self.stats.collaborator_failures += 1;
                warn!(query, error = %e, "Collaborator could not produce candidates");
                Outcome::Feed(Fetched::Failed)
            }
        }
    }
}

enum Outcome {
    Feed(Fetched),
    Interstitial,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    fn quiet_config() -> PacingConfig {
        PacingConfig {
            base_jitter: Duration::ZERO,
            backoff_jitter: Duration::ZERO,
            ..PacingConfig::default()
        }
    }

    #[derive(Default)]
    struct MockBlock {
        rechecks: AtomicU32,
        neutral_visits: AtomicU32,
        session_resets: AtomicU32,
        /// Clearance recheck succeeds once this many rechecks have happened.
        clear_after_rechecks: Option<u32>,
        /// Clearance recheck succeeds once the session has been reset.
        clear_after_reset: bool,
    }

    #[async_trait]
    impl BlockSurface for MockBlock {
        async fn interstitial_cleared(&self) -> anyhow::Result<bool> {
            let n = self.rechecks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.clear_after_reset && self.session_resets.load(Ordering::SeqCst) > 0 {
                return Ok(true);
            }
            Ok(self.clear_after_rechecks.is_some_and(|limit| n >= limit))
        }

        async fn visit_neutral_page(&self) -> anyhow::Result<()> {
            self.neutral_visits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reset_session(&self) -> anyhow::Result<()> {
            self.session_resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn round_delay_strictly_increases() {
        let pacer = PacingController::new(PacingConfig::default());
        let mut prev = Duration::ZERO;
        for round in 0..5 {
            let d = pacer.round_delay(round);
            assert!(d > prev, "round {round} delay {d:?} not above {prev:?}");
            prev = d;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pace_request_never_resolves_below_floor() {
        let config = quiet_config();
        let floor = config.floor;
        let mut pacer = PacingController::new(config);

        let before = Instant::now();
        pacer.pace_request().await;
        assert!(before.elapsed() >= floor);
        assert_eq!(pacer.state().request_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pace_request_spaces_back_to_back_calls() {
        let mut pacer = PacingController::new(quiet_config());
        pacer.pace_request().await;

        let before = Instant::now();
        pacer.pace_request().await;
        // Second request: 1200ms base + 2 * 150ms growth, no jitter.
        assert!(before.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn pace_request_growth_is_capped() {
        let mut pacer = PacingController::new(quiet_config());
        for _ in 0..50 {
            pacer.pace_request().await;
        }
        let before = Instant::now();
        pacer.pace_request().await;
        // Growth term capped at 2000ms: 1200 + 2000 = 3200ms.
        assert!(before.elapsed() <= Duration::from_millis(3300));
    }

    #[tokio::test(start_paused = true)]
    async fn should_take_break_requires_both_duration_and_requests() {
        let mut pacer = PacingController::new(quiet_config());
        assert!(!pacer.should_take_break());

        tokio::time::advance(Duration::from_secs(21 * 60)).await;
        assert!(!pacer.should_take_break(), "request count still below minimum");

        for _ in 0..6 {
            pacer.pace_request().await;
        }
        assert!(pacer.should_take_break());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_resolves_on_early_clearance() {
        let mut pacer = PacingController::new(quiet_config());
        let block = MockBlock {
            clear_after_rechecks: Some(2),
            ..MockBlock::default()
        };
        let outcome = pacer.handle_interstitial(&block, 3).await;
        assert_eq!(outcome, BackoffOutcome::Resolved);
        assert_eq!(block.neutral_visits.load(Ordering::SeqCst), 0);
        assert_eq!(block.session_resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_escalates_then_exhausts() {
        let mut pacer = PacingController::new(quiet_config());
        let block = MockBlock::default();
        let outcome = pacer.handle_interstitial(&block, 3).await;
        assert_eq!(outcome, BackoffOutcome::Exhausted);
        assert_eq!(block.neutral_visits.load(Ordering::SeqCst), 1);
        assert_eq!(block.session_resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_resolves_on_final_round_session_reset() {
        let mut pacer = PacingController::new(quiet_config());
        let block = MockBlock {
            clear_after_reset: true,
            ..MockBlock::default()
        };
        let outcome = pacer.handle_interstitial(&block, 3).await;
        assert_eq!(outcome, BackoffOutcome::Resolved);
        assert_eq!(block.session_resets.load(Ordering::SeqCst), 1);
    }
}
