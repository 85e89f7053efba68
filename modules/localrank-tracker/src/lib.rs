pub mod competitor;
pub mod matcher;
pub mod pacing;
pub mod rankings;
pub mod resolver;
pub mod stats;
pub mod traits;

pub use matcher::{MatcherConfig, Signature, SignatureInputs};
pub use pacing::{BackoffOutcome, PacingConfig, PacingController};
pub use rankings::{RankTracker, RankingRun, RunPolicy, TrackerConfig};
pub use resolver::{DiscoveryConfig, RankResolver, Resolution};
pub use stats::RunStats;
pub use traits::{BlockSurface, CandidateSource, Rendered};
