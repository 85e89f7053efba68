//! Core data model for rank resolution.
//!
//! Candidate records are produced by the external rendering collaborator and
//! are immutable once returned. Everything here is plain data — no rendering
//! or network concerns leak into these types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};

/// Attribute keys the rendering collaborator populates on candidate records.
/// The core never probes page structure itself; whatever affordances the
/// collaborator detected (call/schedule buttons, ratings, addresses) arrive
/// through this map.
pub mod attr {
    /// `"local"`, `"organic"` or `"knowledge_panel"`.
    pub const RESULT_TYPE: &str = "result_type";
    pub const RATING: &str = "rating";
    pub const REVIEWS: &str = "reviews";
    pub const CATEGORY: &str = "category";
    pub const ADDRESS: &str = "address";
    pub const DESCRIPTION: &str = "description";
    /// `"true"` when the collaborator flagged the record as a paid placement.
    pub const SPONSORED: &str = "sponsored";
}

/// One search-result entry as observed by the rendering collaborator.
///
/// `position` is the 1-based on-page order at observation time. It is not
/// guaranteed dense or gap-free when a set is assembled from filtered
/// sources (e.g. a local-pack subset of a mixed results page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub position: u32,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl CandidateRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Whether the collaborator flagged this record as a map/local result.
    pub fn is_local(&self) -> bool {
        self.attribute(attr::RESULT_TYPE) == Some("local")
    }

    pub fn is_sponsored(&self) -> bool {
        self.attribute(attr::SPONSORED) == Some("true")
    }
}

/// Ordered candidate records for one query at one page/scroll state.
/// Order is stable within a set and reflects on-page ranking. `cursor` is
/// the collaborator's opaque token for requesting further scrolled content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub query: String,
    pub records: Vec<CandidateRecord>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl CandidateSet {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            records: Vec::new(),
            cursor: None,
        }
    }
}

/// Which results surface to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// The initial results page for a query.
    Primary,
    /// The expanded, lazily-scrolled full listing (e.g. "More places").
    Extended,
}

/// Secondary signal for match verification: the detail view of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailView {
    pub title: String,
}

/// A resolved rank. Serializes as the integer or the string `"NOT_FOUND"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Found(u32),
    NotFound,
}

impl Rank {
    pub fn is_found(&self) -> bool {
        matches!(self, Rank::Found(_))
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rank::Found(n) => write!(f, "{n}"),
            Rank::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rank::Found(n) => serializer.serialize_u32(*n),
            Rank::NotFound => serializer.serialize_str("NOT_FOUND"),
        }
    }
}

/// Result of resolving one keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankOutcome {
    pub rank: Rank,
    pub matched: Option<CandidateRecord>,
}

impl RankOutcome {
    pub fn not_found() -> Self {
        Self {
            rank: Rank::NotFound,
            matched: None,
        }
    }
}

/// The leading non-target candidate for a keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorOutcome {
    pub rank: Option<u32>,
    pub record: Option<CandidateRecord>,
}

impl CompetitorOutcome {
    pub fn none() -> Self {
        Self {
            rank: None,
            record: None,
        }
    }
}

/// One row of the caller-facing ranking report.
#[derive(Debug, Clone, Serialize)]
pub struct RankingRow {
    pub keyword: String,
    pub rank: Rank,
    pub competitor: CompetitorOutcome,
}

/// Whether a run processed every keyword or was abandoned part-way.
/// Partial results are always retained; this flag is how callers tell the
/// two apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted { reason: String },
}
