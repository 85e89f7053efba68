//! Wire types for the rendering service API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which results surface the service should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Primary,
    Extended,
}

#[derive(Debug, Serialize)]
pub(crate) struct RenderRequest<'a> {
    pub query: &'a str,
    pub surface: Surface,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<&'a str>,
}

/// One raw candidate as extracted by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct WireCandidate {
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Body of a successful /render call.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderResponse {
    /// Final URL the rendered page landed on (after redirects).
    #[serde(default)]
    pub page_url: String,
    /// Leading slice of the rendered HTML, used for block-page detection.
    #[serde(default)]
    pub html_snippet: String,
    #[serde(default)]
    pub candidates: Vec<WireCandidate>,
    /// Opaque scroll/page token for the next extended fetch.
    #[serde(default)]
    pub cursor: Option<String>,
    /// False when the requested surface does not exist for this query
    /// (e.g. no "More places" affordance on the primary page).
    #[serde(default = "default_true")]
    pub surface_available: bool,
}

fn default_true() -> bool {
    true
}

/// What a /render call produced, after block-page classification.
#[derive(Debug, Clone)]
pub enum RenderFeed {
    Candidates(RenderResponse),
    /// The service landed on an anti-automation interstitial instead of
    /// results.
    Interstitial,
    /// The requested surface is not available for this query.
    Unavailable,
}

#[derive(Debug, Serialize)]
pub(crate) struct DetailRequest<'a> {
    pub url: &'a str,
}

/// Body of a successful /detail call.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NavigateRequest<'a> {
    pub url: &'a str,
}

/// Body of a /status call.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub interstitial: bool,
}
