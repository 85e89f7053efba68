pub mod error;
pub mod interstitial;
pub mod types;

pub use error::{Result, SerpClientError};
pub use interstitial::is_interstitial;
pub use types::{
    DetailResponse, RenderFeed, RenderResponse, StatusResponse, Surface, WireCandidate,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use types::{DetailRequest, NavigateRequest, RenderRequest};

/// Neutral entry page for block recovery: re-establishes an organic-looking
/// session before retrying the blocked query.
const NEUTRAL_ENTRY_URL: &str = "https://www.google.com/";

pub struct RenderClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RenderClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        url::Url::parse(base_url).expect("render service base URL must be a valid URL");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Render a results surface for a query and return the raw candidate
    /// feed, classified for block pages.
    pub async fn render(
        &self,
        query: &str,
        surface: Surface,
        cursor: Option<&str>,
    ) -> Result<RenderFeed> {
        info!(query, ?surface, "Render request");

        let resp: RenderResponse = self
            .post(
                "render",
                &RenderRequest {
                    query,
                    surface,
                    cursor,
                },
            )
            .await?;

        if is_interstitial(&resp.page_url, &resp.html_snippet) {
            warn!(query, page_url = resp.page_url.as_str(), "Render landed on interstitial");
            return Ok(RenderFeed::Interstitial);
        }

        if !resp.surface_available {
            info!(query, ?surface, "Requested surface not available");
            return Ok(RenderFeed::Unavailable);
        }

        info!(query, count = resp.candidates.len(), "Render complete");
        Ok(RenderFeed::Candidates(resp))
    }

    /// Fetch the detail view (e.g. place panel) for a result URL.
    pub async fn detail(&self, url: &str) -> Result<DetailResponse> {
        info!(url, "Detail request");
        self.post("detail", &DetailRequest { url }).await
    }

    /// Whether the service's current page is still an interstitial.
    pub async fn interstitial_status(&self) -> Result<bool> {
        let resp: StatusResponse = self.get("status").await?;
        Ok(resp.interstitial)
    }

    /// Navigate the rendering session to a neutral entry page.
    pub async fn visit_neutral_page(&self) -> Result<()> {
        info!(url = NEUTRAL_ENTRY_URL, "Navigating to neutral entry page");
        let _: serde_json::Value = self
            .post(
                "navigate",
                &NavigateRequest {
                    url: NEUTRAL_ENTRY_URL,
                },
            )
            .await?;
        Ok(())
    }

    /// Clear session-level browsing state (cookies and cache) and return to
    /// the neutral entry page.
    pub async fn reset_session(&self) -> Result<()> {
        info!("Resetting rendering session state");
        let _: serde_json::Value = self.post("session/reset", &serde_json::json!({})).await?;
        Ok(())
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SerpClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.client.get(self.endpoint(path)).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SerpClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{path}", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }
}
