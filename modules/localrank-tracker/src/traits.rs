// Trait abstractions for the rank resolver's external collaborators.
//
// CandidateSource — all page rendering/extraction behind one trait. The
// core never touches a browser or the network; it consumes candidate feeds.
// BlockSurface — session-level hooks the interstitial backoff escalates
// through (clearance recheck, neutral re-entry, session reset).
//
// These enable deterministic testing with scripted mock sources: no
// rendering service, no network, `cargo test` in seconds.

use anyhow::Result;
use async_trait::async_trait;

use localrank_common::types::{CandidateRecord, CandidateSet, DetailView, Surface};

/// What one render call produced.
#[derive(Debug, Clone)]
pub enum Rendered {
    Candidates(CandidateSet),
    /// The collaborator landed on an anti-automation interstitial.
    Interstitial,
    /// The requested extended surface does not exist for this query.
    ExtendedUnavailable,
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Render a results surface for a query and extract its candidates.
    /// `cursor` carries the opaque scroll state from the previous extended
    /// set.
    async fn render_candidates(
        &self,
        query: &str,
        surface: Surface,
        cursor: Option<&str>,
    ) -> Result<Rendered>;

    /// Render the detail view for one record. Used only as the secondary
    /// verification signal during extended discovery.
    async fn render_detail(&self, record: &CandidateRecord) -> Result<DetailView>;
}

#[async_trait]
pub trait BlockSurface: Send + Sync {
    /// Whether the interstitial has cleared since the last check.
    async fn interstitial_cleared(&self) -> Result<bool>;

    /// Re-enter via a neutral page before retrying.
    async fn visit_neutral_page(&self) -> Result<()>;

    /// Clear session-level browsing state (cookies/cache) before retrying.
    async fn reset_session(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// serp-client implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl CandidateSource for serp_client::RenderClient {
    async fn render_candidates(
        &self,
        query: &str,
        surface: Surface,
        cursor: Option<&str>,
    ) -> Result<Rendered> {
        let wire_surface = match surface {
            Surface::Primary => serp_client::Surface::Primary,
            Surface::Extended => serp_client::Surface::Extended,
        };

        match self.render(query, wire_surface, cursor).await? {
            serp_client::RenderFeed::Candidates(resp) => {
                let records = resp
                    .candidates
                    .into_iter()
                    .enumerate()
                    .map(|(i, c)| CandidateRecord {
                        position: if c.position > 0 { c.position } else { i as u32 + 1 },
                        title: c.title.trim().to_string(),
                        url: c.url,
                        attributes: c.attributes,
                    })
                    .collect();
                Ok(Rendered::Candidates(CandidateSet {
                    query: query.to_string(),
                    records,
                    cursor: resp.cursor,
                }))
            }
            serp_client::RenderFeed::Interstitial => Ok(Rendered::Interstitial),
            serp_client::RenderFeed::Unavailable => Ok(Rendered::ExtendedUnavailable),
        }
    }

    async fn render_detail(&self, record: &CandidateRecord) -> Result<DetailView> {
        let resp = self.detail(&record.url).await?;
        Ok(DetailView { title: resp.title })
    }
}

#[async_trait]
impl BlockSurface for serp_client::RenderClient {
    async fn interstitial_cleared(&self) -> Result<bool> {
        Ok(!self.interstitial_status().await?)
    }

    async fn visit_neutral_page(&self) -> Result<()> {
        Ok(serp_client::RenderClient::visit_neutral_page(self).await?)
    }

    async fn reset_session(&self) -> Result<()> {
        Ok(serp_client::RenderClient::reset_session(self).await?)
    }
}
