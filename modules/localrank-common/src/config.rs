use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Rendering collaborator
    pub render_base_url: String,
    pub render_token: Option<String>,

    // Target business
    pub business_name: String,
    /// Canonical listing title, when the caller has observed one. Preferred
    /// over `business_name` for the core-prefix match anchor.
    pub canonical_name: Option<String>,
    pub city: String,

    // Keywords to resolve, in order
    pub keywords: Vec<String>,

    // Optional stop-words excluded from signature tokens
    pub stop_words: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            render_base_url: required_env("RENDER_BASE_URL"),
            render_token: env::var("RENDER_TOKEN").ok(),
            business_name: required_env("BUSINESS_NAME"),
            canonical_name: env::var("BUSINESS_CANONICAL_NAME").ok(),
            city: required_env("CITY"),
            keywords: comma_list(&required_env("KEYWORDS")),
            stop_words: env::var("LOCALRANK_STOPWORDS")
                .map(|v| comma_list(&v.to_lowercase()))
                .unwrap_or_default(),
        }
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            render_base_url = self.render_base_url.as_str(),
            has_token = self.render_token.is_some(),
            business = self.business_name.as_str(),
            city = self.city.as_str(),
            keywords = self.keywords.len(),
            stop_words = self.stop_words.len(),
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
