use thiserror::Error;

pub type Result<T> = std::result::Result<T, SerpClientError>;

#[derive(Debug, Error)]
pub enum SerpClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for SerpClientError {
    fn from(err: reqwest::Error) -> Self {
        SerpClientError::Network(err.to_string())
    }
}
