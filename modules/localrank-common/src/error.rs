use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalRankError {
    #[error("Business name too ambiguous to match safely: {0:?}")]
    AmbiguousName(String),

    #[error("Interstitial backoff exhausted after {attempts} attempts")]
    BackoffExhausted { attempts: u32 },

    #[error("Rendering collaborator error: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
