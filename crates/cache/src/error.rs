/// Error type for cache configuration and remote tier failures.
///
/// The local store itself never fails at runtime; only construction and
/// the optional remote tier produce errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    Config(String),

    #[error("Remote cache tier error: {0}")]
    Remote(String),

    #[error("Cache value serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }
}
