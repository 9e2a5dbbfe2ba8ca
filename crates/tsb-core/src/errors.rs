use std::time::Duration;

use crate::store::StoreError;

/// Core error type for the console.
///
/// Adapter crates map their specific errors into this type so the engine can
/// turn any failure into one short user-facing notice.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Short notice shown to the user when a handler gives up.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Error::Store(_) => "⚠️ The data service is unavailable right now. Please try again.",
            Error::Timeout(_) => "⏳ The request took too long. Please try again.",
            _ => "❌ Something went wrong. Please try again.",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_get_their_own_notice() {
        let err = Error::from(StoreError::Unavailable("connection refused".into()));
        assert!(err.user_notice().contains("data service"));
        assert!(err.to_string().contains("connection refused"));
    }
}
