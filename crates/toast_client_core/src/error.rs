//! Error kinds surfaced by the client core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Local durable store unavailable or a statement failed. Fatal to the current operation.
    #[error("storage error: {0}")]
    Storage(String),
    /// Credential missing, expired or refresh failed. Aborts a sync pass.
    #[error("auth error: {0}")]
    Auth(String),
    /// A single remote call failed. Retried on the next trigger.
    #[error("remote error: {0}")]
    RemoteTransient(String),
    /// A live feed delivered an error instead of a snapshot.
    #[error("feed error: {0}")]
    Feed(String),
    #[error("invalid config: {0}")]
    Config(String),
}

impl CoreError {
    pub fn is_auth(&self) -> bool {
        matches!(self, CoreError::Auth(_))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<CoreError> for String {
    fn from(e: CoreError) -> Self {
        e.to_string()
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
