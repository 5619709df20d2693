use thiserror::Error;

/// Main error type for the gateway
///
/// Each variant is one failure class the front door maps to a distinct
/// response; see [`GatewayError::status_code`].
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Caller secret missing or wrong for the requested resource
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Transport or backend failure after the retry policy was exhausted
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The backend refused our own credentials
    #[error("Remote rejected credentials: {0}")]
    RemoteRejected(String),

    /// Path does not resolve to a folder or report
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller asked for cached data only and there is none
    #[error("Not cached: {0}")]
    NotCached(String),

    /// Unparseable request input or structurally invalid report data
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Request uses a directive the gateway does not implement
    #[error("Not implemented: {0}")]
    Unsupported(String),

    /// Ledger store stayed locked for every retry
    #[error("Storage busy: {0}")]
    StorageBusy(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GatewayError {
    /// HTTP status the front door answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::NotFound(_) => 404,
            Self::MalformedInput(_) => 400,
            Self::NotCached(_) => 504,
            Self::Unsupported(_) => 501,
            Self::RemoteUnavailable(_) | Self::RemoteRejected(_) => 502,
            Self::StorageBusy(_) | Self::Storage(_) | Self::ConfigError(_) | Self::IoError(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                Self::StorageBusy(err.to_string())
            }
            _ => Self::Storage(err.to_string()),
        }
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
