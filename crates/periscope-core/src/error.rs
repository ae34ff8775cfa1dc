//! Error types for periscope-core

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for periscope operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by API handlers and snapshot builders
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for the periscope server and bridge
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// A correlation ID string that is not of the form `cmd_<n>`
    #[error("Invalid command id: {0}")]
    InvalidCommandId(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
