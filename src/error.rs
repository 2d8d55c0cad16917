//! Error types.
//!
//! Only connection setup and configuration loading can fail. Transport
//! backpressure is [`crate::ring::Full`], malformed frames and duplicate
//! orders are counted or ignored rather than surfaced.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to establish the feed connection. Always recoverable by retrying.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("invalid feed address: {0}")]
    InvalidAddress(String),
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let err = ConnectError::Connect {
            addr: "127.0.0.1:9".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(err.to_string().starts_with("connect to 127.0.0.1:9 failed"));
        assert_eq!(
            ConnectError::InvalidAddress("nope".into()).to_string(),
            "invalid feed address: nope"
        );
    }
}
