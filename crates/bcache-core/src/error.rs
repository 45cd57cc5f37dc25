//! Error types for bcache

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// bcache error types
#[derive(Debug, Error)]
pub enum Error {
    /// Store capacity must be a positive number of keys
    #[error("invalid capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),

    /// Gossip payload could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidCapacity(0);
        assert_eq!(err.to_string(), "invalid capacity: 0 (must be at least 1)");

        let err: Error = postcard::Error::DeserializeUnexpectedEnd.into();
        assert!(err.to_string().starts_with("codec error"));
    }
}
