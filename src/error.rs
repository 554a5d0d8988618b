//! Typed errors for the codec, the reactive store and configuration.
//!
//! Backend I/O uses `anyhow` with context, the same way the redb-backed
//! services report failures. The variants here cover the places where a
//! caller needs to tell failures apart.

/// Result type for crux operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A value could not be turned into an envelope string.
    #[error("failed to encode entry '{key}': {reason}")]
    Encode { key: String, reason: String },

    /// A stored string could not be parsed back into an envelope.
    #[error("failed to decode entry '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// State or a partial update does not have the shape of the store.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an encode error.
    pub fn encode(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Encode {
            key: key.into(),
            reason: format!("{reason:#}"),
        }
    }

    /// Create a decode error.
    pub fn decode(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            key: key.into(),
            reason: format!("{reason:#}"),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true for faults raised while reading stored data.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_message_names_key() {
        let err = Error::decode("crux:theme", "expected value at line 1 column 1");
        assert!(err.is_decode());
        assert_eq!(
            err.to_string(),
            "failed to decode entry 'crux:theme': expected value at line 1 column 1"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = Error::io(
            "reading crux.toml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(!err.is_decode());
        assert!(std::error::Error::source(&err).is_some());
    }
}
