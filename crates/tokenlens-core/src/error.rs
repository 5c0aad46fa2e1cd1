//! Error types for tokenlens-core
//!
//! The engine is built for graceful degradation: tokenizer failures,
//! missing telemetry fields, unknown pricing entries and failing child
//! sessions all degrade to fallback values with a logged warning. The
//! only error that crosses the analysis boundary is [`CoreError::NoTurns`].

use thiserror::Error;

/// Core error type for tokenlens operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// The requested session has no turns at all - nothing to analyze.
    ///
    /// This is the single caller-input error surfaced by the analyzer;
    /// every other failure is absorbed internally.
    #[error("Session has no turns to analyze: {session_id}")]
    NoTurns { session_id: String },

    /// A session fetch from the injected source failed.
    #[error("Failed to fetch session {session_id}: {message}")]
    SessionFetch { session_id: String, message: String },

    /// A tokenizer backend could not be loaded or used.
    #[error("Tokenizer backend error: {message}")]
    Tokenizer { message: String },

    /// The tool catalog could not be retrieved.
    #[error("Tool catalog error: {message}")]
    Catalog { message: String },

    /// Pricing reference data was malformed.
    #[error("Pricing data error: {message}")]
    Pricing { message: String },
}

impl CoreError {
    pub fn session_fetch(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionFetch {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    pub fn tokenizer(message: impl Into<String>) -> Self {
        Self::Tokenizer {
            message: message.into(),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_turns_display() {
        let err = CoreError::NoTurns {
            session_id: "ses_123".to_string(),
        };
        assert_eq!(err.to_string(), "Session has no turns to analyze: ses_123");
    }

    #[test]
    fn test_session_fetch_helper() {
        let err = CoreError::session_fetch("ses_abc", "connection refused");
        assert!(err.to_string().contains("ses_abc"));
        assert!(err.to_string().contains("connection refused"));
    }
}
