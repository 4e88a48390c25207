//! Error types module
//!
//! The ingestion pipeline classifies every failure into one of a small number of
//! categories. Where a failure surfaces decides what happens next:
//!
//! - [`IngestError::Validation`] is returned synchronously at finalize time, before a job
//!   is ever enqueued.
//! - [`IngestError::FatalInput`] aborts a job before anything was written (corrupt or
//!   unsupported media, missing staging object).
//! - [`IngestError::TransientExternal`] comes from storage or the catalog and may leave
//!   partial state behind, which the orchestrator rolls back. Transcoder failures never
//!   get here; the variant generator falls back to storing the original.
//!
//! Soft degradations (metadata or preview extraction failing) never become an
//! `IngestError`; they are logged and the affected fields are omitted.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// External system an operation talked to when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSystem {
    Storage,
    Catalog,
}

impl Display for ExternalSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExternalSystem::Storage => write!(f, "storage"),
            ExternalSystem::Catalog => write!(f, "catalog"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{system} error: {message}")]
    TransientExternal {
        system: ExternalSystem,
        message: String,
    },

    #[error("Unsupported or corrupt input: {0}")]
    FatalInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    pub fn validation(message: impl Into<String>) -> Self {
        IngestError::Validation(message.into())
    }

    pub fn fatal_input(message: impl Into<String>) -> Self {
        IngestError::FatalInput(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        IngestError::TransientExternal {
            system: ExternalSystem::Storage,
            message: message.into(),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        IngestError::TransientExternal {
            system: ExternalSystem::Catalog,
            message: message.into(),
        }
    }

    /// Machine-readable error code used in logs and notification metadata.
    pub fn error_code(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "VALIDATION_ERROR",
            IngestError::TransientExternal { .. } => "TRANSIENT_EXTERNAL_ERROR",
            IngestError::FatalInput(_) => "FATAL_INPUT_ERROR",
            IngestError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a retry could plausibly succeed. Nothing retries automatically; this only
    /// informs the failure notification.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IngestError::TransientExternal { .. })
    }

    /// Human-readable reason carried in the `upload_failed` notification.
    pub fn user_message(&self) -> String {
        match self {
            IngestError::Validation(msg) => msg.clone(),
            IngestError::FatalInput(_) => {
                "The uploaded file could not be processed. It may be corrupt or in an unsupported format."
                    .to_string()
            }
            IngestError::TransientExternal { .. } => {
                "A temporary problem occurred while processing your upload. Please try again."
                    .to_string()
            }
            IngestError::Internal(_) => {
                "An unexpected error occurred while processing your upload.".to_string()
            }
        }
    }
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<IngestError>() {
            Ok(ingest) => ingest,
            Err(other) => IngestError::Internal(format!("{:#}", other)),
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Internal(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_recoverable() {
        assert!(IngestError::storage("timeout").is_recoverable());
        assert!(IngestError::catalog("down").is_recoverable());
        assert!(!IngestError::fatal_input("bad gif").is_recoverable());
        assert!(!IngestError::validation("too many tags").is_recoverable());
    }

    #[test]
    fn user_message_hides_internal_details() {
        let err = IngestError::storage("connection reset by peer at 10.0.0.3:9000");
        assert!(!err.user_message().contains("10.0.0.3"));
        assert_eq!(err.error_code(), "TRANSIENT_EXTERNAL_ERROR");
    }

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = IngestError::validation("Latitude must be between -90 and 90");
        assert_eq!(err.user_message(), "Latitude must be between -90 and 90");
    }

    #[test]
    fn anyhow_roundtrip_preserves_category() {
        let err: anyhow::Error = IngestError::fatal_input("truncated").into();
        let back = IngestError::from(err);
        assert!(matches!(back, IngestError::FatalInput(_)));

        let generic = IngestError::from(anyhow::anyhow!("boom"));
        assert!(matches!(generic, IngestError::Internal(_)));
    }

    #[test]
    fn display_names_the_external_system() {
        let err = IngestError::catalog("write rejected");
        assert_eq!(err.to_string(), "catalog error: write rejected");
    }
}
