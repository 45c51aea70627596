//! Error types for cook runs.

use cookline_model::ArtifactKind;
use cookline_sandbox::{FaultKind, SandboxError};
use cookline_storage::StorageError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type CookResult<T> = Result<T, CookError>;

/// Why a cook run (or one of its stages) failed.
#[derive(Debug, Error)]
pub enum CookError {
    /// Authored content is inconsistent: duplicate config ids, a missing or
    /// unconfigured function link, an unresolved variable.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("formula `{function}` for `{subject}` was rejected: {reason}")]
    SandboxRejected {
        function: String,
        subject: String,
        reason: String,
    },

    #[error("formula `{function}` for `{subject}` failed: {kind}")]
    SandboxFault {
        function: String,
        subject: String,
        kind: FaultKind,
    },

    #[error("formula `{function}` for `{subject}` returned {actual}, expected {expected}")]
    TypeMismatch {
        function: String,
        subject: String,
        expected: String,
        actual: String,
    },

    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),

    /// A cooker could not interpret its input collection.
    #[error("{kind} cooker failed: {message}")]
    CookerFailed { kind: ArtifactKind, message: String },

    #[error("a cook run is already in progress for {key}")]
    RunInProgress { key: String },
}

impl CookError {
    /// Attributes a sandbox error to the formula and the entity or offer it
    /// was computing for.
    pub fn from_sandbox(err: SandboxError, function: &str, subject: &str) -> Self {
        let (function, subject) = (function.to_string(), subject.to_string());
        match err {
            SandboxError::Rejected { reason } => Self::SandboxRejected {
                function,
                subject,
                reason,
            },
            SandboxError::Fault { kind } => Self::SandboxFault {
                function,
                subject,
                kind,
            },
            SandboxError::TypeMismatch { expected, actual } => Self::TypeMismatch {
                function,
                subject,
                expected,
                actual,
            },
            SandboxError::Validation(msg) => {
                Self::Validation(format!("{msg} (formula `{function}` for `{subject}`)"))
            }
        }
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::SandboxRejected { .. } => "sandbox_rejected",
            Self::SandboxFault { .. } => "sandbox_fault",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Persistence(_) => "persistence",
            Self::CookerFailed { .. } => "cooker_failed",
            Self::RunInProgress { .. } => "run_in_progress",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_errors_carry_attribution() {
        let err = CookError::from_sandbox(
            SandboxError::TypeMismatch {
                expected: "priceAmount (derived)".into(),
                actual: "number".into(),
            },
            "gemPrice",
            "offer-7",
        );
        assert_eq!(
            err.to_string(),
            "formula `gemPrice` for `offer-7` returned number, expected priceAmount (derived)"
        );
        assert_eq!(err.label(), "type_mismatch");
    }

    #[test]
    fn validation_keeps_message() {
        let err = CookError::from_sandbox(SandboxError::Validation("variable `x` missing".into()), "f", "e1");
        assert!(matches!(&err, CookError::Validation(m) if m.starts_with("variable `x` missing")));
    }

    #[test]
    fn faults_map_to_sandbox_fault() {
        let err = CookError::from_sandbox(
            SandboxError::fault(FaultKind::Timeout { timeout_ms: 300 }),
            "f",
            "e1",
        );
        assert!(matches!(err, CookError::SandboxFault { kind: FaultKind::Timeout { .. }, .. }));
    }
}
