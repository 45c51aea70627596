//! Error types for the formula sandbox.

use thiserror::Error;

pub type SandboxResult<T> = Result<T, SandboxError>;

/// How a running formula failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FaultKind {
    #[error("exceeded {timeout_ms}ms deadline")]
    Timeout { timeout_ms: u64 },

    #[error("exceeded memory limit of {limit_bytes} bytes")]
    MemoryLimit { limit_bytes: usize },

    #[error("exhausted fuel budget of {budget}")]
    FuelExhausted { budget: u64 },

    /// An uncaught exception raised by the formula itself, including syntax errors.
    #[error("{0}")]
    Runtime(String),

    #[error("result of {size} bytes exceeds cap of {limit} bytes")]
    ResultTooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    /// Static checks refused the source; nothing was executed.
    #[error("formula rejected: {reason}")]
    Rejected { reason: String },

    #[error("formula fault: {kind}")]
    Fault { kind: FaultKind },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Bad inputs: missing variables, malformed output paths.
    #[error("validation error: {0}")]
    Validation(String),
}

impl SandboxError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Fault {
            kind: FaultKind::Runtime(message.into()),
        }
    }

    pub fn fault(kind: FaultKind) -> Self {
        Self::Fault { kind }
    }
}
