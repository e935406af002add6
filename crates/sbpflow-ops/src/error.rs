//! Error types for operator construction and inference.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpError {
    #[error("not a valid configuration: {0}")]
    InvalidConfig(String),

    #[error("unimplemented for this path: {0}")]
    Unimplemented(String),

    #[error("blob desc mismatch on `{bn}`: expected {expected}, got {actual}")]
    DescMismatch {
        bn: String,
        expected: String,
        actual: String,
    },

    #[error("blob desc of `{0}` not found")]
    MissingBlob(String),

    #[error("invalid axis {axis} for `{bn}` with rank {rank}")]
    InvalidAxis { bn: String, axis: usize, rank: usize },

    #[error("operand `{0}` enrolled twice")]
    DuplicateOperand(String),

    #[error("invalid sbp signature: {0}")]
    InvalidSignature(String),

    #[error("no operator registered for kind `{0}`")]
    UnregisteredOp(String),

    #[error("operator kind `{0}` registered twice")]
    DuplicateRegistration(String),
}

pub type Result<T> = std::result::Result<T, OpError>;
