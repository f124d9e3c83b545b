//! Error types for Atrium
//!
//! One crate-wide error enum so the facade can map every rejection to a
//! distinct HTTP status and stable error code.

use crate::progression::ProgressionError;

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AtriumError {
    /// A referenced user or group does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The student already belongs to a group; removal must precede reassignment
    #[error("user {0} already belongs to a group")]
    AlreadyAssigned(String),

    /// The target group is a single group and already holds a different member
    #[error("group {0} is a single group and already has a member")]
    GroupFull(String),

    /// Progression rule rejection (locked module, bad sequence, failing score)
    #[error(transparent)]
    Progression(#[from] ProgressionError),

    /// The presented credential could not be verified
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The operation requires an authenticated caller
    #[error("authentication required")]
    AuthenticationRequired,

    /// The caller asked to join a room they are not a member of
    #[error("not authorized for room {0}")]
    NotAuthorizedForRoom(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AtriumError {
    /// Stable machine-readable code, used in error responses and frames
    pub fn code(&self) -> &'static str {
        match self {
            AtriumError::NotFound(_) => "NOT_FOUND",
            AtriumError::AlreadyAssigned(_) => "ALREADY_ASSIGNED",
            AtriumError::GroupFull(_) => "GROUP_FULL",
            AtriumError::Progression(e) => e.code(),
            AtriumError::InvalidCredential(_) => "INVALID_CREDENTIAL",
            AtriumError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            AtriumError::NotAuthorizedForRoom(_) => "NOT_AUTHORIZED_FOR_ROOM",
            AtriumError::Database(_) => "DATABASE_ERROR",
            AtriumError::Config(_) => "CONFIG_ERROR",
            AtriumError::Internal(_) => "INTERNAL_ERROR",
            AtriumError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AtriumError>;
