use thiserror::Error;

use crate::booking::model::BookingStatus;

/// Domain error taxonomy for the booking core. Every variant is terminal for
/// the current operation; retry policy belongs to callers, never to the core.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("requested slot overlaps an existing booking for this dentist; pick another time")]
    SlotConflict,

    #[error("booking cannot move from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("insufficient permission")]
    Permission,

    #[error("none of the requested fields may be updated by this caller in the current state")]
    NoUpdatableFields,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("service is not currently offered")]
    ServiceInactive,

    #[error("booking was modified concurrently; reload and retry")]
    Stale,

    #[error("storage failure")]
    Repository(#[from] anyhow::Error),
}

impl BookingError {
    /// Stable machine-readable code, mirrored by the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::SlotConflict => "SLOT_CONFLICT",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::Permission => "FORBIDDEN",
            BookingError::NoUpdatableFields => "NO_UPDATABLE_FIELDS",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::ServiceInactive => "SERVICE_INACTIVE",
            BookingError::Stale => "CONCURRENT_UPDATE",
            BookingError::Repository(_) => "INTERNAL",
        }
    }
}
