//! Error taxonomy for booking operations.
//!
//! Only domain outcomes cross the controller boundary. Cache-tier failures
//! are converted to fallback behavior at the cache boundary and never reach
//! callers; durable-store failures surface as [`BookingError::Transient`].

use thiserror::Error;

/// Result alias for booking operations.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Domain outcomes of booking operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The event does not exist.
    #[error("Event not found")]
    EventNotFound,

    /// No booking exists for this user and event.
    #[error("Booking not found")]
    BookingNotFound,

    /// The user already holds a booking for this event.
    #[error("You have already booked this event")]
    AlreadyBooked,

    /// The event has no remaining slots. A normal business outcome, not a
    /// failure.
    #[error("Event is fully booked")]
    FullyBooked,

    /// A store operation failed mid-flight. The whole operation is safe to
    /// retry.
    #[error("Booking could not be completed, please try again: {0}")]
    Transient(String),
}

impl BookingError {
    /// Returns `true` for outcomes that will not change on retry.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        assert!(!BookingError::Transient("io".into()).is_terminal());
        assert!(BookingError::FullyBooked.is_terminal());
        assert!(BookingError::AlreadyBooked.is_terminal());
    }
}
