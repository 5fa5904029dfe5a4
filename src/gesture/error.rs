//! Gesture Error Types
//!
//! Errors surfaced by the registration and coordination layer. The dispatch
//! path never returns these: rejected gestures, synthesis failures and dead
//! listeners are all resolved locally.

use thiserror::Error;

/// Result type for gesture operations
pub type Result<T> = std::result::Result<T, GestureError>;

/// Gesture module error types
#[derive(Error, Debug)]
pub enum GestureError {
    /// Caller supplied an argument the service cannot act on
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Handle does not refer to a live registration
    #[error("Unknown listener: {0}")]
    UnknownListener(u64),

    /// Sensitivity outside 0..=4
    #[error("Invalid sensitivity: {0} (expected 0..=4)")]
    InvalidSensitivity(u8),

    /// Display geometry the tracker cannot use
    #[error("Invalid display geometry: {0}x{1}")]
    InvalidDisplay(u32, u32),

    /// Coordination thread is gone
    #[error("Gesture service stopped")]
    ServiceStopped,

    /// Listener refused or failed to take an activation
    #[error("Activation delivery failed: {0}")]
    DeliveryFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Error classification for recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Bad input from a registration client
    Argument,
    /// Listener delivery problems
    Delivery,
    /// Service lifecycle problems
    Lifecycle,
    /// Unknown error type
    Unknown,
}

/// Classify error for recovery strategy selection
pub fn classify_error(error: &GestureError) -> ErrorType {
    match error {
        GestureError::InvalidArgument(_)
        | GestureError::UnknownListener(_)
        | GestureError::InvalidSensitivity(_)
        | GestureError::InvalidDisplay(_, _) => ErrorType::Argument,

        GestureError::DeliveryFailed(_) => ErrorType::Delivery,

        GestureError::ServiceStopped | GestureError::Io(_) => ErrorType::Lifecycle,

        GestureError::Unknown(_) => ErrorType::Unknown,
    }
}

impl GestureError {
    /// Whether the service keeps running normally after this error.
    ///
    /// Argument and delivery errors only affect the caller (or the one
    /// activation); lifecycle errors mean the service is no longer usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            classify_error(self),
            ErrorType::Argument | ErrorType::Delivery
        )
    }
}
