//! Error taxonomy.
//!
//! Every fallible operation returns one of the enums below. Each variant falls into
//! exactly one [`ErrorClass`]:
//!
//! - **Transient**: recovered inside the session state machine and never returned
//!   from [`DeviceSession::poll`](crate::session::DeviceSession::poll).
//! - **Structural**: a precondition the caller violated. Reported immediately, never retried.
//! - **Fatal**: the owning catalog/session is unusable and must be recreated.
//! - **BestEffort**: never returned as an error; surfaced as a
//!   [`SessionWarning`](crate::session::SessionWarning) instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::device::{NativeError, ObjectId};

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Structural,
    Fatal,
    BestEffort,
}

/// Device discovery failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("input subsystem unavailable: {0}")]
    SubsystemUnavailable(String),
    #[error("device enumeration failed: {0}")]
    EnumerationFailed(#[source] NativeError),
    #[error("joystick '{index}' is not connected ({count} device(s) found)")]
    DeviceIndexOutOfRange { index: usize, count: usize },
}

/// Failures while opening a device session.
#[derive(Debug, Error)]
pub enum DeviceOpenError {
    #[error("failed to create device '{name}': {source}")]
    CreateFailed { name: String, source: NativeError },
    #[error("device '{name}' rejected the joystick data format: {source}")]
    FormatNegotiationFailed { name: String, source: NativeError },
}

/// Failures of [`DeviceSession::acquire`](crate::session::DeviceSession::acquire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The device was lost (unplugged, sleep/wake). Retrying is expected to succeed.
    #[error("device input lost")]
    InputLost,
    /// Another process holds exclusive access. Soft: try again later.
    #[error("another application has priority access to the device")]
    OtherAppHasPriority,
    /// Bad parameters or an uninitialized device. Fatal for the session.
    #[error("device is in an invalid state: {0}")]
    InvalidState(NativeError),
}

/// Failures of [`DeviceSession::poll`](crate::session::DeviceSession::poll).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("device session failed: {0}")]
    Fatal(String),
    #[error("poll cancelled")]
    Cancelled,
}

/// Session-level failures other than acquire/poll.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("object enumeration failed: {0}")]
    ObjectEnumerationFailed(#[source] NativeError),
}

/// Effect enumeration, creation and playback failures.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("device is not acquired: {0}")]
    DeviceNotAcquired(#[source] AcquireError),
    #[error("axis binding {axes:?} is empty or not part of the device layout")]
    InvalidAxisBinding { axes: Vec<ObjectId> },
    #[error("invalid direction encoding: {0}")]
    InvalidDirectionEncoding(String),
    #[error("parameters for {given} do not match effect type {expected}")]
    ParametersMismatch { expected: String, given: &'static str },
    #[error("{field} {value} is outside {min}..={max}")]
    MagnitudeOutOfRange { field: &'static str, value: i64, min: i64, max: i64 },
    #[error("effect enumeration failed: {0}")]
    EnumerationFailed(#[source] NativeError),
    #[error("effect creation failed: {0}")]
    CreateFailed(#[source] NativeError),
    #[error("effect command failed: {0}")]
    CommandFailed(#[source] NativeError),
    #[error("effect binding used after release")]
    UseAfterRelease,
    #[error("owning device session is gone")]
    SessionClosed,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("axis range is empty: min {min} must be below max {max}")]
    InvalidAxisRange { min: i32, max: i32 },
}

impl CatalogError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DeviceIndexOutOfRange { .. } => ErrorClass::Structural,
            Self::SubsystemUnavailable(_) | Self::EnumerationFailed(_) => ErrorClass::Fatal,
        }
    }
}

impl DeviceOpenError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Fatal
    }
}

impl AcquireError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InputLost | Self::OtherAppHasPriority => ErrorClass::Transient,
            Self::InvalidState(_) => ErrorClass::Fatal,
        }
    }
}

impl PollError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Fatal(_) => ErrorClass::Fatal,
            // Cancellation is requested by the caller, never a device condition.
            Self::Cancelled => ErrorClass::Structural,
        }
    }
}

impl EffectError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DeviceNotAcquired(_)
            | Self::InvalidAxisBinding { .. }
            | Self::InvalidDirectionEncoding(_)
            | Self::ParametersMismatch { .. }
            | Self::MagnitudeOutOfRange { .. }
            | Self::UseAfterRelease
            | Self::SessionClosed => ErrorClass::Structural,
            Self::EnumerationFailed(_) | Self::CreateFailed(_) | Self::CommandFailed(_) => {
                ErrorClass::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_errors_split_transient_and_fatal() {
        assert_eq!(AcquireError::InputLost.class(), ErrorClass::Transient);
        assert_eq!(AcquireError::OtherAppHasPriority.class(), ErrorClass::Transient);
        assert_eq!(
            AcquireError::InvalidState(NativeError::InvalidParam).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn precondition_violations_are_structural() {
        assert_eq!(EffectError::UseAfterRelease.class(), ErrorClass::Structural);
        assert_eq!(
            EffectError::InvalidDirectionEncoding("mixed".into()).class(),
            ErrorClass::Structural
        );
        assert_eq!(
            CatalogError::DeviceIndexOutOfRange { index: 3, count: 2 }.class(),
            ErrorClass::Structural
        );
    }

    #[test]
    fn out_of_range_message_names_index_and_count() {
        let msg = CatalogError::DeviceIndexOutOfRange { index: 3, count: 2 }.to_string();
        assert!(msg.contains("'3'"));
        assert!(msg.contains("2 device(s)"));
    }
}
