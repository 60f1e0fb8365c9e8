//! Error types for the GPI layer.
//!
//! All errors are strongly typed using thiserror. Resolution misses are not
//! errors at all: hierarchy lookups return `Option` because absence is the
//! common outcome when probing objects across backends.

use thiserror::Error;

use crate::callback::{CallbackId, CallbackState};
use crate::types::{CallbackReason, ObjectType};

/// Errors raised by the GPI layer.
#[derive(Debug, Error)]
pub enum GpiError {
    /// An accessor was invoked on a handle whose classification does not support it.
    #[error("{operation} is not supported for objects of type {object_type}")]
    Unsupported {
        /// The rejected operation.
        operation: &'static str,
        /// Classification of the offending handle.
        object_type: ObjectType,
    },

    /// A write was attempted on a constant object.
    #[error("object '{name}' is constant and cannot be written")]
    ReadOnly {
        /// Fully-qualified name of the object.
        name: String,
    },

    /// A logical index fell outside the declared range of an indexable object.
    #[error("index {index} is outside the range [{left}:{right}]")]
    IndexOutOfRange {
        /// Requested logical index.
        index: i64,
        /// Declared left bound.
        left: i64,
        /// Declared right bound.
        right: i64,
    },

    /// A value could not be encoded or decoded.
    #[error("invalid value: {reason}")]
    InvalidValue {
        /// What was wrong with it.
        reason: String,
    },

    /// A callback state change not permitted by the state machine.
    #[error("invalid callback transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// State before the attempted change.
        from: CallbackState,
        /// Requested state.
        to: CallbackState,
    },

    /// The callback token does not name a live callback.
    #[error("unknown callback {id}")]
    UnknownCallback {
        /// The stale or foreign token.
        id: CallbackId,
    },

    /// The native simulator API rejected a call.
    #[error("native call {call} failed: {detail}")]
    Native {
        /// Name of the native entry point.
        call: &'static str,
        /// Diagnostic from the backend.
        detail: String,
    },

    /// A callback fired with user data that failed validation.
    #[error("corrupted {} callback on {product}: {detail}", reason_label(*.reason))]
    Corrupted {
        /// Reason code the callback was registered for, if it could be recovered.
        reason: Option<CallbackReason>,
        /// Simulator product string.
        product: String,
        /// What failed to validate.
        detail: String,
    },

    /// A second backend tried to register in a process that already has one.
    #[error("backend {active} is already active in this process")]
    BackendAlreadyActive {
        /// Name of the backend already installed.
        active: String,
    },

    /// No backend has been installed yet.
    #[error("no GPI backend is active")]
    NoActiveBackend,

    /// Configuration could not be loaded.
    #[error("configuration error: {message}")]
    Config {
        /// Diagnostic message.
        message: String,
    },
}

impl GpiError {
    /// Creates a native-API error.
    #[must_use]
    pub fn native(call: &'static str, detail: impl Into<String>) -> Self {
        Self::Native {
            call,
            detail: detail.into(),
        }
    }

    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a type-mismatch error.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::ReadOnly { .. })
    }

    /// Returns true if this error came from the native simulator API.
    #[must_use]
    pub const fn is_native(&self) -> bool {
        matches!(self, Self::Native { .. })
    }

    /// Returns true if this error must end the simulation.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

fn reason_label(reason: Option<CallbackReason>) -> String {
    reason.map_or_else(|| "unknown".to_string(), |r| r.to_string())
}

/// Result type for GPI operations.
pub type GpiResult<T> = Result<T, GpiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        let err = GpiError::Unsupported {
            operation: "read_real",
            object_type: ObjectType::Module,
        };
        assert!(err.is_unsupported());
        assert!(!err.is_fatal());

        let err = GpiError::native("vpi_register_cb", "returned null");
        assert!(err.is_native());
        assert_eq!(err.to_string(), "native call vpi_register_cb failed: returned null");

        let err = GpiError::Corrupted {
            reason: None,
            product: "model".to_string(),
            detail: "bad tag".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "corrupted unknown callback on model: bad tag");
    }
}
