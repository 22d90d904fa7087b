//! Hand-rolled error taxonomy for the promise chain.
//!
//! Kept deliberately flat (one enum, not a three-layer Core/Domain/Impl
//! taxonomy) since this crate has none of the cross-service concerns
//! (transport, cluster membership, security posture) that justify that
//! depth elsewhere. `std::error::Error` is implemented by hand to match
//! the surrounding ecosystem's convention of not pulling `thiserror` into
//! production code.

use std::fmt;

use crate::envelope::ValueType;

/// Everything that can settle a promise as rejected from within this crate
/// itself, as opposed to an application-supplied rejection reason.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum PromiseError {
    /// A handler declared a parameter type that did not match the
    /// envelope offered to it.
    BadCast {
        from: ValueType,
        to: ValueType,
    },
    /// A handler unwound via `panic!` instead of returning.
    HandlerPanicked {
        message: String,
    },
    /// `with_timeout` elapsed before the guarded promise settled.
    TimedOut,
    /// Reserved for collaborator adapters that implement a `stop`
    /// operation; rejects all in-flight promises with this reason. No
    /// adapter in this crate raises it today.
    Stopped,
}

impl fmt::Display for PromiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseError::BadCast { from, to } => {
                write!(f, "bad cast: handler expected {to}, envelope held {from}")
            }
            PromiseError::HandlerPanicked { message } => {
                write!(f, "handler panicked: {message}")
            }
            PromiseError::TimedOut => write!(f, "promise timed out"),
            PromiseError::Stopped => write!(f, "service stopped"),
        }
    }
}

impl std::error::Error for PromiseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Precise mismatch produced by `AnyValue::downcast`.
#[derive(Debug, Clone)]
pub struct BadCast {
    pub from: ValueType,
    pub to: ValueType,
}

impl fmt::Display for BadCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad cast from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for BadCast {}

impl From<BadCast> for PromiseError {
    fn from(c: BadCast) -> Self {
        PromiseError::BadCast { from: c.from, to: c.to }
    }
}
