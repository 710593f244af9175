//! Authentication error types.
//!
//! This module defines errors that can occur while obtaining, validating and
//! injecting WSAA access tickets, and while calling the SOAP services the
//! tickets authorize.

use std::sync::Arc;

use arca_sdk_storage::{BoxError, StorageError};
use thiserror::Error;

/// Authentication and dispatch errors.
///
/// A missing or expired ticket is never an error: the gateway treats it as a
/// cache miss and logs in again. Every variant below propagates to the caller
/// unchanged.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. New variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// A ticket record is missing its token, signature or expiration time,
    /// or its header has the wrong shape.
    #[error("Malformed ticket: {0}")]
    MalformedTicket(String),

    /// The tax identifier a ticket was formatted for is not a positive
    /// integer.
    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),

    /// The remote login call failed or returned an unusable response.
    ///
    /// Not retried.
    #[error("Remote login failed: {message}")]
    RemoteLogin {
        /// Description of the failure.
        message: String,
        /// The underlying transport or protocol error.
        #[source]
        source: Option<BoxError>,
    },

    /// Ticket store failure other than "not found".
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Ticket store error: {0}")]
    Store(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),

    /// The dispatcher was asked to invoke an operation the wrapped service
    /// does not declare.
    #[error("Unknown operation {operation} on service {service}")]
    UnknownOperation {
        /// Service the call was addressed to.
        service: String,
        /// Requested operation name.
        operation: String,
    },

    /// The login request could not be signed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The login request could not be built.
    #[error("Invalid login request: {0}")]
    Tra(String),

    /// A SOAP service answered with a fault.
    #[error("Remote fault {code}: {message}")]
    RemoteFault {
        /// Fault code as reported by the service.
        code: String,
        /// Fault description.
        message: String,
    },

    /// A SOAP service could not be reached or answered with an unreadable
    /// body.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// The underlying HTTP or decoding error.
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AuthError {
    /// Creates a `RemoteLogin` error with the given message.
    #[must_use]
    pub fn remote_login(message: impl Into<String>) -> Self {
        Self::RemoteLogin { message: message.into(), source: None }
    }

    /// Creates a `RemoteLogin` error with a message and source error.
    #[must_use]
    pub fn remote_login_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::RemoteLogin { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a `Transport` error with the given message.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Creates a `Transport` error with a message and source error.
    #[must_use]
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates an `UnknownOperation` error.
    #[must_use]
    pub fn unknown_operation(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnknownOperation { service: service.into(), operation: operation.into() }
    }

    /// Converts a SOAP-level failure into a login failure, keeping the
    /// original error as the source.
    pub(crate) fn into_remote_login(self) -> Self {
        match self {
            Self::RemoteLogin { .. } => self,
            Self::RemoteFault { ref code, ref message } => {
                let message = format!("login service fault {code}: {message}");
                Self::remote_login_with_source(message, self)
            },
            other => Self::remote_login_with_source("login call failed", other),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::Store(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
