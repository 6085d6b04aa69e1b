//! Error types for dynprop.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while converting between serialized property values and
/// typed values.
#[derive(Debug, Error)]
pub enum MarshalError {
    /// The stored value could not be parsed as the requested type.
    #[error("Failed to deserialize value {raw:?} as {type_name}: {message}")]
    Deserialization {
        /// The raw serialized value, truncated for logging.
        raw: String,
        /// Target Rust type.
        type_name: &'static str,
        /// Underlying parser message.
        message: String,
    },

    /// The typed value could not be serialized for storage.
    #[error("Failed to serialize value of type {type_name}: {message}")]
    Serialization {
        /// Source Rust type.
        type_name: &'static str,
        /// Underlying serializer message.
        message: String,
    },
}

/// Errors raised by property sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Property absent in the source and no default value was supplied.
    #[error(
        "Property '{name}' of type {type_name} not found in property source \
         and no default value was provided. Configure the property in the \
         source or supply a default value."
    )]
    PropertyNotFound {
        /// Property name within the source.
        name: String,
        /// Requested Rust type.
        type_name: &'static str,
    },

    /// The external store did not confirm its initial full sync in time.
    #[error("Property source did not receive initial sync within {timeout:?}")]
    InitializationTimeout {
        /// Configured initialization timeout.
        timeout: Duration,
    },

    /// A bulk read could not gather all property values within budget.
    #[error("Bulk read of source properties did not complete within {timeout:?}")]
    BulkReadTimeout {
        /// Configured bulk read budget.
        timeout: Duration,
    },

    /// The source was closed and no longer serves reads or subscriptions.
    #[error("Property source is closed")]
    SourceClosed,

    /// Registering or servicing a watch on the backing medium failed.
    #[error("Property watch failure: {message}")]
    Watch {
        /// Details from the watch backend.
        message: String,
    },
}

/// Top-level error type for dynprop.
///
/// This enum encompasses all possible errors that can occur when reading,
/// subscribing to, or propagating property values.
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("Marshalling error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl PropertyError {
    /// Returns true if this is a marshalling error.
    #[must_use]
    pub const fn is_marshal(&self) -> bool {
        matches!(self, Self::Marshal(_))
    }

    /// Returns true if this is a source error.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if the property was simply missing from its source.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Source(SourceError::PropertyNotFound { .. }))
    }

    /// Returns true if this error is retryable.
    ///
    /// Timeouts may clear on retry; a missing property or a malformed value
    /// will not change until the source itself changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Source(
                SourceError::InitializationTimeout { .. } | SourceError::BulkReadTimeout { .. }
            )
        )
    }
}

/// Result type alias for dynprop operations.
pub type PropertyResult<T> = Result<T, PropertyError>;
