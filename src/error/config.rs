//! Configuration and validation errors.

use derive_more::with_trait::{Display, Error};

/// Errors from a `configure` script result or CLI flag combination.
#[derive(Debug, Display, Error)]
pub enum ConfigError {
    /// A `configure` key had the wrong shape (e.g. `headers` was not a
    /// map or function).
    #[display("invalid value for configuration key `{key}`: {message}")]
    InvalidKey {
        /// The offending key.
        #[error(not(source))]
        key: String,
        /// Why the value was rejected.
        #[error(not(source))]
        message: String,
    },

    /// The thread count requested for the suite worker pool was zero.
    #[display("thread count must be at least 1")]
    InvalidThreadCount,
}

impl ConfigError {
    /// Builds a [`ConfigError::InvalidKey`].
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            message: message.into(),
        }
    }
}
