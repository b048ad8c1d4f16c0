//! Errors raised by the [`MockDispatcher`](crate::mock::MockDispatcher).

use derive_more::with_trait::{Display, Error};

/// Errors from serving a mocked HTTP request.
#[derive(Debug, Display, Error)]
pub enum MockError {
    /// No scenario's predicate matched the request; surfaced so the
    /// dispatcher can turn it into a 404, not a 500.
    #[display("no scenario matched request {method} {path}")]
    NoMatch {
        /// HTTP method of the unmatched request.
        #[error(not(source))]
        method: String,
        /// Path of the unmatched request.
        #[error(not(source))]
        path: String,
    },

    /// An exception was raised while running the matched scenario.
    #[display("handler error: {message}")]
    Handler {
        /// The raised message, surfaced verbatim in the 500 body.
        #[error(not(source))]
        message: String,
    },

    /// The listener socket could not be bound.
    #[display("failed to bind mock listener on port {port}: {source}")]
    Bind {
        /// Requested port (0 = OS-assigned).
        #[error(not(source))]
        port: u16,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl MockError {
    /// Builds a [`MockError::NoMatch`].
    #[must_use]
    pub fn no_match(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NoMatch {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Builds a [`MockError::Handler`].
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}
