//! Errors raised by the [`CallRegistry`](crate::call_registry::CallRegistry).

use derive_more::with_trait::{Display, Error};

/// Errors that can occur resolving a `call`/`callonce`/`callSingle` step.
#[derive(Debug, Display, Error)]
pub enum CallError {
    /// The callee feature re-entered a `callonce`/`callSingle` key that is
    /// already in progress on the current call stack — a would-be
    /// deadlock, reported instead of waited on.
    #[display("reentrant call into {feature} while its result is still in progress")]
    Reentrant {
        /// Identity of the feature being re-entered.
        #[error(not(source))]
        feature: String,
    },

    /// The call stack exceeded the configured depth limit.
    #[display("call stack depth exceeded limit of {limit}")]
    StackOverflow {
        /// The configured limit that was exceeded.
        #[error(not(source))]
        limit: usize,
    },

    /// The callee feature could not be located or parsed.
    #[display("callee feature not found: {feature}")]
    FeatureNotFound {
        /// The requested feature identity.
        #[error(not(source))]
        feature: String,
    },

    /// The callee produced no matching scenario (e.g. tag filter excluded
    /// every scenario in the feature).
    #[display("callee feature {feature} has no runnable scenario")]
    NoRunnableScenario {
        /// The requested feature identity.
        #[error(not(source))]
        feature: String,
    },
}

impl CallError {
    /// Builds a [`CallError::Reentrant`].
    #[must_use]
    pub fn reentrant(feature: impl Into<String>) -> Self {
        Self::Reentrant {
            feature: feature.into(),
        }
    }

    /// Builds a [`CallError::StackOverflow`].
    #[must_use]
    pub fn stack_overflow(limit: usize) -> Self {
        Self::StackOverflow { limit }
    }

    /// Builds a [`CallError::FeatureNotFound`].
    #[must_use]
    pub fn feature_not_found(feature: impl Into<String>) -> Self {
        Self::FeatureNotFound {
            feature: feature.into(),
        }
    }

    /// Builds a [`CallError::NoRunnableScenario`].
    #[must_use]
    pub fn no_runnable_scenario(feature: impl Into<String>) -> Self {
        Self::NoRunnableScenario {
            feature: feature.into(),
        }
    }
}
