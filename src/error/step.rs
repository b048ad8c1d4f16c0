//! Step dispatch and evaluation errors.

use derive_more::with_trait::{Display, Error};

/// Errors raised while dispatching or evaluating a single step.
#[derive(Debug, Display, Error)]
pub enum StepError {
    /// The script engine raised an exception evaluating the step text.
    #[display("evaluation failed at {location}: {message}")]
    Evaluate {
        /// Human-readable source location (`file:line`).
        #[error(not(source))]
        location: String,
        /// The raised message.
        #[error(not(source))]
        message: String,
    },

    /// No keyword or expression handler recognised the step text.
    #[display("no matching step handler for: {step_text}")]
    NoMatch {
        /// The offending step text.
        #[error(not(source))]
        step_text: String,
    },

    /// `match`/`assert` evaluated to a falsy comparison.
    #[display("assertion failed at {location}: {diff}")]
    Assertion {
        /// Source location of the failing step.
        #[error(not(source))]
        location: String,
        /// Structured diff message, including the path into the
        /// mismatching sub-value.
        #[error(not(source))]
        diff: String,
    },

    /// A called feature's scenario failed.
    #[display("call to {feature} failed: {message}")]
    CallFailed {
        /// Identity of the callee feature.
        #[error(not(source))]
        feature: String,
        /// The callee's failure message.
        #[error(not(source))]
        message: String,
    },
}

impl StepError {
    /// Builds an [`StepError::Evaluate`].
    #[must_use]
    pub fn evaluate(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluate {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Builds a [`StepError::NoMatch`].
    #[must_use]
    pub fn no_match(step_text: impl Into<String>) -> Self {
        Self::NoMatch {
            step_text: step_text.into(),
        }
    }

    /// Builds a [`StepError::Assertion`].
    #[must_use]
    pub fn assertion(location: impl Into<String>, diff: impl Into<String>) -> Self {
        Self::Assertion {
            location: location.into(),
            diff: diff.into(),
        }
    }

    /// Builds a [`StepError::CallFailed`].
    #[must_use]
    pub fn call_failed(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallFailed {
            feature: feature.into(),
            message: message.into(),
        }
    }
}
