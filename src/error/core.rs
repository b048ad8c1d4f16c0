//! Top-level error type for all execution-core operations.

use std::io;

use derive_more::with_trait::{Display, Error};

use super::{CallError, ConfigError, LockError, MockError, StepError};

/// Consolidated error type returned by suite, feature, and scenario
/// execution, and by the mock dispatcher.
#[derive(Debug, Display, Error)]
pub enum Error {
    /// A feature file could not be parsed.
    ///
    /// Carries a rendered message rather than `gherkin::ParseFileError`
    /// itself, since the only thing the core does with a parse failure
    /// is report "file path + line" text (spec §7) — it never matches
    /// on the parser's internal error shape.
    #[display("failed to parse feature file: {_0}")]
    Parse(#[error(not(source))] String),

    /// I/O error while reading features or writing reports.
    #[display("I/O operation failed: {_0}")]
    Io(io::Error),

    /// A step failed to evaluate.
    #[display("step execution failed: {_0}")]
    Step(StepError),

    /// A feature-call (`call`/`callonce`/`callSingle`) failed.
    #[display("call failed: {_0}")]
    Call(CallError),

    /// A named or wildcard lock could not be acquired or released cleanly.
    #[display("lock error: {_0}")]
    Lock(LockError),

    /// The mock dispatcher failed to serve a request.
    #[display("mock dispatcher error: {_0}")]
    Mock(MockError),

    /// A `configure` script or CLI flag produced an invalid configuration.
    #[display("configuration error: {_0}")]
    Config(ConfigError),

    /// The scenario was cancelled cooperatively before completing.
    #[display("scenario cancelled")]
    Cancelled,
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<gherkin::ParseFileError> for Error {
    fn from(e: gherkin::ParseFileError) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<StepError> for Error {
    fn from(e: StepError) -> Self {
        Self::Step(e)
    }
}

impl From<CallError> for Error {
    fn from(e: CallError) -> Self {
        Self::Call(e)
    }
}

impl From<LockError> for Error {
    fn from(e: LockError) -> Self {
        Self::Lock(e)
    }
}

impl From<MockError> for Error {
    fn from(e: MockError) -> Self {
        Self::Mock(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_step_error() {
        let err: Error = StepError::no_match("Given undefined step").into();
        assert!(matches!(err, Error::Step(_)));
        assert!(err.to_string().contains("step execution failed"));
    }

    #[test]
    fn wraps_call_error() {
        let err: Error = CallError::reentrant("helper.feature").into();
        assert!(matches!(err, Error::Call(_)));
    }
}
