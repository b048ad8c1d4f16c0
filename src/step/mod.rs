//! Step classification and dispatch (spec §4.2 "StepExecutor").

mod executor;
mod keyword;
mod match_op;

pub use executor::StepExecutor;
pub use keyword::{classify, Dispatch, StepKeyword};
pub use match_op::MatchOp;

/// One parsed Gherkin step, already past outline `<placeholder>`
/// substitution (spec §3 "Scenario").
#[derive(Clone, Debug)]
pub struct Step {
    /// `*`, `Given`, `When`, `Then`, `And`, or `But`.
    pub prefix: String,
    /// The step's free text (right-hand side).
    pub text: String,
    /// Optional doc-string, with its captured source line.
    pub doc_string: Option<DocString>,
    /// Optional data table.
    pub table: Option<Vec<Vec<String>>>,
    /// 1-based source line, for diagnostics.
    pub line: u32,
}

/// A doc-string attached to a step.
#[derive(Clone, Debug)]
pub struct DocString {
    /// The doc-string content with uniform leading whitespace trimmed.
    pub content: String,
    /// Source line the opening `"""` appeared on.
    pub line: u32,
}
