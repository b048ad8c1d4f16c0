//! Result trees returned by step/scenario/feature/suite execution
//! (spec §3 "ScenarioResult", "FeatureResult", "SuiteResult").

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;
use crate::feature::FeatureId;
use crate::value::ScopeValue;

/// MIME-typed blob attached to a step (e.g. `doc`'s rendered HTML).
#[derive(Clone, Debug)]
pub struct Embed {
    /// MIME type of `data` (e.g. `text/html`).
    pub mime_type: String,
    /// Raw embed payload.
    pub data: Vec<u8>,
}

/// Outcome of executing one step.
#[derive(Debug)]
pub struct StepResult {
    /// Gherkin keyword/prefix as written (`Given`, `*`, ...).
    pub prefix: String,
    /// The step's text (post placeholder-substitution).
    pub text: String,
    /// Wall-clock duration, measured with a monotonic clock.
    pub duration: Duration,
    /// `None` on success; `Some` carries the failure.
    pub error: Option<Error>,
    /// Log lines captured by `print` steps or the tracing collector.
    pub log_lines: Vec<String>,
    /// Embeds attached by steps like `doc`.
    pub embeds: Vec<Embed>,
}

impl StepResult {
    /// True if the step completed without error.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Terminal state of a scenario run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScenarioStatus {
    /// Every step passed.
    Passed,
    /// A step failed (evaluation error, assertion failure, or a failed
    /// nested call).
    Failed,
    /// The scenario observed a cancel token between steps.
    Cancelled,
}

/// Outcome of running a Background + Scenario (or one Examples row).
#[derive(Debug)]
pub struct ScenarioResult {
    /// Scenario name (post `<placeholder>` substitution for outline rows).
    pub name: String,
    /// Terminal status.
    pub status: ScenarioStatus,
    /// Total duration across Background + Scenario steps.
    pub duration: Duration,
    /// Per-step outcomes in source order.
    pub steps: Vec<StepResult>,
    /// Snapshot of the final variable map, exposed to callers of this
    /// scenario as a feature-call result (`resultVariables`).
    pub result_variables: HashMap<String, ScopeValue>,
}

impl ScenarioResult {
    /// True iff `status` is [`ScenarioStatus::Passed`].
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// The first failing step's error message, if any, used to build a
    /// [`StepError::CallFailed`](crate::error::StepError::CallFailed)
    /// message for a caller's `call` step.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        self.steps
            .iter()
            .find(|s| !s.passed())
            .and_then(|s| s.error.as_ref())
            .map(std::string::ToString::to_string)
    }
}

/// Outcome of running every scenario of one feature.
#[derive(Debug)]
pub struct FeatureResult {
    /// Identity of the feature that was run.
    pub feature_id: FeatureId,
    /// Display name from the Gherkin `Feature:` line.
    pub name: String,
    /// One entry per executed scenario (outline rows already expanded).
    pub scenarios: Vec<ScenarioResult>,
}

impl FeatureResult {
    /// True iff every scenario passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioResult::passed)
    }

    /// Count of scenarios, for reporting.
    #[must_use]
    pub fn scenario_count(&self) -> usize {
        self.scenarios.len()
    }
}

/// Outcome of running an entire suite.
#[derive(Debug, Default)]
pub struct SuiteResult {
    /// One entry per feature that was scheduled.
    pub features: Vec<FeatureResult>,
    /// Infrastructure-level errors (parser failures of shared fixtures,
    /// I/O errors) that are not attributable to any one scenario.
    pub infra_errors: Vec<String>,
}

impl SuiteResult {
    /// True iff at least one scenario failed (spec §4.6 "isFailed").
    #[must_use]
    pub fn is_failed(&self) -> bool {
        !self.infra_errors.is_empty()
            || self
                .features
                .iter()
                .any(|f| f.scenarios.iter().any(|s| !s.passed()))
    }

    /// Total scenario count across every feature.
    #[must_use]
    pub fn scenario_count(&self) -> usize {
        self.features.iter().map(FeatureResult::scenario_count).sum()
    }

    /// Total feature count.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Process exit code per spec §6: `0` all-pass, `1` test failures,
    /// `3` infrastructure error. (`2`, driver/agent startup failure, is
    /// raised by the caller before a `SuiteResult` exists at all.)
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if !self.infra_errors.is_empty() {
            3
        } else if self.is_failed() {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_scenario() -> ScenarioResult {
        ScenarioResult {
            name: "ok".into(),
            status: ScenarioStatus::Passed,
            duration: Duration::default(),
            steps: vec![],
            result_variables: HashMap::new(),
        }
    }

    #[test]
    fn suite_exit_code_zero_when_all_pass() {
        let result = SuiteResult {
            features: vec![FeatureResult {
                feature_id: FeatureId::from_inline("f"),
                name: "f".into(),
                scenarios: vec![passing_scenario()],
            }],
            infra_errors: vec![],
        };
        assert_eq!(result.exit_code(), 0);
        assert!(!result.is_failed());
    }

    #[test]
    fn suite_exit_code_three_on_infra_error() {
        let result = SuiteResult {
            features: vec![],
            infra_errors: vec!["boom".into()],
        };
        assert_eq!(result.exit_code(), 3);
    }
}
