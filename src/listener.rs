//! Streaming lifecycle observer interface (spec §4.8, §6).
//!
//! Implementors must not block for longer than one scenario step's
//! granularity, or they throttle the worker pool (spec §6): each
//! callback runs synchronously on the scenario's own worker task, so a
//! slow listener delays that task's next step.

use crate::event::{FeatureEvent, ScenarioEvent, SuiteEvent};

/// Receives the six streaming lifecycle callbacks a suite run emits.
///
/// Default implementations are no-ops so a listener only needs to
/// override what it cares about.
pub trait ResultListener: Send + Sync {
    /// Fires before any scenario is dispatched.
    fn on_suite_start(&self, _event: &SuiteEvent) {}
    /// Fires once every worker has quiesced, before reports are written.
    fn on_suite_end(&self, _event: &SuiteEvent) {}
    /// Fires when the first scenario of a feature is dispatched.
    fn on_feature_start(&self, _event: &FeatureEvent) {}
    /// Fires when the last scenario of a feature finishes.
    fn on_feature_end(&self, _event: &FeatureEvent) {}
    /// Fires immediately before a scenario's steps run.
    fn on_scenario_start(&self, _event: &ScenarioEvent) {}
    /// Fires immediately after a scenario's steps finish.
    fn on_scenario_end(&self, _event: &ScenarioEvent) {}
}
