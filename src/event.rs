//! Lifecycle events streamed to [`ResultListener`](crate::listener::ResultListener)
//! implementors (spec §6 "Result listener interface").

use std::time::SystemTime;

use crate::feature::FeatureId;

/// Wraps a lifecycle payload with the wall-clock time it was emitted,
/// used by the JSONL writer and any other streaming consumer.
#[derive(Clone, Debug)]
pub struct Event<T> {
    /// The event payload.
    pub value: T,
    /// When the core emitted this event.
    pub at: SystemTime,
}

impl<T> Event<T> {
    /// Wraps `value` with the current time.
    #[must_use]
    pub fn now(value: T) -> Self {
        Self { value, at: SystemTime::now() }
    }
}

/// Suite-level lifecycle payloads.
#[derive(Clone, Debug)]
pub enum SuiteEvent {
    /// Fires before any scenario is dispatched.
    Started,
    /// Fires after every worker has quiesced, before reports are written.
    Finished { scenario_count: usize, failed: bool },
}

/// Feature-level lifecycle payloads.
#[derive(Clone, Debug)]
pub enum FeatureEvent {
    /// Fires when the first scenario of a feature is dispatched.
    Started { feature: FeatureId },
    /// Fires when the last scenario of a feature finishes.
    Finished { feature: FeatureId, passed: bool },
}

/// Scenario-level lifecycle payloads.
#[derive(Clone, Debug)]
pub enum ScenarioEvent {
    /// Fires immediately before a scenario's steps run.
    Started { feature: FeatureId, name: String },
    /// Fires immediately after a scenario's steps finish, in any terminal state.
    Finished { feature: FeatureId, name: String, passed: bool },
}
