//! Structured logging integration (spec §9 ambient stack: "Logging"),
//! adapted from the teacher's `tracing::{collector, layer, visitor}`
//! trio but collapsed into a single synchronous [`Layer`]: this crate
//! runs one scenario to completion inside a single `.await` before
//! anything reads its logs back out, so there's no need for the
//! teacher's span-close `Callback`/`mpsc` waiter machinery, which
//! exists to let a streaming writer observe logs from spans that may
//! still be open elsewhere.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Span field name a scenario's span is tagged with (mirrors the
/// teacher's `ScenarioId::SPAN_FIELD_NAME` convention).
pub const SCENARIO_SPAN_FIELD: &str = "bddcore_scenario_id";

/// Collects `tracing` log lines emitted inside a scenario's span,
/// keyed by the scenario id recorded on that span, for attachment to
/// that scenario's [`StepResult`](crate::result::StepResult)s.
#[derive(Debug, Default)]
pub struct CollectorLayer {
    logs: Mutex<HashMap<u64, Vec<String>>>,
}

impl CollectorLayer {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every log line collected for `scenario_id`
    /// so far. Call once a scenario finishes running.
    #[must_use]
    pub fn take_logs(&self, scenario_id: u64) -> Vec<String> {
        self.logs.lock().unwrap().remove(&scenario_id).unwrap_or_default()
    }
}

#[derive(Default)]
struct ScenarioIdVisitor {
    id: Option<u64>,
}

impl Visit for ScenarioIdVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == SCENARIO_SPAN_FIELD {
            self.id = Some(value);
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" && self.message.is_none() {
            self.message = Some(format!("{value:?}"));
        }
    }
}

impl<S> Layer<S> for CollectorLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = ScenarioIdVisitor::default();
        attrs.values().record(&mut visitor);
        if let (Some(span), Some(scenario_id)) = (ctx.span(id), visitor.id) {
            span.extensions_mut().replace(scenario_id);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let scenario_id = ctx
            .event_scope(event)
            .and_then(|scope| scope.from_root().find_map(|span| span.extensions().get::<u64>().copied()));
        let Some(scenario_id) = scenario_id else {
            return;
        };
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = visitor.message.unwrap_or_default();
        let entry = format!("[{}] {line}", event.metadata().level());
        self.logs.lock().unwrap().entry(scenario_id).or_default().push(entry);
    }
}

/// Installs a process-wide [`tracing_subscriber`] registry combining a
/// [`CollectorLayer`] with a `fmt` layer writing to stderr, returning
/// the collector handle so callers can read per-scenario logs back out
/// once a scenario completes. Safe to call more than once; later calls
/// are no-ops if a global subscriber is already installed.
pub fn init() -> Arc<CollectorLayer> {
    use tracing_subscriber::prelude::*;
    let collector = Arc::new(CollectorLayer::new());
    let _ = tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).with(collector.clone()).try_init();
    collector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_starts_with_no_logs() {
        let collector = CollectorLayer::new();
        assert!(collector.take_logs(1).is_empty());
    }

    #[test]
    fn captures_log_lines_within_scenario_span() {
        use tracing_subscriber::prelude::*;

        let collector = Arc::new(CollectorLayer::new());
        let subscriber = tracing_subscriber::registry().with(collector.clone());
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("scenario", bddcore_scenario_id = 7u64);
            let _enter = span.enter();
            tracing::info!("hello from scenario 7");
        });

        let logs = collector.take_logs(7);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("hello from scenario 7"));
    }

    #[test]
    fn take_logs_drains_the_buffer() {
        use tracing_subscriber::prelude::*;

        let collector = Arc::new(CollectorLayer::new());
        let subscriber = tracing_subscriber::registry().with(collector.clone());
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("scenario", bddcore_scenario_id = 3u64);
            let _enter = span.enter();
            tracing::warn!("first");
        });

        assert_eq!(collector.take_logs(3).len(), 1);
        assert!(collector.take_logs(3).is_empty());
    }
}
