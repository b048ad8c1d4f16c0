//! Line-delimited JSON event stream writer (spec §9 supplement: "JSONL
//! event stream writer"), one JSON object per line for every lifecycle
//! callback a [`ResultListener`] observes — new relative to the
//! teacher's XML-only writer family, grounded on [`crate::event::Event`]'s
//! existing timestamped-payload shape plus `serde_json`, already a core
//! dependency.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::error::Result;
use crate::event::{FeatureEvent, ScenarioEvent, SuiteEvent};
use crate::feature::FeatureId;
use crate::listener::ResultListener;

/// Appends one JSON object per line to `<output_dir>/events.jsonl`.
pub struct JsonlWriter {
    file: Mutex<std::fs::File>,
}

impl JsonlWriter {
    /// Opens (creating if needed) `<output_dir>/events.jsonl` for append.
    pub fn new(output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join("events.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    fn write_line(&self, value: serde_json::Value) {
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "{value}");
    }
}

fn epoch_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default()
}

fn feature_id_str(id: &FeatureId) -> String {
    id.to_string()
}

impl ResultListener for JsonlWriter {
    fn on_suite_start(&self, _event: &SuiteEvent) {
        self.write_line(json!({"type": "suiteStarted", "at": epoch_ms()}));
    }

    fn on_suite_end(&self, event: &SuiteEvent) {
        if let SuiteEvent::Finished { scenario_count, failed } = event {
            self.write_line(json!({
                "type": "suiteFinished",
                "at": epoch_ms(),
                "scenarioCount": scenario_count,
                "failed": failed,
            }));
        }
    }

    fn on_feature_start(&self, event: &FeatureEvent) {
        if let FeatureEvent::Started { feature } = event {
            self.write_line(json!({"type": "featureStarted", "at": epoch_ms(), "feature": feature_id_str(feature)}));
        }
    }

    fn on_feature_end(&self, event: &FeatureEvent) {
        if let FeatureEvent::Finished { feature, passed } = event {
            self.write_line(json!({
                "type": "featureFinished",
                "at": epoch_ms(),
                "feature": feature_id_str(feature),
                "passed": passed,
            }));
        }
    }

    fn on_scenario_start(&self, event: &ScenarioEvent) {
        if let ScenarioEvent::Started { feature, name } = event {
            self.write_line(json!({
                "type": "scenarioStarted",
                "at": epoch_ms(),
                "feature": feature_id_str(feature),
                "name": name,
            }));
        }
    }

    fn on_scenario_end(&self, event: &ScenarioEvent) {
        if let ScenarioEvent::Finished { feature, name, passed } = event {
            self.write_line(json!({
                "type": "scenarioFinished",
                "at": epoch_ms(),
                "feature": feature_id_str(feature),
                "name": name,
                "passed": passed,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonlWriter::new(dir.path()).unwrap();
        writer.on_suite_start(&SuiteEvent::Started);
        writer.on_feature_start(&FeatureEvent::Started { feature: FeatureId::from_inline("f") });
        writer.on_suite_end(&SuiteEvent::Finished { scenario_count: 1, failed: false });

        let contents = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["type"], "featureStarted");
    }
}
