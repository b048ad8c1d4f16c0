//! JUnit XML report writer (spec §9 supplement: "JUnit XML writer"),
//! grounded on the teacher's modular `writer::junit` implementation but
//! collapsed to a single pass over a finished [`SuiteResult`] instead of
//! a live [`Writer`](crate::listener::ResultListener) event handler —
//! this crate already holds the whole result tree in memory once a
//! suite finishes, so there is no need to accumulate per-scenario event
//! logs the way a streaming Cucumber writer must.

use std::fs;
use std::path::Path;

use junit_report::{Duration as JunitDuration, Report, TestCase, TestCaseBuilder, TestSuiteBuilder};

use crate::error::Result;
use crate::feature::FeatureId;
use crate::result::{FeatureResult, ScenarioResult, ScenarioStatus, SuiteResult};

/// Writes one JUnit XML file per feature under `<output_dir>/junit-xml/`,
/// named by the feature's package-qualified file stem (spec §9).
pub fn write_report(result: &SuiteResult, output_dir: &Path) -> Result<()> {
    let dir = output_dir.join("junit-xml");
    fs::create_dir_all(&dir)?;
    for feature in &result.features {
        let report = build_report(feature);
        let path = dir.join(format!("{}.xml", qualified_name(&feature.feature_id)));
        let file = fs::File::create(&path)?;
        report
            .write_xml(file)
            .map_err(|e| crate::error::Error::Io(std::io::Error::other(e.to_string())))?;
    }
    Ok(())
}

fn qualified_name(id: &FeatureId) -> String {
    match id {
        FeatureId::Path(path) => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("feature")
            .replace(['/', '\\'], "."),
        FeatureId::Inline(hash) => format!("inline-{hash}"),
    }
}

fn build_report(feature: &FeatureResult) -> Report {
    let mut report = Report::new();
    let mut suite = TestSuiteBuilder::new(&format!("Feature: {}", feature.name)).build();
    for scenario in &feature.scenarios {
        suite.add_testcase(build_test_case(scenario));
    }
    report.add_testsuite(suite);
    report
}

fn build_test_case(scenario: &ScenarioResult) -> TestCase {
    let duration = JunitDuration::try_from(scenario.duration).unwrap_or(JunitDuration::ZERO);
    match scenario.status {
        ScenarioStatus::Passed => TestCaseBuilder::success(&scenario.name, duration).build(),
        ScenarioStatus::Cancelled => TestCaseBuilder::skipped(&scenario.name).build(),
        ScenarioStatus::Failed => {
            let message = scenario.failure_message().unwrap_or_else(|| "step failed".to_string());
            TestCaseBuilder::failure(&scenario.name, duration, "Step failed", &message).build()
        }
    }
}
