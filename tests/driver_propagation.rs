//! End-to-end coverage of concrete scenario 6 ("Driver propagation via
//! caller scope", spec §4.4): a helper feature that declares `scope:
//! 'caller'` via `configure` hands its `driver` handle up to the caller
//! on return, regardless of call mode.

use std::fs;
use std::io::Write as _;

use bddcore::suite::{SuiteConfig, SuiteRunner};
use bddcore::tag::TagExpr;

fn write_feature(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

/// A helper feature that configures `scope: 'caller'`, then opens and
/// navigates a driver, must leave that driver live in the caller's scope
/// after a bare `call` returns.
#[tokio::test]
async fn driver_propagates_to_caller_on_scope_caller() {
    let dir = tempfile::tempdir().unwrap();
    write_feature(
        dir.path(),
        "helper.feature",
        "Feature: helper\n  Scenario: bootstrap browser\n    * configure x = {scope: 'caller'}\n    * driver 'http://example.com/page'\n",
    );
    let caller = "Feature: caller\n  Scenario: uses propagated driver\n    * call read('helper.feature')\n    * match driver.title == 'title-of-http://example.com/page'\n";
    let path = write_feature(dir.path(), "caller.feature", caller);

    let runner = SuiteRunner::new(SuiteConfig {
        paths: vec![path],
        tag_filter: TagExpr::Any,
        listeners: vec![],
        perf_hook: None,
        config: std::sync::Arc::new(bddcore::config::Config::default()),
    });
    let result = runner.run().await;

    assert!(!result.is_failed(), "{:?}", result.features);
    assert_eq!(result.scenario_count(), 1);
}

/// Without `scope: 'caller'`, a callee's driver handle stays local to the
/// callee: the caller never sees a `driver` binding.
#[tokio::test]
async fn driver_does_not_propagate_without_scope_caller() {
    let dir = tempfile::tempdir().unwrap();
    write_feature(
        dir.path(),
        "helper.feature",
        "Feature: helper\n  Scenario: bootstrap browser\n    * driver 'http://example.com/page'\n",
    );
    let caller =
        "Feature: caller\n  Scenario: driver stays local to the callee\n    * call read('helper.feature')\n    * match driver == null\n";
    let path = write_feature(dir.path(), "caller.feature", caller);

    let runner = SuiteRunner::new(SuiteConfig {
        paths: vec![path],
        tag_filter: TagExpr::Any,
        listeners: vec![],
        perf_hook: None,
        config: std::sync::Arc::new(bddcore::config::Config::default()),
    });
    let result = runner.run().await;

    assert!(result.is_failed(), "expected the caller's `driver` match to fail: {:?}", result.features);
}
