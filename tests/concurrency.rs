//! Exercises the `@lock=<name>` tag end to end through [`SuiteRunner`]:
//! scenarios that share a lock name must never execute concurrently, while
//! scenarios with no lock (or distinct lock names) are free to overlap.
//! `lock_manager`'s own unit tests cover the primitive directly; this
//! drives the same property through real feature discovery, scheduling,
//! and tag resolution.

use std::fs;
use std::io::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;

use bddcore::config::Config;
use bddcore::error::Result;
use bddcore::host::HostObject;
use bddcore::suite::{SuiteConfig, SuiteRunner};
use bddcore::tag::TagExpr;
use bddcore::value::ScopeValue;

#[derive(Debug, Default)]
struct ConcurrencyProbe {
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl HostObject for ConcurrencyProbe {
    fn type_name(&self) -> &'static str {
        "ConcurrencyProbe"
    }

    fn get_property(&self, _name: &str) -> Result<Option<Json>> {
        Ok(None)
    }

    fn invoke(&self, name: &str, _args: &[Json]) -> Result<Json> {
        match name {
            "hold" => {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(25));
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(Json::Bool(true))
            }
            other => Err(bddcore::error::Error::Step(bddcore::error::StepError::no_match(format!(
                "ConcurrencyProbe.{other}(...)"
            )))),
        }
    }
}

fn write_feature(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

fn config_with_probe(probe: &Arc<ConcurrencyProbe>, threads: usize) -> Arc<Config> {
    let mut bindings = std::collections::HashMap::new();
    bindings.insert("probe".to_string(), ScopeValue::Handle(Arc::clone(probe) as Arc<dyn HostObject>));
    Arc::new(Config {
        threads,
        config_bindings: Arc::new(bindings),
        ..Config::default()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn scenarios_sharing_a_lock_name_never_overlap() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let dir = tempfile::tempdir().unwrap();
    let mut feature = String::from("Feature: shared lock\n");
    for i in 0..5 {
        feature.push_str(&format!("  @lock=shared\n  Scenario: holder {i}\n    * def ok = probe.hold()\n"));
    }
    write_feature(dir.path(), "locked.feature", &feature);

    let runner = SuiteRunner::new(SuiteConfig {
        paths: vec![dir.path().to_path_buf()],
        tag_filter: TagExpr::Any,
        listeners: vec![],
        perf_hook: None,
        config: config_with_probe(&probe, 5),
    });
    let result = runner.run().await;

    assert!(!result.is_failed(), "{:?}", result.features);
    assert_eq!(probe.max_seen.load(Ordering::SeqCst), 1, "a shared @lock must serialize every holder");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn scenarios_with_no_lock_run_concurrently() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let dir = tempfile::tempdir().unwrap();
    let mut feature = String::from("Feature: unlocked\n");
    for i in 0..5 {
        feature.push_str(&format!("  Scenario: holder {i}\n    * def ok = probe.hold()\n"));
    }
    write_feature(dir.path(), "unlocked.feature", &feature);

    let runner = SuiteRunner::new(SuiteConfig {
        paths: vec![dir.path().to_path_buf()],
        tag_filter: TagExpr::Any,
        listeners: vec![],
        perf_hook: None,
        config: config_with_probe(&probe, 5),
    });
    let result = runner.run().await;

    assert!(!result.is_failed(), "{:?}", result.features);
    assert!(probe.max_seen.load(Ordering::SeqCst) > 1, "unrelated scenarios should overlap when nothing locks them");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn distinct_lock_names_do_not_exclude_each_other() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let dir = tempfile::tempdir().unwrap();
    let mut feature = String::from("Feature: distinct locks\n");
    for i in 0..5 {
        feature.push_str(&format!("  @lock=lock-{i}\n  Scenario: holder {i}\n    * def ok = probe.hold()\n"));
    }
    write_feature(dir.path(), "distinct.feature", &feature);

    let runner = SuiteRunner::new(SuiteConfig {
        paths: vec![dir.path().to_path_buf()],
        tag_filter: TagExpr::Any,
        listeners: vec![],
        perf_hook: None,
        config: config_with_probe(&probe, 5),
    });
    let result = runner.run().await;

    assert!(!result.is_failed(), "{:?}", result.features);
    assert!(probe.max_seen.load(Ordering::SeqCst) > 1, "distinct lock names must not exclude each other");
}
