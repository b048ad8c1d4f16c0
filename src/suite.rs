//! Feature discovery, outline expansion already done upstream, worker-pool
//! scheduling, and lifecycle-event emission (spec §4.6 "SuiteRunner").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::call_registry::CallRegistry;
use crate::config::Config;
use crate::driver::{DriverFactory, NullDriverFactory};
use crate::event::{FeatureEvent, ScenarioEvent, SuiteEvent};
use crate::feature::FeatureId;
use crate::listener::ResultListener;
use crate::lock_manager::LockManager;
use crate::parse::ParsedFeature;
use crate::perf::PerfHook;
use crate::result::{FeatureResult, ScenarioResult, SuiteResult};
use crate::runtime::{FileFeatureLoader, RuntimeDeps, ScenarioRuntime};
use crate::tag::TagExpr;

/// Everything a [`SuiteRunner`] needs beyond process-wide [`Config`]:
/// where to find feature files, how to filter scenarios, and which
/// observers to notify.
pub struct SuiteConfig {
    /// Feature files or directories to run. Directories are walked for
    /// `*.feature` files (spec §6 "Feature path schemes": plain
    /// filesystem paths).
    pub paths: Vec<PathBuf>,
    /// Parsed tag filter expression (spec §4.6 "tag filter expression").
    pub tag_filter: TagExpr,
    /// Streaming lifecycle observers.
    pub listeners: Vec<Arc<dyn ResultListener>>,
    /// External per-HTTP-call timing sink, if any.
    pub perf_hook: Option<Arc<dyn PerfHook>>,
    /// Process-wide configuration (threads, config bindings, etc.).
    pub config: Arc<Config>,
}

/// Feature-level tag that opts a feature's scenarios out of parallel
/// execution with each other (spec §4.6 "unless a feature-level tag
/// disables it"). Scenarios of such a feature still run concurrently
/// with scenarios of *other* features.
const SERIAL_TAG: &str = "parallel";

fn feature_is_serial(feature: &ParsedFeature) -> bool {
    feature
        .tags
        .iter()
        .find(|t| t.name == SERIAL_TAG)
        .is_some_and(|t| t.values.first().map(String::as_str) == Some("false"))
}

/// One unit of work submitted to the worker pool: every scenario of a
/// non-parallel feature runs sequentially inside a single unit; every
/// other scenario gets its own unit, so it can run concurrently with
/// its feature-siblings.
struct Unit {
    feature_idx: usize,
    scenario_idxs: Vec<usize>,
}

struct FeatureProgress {
    remaining: AtomicUsize,
    started: AtomicBool,
    all_passed: AtomicBool,
}

/// Expands features into scenarios, submits them to a bounded worker
/// pool, and collects results (spec §4.6).
pub struct SuiteRunner {
    suite: SuiteConfig,
    lock_manager: LockManager,
    call_registry: CallRegistry,
    loader: Arc<FileFeatureLoader>,
    http_client: reqwest::Client,
    driver_factory: Arc<dyn DriverFactory>,
}

impl SuiteRunner {
    /// Builds a runner with fresh suite-wide [`LockManager`] and
    /// [`CallRegistry`] instances, injected explicitly into every
    /// [`ScenarioRuntime`] this run creates (spec §9 "Global mutable
    /// state").
    #[must_use]
    pub fn new(suite: SuiteConfig) -> Self {
        let max_call_depth = suite.config.max_call_depth;
        Self {
            suite,
            lock_manager: LockManager::new(),
            call_registry: CallRegistry::with_max_call_depth(max_call_depth),
            loader: Arc::new(FileFeatureLoader::new()),
            http_client: reqwest::Client::new(),
            driver_factory: Arc::new(NullDriverFactory),
        }
    }

    /// Discovers, parses, and filters features, then runs every
    /// selected scenario to completion, emitting lifecycle events along
    /// the way.
    pub async fn run(&self) -> SuiteResult {
        for listener in &self.suite.listeners {
            listener.on_suite_start(&SuiteEvent::Started);
        }

        let mut infra_errors = Vec::new();
        let mut parsed: Vec<Arc<ParsedFeature>> = Vec::new();
        for path in discover_feature_files(&self.suite.paths) {
            match crate::parse::parse_path(&path) {
                Ok(feature) => parsed.push(Arc::new(feature)),
                Err(e) => infra_errors.push(format!("{}: {e}", path.display())),
            }
        }

        // (feature index, scenario index within that feature's `scenarios`)
        let selected: Vec<Vec<usize>> = parsed
            .iter()
            .map(|feature| {
                (0..feature.scenarios.len())
                    .filter(|&i| {
                        let names: Vec<&str> = feature.scenarios[i].tags.iter().map(|t| t.name.as_str()).collect();
                        self.suite.tag_filter.matches(&names)
                    })
                    .collect()
            })
            .collect();

        let progress: Vec<Arc<FeatureProgress>> = parsed
            .iter()
            .map(|_| {
                Arc::new(FeatureProgress {
                    remaining: AtomicUsize::new(0),
                    started: AtomicBool::new(false),
                    all_passed: AtomicBool::new(true),
                })
            })
            .collect();
        for (idx, scenario_idxs) in selected.iter().enumerate() {
            progress[idx].remaining.store(scenario_idxs.len(), Ordering::SeqCst);
        }

        let mut units = Vec::new();
        for (feature_idx, scenario_idxs) in selected.into_iter().enumerate() {
            if scenario_idxs.is_empty() {
                continue;
            }
            if feature_is_serial(&parsed[feature_idx]) {
                units.push(Unit { feature_idx, scenario_idxs });
            } else {
                for idx in scenario_idxs {
                    units.push(Unit { feature_idx, scenario_idxs: vec![idx] });
                }
            }
        }

        let deps = RuntimeDeps {
            lock_manager: self.lock_manager.clone(),
            call_registry: self.call_registry.clone(),
            loader: self.loader.clone(),
            http_client: self.http_client.clone(),
            uri_patterns: Vec::new(),
            perf_hook: self.suite.perf_hook.clone(),
            config: Arc::clone(&self.suite.config),
            driver_factory: Arc::clone(&self.driver_factory),
        };
        let parsed = Arc::new(parsed);
        let progress = Arc::new(progress);
        let listeners = Arc::new(self.suite.listeners.clone());
        let call_registry = self.call_registry.clone();

        let threads = self.suite.config.threads.max(1);
        let outputs: Vec<Vec<(usize, usize, ScenarioResult)>> = stream::iter(units.into_iter().map(|unit| {
            let parsed = Arc::clone(&parsed);
            let progress = Arc::clone(&progress);
            let listeners = Arc::clone(&listeners);
            let deps = deps.clone();
            let call_registry = call_registry.clone();
            async move { run_unit(unit, parsed, progress, listeners, deps, call_registry).await }
        }))
        .buffer_unordered(threads)
        .collect()
        .await;

        let mut by_feature: HashMap<usize, Vec<(usize, ScenarioResult)>> = HashMap::new();
        for batch in outputs {
            for (feature_idx, scenario_idx, result) in batch {
                by_feature.entry(feature_idx).or_default().push((scenario_idx, result));
            }
        }

        let mut features = Vec::new();
        for (feature_idx, mut rows) in by_feature {
            rows.sort_by_key(|(idx, _)| *idx);
            let feature = &parsed[feature_idx];
            features.push(FeatureResult {
                feature_id: feature.id.clone(),
                name: feature.name.clone(),
                scenarios: rows.into_iter().map(|(_, r)| r).collect(),
            });
        }

        let scenario_count = features.iter().map(FeatureResult::scenario_count).sum();
        let failed = !infra_errors.is_empty() || features.iter().any(|f| !f.is_passed());
        for listener in &self.suite.listeners {
            listener.on_suite_end(&SuiteEvent::Finished { scenario_count, failed });
        }

        SuiteResult { features, infra_errors }
    }
}

async fn run_unit(
    unit: Unit,
    parsed: Arc<Vec<Arc<ParsedFeature>>>,
    progress: Arc<Vec<Arc<FeatureProgress>>>,
    listeners: Arc<Vec<Arc<dyn ResultListener>>>,
    deps: RuntimeDeps,
    call_registry: CallRegistry,
) -> Vec<(usize, usize, ScenarioResult)> {
    let feature = &parsed[unit.feature_idx];
    let fp = &progress[unit.feature_idx];
    let mut out = Vec::with_capacity(unit.scenario_idxs.len());

    for scenario_idx in unit.scenario_idxs {
        if fp.started.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            let event = FeatureEvent::Started { feature: feature.id.clone() };
            for l in listeners.iter() {
                l.on_feature_start(&event);
            }
        }

        let scenario = &feature.scenarios[scenario_idx];
        let start_event = ScenarioEvent::Started { feature: feature.id.clone(), name: scenario.name.clone() };
        for l in listeners.iter() {
            l.on_scenario_start(&start_event);
        }

        let lock_name = crate::runtime::resolve_lock_name(&scenario.tags);
        let feature_path = match &feature.id {
            FeatureId::Path(p) => Some(p.clone()),
            FeatureId::Inline(_) => None,
        };
        let runtime = ScenarioRuntime::new(deps.clone(), feature.id.clone(), feature_path);
        let result = runtime.call(scenario, lock_name).await;

        let end_event =
            ScenarioEvent::Finished { feature: feature.id.clone(), name: scenario.name.clone(), passed: result.passed() };
        for l in listeners.iter() {
            l.on_scenario_end(&end_event);
        }
        if !result.passed() {
            fp.all_passed.store(false, Ordering::SeqCst);
        }

        if fp.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            call_registry.clear_feature_scope(&feature.id);
            let event = FeatureEvent::Finished { feature: feature.id.clone(), passed: fp.all_passed.load(Ordering::SeqCst) };
            for l in listeners.iter() {
                l.on_feature_end(&event);
            }
        }

        out.push((unit.feature_idx, scenario_idx, result));
    }

    out
}

/// Resolves `paths` to a sorted list of `.feature` files: files are
/// included as-is, directories are walked recursively.
fn discover_feature_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            out.extend(walk_dir(path));
        } else {
            out.push(path.clone());
        }
    }
    out.sort();
    out
}

fn walk_dir(dir: &Path) -> Vec<PathBuf> {
    globwalk::GlobWalkerBuilder::new(dir, "**/*.feature")
        .build()
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

/// Thin process entry point (spec §6 "Exit codes" / "Output directory
/// backup"): backs up a prior output directory if requested, runs the
/// suite, writes whichever report formats were asked for, and returns
/// the finished [`SuiteResult`] alongside the process exit code.
///
/// Exit code `2` ("driver/agent startup failure", spec §6) is reserved
/// for a caller that fails to construct its own driver/agent before a
/// suite even starts; this function only ever returns `0`, `1`, or `3`,
/// per [`SuiteResult::exit_code`].
pub async fn run_suite(cli: &crate::cli::Cli) -> (SuiteResult, i32) {
    if cli.backup_output {
        if let Err(e) = backup_output_dir(&cli.output_dir) {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, dir = %cli.output_dir.display(), "failed to back up prior output directory");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }
    }

    let mut suite_config = cli.to_suite_config();

    #[cfg(feature = "output-jsonl")]
    if cli.jsonl {
        if let Ok(writer) = crate::writer::jsonl::JsonlWriter::new(&cli.output_dir) {
            suite_config.listeners.push(Arc::new(writer));
        }
    }

    let runner = SuiteRunner::new(suite_config);
    let result = runner.run().await;

    #[cfg(feature = "output-junit")]
    if cli.junit {
        let _ = crate::writer::junit::write_report(&result, &cli.output_dir);
    }

    let code = result.exit_code();
    (result, code)
}

/// Renames an existing output directory to `<dirName>_<YYYYMMDD_HHMMSS>`
/// (spec §6), a no-op if the directory doesn't exist yet.
fn backup_output_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    let stamp = format_timestamp_utc(now);
    let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("output");
    let backup = dir.with_file_name(format!("{dir_name}_{stamp}"));
    std::fs::rename(dir, backup)
}

fn format_timestamp_utc(unix_secs: u64) -> String {
    let (y, mo, d, h, mi, s) = civil_from_unix(unix_secs as i64);
    format!("{y:04}{mo:02}{d:02}_{h:02}{mi:02}{s:02}")
}

/// Howard Hinnant's `civil_from_days` algorithm, combined with a
/// seconds-of-day split, to turn a Unix timestamp into a UTC calendar
/// date and time without pulling in a dedicated date/time dependency.
fn civil_from_unix(secs: i64) -> (i64, u32, u32, u32, u32, u32) {
    let days = secs.div_euclid(86400);
    let rem = secs.rem_euclid(86400);
    let hour = (rem / 3600) as u32;
    let min = ((rem % 3600) / 60) as u32;
    let sec = (rem % 60) as u32;

    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };

    (y, m, d, hour, min, sec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_feature(dir: &std::path::Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn outline_feature_expands_to_n_scenarios_all_passing() {
        let dir = tempfile::tempdir().unwrap();
        write_feature(
            dir.path(),
            "add.feature",
            "Feature: arithmetic\n  Scenario Outline: add <a>+<b>=<sum>\n    * def result = <a> + <b>\n    * match result == <sum>\n\n    Examples:\n      | a! | b! | sum! |\n      | 1  | 2  | 3    |\n      | 5  | 5  | 10   |\n      | 0  | 0  | 0    |\n",
        );

        let runner = SuiteRunner::new(SuiteConfig {
            paths: vec![dir.path().to_path_buf()],
            tag_filter: TagExpr::Any,
            listeners: vec![],
            perf_hook: None,
            config: Arc::new(Config::default()),
        });
        let result = runner.run().await;
        assert_eq!(result.scenario_count(), 3);
        assert!(!result.is_failed());
    }

    #[tokio::test]
    async fn parse_error_is_recorded_but_does_not_abort_other_features() {
        let dir = tempfile::tempdir().unwrap();
        write_feature(dir.path(), "broken.feature", "not a feature at all {{{\n");
        write_feature(dir.path(), "ok.feature", "Feature: f\n  Scenario: s\n    * def x = 1\n    * match x == 1\n");

        let runner = SuiteRunner::new(SuiteConfig {
            paths: vec![dir.path().to_path_buf()],
            tag_filter: TagExpr::Any,
            listeners: vec![],
            perf_hook: None,
            config: Arc::new(Config::default()),
        });
        let result = runner.run().await;
        assert_eq!(result.scenario_count(), 1);
        assert!(!result.infra_errors.is_empty());
        assert!(result.is_failed());
    }

    #[tokio::test]
    async fn tag_filter_excludes_non_matching_scenarios() {
        let dir = tempfile::tempdir().unwrap();
        write_feature(
            dir.path(),
            "tags.feature",
            "Feature: f\n  @smoke\n  Scenario: included\n    * def x = 1\n  Scenario: excluded\n    * def x = 1\n",
        );

        let runner = SuiteRunner::new(SuiteConfig {
            paths: vec![dir.path().to_path_buf()],
            tag_filter: TagExpr::parse("@smoke"),
            listeners: vec![],
            perf_hook: None,
            config: Arc::new(Config::default()),
        });
        let result = runner.run().await;
        assert_eq!(result.scenario_count(), 1);
    }
}
