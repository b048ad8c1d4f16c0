//! Owns one scenario's script engine, variable scope, and pending HTTP
//! request state, and carries out the invocation protocol (spec §4.3
//! "ScenarioRuntime") including feature-call resolution (spec §4.4
//! "CallRegistry").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as Json;

use crate::cancel::CancelToken;
use crate::call_registry::{CallOutcome, CallRegistry};
use crate::config::{Config, ConfigureResult};
use crate::driver::DriverFactory;
use crate::engine::{BoaScriptEngine, ScriptEngine};
use crate::error::{CallError, Error, Result, StepError};
use crate::feature::{CallKey, CallMode, FeatureId, FeatureScopedKey};
use crate::host::HostObject;
use crate::http::{HttpResponse, PendingRequest};
use crate::lock_manager::LockManager;
use crate::parse::{ParsedFeature, RunnableScenario};
use crate::perf::PerfHook;
use crate::result::{ScenarioResult, ScenarioStatus};
use crate::scope::VariableScope;
use crate::step::{StepExecutor, StepKeyword};
use crate::tag::Tag;
use crate::value::ScopeValue;

/// Resolves a feature reference (a path or `read(...)`/literal string
/// named by a `call` step) to its parsed form, caching by identity so a
/// feature called repeatedly is only parsed once per suite run.
pub trait FeatureLoader: Send + Sync {
    /// Loads and parses the feature named by `raw_ref` (already stripped
    /// of `read(...)` wrapping and quoting), relative to `base`.
    fn load(&self, raw_ref: &str, base: Option<&std::path::Path>) -> Result<Arc<ParsedFeature>>;
}

/// A [`FeatureLoader`] backed by the filesystem, memoizing by resolved
/// path so concurrent callers of the same helper feature parse it once.
pub struct FileFeatureLoader {
    cache: std::sync::Mutex<HashMap<std::path::PathBuf, Arc<ParsedFeature>>>,
}

impl FileFeatureLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self { cache: std::sync::Mutex::new(HashMap::new()) }
    }

    fn resolve_path(raw_ref: &str, base: Option<&std::path::Path>) -> std::path::PathBuf {
        let stripped = raw_ref.strip_prefix("classpath:").unwrap_or(raw_ref);
        let path = std::path::Path::new(stripped);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.and_then(std::path::Path::parent)
                .map(|dir| dir.join(path))
                .unwrap_or_else(|| path.to_path_buf())
        }
    }
}

impl Default for FileFeatureLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureLoader for FileFeatureLoader {
    fn load(&self, raw_ref: &str, base: Option<&std::path::Path>) -> Result<Arc<ParsedFeature>> {
        let resolved = Self::resolve_path(raw_ref, base);
        if let Some(hit) = self.cache.lock().unwrap().get(&resolved) {
            return Ok(Arc::clone(hit));
        }
        let parsed = Arc::new(crate::parse::parse_path(&resolved)?);
        self.cache.lock().unwrap().insert(resolved, Arc::clone(&parsed));
        Ok(parsed)
    }
}

/// Process-wide services every [`ScenarioRuntime`] depends on, injected
/// explicitly rather than reached for as ambient state (spec §9 "Global
/// mutable state").
#[derive(Clone)]
pub struct RuntimeDeps {
    pub lock_manager: LockManager,
    pub call_registry: CallRegistry,
    pub loader: Arc<dyn FeatureLoader>,
    pub http_client: reqwest::Client,
    pub uri_patterns: Vec<String>,
    pub perf_hook: Option<Arc<dyn PerfHook>>,
    pub config: Arc<Config>,
    pub driver_factory: Arc<dyn DriverFactory>,
}

/// One scenario's live execution state: its script engine, variable
/// scope, in-flight HTTP request, and the shared services it calls into
/// for locks and feature calls.
pub struct ScenarioRuntime {
    deps: RuntimeDeps,
    engine: Box<dyn ScriptEngine>,
    scope: VariableScope,
    cancel: CancelToken,
    pending: PendingRequest,
    feature_id: FeatureId,
    feature_path: Option<std::path::PathBuf>,
    call_stack: crate::call_registry::CallStack,
    configure_result: ConfigureResult,
}

impl ScenarioRuntime {
    /// Builds a top-level runtime for `feature_id`, seeded with the
    /// suite's config bindings.
    #[must_use]
    pub fn new(deps: RuntimeDeps, feature_id: FeatureId, feature_path: Option<std::path::PathBuf>) -> Self {
        let scope = VariableScope::new(Arc::clone(&deps.config.config_bindings));
        Self {
            deps,
            engine: Box::new(BoaScriptEngine::new()),
            scope,
            cancel: CancelToken::new(),
            pending: PendingRequest { base_url: String::new(), ..PendingRequest::default() },
            feature_id,
            feature_path,
            call_stack: crate::call_registry::CallStack::default(),
            configure_result: ConfigureResult::default(),
        }
    }

    fn child_for_call(
        &mut self,
        feature_id: FeatureId,
        feature_path: Option<std::path::PathBuf>,
        args: HashMap<String, ScopeValue>,
        shared: bool,
    ) -> Self {
        let scope = if shared { self.scope.fork_shared(args) } else { self.scope.fork_isolated(args) };
        Self {
            deps: self.deps.clone(),
            engine: Box::new(BoaScriptEngine::new()),
            scope,
            cancel: self.cancel.clone(),
            pending: PendingRequest { base_url: String::new(), ..PendingRequest::default() },
            feature_id,
            feature_path,
            call_stack: self.call_stack.clone(),
            configure_result: ConfigureResult::default(),
        }
    }

    /// The token observed for cooperative cancellation (spec §5).
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn scope(&self) -> &VariableScope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut VariableScope {
        &mut self.scope
    }

    pub fn pending_mut(&mut self) -> &mut PendingRequest {
        &mut self.pending
    }

    /// Binds an explicit host object into scope under `name` (e.g. a
    /// `Driver` implementation a consumer wires in before running the
    /// suite).
    pub fn bind_host_object(&mut self, name: &str, value: Arc<dyn HostObject>) {
        self.scope.set(name, ScopeValue::Handle(value));
    }

    /// Ensures a `driver` handle is bound in scope, building one via the
    /// injected [`DriverFactory`] from the accumulated `configure driver =
    /// {...}` map on first use (spec §4.2 "driver" keyword). Returns the
    /// existing handle if the scenario already bound one.
    pub fn ensure_driver(&mut self) -> Result<Arc<dyn HostObject>> {
        if let Some(existing) = self.scope.get("driver").and_then(ScopeValue::as_handle) {
            return Ok(Arc::clone(existing));
        }
        let config = Json::Object(self.configure_result.raw.clone().into_iter().collect());
        let handle = self.deps.driver_factory.create(&config)?;
        self.scope.set("driver", ScopeValue::Handle(Arc::clone(&handle)));
        Ok(handle)
    }

    /// Evaluates `source`, refreshing the engine's bindings from the
    /// current scope first (the engine holds no live reference back into
    /// [`VariableScope`]).
    pub fn eval(&mut self, source: &str) -> Result<Json> {
        let bindings = self.scope.visible_bindings();
        self.engine.eval_with_scope(source, &bindings)
    }

    /// Sends the accumulated [`PendingRequest`], binding the response as
    /// `response`/`responseStatus` and clearing per-request state for
    /// the next call.
    pub async fn send_pending_request(&mut self, location: &str) -> Result<()> {
        let response = crate::http::send(
            &self.deps.http_client,
            &self.pending,
            &self.deps.uri_patterns,
            self.deps.perf_hook.as_deref(),
        )
        .await
        .map_err(|e| match e {
            Error::Mock(m) => Error::Step(StepError::evaluate(location, m.to_string())),
            other => other,
        })?;
        let status = response.status;
        self.scope.set("response", ScopeValue::Handle(Arc::new(response)));
        self.scope.set("responseStatus", ScopeValue::Json(Json::from(status)));
        self.pending = PendingRequest { base_url: self.pending.base_url.clone(), ..PendingRequest::default() };
        Ok(())
    }

    /// Applies a `configure` step's result: remembers `scope: 'caller'`
    /// for driver propagation and keeps unrecognised keys visible via
    /// scope for feature scripts to read back (spec §6 "Configuration
    /// entry points").
    pub fn apply_configure(&mut self, value: &Json) {
        let result = ConfigureResult::from_json(value);
        self.scope.set("__configure", ScopeValue::Json(value.clone()));
        self.configure_result = result;
    }

    /// Runs the scenario's steps (Background already merged in by the
    /// outline expander) and produces the terminal [`ScenarioResult`].
    /// `lock_name` is the already tie-broken `@lock=<name>` value, if
    /// any (spec §4.3 invocation protocol step 1).
    pub async fn call(mut self, scenario: &RunnableScenario, lock_name: Option<String>) -> ScenarioResult {
        let start = Instant::now();
        let _guard = match &lock_name {
            Some(name) => Some(self.deps.lock_manager.acquire(name).await),
            None => None,
        };

        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut status = ScenarioStatus::Passed;
        for step in &scenario.steps {
            if self.cancel.is_cancelled() {
                status = ScenarioStatus::Cancelled;
                break;
            }
            let result = StepExecutor::execute(step, &mut self).await;
            let failed = !result.passed();
            steps.push(result);
            if failed {
                status = ScenarioStatus::Failed;
                break;
            }
        }

        ScenarioResult {
            name: scenario.name.clone(),
            status,
            duration: start.elapsed(),
            steps,
            result_variables: self.scope.local_snapshot(),
        }
    }

    /// Resolves and runs a `call`/`callonce`/`callSingle` step (spec
    /// §4.4), returning the callee's [`CallOutcome`] and propagating any
    /// `scope: 'caller'` host handles directly into this runtime's
    /// scope before returning. `shared` is true for the bare (unassigned)
    /// call form, which forks the callee's scope without deep-copying
    /// map/list values (spec §4.4 "Shared scope"); false for the assigned
    /// `def x = call ...` isolated form.
    pub async fn call_feature(&mut self, keyword: StepKeyword, rest: &str, location: &str, shared: bool) -> Result<CallOutcome> {
        let (path_expr, arg_expr) = split_call_target(rest);
        let path = self.resolve_call_path(&path_expr)?;
        let args = if arg_expr.trim().is_empty() { Json::Null } else { self.eval(&arg_expr)? };

        let feature_path = self.feature_path.clone();
        let callee_feature = self
            .deps
            .loader
            .load(&path, feature_path.as_deref())
            .map_err(|_| Error::Call(CallError::feature_not_found(path.clone())))?;
        let callee_id = callee_feature.id.clone();

        let call_stack = self
            .call_stack
            .push(&callee_id, self.deps.call_registry.max_call_depth())
            .map_err(|e| Error::Step(StepError::evaluate(location, e.to_string())))?;

        let scenario = callee_feature
            .scenarios
            .first()
            .cloned()
            .ok_or_else(|| Error::Call(CallError::no_runnable_scenario(path.clone())))?;

        let owner_id = self.feature_id.clone();
        let callee_path = match &callee_id {
            FeatureId::Path(p) => Some(p.clone()),
            FeatureId::Inline(_) => None,
        };

        // Built eagerly even though a `callonce`/`callSingle` cache hit
        // would discard it unused — constructing an empty engine plus a
        // forked scope is cheap, and it keeps `produce` a plain `move`
        // closure with no borrow of `self` that would otherwise have to
        // outlive the `.await` inside the registry's wait loop.
        let mut child = self.child_for_call(callee_id.clone(), callee_path, seed_args(&args), shared);
        child.call_stack = call_stack;

        let produce = move || async move {
            let result = run_called_scenario(&mut child, &scenario).await?;
            Ok(result)
        };

        let mode = match keyword {
            StepKeyword::Call => CallMode::Fresh,
            StepKeyword::CallOnce => CallMode::Once,
            StepKeyword::CallSingle => CallMode::Single,
            _ => unreachable!("call_feature only dispatched for call keywords"),
        };

        let outcome = match mode {
            CallMode::Fresh => produce().await?,
            CallMode::Once => {
                let key = FeatureScopedKey::new(callee_id.clone(), &args);
                self.deps.call_registry.call_once(owner_id, key, produce).await?
            }
            CallMode::Single => {
                let key = CallKey::new(callee_id.clone(), CallMode::Single, &args);
                self.deps.call_registry.call_single(key, produce).await?
            }
        };

        for (name, handle) in &outcome.propagate_handles {
            self.scope.set(name.clone(), handle.clone());
        }

        Ok(outcome)
    }

    fn resolve_call_path(&self, expr: &str) -> Result<String> {
        let trimmed = expr.trim();
        if let Some(inner) = strip_quotes(trimmed) {
            return Ok(inner.to_string());
        }
        if let Some(call) = trimmed.strip_prefix("read(").and_then(|s| s.strip_suffix(')')) {
            if let Some(inner) = strip_quotes(call.trim()) {
                return Ok(inner.to_string());
            }
        }
        Err(StepError::no_match(format!("could not resolve feature reference from: {expr}")).into())
    }
}

fn strip_quotes(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'') || (bytes[0] == b'"' && bytes[s.len() - 1] == b'"') {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

/// Splits `call`/`callonce`/`callSingle` text into its feature reference
/// and trailing argument expression, e.g. `read('helper.feature') {a:1}`
/// → (`read('helper.feature')`, `{a:1}`).
fn split_call_target(rest: &str) -> (String, String) {
    let rest = rest.trim();
    if let Some(body) = rest.strip_prefix("read(") {
        if let Some(close) = body.find(')') {
            let path_expr = format!("read({}", &body[..=close]);
            let arg_expr = body[close + 1..].trim().to_string();
            return (path_expr, arg_expr);
        }
    }
    // Bare quoted literal: split on the matching closing quote.
    let bytes = rest.as_bytes();
    if !bytes.is_empty() && (bytes[0] == b'\'' || bytes[0] == b'"') {
        let quote = bytes[0];
        if let Some(end) = rest[1..].find(quote as char) {
            let path_expr = rest[..end + 2].to_string();
            let arg_expr = rest[end + 2..].trim().to_string();
            return (path_expr, arg_expr);
        }
    }
    (rest.to_string(), String::new())
}

fn seed_args(args: &Json) -> HashMap<String, ScopeValue> {
    match args {
        Json::Object(map) => map.iter().map(|(k, v)| (k.clone(), ScopeValue::Json(v.clone()))).collect(),
        Json::Null => HashMap::new(),
        other => {
            let mut map = HashMap::new();
            map.insert("__arg".to_string(), ScopeValue::Json(other.clone()));
            map
        }
    }
}

async fn run_called_scenario(runtime: &mut ScenarioRuntime, scenario: &RunnableScenario) -> Result<CallOutcome> {
    for step in &scenario.steps {
        let result = StepExecutor::execute(step, runtime).await;
        if !result.passed() {
            let message = result
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "callee step failed".to_string());
            return Err(Error::Step(StepError::call_failed(runtime.feature_id.to_string(), message)));
        }
    }
    let propagation = &runtime.deps.config.propagation;
    let propagate_caller = runtime
        .configure_result
        .scope_caller;
    let mut propagate_handles = HashMap::new();
    if propagate_caller {
        for name in propagation.names() {
            if let Some(value @ ScopeValue::Handle(_)) = runtime.scope.get(name) {
                propagate_handles.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(CallOutcome { result_variables: runtime.scope.local_snapshot(), propagate_handles })
}

/// Resolves the effective `@lock=<name>` for a scenario given its merged
/// tag list (feature tags appended first, scenario tags appended after,
/// per [`crate::parse::expand_scenario`]) — the *last* matching `lock`
/// tag therefore implements the documented tie-break (scenario-level
/// wins; feature-level applies only when the scenario has none).
#[must_use]
pub fn resolve_lock_name(tags: &[Tag]) -> Option<String> {
    tags.iter()
        .rev()
        .find(|t| t.name == "lock")
        .map(|t| t.values.first().cloned().unwrap_or_default())
}
