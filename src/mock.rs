//! Mock HTTP dispatcher: serves requests by selecting and running a
//! scenario from a specially-marked mock feature, reusing the same
//! [`ScenarioRuntime`] the suite runner drives (spec §4.7 "MockDispatcher").
//!
//! A single long-lived runtime (the "mock root") evaluates each mock
//! feature's Background once; every incoming request forks an isolated
//! scope from that root and tries each scenario in declaration order,
//! treating its first step as a boolean predicate over the request and
//! running the remaining steps as the response-building handler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use serde_json::Value as Json;

use crate::error::{Error, MockError, Result};
use crate::host::HostObject;
use crate::parse::ParsedFeature;
use crate::runtime::{RuntimeDeps, ScenarioRuntime};
use crate::step::StepExecutor;
use crate::value::ScopeValue;

/// One incoming request's attributes, bound into script as `request`
/// (spec §4.7 item 2: `method`, `path`, `pathMatches(pattern)`,
/// `param(name)`, `header(name)`, `bodyString`).
#[derive(Debug)]
struct MockRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body_text: String,
    body_json: Option<Json>,
}

impl HostObject for MockRequest {
    fn type_name(&self) -> &'static str {
        "MockRequest"
    }

    fn get_property(&self, name: &str) -> Result<Option<Json>> {
        Ok(match name {
            "method" => Some(Json::String(self.method.clone())),
            "path" => Some(Json::String(self.path.clone())),
            "bodyString" => Some(Json::String(self.body_text.clone())),
            "body" => Some(self.body_json.clone().unwrap_or_else(|| Json::String(self.body_text.clone()))),
            _ => None,
        })
    }

    fn invoke(&self, name: &str, args: &[Json]) -> Result<Json> {
        match name {
            "pathMatches" => {
                let pattern = args.first().and_then(Json::as_str).unwrap_or_default();
                Ok(Json::Bool(path_matches(pattern, &self.path)))
            }
            "param" => {
                let key = args.first().and_then(Json::as_str).unwrap_or_default();
                Ok(self.query.get(key).cloned().map(Json::String).unwrap_or(Json::Null))
            }
            "header" => {
                let key = args.first().and_then(Json::as_str).unwrap_or_default();
                Ok(self
                    .headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| Json::String(v.clone()))
                    .unwrap_or(Json::Null))
            }
            other => Err(Error::Step(crate::error::StepError::no_match(format!("MockRequest.{other}(...)")))),
        }
    }
}

/// Matches a `{placeholder}` path template against a concrete path,
/// segment by segment (spec §8 "pathMatches('/users/{id}')").
fn path_matches(pattern: &str, path: &str) -> bool {
    let pat: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let got: Vec<&str> = path.trim_matches('/').split('/').collect();
    if pat.len() != got.len() {
        return false;
    }
    pat.iter().zip(got.iter()).all(|(p, g)| (p.starts_with('{') && p.ends_with('}')) || p == g)
}

/// One mock feature's parsed form plus the variable bindings its
/// Background left behind, captured once and reused across every
/// request (spec §4.7 item 1, "mock root").
struct MockRoot {
    feature: ParsedFeature,
    background_bindings: Arc<HashMap<String, ScopeValue>>,
}

/// The set of mock roots currently in effect. Swapped wholesale under
/// [`MockDispatcher::reload`] so an in-flight request keeps running
/// against the snapshot it started with (spec §9 watch mode).
struct Snapshot {
    roots: Vec<MockRoot>,
}

/// Configuration for one mock server instance (spec §4.7, §6 "Mock HTTP
/// interface").
pub struct MockConfig {
    /// Mock feature files to serve, tried in order per request.
    pub feature_paths: Vec<PathBuf>,
    /// TCP port to bind; `0` lets the OS assign one.
    pub port: u16,
    /// Path prefix stripped from incoming requests before matching.
    pub path_prefix: Option<String>,
    /// Paths to a PEM certificate and private key, enabling TLS.
    #[cfg(feature = "mock-tls")]
    pub tls: Option<(PathBuf, PathBuf)>,
}

/// Serves HTTP requests from one or more mock features (spec §4.7).
pub struct MockDispatcher {
    snapshot: RwLock<Arc<Snapshot>>,
    deps: RuntimeDeps,
    feature_paths: Vec<PathBuf>,
    path_prefix: Option<String>,
}

impl MockDispatcher {
    /// Parses every configured mock feature and evaluates its Background
    /// once, building the mock root(s) requests will be matched against.
    pub async fn new(config: MockConfig, deps: RuntimeDeps) -> Result<Arc<Self>> {
        let mut roots = Vec::with_capacity(config.feature_paths.len());
        for path in &config.feature_paths {
            roots.push(build_root(&deps, path).await?);
        }
        Ok(Arc::new(Self {
            snapshot: RwLock::new(Arc::new(Snapshot { roots })),
            deps,
            feature_paths: config.feature_paths,
            path_prefix: config.path_prefix,
        }))
    }

    /// Re-parses every mock feature and evaluates Background again,
    /// swapping in the new snapshot atomically (spec §4.7 item 5: "the
    /// mock feature file is re-parsed on modification and the next
    /// request uses the new definition").
    pub async fn reload(&self) -> Result<()> {
        let mut roots = Vec::with_capacity(self.feature_paths.len());
        for path in &self.feature_paths {
            roots.push(build_root(&self.deps, path).await?);
        }
        *self.snapshot.write().unwrap() = Arc::new(Snapshot { roots });
        Ok(())
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap())
    }

    /// Spawns a background task that polls the configured feature files'
    /// mtimes and calls [`Self::reload`] when any changes (spec §9 watch
    /// mode). A reparse failure is logged-and-ignored, keeping the
    /// previous snapshot live rather than taking the server down.
    pub fn spawn_watch(self: &Arc<Self>, poll_interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut last: HashMap<PathBuf, std::time::SystemTime> = HashMap::new();
            loop {
                tokio::time::sleep(poll_interval).await;
                let mut changed = false;
                for path in &dispatcher.feature_paths {
                    if let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) {
                        if last.get(path) != Some(&modified) {
                            last.insert(path.clone(), modified);
                            changed = true;
                        }
                    }
                }
                if changed {
                    let _ = dispatcher.reload().await;
                }
            }
        })
    }

    /// Binds a plain-TCP listener and serves indefinitely on a
    /// background task. `port` `0` lets the OS assign one (spec §4.7
    /// "port (0 = OS-assigned)").
    pub async fn serve(self: Arc<Self>, port: u16) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let dispatcher = self;
        let make_svc = make_service_fn(move |_conn| {
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let dispatcher = Arc::clone(&dispatcher);
                    async move { Ok::<_, hyper::Error>(dispatcher.handle(req).await) }
                }))
            }
        });
        let server = Server::try_bind(&addr)
            .map_err(|e| {
                Error::Mock(MockError::Bind { port, source: std::io::Error::new(std::io::ErrorKind::AddrInUse, e) })
            })?
            .serve(make_svc);
        let bound_addr = server.local_addr();
        let handle = tokio::spawn(async move {
            let _ = server.await;
        });
        Ok((bound_addr, handle))
    }

    async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let method = req.method().as_str().to_string();
        let raw_path = req.uri().path().to_string();
        let path = match &self.path_prefix {
            Some(prefix) => raw_path.strip_prefix(prefix.as_str()).unwrap_or(&raw_path).to_string(),
            None => raw_path,
        };
        let query: HashMap<String, String> = req
            .uri()
            .query()
            .and_then(|q| reqwest::Url::parse(&format!("http://x?{q}")).ok())
            .map(|u| u.query_pairs().into_owned().collect())
            .unwrap_or_default();
        let headers: HashMap<String, String> = req
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let content_type = headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("content-type")).map(|(_, v)| v.clone());
        let body_bytes = hyper::body::to_bytes(req.into_body()).await.unwrap_or_default();
        let body_text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body_json = content_type
            .filter(|ct| ct.contains("json"))
            .and_then(|_| serde_json::from_str(&body_text).ok());

        let mock_request =
            Arc::new(MockRequest { method: method.clone(), path: path.clone(), query, headers, body_text, body_json });

        match self.dispatch(mock_request).await {
            Ok(value) => build_mock_response(&value),
            Err(Error::Mock(MockError::NoMatch { .. })) => {
                Response::builder().status(StatusCode::NOT_FOUND).body(Body::empty()).unwrap_or_default()
            }
            Err(e) => Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from(e.to_string()))
                .unwrap_or_default(),
        }
    }

    /// Tries every root's scenarios in declaration order; the first
    /// whose first step evaluates truthy against `request` is selected,
    /// and its remaining steps run to completion in the forked scope
    /// (spec §4.7 item 3). Returns the final `response` variable.
    async fn dispatch(&self, request: Arc<MockRequest>) -> Result<Json> {
        let snapshot = self.snapshot();
        for root in &snapshot.roots {
            for scenario in &root.feature.scenarios {
                let own = scenario.own_steps();
                let Some(predicate) = own.first() else { continue };

                let mut runtime = ScenarioRuntime::new(self.deps.clone(), root.feature.id.clone(), None);
                for (name, value) in root.background_bindings.iter() {
                    runtime.scope_mut().set(name.clone(), value.deep_copy());
                }
                runtime.bind_host_object("request", Arc::clone(&request) as Arc<dyn HostObject>);

                let matched = runtime.eval(&predicate.text).map(|v| ScopeValue::Json(v).is_truthy()).unwrap_or(false);
                if !matched {
                    continue;
                }

                for step in &own[1..] {
                    let result = StepExecutor::execute(step, &mut runtime).await;
                    if !result.passed() {
                        let message =
                            result.error.map(|e| e.to_string()).unwrap_or_else(|| "mock handler failed".to_string());
                        return Err(Error::Mock(MockError::handler(message)));
                    }
                }

                let response = runtime.scope().get("response").and_then(ScopeValue::as_json).cloned().unwrap_or(Json::Null);
                return Ok(response);
            }
        }
        Err(Error::Mock(MockError::no_match(request.method.clone(), request.path.clone())))
    }
}

/// Evaluates a mock feature's Background once against a fresh runtime
/// and captures the resulting bindings for reuse by every request (spec
/// §4.7 item 1).
async fn build_root(deps: &RuntimeDeps, path: &std::path::Path) -> Result<MockRoot> {
    let feature = crate::parse::parse_path(path)?;
    let mut runtime = ScenarioRuntime::new(deps.clone(), feature.id.clone(), Some(path.to_path_buf()));
    for step in &feature.background {
        let result = StepExecutor::execute(step, &mut runtime).await;
        if !result.passed() {
            let message = result.error.map(|e| e.to_string()).unwrap_or_else(|| "mock root background failed".to_string());
            return Err(Error::Mock(MockError::handler(message)));
        }
    }
    let background_bindings = Arc::new(runtime.scope().visible_bindings());
    Ok(MockRoot { feature, background_bindings })
}

/// Builds the HTTP response from the scenario handler's final `response`
/// variable, expected to be a JSON object shaped like `{status, headers,
/// body}` (spec §6 "responses carry status ... headers ... and body").
fn build_mock_response(value: &Json) -> Response<Body> {
    let empty = serde_json::Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    let status = obj.get("status").and_then(Json::as_u64).unwrap_or(200) as u16;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);

    let mut builder = Response::builder().status(status);
    if let Some(Json::Object(headers)) = obj.get("headers") {
        for (name, value) in headers {
            if let Some(text) = value.as_str() {
                builder = builder.header(name.as_str(), text);
            }
        }
    }

    let body = match obj.get("body") {
        Some(Json::String(text)) => Body::from(text.clone()),
        Some(other) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(other).unwrap_or_default())
        }
        None => Body::empty(),
    };

    builder.body(body).unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(feature = "mock-tls")]
mod tls {
    //! TLS-capable listener for [`super::MockDispatcher`] (spec §6
    //! "Optional TLS when configured with certificate and key file
    //! paths"). Accepts connections manually rather than through
    //! [`hyper::Server::bind`] since hyper needs a concrete I/O type per
    //! connection and the accept/handshake step happens before hyper
    //! ever sees the stream.

    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;
    use std::sync::Arc;

    use hyper::server::conn::Http;
    use hyper::service::service_fn;
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    use super::MockDispatcher;
    use crate::error::{Error, MockError, Result};

    fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<rustls::ServerConfig> {
        let cert_file = File::open(cert_path).map_err(|e| {
            Error::Mock(MockError::handler(format!("reading TLS certificate {}: {e}", cert_path.display())))
        })?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .map_err(|e| Error::Mock(MockError::handler(format!("parsing TLS certificate: {e}"))))?
            .into_iter()
            .map(rustls::Certificate)
            .collect();

        let key_file = File::open(key_path).map_err(|e| {
            Error::Mock(MockError::handler(format!("reading TLS key {}: {e}", key_path.display())))
        })?;
        let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_file))
            .map_err(|e| Error::Mock(MockError::handler(format!("parsing TLS private key: {e}"))))?;
        let key = keys
            .pop()
            .map(rustls::PrivateKey)
            .ok_or_else(|| Error::Mock(MockError::handler("TLS key file contained no PKCS#8 private key".to_string())))?;

        rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Mock(MockError::handler(format!("building TLS server config: {e}"))))
    }

    /// Binds a TLS listener and serves indefinitely on a background
    /// task, terminating TLS before handing each connection to hyper.
    pub async fn serve_tls(
        dispatcher: Arc<MockDispatcher>,
        port: u16,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
        let config = load_server_config(cert_path, key_path)?;
        let acceptor = TlsAcceptor::from(Arc::new(config));
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| Error::Mock(MockError::Bind { port, source: e }))?;
        let bound_addr = listener.local_addr().map_err(|e| Error::Mock(MockError::Bind { port, source: e }))?;

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else { continue };
                let acceptor = acceptor.clone();
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let Ok(tls_stream) = acceptor.accept(stream).await else { return };
                    let dispatcher = Arc::clone(&dispatcher);
                    let service = service_fn(move |req| {
                        let dispatcher = Arc::clone(&dispatcher);
                        async move { Ok::<_, hyper::Error>(dispatcher.handle(req).await) }
                    });
                    let _ = Http::new().serve_connection(tls_stream, service).await;
                });
            }
        });

        Ok((bound_addr, handle))
    }
}

#[cfg(feature = "mock-tls")]
pub use tls::serve_tls;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_registry::CallRegistry;
    use crate::config::Config;
    use crate::lock_manager::LockManager;
    use crate::runtime::FileFeatureLoader;

    fn deps() -> RuntimeDeps {
        RuntimeDeps {
            lock_manager: LockManager::new(),
            call_registry: CallRegistry::new(),
            loader: Arc::new(FileFeatureLoader::new()),
            http_client: reqwest::Client::new(),
            uri_patterns: Vec::new(),
            perf_hook: None,
            config: Arc::new(Config::default()),
            driver_factory: Arc::new(crate::driver::NullDriverFactory),
        }
    }

    fn write_feature(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const MOCK_FEATURE: &str = r#"
Feature: user api mock

  Scenario: get one user
    Given request.pathMatches('/users/{id}') && request.method == 'GET'
    * def response = { status: 200, body: { id: 42 } }

  Scenario: create user
    Given request.pathMatches('/users') && request.method == 'POST'
    * def response = { status: 201, body: { created: true } }
"#;

    #[tokio::test]
    async fn get_request_matches_first_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_feature(dir.path(), "users.feature", MOCK_FEATURE);
        let dispatcher = MockDispatcher::new(
            MockConfig { feature_paths: vec![path], port: 0, path_prefix: None, #[cfg(feature = "mock-tls")] tls: None },
            deps(),
        )
        .await
        .unwrap();

        let request = Arc::new(MockRequest {
            method: "GET".to_string(),
            path: "/users/42".to_string(),
            query: HashMap::new(),
            headers: HashMap::new(),
            body_text: String::new(),
            body_json: None,
        });
        let response = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(response["status"], 200);
        assert_eq!(response["body"]["id"], 42);
    }

    #[tokio::test]
    async fn post_request_matches_second_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_feature(dir.path(), "users.feature", MOCK_FEATURE);
        let dispatcher = MockDispatcher::new(
            MockConfig { feature_paths: vec![path], port: 0, path_prefix: None, #[cfg(feature = "mock-tls")] tls: None },
            deps(),
        )
        .await
        .unwrap();

        let request = Arc::new(MockRequest {
            method: "POST".to_string(),
            path: "/users".to_string(),
            query: HashMap::new(),
            headers: HashMap::new(),
            body_text: "{}".to_string(),
            body_json: Some(serde_json::json!({})),
        });
        let response = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(response["status"], 201);
    }

    #[tokio::test]
    async fn unmatched_request_yields_no_match_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_feature(dir.path(), "users.feature", MOCK_FEATURE);
        let dispatcher = MockDispatcher::new(
            MockConfig { feature_paths: vec![path], port: 0, path_prefix: None, #[cfg(feature = "mock-tls")] tls: None },
            deps(),
        )
        .await
        .unwrap();

        let request = Arc::new(MockRequest {
            method: "DELETE".to_string(),
            path: "/unknown".to_string(),
            query: HashMap::new(),
            headers: HashMap::new(),
            body_text: String::new(),
            body_json: None,
        });
        let err = dispatcher.dispatch(request).await.unwrap_err();
        assert!(matches!(err, Error::Mock(MockError::NoMatch { .. })));
    }

    #[test]
    fn path_matches_template_segments() {
        assert!(path_matches("/users/{id}", "/users/42"));
        assert!(!path_matches("/users/{id}", "/users/42/extra"));
        assert!(path_matches("/users", "/users"));
    }

    #[tokio::test]
    async fn serve_binds_to_os_assigned_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_feature(dir.path(), "users.feature", MOCK_FEATURE);
        let dispatcher = MockDispatcher::new(
            MockConfig { feature_paths: vec![path], port: 0, path_prefix: None, #[cfg(feature = "mock-tls")] tls: None },
            deps(),
        )
        .await
        .unwrap();
        let (addr, handle) = dispatcher.serve(0).await.unwrap();
        assert_ne!(addr.port(), 0);
        handle.abort();
    }
}
