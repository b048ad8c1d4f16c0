//! Suite/feature configuration assembled from CLI flags plus
//! `configure` script results (spec §6 "Configuration entry points").

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::value::ScopeValue;

/// Driver propagation manifest entry (spec §4.4 "Driver upward
/// propagation"): beyond the built-in `driver` name, a `configure`
/// result may list additional host-handle names to move from a
/// `scope: 'caller'` callee into its caller on return.
#[derive(Clone, Debug, Default)]
pub struct PropagationManifest {
    names: Vec<String>,
}

impl PropagationManifest {
    /// The built-in minimal set (spec §9 Open Questions): just `driver`.
    #[must_use]
    pub fn minimal() -> Self {
        Self { names: vec!["driver".to_string()] }
    }

    /// Extends the manifest with additional names from configuration.
    pub fn extend(&mut self, names: impl IntoIterator<Item = String>) {
        self.names.extend(names);
    }

    /// The full set of names that propagate.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Result of evaluating a `configure` script: a map of recognized and
/// unknown keys, the latter preserved verbatim and exposed to feature
/// scripts (spec §6).
#[derive(Clone, Debug, Default)]
pub struct ConfigureResult {
    /// Raw key/value map as returned by the `configure` script.
    pub raw: HashMap<String, Json>,
    /// `scope: 'caller'` — whether a callee's host handles propagate.
    pub scope_caller: bool,
}

impl ConfigureResult {
    /// Parses a raw JSON object returned by a `configure` step.
    #[must_use]
    pub fn from_json(value: &Json) -> Self {
        let mut raw = HashMap::new();
        if let Json::Object(map) = value {
            for (k, v) in map {
                raw.insert(k.clone(), v.clone());
            }
        }
        let scope_caller = raw
            .get("scope")
            .and_then(Json::as_str)
            .map(|s| s == "caller")
            .unwrap_or(false);
        Self { raw, scope_caller }
    }
}

/// Process-wide suite configuration: thread count, output directory,
/// tag filter, and config-layer bindings visible to every scenario's
/// [`VariableScope`](crate::scope::VariableScope).
#[derive(Clone)]
pub struct Config {
    /// Worker pool size (spec §4.6).
    pub threads: usize,
    /// Output directory for reports.
    pub output_dir: std::path::PathBuf,
    /// Raw tag filter expression text.
    pub tag_filter: String,
    /// Config-layer bindings (spec §4.1 "config bindings").
    pub config_bindings: Arc<HashMap<String, ScopeValue>>,
    /// Driver propagation manifest.
    pub propagation: PropagationManifest,
    /// Call-stack depth limit (spec §9).
    pub max_call_depth: usize,
    /// Whether to back up a prior output directory before writing
    /// (spec §6 "Backup of prior output directories").
    pub backup_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            output_dir: std::path::PathBuf::from("target/bddcore-reports"),
            tag_filter: String::new(),
            config_bindings: Arc::new(HashMap::new()),
            propagation: PropagationManifest::minimal(),
            max_call_depth: crate::call_registry::DEFAULT_MAX_CALL_DEPTH,
            backup_output: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn configure_result_parses_scope_caller() {
        let result = ConfigureResult::from_json(&json!({"scope": "caller", "retry": {"count": 2}}));
        assert!(result.scope_caller);
        assert_eq!(result.raw["retry"], json!({"count": 2}));
    }

    #[test]
    fn propagation_manifest_starts_minimal() {
        let manifest = PropagationManifest::minimal();
        assert_eq!(manifest.names(), &["driver".to_string()]);
    }
}
