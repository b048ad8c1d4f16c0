//! Per-scenario variable scope: a name→value mapping layered over
//! feature/config defaults, with snapshot/restore and deep-copy
//! semantics (spec §3, §4.1).

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::ScopeValue;

/// An immutable snapshot of a [`VariableScope`]'s visible state.
///
/// Restoring a snapshot exactly recreates what `get` would have
/// returned at the moment it was taken; the snapshot is a cheap `Arc`
/// clone, not a deep copy of every value, so taking snapshots inside a
/// hot loop (e.g. before every step, for cancellation bookkeeping) is
/// inexpensive.
#[derive(Clone)]
pub struct ScopeSnapshot {
    config: Arc<HashMap<String, ScopeValue>>,
    feature_defaults: Arc<HashMap<String, ScopeValue>>,
    local: Arc<HashMap<String, ScopeValue>>,
}

/// A scenario's variable mapping.
///
/// Three layered sources are consulted in order on `get`:
/// 1. scenario-local bindings (mutable, dropped at scenario end) —
///    always written to by `set`;
/// 2. feature-level defaults (seeded from caller args or Background
///    evaluation);
/// 3. config bindings (process-wide, immutable after suite init).
pub struct VariableScope {
    config: Arc<HashMap<String, ScopeValue>>,
    feature_defaults: Arc<HashMap<String, ScopeValue>>,
    local: HashMap<String, ScopeValue>,
}

impl VariableScope {
    /// Creates a scope seeded only with process-wide config bindings.
    #[must_use]
    pub fn new(config: Arc<HashMap<String, ScopeValue>>) -> Self {
        Self {
            config,
            feature_defaults: Arc::new(HashMap::new()),
            local: HashMap::new(),
        }
    }

    /// Creates a scope with feature-level defaults layered beneath
    /// scenario-local bindings (e.g. seeded from Background evaluation
    /// or a caller's arg map for an isolated-scope call).
    #[must_use]
    pub fn with_feature_defaults(
        config: Arc<HashMap<String, ScopeValue>>,
        feature_defaults: Arc<HashMap<String, ScopeValue>>,
    ) -> Self {
        Self {
            config,
            feature_defaults,
            local: HashMap::new(),
        }
    }

    /// Forks a fresh scope that shares this scope's config and treats
    /// its current visible bindings as feature defaults — used to seed
    /// a called feature's scope with an isolated copy of the caller's
    /// state plus explicit call args (the assigned `def x = call ...`
    /// form, spec §4.4 "Isolated scope").
    #[must_use]
    pub fn fork_isolated(&self, extra: HashMap<String, ScopeValue>) -> Self {
        let mut defaults: HashMap<String, ScopeValue> = HashMap::new();
        for key in self.feature_defaults.keys() {
            if let Some(v) = self.get(key) {
                defaults.insert(key.clone(), v.deep_copy());
            }
        }
        for (k, v) in &self.local {
            defaults.insert(k.clone(), v.deep_copy());
        }
        defaults.extend(extra);
        Self {
            config: Arc::clone(&self.config),
            feature_defaults: Arc::new(defaults),
            local: HashMap::new(),
        }
    }

    /// Forks a fresh scope for the bare `call feature arg` form (spec
    /// §4.4 "Shared scope"). Unlike [`Self::fork_isolated`], map/list
    /// values are not deep-copied: this scope's own binding is promoted
    /// in place to a [`ScopeValue::Shared`] cell and the same `Arc` is
    /// handed to the child, so a mutation either side makes through that
    /// cell (e.g. a host function appending into a shared list) is
    /// visible to the other without waiting for the callee to return.
    /// Scalars are still copied by value since there is nothing to share.
    pub fn fork_shared(&mut self, extra: HashMap<String, ScopeValue>) -> Self {
        let mut defaults: HashMap<String, ScopeValue> = HashMap::new();
        let default_keys: Vec<String> = self.feature_defaults.keys().cloned().collect();
        for key in default_keys {
            if let Some(v) = self.feature_defaults.get(&key) {
                defaults.insert(key, v.share_or_copy());
            }
        }
        let local_keys: Vec<String> = self.local.keys().cloned().collect();
        for key in local_keys {
            let shared = self.local.get(&key).unwrap().share_or_copy();
            self.local.insert(key.clone(), shared.clone());
            defaults.insert(key, shared);
        }
        defaults.extend(extra);
        Self {
            config: Arc::clone(&self.config),
            feature_defaults: Arc::new(defaults),
            local: HashMap::new(),
        }
    }

    /// Looks up a name, scenario-local shadowing feature-default
    /// shadowing config.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScopeValue> {
        self.local
            .get(name)
            .or_else(|| self.feature_defaults.get(name))
            .or_else(|| self.config.get(name))
    }

    /// Assigns a value. Assignment always writes to the scenario-local
    /// layer, regardless of where a same-named value was previously
    /// visible from.
    pub fn set(&mut self, name: impl Into<String>, value: ScopeValue) {
        self.local.insert(name.into(), value);
    }

    /// Returns the deep-cloned value of `name`, implementing the `copy`
    /// keyword: later mutation of the source is invisible to the copy.
    #[must_use]
    pub fn deep_copy_of(&self, name: &str) -> Option<ScopeValue> {
        self.get(name).map(ScopeValue::deep_copy)
    }

    /// Produces a restorable snapshot of currently-visible state.
    #[must_use]
    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            config: Arc::clone(&self.config),
            feature_defaults: Arc::clone(&self.feature_defaults),
            local: Arc::new(self.local.clone()),
        }
    }

    /// Restores a previously taken snapshot, exactly recreating its
    /// visible state.
    pub fn restore(&mut self, snapshot: &ScopeSnapshot) {
        self.config = Arc::clone(&snapshot.config);
        self.feature_defaults = Arc::clone(&snapshot.feature_defaults);
        self.local = (*snapshot.local).clone();
    }

    /// Names visible in the scenario-local layer only — used to compute
    /// what a shared-scope `call` should merge back into the caller.
    #[must_use]
    pub fn local_names(&self) -> impl Iterator<Item = &String> {
        self.local.keys()
    }

    /// Returns an owned map of every scenario-local binding, used to
    /// build a callee's `resultVariables`.
    #[must_use]
    pub fn local_snapshot(&self) -> HashMap<String, ScopeValue> {
        self.local
            .iter()
            .map(|(k, v)| (k.clone(), v.deep_copy()))
            .collect()
    }

    /// Merges bindings whose names are new to this scope (does not
    /// overwrite existing scenario-local names) — the shared-scope
    /// call-back-propagation rule.
    pub fn merge_new(&mut self, bindings: HashMap<String, ScopeValue>) {
        for (k, v) in bindings {
            self.local.entry(k).or_insert(v);
        }
    }

    /// Every name currently visible, local shadowing feature-defaults
    /// shadowing config — used to refresh a script engine's bindings
    /// before evaluating a step, since the engine holds no reference
    /// back into this scope.
    #[must_use]
    pub fn visible_bindings(&self) -> HashMap<String, ScopeValue> {
        let mut out: HashMap<String, ScopeValue> = HashMap::new();
        for (k, v) in self.config.iter() {
            out.insert(k.clone(), v.deep_copy());
        }
        for (k, v) in self.feature_defaults.iter() {
            out.insert(k.clone(), v.deep_copy());
        }
        for (k, v) in &self.local {
            out.insert(k.clone(), v.deep_copy());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> VariableScope {
        VariableScope::new(Arc::new(HashMap::new()))
    }

    #[test]
    fn set_shadows_config_and_defaults() {
        let mut config = HashMap::new();
        config.insert("x".to_string(), ScopeValue::Json(json!(1)));
        let mut s = VariableScope::new(Arc::new(config));
        assert_eq!(s.get("x").unwrap().as_json().unwrap(), &json!(1));
        s.set("x", ScopeValue::Json(json!(2)));
        assert_eq!(s.get("x").unwrap().as_json().unwrap(), &json!(2));
    }

    #[test]
    fn deep_copy_is_isolated_from_later_mutation() {
        let mut s = scope();
        s.set("x", ScopeValue::Json(json!({"a": 1})));
        let y = s.deep_copy_of("x").unwrap();
        s.set("x", ScopeValue::Json(json!({"a": 2})));
        assert_eq!(y.as_json().unwrap(), &json!({"a": 1}));
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let mut s = scope();
        s.set("x", ScopeValue::Json(json!(1)));
        let snap = s.snapshot();
        s.set("x", ScopeValue::Json(json!(2)));
        s.restore(&snap);
        assert_eq!(s.get("x").unwrap().as_json().unwrap(), &json!(1));
    }

    #[test]
    fn two_scopes_do_not_observe_each_others_locals() {
        let mut s1 = scope();
        let mut s2 = scope();
        s1.set("v", ScopeValue::Json(json!("s1")));
        s2.set("v", ScopeValue::Json(json!("s2")));
        assert_eq!(s1.get("v").unwrap().as_json().unwrap(), &json!("s1"));
        assert_eq!(s2.get("v").unwrap().as_json().unwrap(), &json!("s2"));
    }

    #[test]
    fn merge_new_does_not_overwrite_existing_local() {
        let mut s = scope();
        s.set("kept", ScopeValue::Json(json!("orig")));
        let mut incoming = HashMap::new();
        incoming.insert("kept".to_string(), ScopeValue::Json(json!("overwritten")));
        incoming.insert("fresh".to_string(), ScopeValue::Json(json!("new")));
        s.merge_new(incoming);
        assert_eq!(s.get("kept").unwrap().as_json().unwrap(), &json!("orig"));
        assert_eq!(s.get("fresh").unwrap().as_json().unwrap(), &json!("new"));
    }
}
