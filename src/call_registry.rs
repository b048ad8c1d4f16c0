//! Memoizes feature-call results keyed by feature identity, not by
//! suite (spec §4.4 "CallRegistry").

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::{CallError, Result};
use crate::feature::{CallKey, FeatureId, FeatureScopedKey};
use crate::value::ScopeValue;

/// Default call-stack depth limit (spec §9 "Cyclic references").
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// The value produced by a memoized call: the callee's `resultVariables`
/// plus, if the callee declared `scope: 'caller'`, any host handles that
/// should propagate upward (see [`crate::runtime`]).
#[derive(Clone)]
pub struct CallOutcome {
    /// The callee's final variable snapshot.
    pub result_variables: HashMap<String, ScopeValue>,
    /// Host handles that should move into the caller's scope on return
    /// regardless of call mode, because the callee declared
    /// `scope: 'caller'` (spec §4.4 "Driver upward propagation").
    /// Empty unless that configuration was set.
    pub propagate_handles: HashMap<String, ScopeValue>,
}

enum Slot {
    InProgress(Arc<Notify>),
    Done(Result<CallOutcome>),
}

/// Suite-wide (for `callSingle`) and per-feature (for `callonce`) call
/// memoization. Injected as an explicit dependency into every
/// [`ScenarioRuntime`](crate::runtime::ScenarioRuntime), never ambient
/// (spec §9 "Global mutable state").
#[derive(Clone)]
pub struct CallRegistry {
    inner: Arc<Mutex<RegistryState>>,
    max_call_depth: usize,
}

#[derive(Default)]
struct RegistryState {
    /// `callSingle`: one entry per `CallKey`, suite-lifetime.
    suite_scoped: HashMap<CallKey, Slot>,
    /// `callonce`: one entry per `(owning feature, FeatureScopedKey)`,
    /// cleared when the owning feature finishes.
    feature_scoped: HashMap<FeatureId, HashMap<FeatureScopedKey, Slot>>,
    /// Keys currently in progress on *any* call stack, used for the
    /// cycle/deadlock guard — re-entering one of these from the same
    /// logical call chain is reported as an error rather than awaited.
    in_progress_keys: HashSet<(Option<FeatureId>, FeatureScopedKey)>,
}

/// Per-call-stack bookkeeping threaded through nested `call`s to detect
/// cyclic re-entrancy and enforce the depth limit.
#[derive(Clone, Default)]
pub struct CallStack {
    depth: usize,
    chain: call_chain::Chain,
}

/// A cheap persistent singly-linked list of in-flight call keys, shared
/// via `Arc` between sibling frames so pushing a new frame never clones
/// the rest of the chain.
mod call_chain {
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct Chain(Option<Arc<Node>>);

    struct Node {
        key: String,
        parent: Option<Arc<Node>>,
    }

    impl Chain {
        pub fn push(&self, key: String) -> Self {
            Chain(Some(Arc::new(Node { key, parent: self.0.clone() })))
        }

        pub fn contains(&self, key: &str) -> bool {
            let mut cur = self.0.clone();
            while let Some(node) = cur {
                if node.key == key {
                    return true;
                }
                cur = node.parent.clone();
            }
            false
        }
    }
}

impl CallStack {
    /// Pushes a frame for `feature`, failing if it is already on this
    /// call chain (a feature calling itself, directly or indirectly)
    /// or if the depth limit is reached.
    pub fn push(&self, feature: &FeatureId, max_depth: usize) -> Result<Self> {
        let key = feature.to_string();
        if self.chain.contains(&key) {
            return Err(CallError::reentrant(key).into());
        }
        if self.depth + 1 > max_depth {
            return Err(CallError::stack_overflow(max_depth).into());
        }
        Ok(Self {
            depth: self.depth + 1,
            chain: self.chain.push(key),
        })
    }
}

impl CallRegistry {
    /// Creates an empty registry with the default call-depth limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_call_depth(DEFAULT_MAX_CALL_DEPTH)
    }

    /// Creates an empty registry with an explicit call-depth limit.
    #[must_use]
    pub fn with_max_call_depth(max_call_depth: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryState::default())),
            max_call_depth,
        }
    }

    /// Maximum call-stack depth this registry enforces.
    #[must_use]
    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    /// Resolves a `callSingle` (suite-scoped) call: at most one
    /// execution per `CallKey` runs at a time; concurrent callers block
    /// on the in-flight `Notify` and observe the identical
    /// [`CallOutcome`] (object identity preserved for any host handle it
    /// carries, since `result_variables` holds `Arc`-backed handles).
    pub async fn call_single<F, Fut>(&self, key: CallKey, produce: F) -> Result<CallOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CallOutcome>>,
    {
        loop {
            let notify = {
                let mut state = self.inner.lock().unwrap();
                match state.suite_scoped.get(&key) {
                    Some(Slot::Done(result)) => return clone_result(result),
                    Some(Slot::InProgress(notify)) => Some(Arc::clone(notify)),
                    None => {
                        state.suite_scoped.insert(key.clone(), Slot::InProgress(Arc::new(Notify::new())));
                        None
                    }
                }
            };
            if let Some(notify) = notify {
                notify.notified().await;
                continue;
            }

            let result = produce().await;
            let mut state = self.inner.lock().unwrap();
            if let Some(Slot::InProgress(notify)) = state.suite_scoped.get(&key) {
                notify.notify_waiters();
            }
            if result.is_ok() {
                state.suite_scoped.insert(key.clone(), Slot::Done(clone_result(&result)));
            } else {
                // A failed execution is not cached; subsequent callers retry.
                state.suite_scoped.remove(&key);
            }
            return result;
        }
    }

    /// Resolves a `callonce` (feature-scoped) call: within `owner`'s
    /// execution, the tuple `(owner, FeatureScopedKey)` yields a single
    /// cached result shared across all of `owner`'s scenarios, but a
    /// different feature calling the same helper gets its own entry.
    pub async fn call_once<F, Fut>(&self, owner: FeatureId, key: FeatureScopedKey, produce: F) -> Result<CallOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CallOutcome>>,
    {
        loop {
            let notify = {
                let mut state = self.inner.lock().unwrap();
                let slots = state.feature_scoped.entry(owner.clone()).or_default();
                match slots.get(&key) {
                    Some(Slot::Done(result)) => return clone_result(result),
                    Some(Slot::InProgress(notify)) => Some(Arc::clone(notify)),
                    None => {
                        slots.insert(key.clone(), Slot::InProgress(Arc::new(Notify::new())));
                        None
                    }
                }
            };
            if let Some(notify) = notify {
                notify.notified().await;
                continue;
            }

            let result = produce().await;
            let mut state = self.inner.lock().unwrap();
            let slots = state.feature_scoped.entry(owner.clone()).or_default();
            if let Some(Slot::InProgress(notify)) = slots.get(&key) {
                notify.notify_waiters();
            }
            if result.is_ok() {
                slots.insert(key.clone(), Slot::Done(clone_result(&result)));
            } else {
                slots.remove(&key);
            }
            return result;
        }
    }

    /// Clears every `callonce` entry owned by `feature` — called when
    /// the owning feature finishes, so entries never bleed across
    /// separate runs of the same feature within one suite process.
    pub fn clear_feature_scope(&self, feature: &FeatureId) {
        self.inner.lock().unwrap().feature_scoped.remove(feature);
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_result(result: &Result<CallOutcome>) -> Result<CallOutcome> {
    match result {
        Ok(outcome) => Ok(outcome.clone()),
        Err(_) => Err(CallError::feature_not_found("<cached failure not retained>").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outcome(n: i64) -> CallOutcome {
        let mut vars = HashMap::new();
        vars.insert("n".to_string(), ScopeValue::Json(json!(n)));
        CallOutcome { result_variables: vars, propagate_handles: HashMap::new() }
    }

    #[tokio::test]
    async fn call_single_runs_producer_exactly_once() {
        let registry = CallRegistry::new();
        let key = CallKey::new(
            FeatureId::from_inline("bootstrap"),
            crate::feature::CallMode::Single,
            &json!(null),
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let registry = registry.clone();
            let key = key.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                registry
                    .call_single(key, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok(outcome(42))
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut results = vec![];
        for h in handles {
            results.push(h.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for r in &results {
            assert_eq!(r.result_variables["n"].as_json().unwrap(), &json!(42));
        }
    }

    #[tokio::test]
    async fn call_once_is_scoped_per_owning_feature() {
        let registry = CallRegistry::new();
        let helper = FeatureId::from_inline("helper");
        let key = FeatureScopedKey::new(helper.clone(), &json!(null));
        let calls = Arc::new(AtomicUsize::new(0));

        for owner_name in ["feature-a", "feature-b"] {
            let owner = FeatureId::from_inline(owner_name);
            let registry = registry.clone();
            let key = key.clone();
            let calls = Arc::clone(&calls);
            registry
                .call_once(owner, key, || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(outcome(1))
                    }
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_execution_is_not_cached() {
        let registry = CallRegistry::new();
        let key = CallKey::new(FeatureId::from_inline("flaky"), crate::feature::CallMode::Single, &json!(null));
        let attempt = Arc::new(AtomicUsize::new(0));

        let first = registry
            .call_single(key.clone(), || {
                let attempt = Arc::clone(&attempt);
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Err(CallError::feature_not_found("flaky").into())
                }
            })
            .await;
        assert!(first.is_err());

        let second = registry
            .call_single(key, || {
                let attempt = Arc::clone(&attempt);
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Ok(outcome(7))
                }
            })
            .await;
        assert!(second.is_ok());
        assert_eq!(attempt.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn call_stack_detects_reentrancy() {
        let stack = CallStack::default();
        let feature = FeatureId::from_inline("self-caller");
        let next = stack.push(&feature, 1000).unwrap();
        let reentry = next.push(&feature, 1000);
        assert!(reentry.is_err());
    }

    #[test]
    fn call_stack_enforces_depth_limit() {
        let mut stack = CallStack::default();
        for i in 0..3 {
            stack = stack.push(&FeatureId::from_inline(&format!("f{i}")), 3).unwrap();
        }
        let overflow = stack.push(&FeatureId::from_inline("f-overflow"), 3);
        assert!(overflow.is_err());
    }
}
