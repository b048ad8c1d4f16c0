//! Feature identity and call-key derivation (spec §3 "Feature", "CallKey").

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde_json::Value as Json;
use sha2::{Digest, Sha256};

use crate::value::canonical_json;

/// A stable identity for a parsed [`gherkin::Feature`]: an absolute path
/// for file-backed features, or a content hash for inline/`classpath:`
/// features. Two runs of the same file must hash identically, which is
/// why this wraps a path rather than any in-memory pointer.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum FeatureId {
    /// Canonicalized filesystem path.
    Path(PathBuf),
    /// Hash of inline feature text (used for `classpath:` and in-test
    /// inline features, per spec §6 "Feature path schemes").
    Inline(String),
}

impl FeatureId {
    /// Builds a [`FeatureId`] from a resolved filesystem path.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::Path(canonical)
    }

    /// Builds a [`FeatureId`] from inline feature text.
    #[must_use]
    pub fn from_inline(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self::Inline(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Inline(h) => write!(f, "inline:{h}"),
        }
    }
}

/// The call mode a `call`/`callonce`/`callSingle` step requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CallMode {
    /// Isolated scope, not memoized: a fresh run every time (spec §4.4
    /// default mode, whether assigned or bare).
    Fresh,
    /// Feature-scoped memoization (`callonce`).
    Once,
    /// Suite-scoped memoization (`callSingle`).
    Single,
}

/// Key identifying one memoizable call in the [`CallRegistry`](crate::call_registry::CallRegistry):
/// `(featureIdentity, mode, argHash)`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CallKey {
    /// Identity of the callee feature.
    pub feature: FeatureId,
    /// Memoization mode.
    pub mode: CallMode,
    /// Canonical hash of the argument map (sorted keys), or empty string
    /// when the call passes no arguments.
    pub arg_hash: String,
}

impl CallKey {
    /// Builds a [`CallKey`] from a callee identity, mode, and argument
    /// value (typically a JSON object, possibly `Json::Null` for no
    /// args).
    #[must_use]
    pub fn new(feature: FeatureId, mode: CallMode, args: &Json) -> Self {
        Self {
            feature,
            mode,
            arg_hash: canonical_json(args),
        }
    }
}

/// For `callonce`, the feature-scoping key is `(featureIdentity, argHash)`
/// *without* the mode component — every `callonce` within one feature's
/// execution hits the same entry regardless of which scenario issued it,
/// but a different feature calling the same helper gets its own entry
/// keyed by its own `FeatureId` as the owner, tracked separately by the
/// registry (see `CallRegistry::callonce`).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FeatureScopedKey {
    /// Identity of the callee feature.
    pub callee: FeatureId,
    /// Canonical argument hash.
    pub arg_hash: String,
}

impl FeatureScopedKey {
    /// Builds a [`FeatureScopedKey`].
    #[must_use]
    pub fn new(callee: FeatureId, args: &Json) -> Self {
        Self {
            callee,
            arg_hash: canonical_json(args),
        }
    }
}

/// Computes a stable hash usable as a `HashMap` key component for a
/// `FeatureId`, exposed for callers that want to bucket by identity
/// without storing the full `FeatureId`.
#[must_use]
pub fn feature_hash(id: &FeatureId) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_key_equal_for_structurally_equal_args() {
        let id = FeatureId::from_inline("Feature: f\n");
        let a = CallKey::new(id.clone(), CallMode::Once, &json!({"b": 1, "a": 2}));
        let b = CallKey::new(id, CallMode::Once, &json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn different_features_get_different_feature_scoped_keys() {
        let a = FeatureScopedKey::new(FeatureId::from_inline("Feature: a\n"), &json!(null));
        let b = FeatureScopedKey::new(FeatureId::from_inline("Feature: b\n"), &json!(null));
        assert_ne!(a, b);
    }
}
