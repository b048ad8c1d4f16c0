//! The `match <actual> <op> <expected>` operator set (spec §4.2).

use serde_json::Value as Json;

/// One of the comparison operators `match`/`assert` support, with the
/// optional `each` prefix recorded separately.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchOp {
    Eq,
    Ne,
    Contains,
    NotContains,
    ContainsDeep,
    ContainsOnly,
    Within,
    NotWithin,
}

impl MatchOp {
    /// Parses the operator token(s) out of the text following `match`.
    ///
    /// Handles the documented tie-break: when `deep` follows `contains`
    /// with no value on the same line, `deep` is part of the operator
    /// and the expected value comes from a following doc-string rather
    /// than being parsed here.
    #[must_use]
    pub fn parse(text: &str) -> Option<(Self, &str)> {
        let text = text.trim_start();
        let pairs: &[(&str, MatchOp)] = &[
            ("!contains", MatchOp::NotContains),
            ("contains only", MatchOp::ContainsOnly),
            ("contains deep", MatchOp::ContainsDeep),
            ("contains", MatchOp::Contains),
            ("!within", MatchOp::NotWithin),
            ("within", MatchOp::Within),
            ("==", MatchOp::Eq),
            ("!=", MatchOp::Ne),
        ];
        for (token, op) in pairs {
            if let Some(rest) = text.strip_prefix(token) {
                return Some((*op, rest.trim_start()));
            }
        }
        None
    }

    /// Evaluates the operator given an `each` flag, the actual value,
    /// and the expected value. Returns `Ok(true/false)`; callers turn a
    /// `false` into a [`StepError::Assertion`](crate::error::StepError::Assertion)
    /// with a structured diff.
    #[must_use]
    pub fn evaluate(self, each: bool, actual: &Json, expected: &Json) -> bool {
        if each {
            let Json::Array(items) = actual else { return false };
            return items.iter().all(|item| self.evaluate(false, item, expected));
        }
        match self {
            MatchOp::Eq => actual == expected,
            MatchOp::Ne => actual != expected,
            MatchOp::Contains => contains(actual, expected, false),
            MatchOp::NotContains => !contains(actual, expected, false),
            MatchOp::ContainsDeep => contains(actual, expected, true),
            MatchOp::ContainsOnly => contains_only(actual, expected),
            MatchOp::Within => within(actual, expected),
            MatchOp::NotWithin => !within(actual, expected),
        }
    }
}

/// `contains`: for arrays, every item of `expected` (if an array) or
/// `expected` itself must be present in `actual`; for objects, every
/// key/value of `expected` must be present in `actual` (deep, when
/// `deep` is set, recursing into nested objects/arrays; shallow
/// otherwise, requiring exact equality of nested values).
fn contains(actual: &Json, expected: &Json, deep: bool) -> bool {
    match (actual, expected) {
        (Json::Array(a), Json::Array(e)) => e.iter().all(|ev| a.iter().any(|av| values_match(av, ev, deep))),
        (Json::Array(a), other) => a.iter().any(|av| values_match(av, other, deep)),
        (Json::Object(a), Json::Object(e)) => e.iter().all(|(k, ev)| {
            a.get(k).map(|av| values_match(av, ev, deep)).unwrap_or(false)
        }),
        (Json::String(a), Json::String(e)) => a.contains(e.as_str()),
        _ => false,
    }
}

fn values_match(actual: &Json, expected: &Json, deep: bool) -> bool {
    if deep {
        match (actual, expected) {
            (Json::Object(_), Json::Object(_)) | (Json::Array(_), Json::Array(_)) => {
                contains(actual, expected, true)
            }
            _ => actual == expected,
        }
    } else {
        actual == expected
    }
}

/// `contains only`: `actual` and `expected` hold exactly the same
/// elements (as a set; array order is ignored).
fn contains_only(actual: &Json, expected: &Json) -> bool {
    match (actual, expected) {
        (Json::Array(a), Json::Array(e)) => {
            a.len() == e.len() && e.iter().all(|ev| a.contains(ev)) && a.iter().all(|av| e.contains(av))
        }
        (Json::Object(a), Json::Object(e)) => {
            a.len() == e.len() && e.iter().all(|(k, ev)| a.get(k) == Some(ev))
        }
        _ => actual == expected,
    }
}

/// `within`: `actual` must be one of the values listed in `expected`
/// (an array), or structurally contained by it for object/array
/// `actual`.
fn within(actual: &Json, expected: &Json) -> bool {
    match expected {
        Json::Array(options) => options.iter().any(|opt| opt == actual),
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_and_ne() {
        assert!(MatchOp::Eq.evaluate(false, &json!(1), &json!(1)));
        assert!(MatchOp::Ne.evaluate(false, &json!(1), &json!(2)));
    }

    #[test]
    fn contains_array_subset() {
        let actual = json!([1, 2, 3]);
        assert!(MatchOp::Contains.evaluate(false, &actual, &json!([1, 3])));
        assert!(!MatchOp::Contains.evaluate(false, &actual, &json!([1, 4])));
    }

    #[test]
    fn contains_deep_recurses_into_nested_objects() {
        let actual = json!({"user": {"id": 1, "name": "bob", "extra": "x"}});
        let expected = json!({"user": {"id": 1, "name": "bob"}});
        assert!(MatchOp::ContainsDeep.evaluate(false, &actual, &expected));
    }

    #[test]
    fn contains_only_requires_exact_set() {
        assert!(MatchOp::ContainsOnly.evaluate(false, &json!([1, 2]), &json!([2, 1])));
        assert!(!MatchOp::ContainsOnly.evaluate(false, &json!([1, 2, 2]), &json!([1, 2])));
    }

    #[test]
    fn within_checks_membership() {
        assert!(MatchOp::Within.evaluate(false, &json!("a"), &json!(["a", "b"])));
        assert!(!MatchOp::Within.evaluate(false, &json!("c"), &json!(["a", "b"])));
    }

    #[test]
    fn each_prefix_applies_operator_to_every_item() {
        let actual = json!([{"status": "ok", "extra": 1}, {"status": "ok", "extra": 2}]);
        let expected = json!({"status": "ok"});
        assert!(!MatchOp::Eq.evaluate(true, &actual, &expected));
        assert!(MatchOp::ContainsDeep.evaluate(true, &actual, &expected));
    }

    #[test]
    fn parse_prefers_longest_operator_token() {
        let (op, rest) = MatchOp::parse("contains only ['a']").unwrap();
        assert_eq!(op, MatchOp::ContainsOnly);
        assert_eq!(rest, "['a']");
    }
}
