//! The embedded-script-engine boundary.
//!
//! Per spec §1, the script engine itself (a JavaScript evaluator with
//! host-object bridging) is an external collaborator; this module only
//! specifies the interface the rest of the core consumes and a narrow
//! adapter over `boa_engine`, kept isolated so no other module needs to
//! import `boa_engine` directly (mirrors the teacher's narrow-adapter
//! pattern for `hashable_regex.rs` wrapping `regex::Regex`).

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;

use crate::error::{Error, Result, StepError};
use crate::host::HostObject;
use crate::value::ScopeValue;

/// Evaluates expressions/snippets against a set of bound names.
///
/// An implementer owns no scenario state of its own: every binding it
/// sees is pushed in by the caller before `eval`/`eval_with_scope`, and
/// every side effect it produces on a bound host object flows through
/// that object's [`HostObject`] methods, not through engine-private
/// storage.
pub trait ScriptEngine: Send {
    /// Binds a plain JSON value under `name`, visible to subsequent
    /// evaluations until rebound or the engine is dropped.
    fn bind_value(&mut self, name: &str, value: &Json);

    /// Binds an opaque host object under `name`. The default
    /// [`eval_with_scope`](Self::eval_with_scope) implementation does
    /// not rely on this for member access (see its doc comment); an
    /// engine with a real host-object bridge (e.g. one exposing JS
    /// `Proxy` objects) can override both to use it instead.
    fn bind_host_object(&mut self, name: &str, value: Arc<dyn HostObject>);

    /// Evaluates `source` as an expression or statement sequence,
    /// returning its completion value (or `Json::Null` for
    /// side-effect-only statements).
    fn eval(&mut self, source: &str) -> Result<Json>;

    /// Convenience: binds every entry of `bindings`, then evaluates.
    ///
    /// Host handles are not exposed to the underlying engine as live
    /// objects — per spec §1 the engine's own host-object bridging is an
    /// external collaborator, and per spec §9 "Design notes" the bridge
    /// should be "explicit dispatch tables", not reflection. This default
    /// implementation supplies that dispatch itself: it rewrites every
    /// `handle.member` / `handle.method(args...)` occurrence in `source`
    /// into the JSON literal [`HostObject::get_property`] /
    /// [`HostObject::invoke`] produced, argument expressions first being
    /// evaluated against the same bindings, then hands the fully
    /// host-object-free source to [`eval`](Self::eval).
    fn eval_with_scope(&mut self, source: &str, bindings: &HashMap<String, ScopeValue>) -> Result<Json> {
        let mut handles = HashMap::new();
        let mut shared_snapshots: Vec<(&str, Json)> = Vec::new();
        for (name, value) in bindings {
            match value {
                ScopeValue::Json(v) => self.bind_value(name, v),
                ScopeValue::Handle(h) => {
                    handles.insert(name.as_str(), h);
                }
                ScopeValue::Shared(_) => {
                    // Bound as a read-only snapshot: the script engine
                    // never sees live shared storage, only the value it
                    // held at eval start (spec §1 "no reflection").
                    shared_snapshots.push((name.as_str(), value.to_json().unwrap_or(Json::Null)));
                }
            }
        }
        for (name, snapshot) in &shared_snapshots {
            self.bind_value(name, snapshot);
        }
        if handles.is_empty() {
            return self.eval(source);
        }
        let rewritten = rewrite_host_member_access(source, &handles, self)?;
        self.eval(&rewritten)
    }
}

/// Matches `receiver.member` and `receiver.member(args)`, args limited to
/// one level of nesting-free text (no parens inside an argument) — the
/// DSL's predicate and assertion expressions only ever call host methods
/// with literal or scope-variable arguments, never nested calls.
static MEMBER_ACCESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)(\s*\(([^()]*)\))?").unwrap());

/// Rewrites every `handle.member`/`handle.method(args)` reference in
/// `source` whose receiver names a bound host handle into the JSON
/// literal its [`HostObject`] dispatch produced, leaving every other
/// occurrence (plain JS property access on a JSON-bound variable, calls
/// to global functions, etc.) untouched.
fn rewrite_host_member_access(
    source: &str,
    handles: &HashMap<&str, &Arc<dyn HostObject>>,
    engine: &mut (impl ScriptEngine + ?Sized),
) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0usize;
    for caps in MEMBER_ACCESS.captures_iter(source) {
        let whole = caps.get(0).unwrap();
        let receiver = caps.get(1).unwrap().as_str();
        let Some(host) = handles.get(receiver) else { continue };
        let member = caps.get(2).unwrap().as_str();
        let call_args = caps.get(4).map(|m| m.as_str());

        let value = match call_args {
            Some(args_src) => {
                let args = eval_arg_list(args_src, engine)?;
                host.invoke(member, &args)?
            }
            None => host.get_property(member)?.unwrap_or(Json::Null),
        };

        out.push_str(&source[last..whole.start()]);
        // Parenthesised so a substituted object/array literal can never
        // be misread as a block at statement start, and so a following
        // `.member`/`(...)` on the result still parses as a continuation
        // of the same expression.
        out.push('(');
        out.push_str(&serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string()));
        out.push(')');
        last = whole.end();
    }
    out.push_str(&source[last..]);
    Ok(out)
}

fn eval_arg_list(args_src: &str, engine: &mut (impl ScriptEngine + ?Sized)) -> Result<Vec<Json>> {
    let trimmed = args_src.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    split_top_level_commas(trimmed).into_iter().map(|arg| engine.eval(arg.trim())).collect()
}

/// Splits `s` on commas outside of quotes and bracket nesting, so an
/// argument like `{a: 1, b: 2}` or `'a, b'` is not split in the middle.
fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut start = 0usize;
    let mut prev = '\0';
    for (i, ch) in s.char_indices() {
        match in_quote {
            Some(q) => {
                if ch == q && prev != '\\' {
                    in_quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => in_quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
        prev = ch;
    }
    parts.push(&s[start..]);
    parts
}

/// [`ScriptEngine`] backed by `boa_engine`.
///
/// Host-object member access never reaches `boa_engine` itself: the
/// default [`ScriptEngine::eval_with_scope`] rewrites it to JSON literals
/// before this engine ever sees the source (see that method's doc
/// comment), so [`bind_host_object`](ScriptEngine::bind_host_object) is a
/// no-op here.
pub struct BoaScriptEngine {
    context: boa_engine::Context,
}

impl BoaScriptEngine {
    /// Creates a fresh engine with no bindings, with every function
    /// registered elsewhere in the program via `#[host_fn]` already bound
    /// as a global callable (spec §9 "Design notes" host/script bridging).
    #[must_use]
    pub fn new() -> Self {
        let mut engine = Self { context: boa_engine::Context::default() };
        engine.bind_native_functions();
        engine
    }

    #[cfg(feature = "macros")]
    fn bind_native_functions(&mut self) {
        for reg in crate::host::native_functions() {
            let func = reg.func;
            let native = boa_engine::NativeFunction::from_copy_closure(move |_this, args, context| {
                let json_args: Vec<Json> =
                    args.iter().map(|a| boa_value_to_json(a, context).unwrap_or(Json::Null)).collect();
                let result = func(&json_args);
                let src = serde_json::to_string(&result).unwrap_or_else(|_| "null".to_string());
                context.eval(boa_engine::Source::from_bytes(&src))
            });
            let _ = self.context.register_global_callable(reg.name, 0, native);
        }
    }

    #[cfg(not(feature = "macros"))]
    fn bind_native_functions(&mut self) {}
}

impl Default for BoaScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for BoaScriptEngine {
    fn bind_value(&mut self, name: &str, value: &Json) {
        let js_source = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        let assignment = format!("globalThis.{name} = ({js_source});");
        let _ = self.context.eval(boa_engine::Source::from_bytes(&assignment));
    }

    fn bind_host_object(&mut self, _name: &str, _value: Arc<dyn HostObject>) {
        // See the struct doc comment: handled upstream by
        // `eval_with_scope`'s literal rewrite, not here.
    }

    fn eval(&mut self, source: &str) -> Result<Json> {
        let result = self
            .context
            .eval(boa_engine::Source::from_bytes(source))
            .map_err(|e| Error::Step(StepError::evaluate("<script>", e.to_string())))?;
        boa_value_to_json(&result, &mut self.context)
    }
}

fn boa_value_to_json(value: &boa_engine::JsValue, context: &mut boa_engine::Context) -> Result<Json> {
    use boa_engine::JsValue;
    Ok(match value {
        JsValue::Null | JsValue::Undefined => Json::Null,
        JsValue::Boolean(b) => Json::Bool(*b),
        JsValue::Integer(i) => Json::from(*i),
        JsValue::Rational(r) => serde_json::Number::from_f64(*r).map(Json::Number).unwrap_or(Json::Null),
        JsValue::String(s) => Json::String(s.to_std_string_escaped()),
        _ => {
            let text = value
                .to_string(context)
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_default();
            serde_json::from_str(&text).unwrap_or(Json::String(text))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluates_arithmetic() {
        let mut engine = BoaScriptEngine::new();
        let result = engine.eval("1 + 2").unwrap();
        assert_eq!(result, Json::from(3));
    }

    #[cfg(feature = "macros")]
    fn double_it(args: &[Json]) -> Json {
        let n = args.first().and_then(Json::as_i64).unwrap_or(0);
        Json::from(n * 2)
    }

    #[cfg(feature = "macros")]
    inventory::submit! {
        crate::host::NativeFnReg { name: "engineTestDoubleIt", func: double_it }
    }

    #[cfg(feature = "macros")]
    #[test]
    fn host_fn_registered_functions_are_callable_from_script() {
        let mut engine = BoaScriptEngine::new();
        let result = engine.eval("engineTestDoubleIt(21)").unwrap();
        assert_eq!(result, Json::from(42));
    }

    #[test]
    fn bound_value_is_visible_to_later_eval() {
        let mut engine = BoaScriptEngine::new();
        engine.bind_value("x", &Json::from(41));
        let result = engine.eval("x + 1").unwrap();
        assert_eq!(result, Json::from(42));
    }

    #[derive(Debug)]
    struct Dummy;

    impl HostObject for Dummy {
        fn type_name(&self) -> &'static str {
            "Dummy"
        }

        fn get_property(&self, name: &str) -> Result<Option<Json>> {
            Ok(match name {
                "method" => Some(Json::String("GET".to_string())),
                _ => None,
            })
        }

        fn invoke(&self, name: &str, args: &[Json]) -> Result<Json> {
            match name {
                "pathMatches" => Ok(Json::Bool(args.first() == Some(&json!("/users/{id}")))),
                other => Err(Error::Step(StepError::no_match(format!("Dummy.{other}(...)")))),
            }
        }
    }

    #[test]
    fn host_property_access_rewrites_to_a_json_literal() {
        let mut engine = BoaScriptEngine::new();
        let mut bindings = HashMap::new();
        bindings.insert("request".to_string(), ScopeValue::Handle(Arc::new(Dummy)));
        let result = engine.eval_with_scope("request.method == 'GET'", &bindings).unwrap();
        assert_eq!(result, Json::Bool(true));
    }

    #[test]
    fn host_method_call_receives_evaluated_args() {
        let mut engine = BoaScriptEngine::new();
        let mut bindings = HashMap::new();
        bindings.insert("request".to_string(), ScopeValue::Handle(Arc::new(Dummy)));
        let result = engine.eval_with_scope("request.pathMatches('/users/{id}')", &bindings).unwrap();
        assert_eq!(result, Json::Bool(true));
    }

    #[test]
    fn combined_predicate_matches_mock_dispatch_style_expression() {
        let mut engine = BoaScriptEngine::new();
        let mut bindings = HashMap::new();
        bindings.insert("request".to_string(), ScopeValue::Handle(Arc::new(Dummy)));
        let result = engine
            .eval_with_scope("request.pathMatches('/users/{id}') && request.method == 'GET'", &bindings)
            .unwrap();
        assert_eq!(result, Json::Bool(true));
    }

    #[test]
    fn plain_json_property_access_is_left_for_the_engine() {
        let mut engine = BoaScriptEngine::new();
        let mut bindings = HashMap::new();
        bindings.insert("config".to_string(), ScopeValue::Json(json!({"retries": 3})));
        let result = engine.eval_with_scope("config.retries", &bindings).unwrap();
        assert_eq!(result, Json::from(3));
    }
}
