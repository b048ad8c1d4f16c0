//! Per-keyword step dispatch (spec §4.2 "StepExecutor").
//!
//! `StepExecutor::execute` is the single entry point the scenario loop
//! calls for every step; it classifies the text, times the dispatch
//! with a monotonic clock, and always returns a [`StepResult`] rather
//! than letting an error escape (spec §7 "errors never cross a scenario
//! boundary as exceptions").

use std::time::Instant;

use serde_json::Value as Json;

use crate::error::{Error, Result, StepError};
use crate::result::{Embed, StepResult};
use crate::runtime::ScenarioRuntime;
use crate::step::keyword::{classify, Dispatch, StepKeyword};
use crate::step::match_op::MatchOp;
use crate::step::{DocString, Step};
use crate::value::ScopeValue;

/// Stateless dispatcher; all mutable state lives on the
/// [`ScenarioRuntime`] it is handed.
pub struct StepExecutor;

impl StepExecutor {
    /// Executes one step against `runtime`, never propagating an error
    /// as a Rust `Err` — failures are captured in the returned
    /// [`StepResult`].
    pub async fn execute(step: &Step, runtime: &mut ScenarioRuntime) -> StepResult {
        let start = Instant::now();
        let mut log_lines = Vec::new();
        let mut embeds = Vec::new();

        let outcome = Self::dispatch(step, runtime, &mut log_lines, &mut embeds).await;

        StepResult {
            prefix: step.prefix.clone(),
            text: step.text.clone(),
            duration: start.elapsed(),
            error: outcome.err(),
            log_lines,
            embeds,
        }
    }

    async fn dispatch(
        step: &Step,
        runtime: &mut ScenarioRuntime,
        log_lines: &mut Vec<String>,
        embeds: &mut Vec<Embed>,
    ) -> Result<()> {
        let location = format!("line {}", step.line);
        match classify(&step.text) {
            Dispatch::Expression(expr) => {
                runtime.eval(&expr)?;
                Ok(())
            }
            Dispatch::Keyword { keyword, assign_to, rest } => {
                Self::dispatch_keyword(keyword, assign_to, &rest, step, runtime, &location, log_lines, embeds)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_keyword(
        keyword: StepKeyword,
        assign_to: Option<String>,
        rest: &str,
        step: &Step,
        runtime: &mut ScenarioRuntime,
        location: &str,
        log_lines: &mut Vec<String>,
        embeds: &mut Vec<Embed>,
    ) -> Result<()> {
        match keyword {
            StepKeyword::Def => {
                let value = runtime.eval(rest)?;
                let name = assign_to.ok_or_else(|| StepError::no_match("def without assignment"))?;
                runtime.scope_mut().set(name, ScopeValue::Json(value));
                Ok(())
            }
            StepKeyword::Url => {
                let value = runtime.eval(rest)?;
                runtime.pending_mut().base_url = value.as_str().unwrap_or_default().to_string();
                Ok(())
            }
            StepKeyword::Method => {
                let method = rest.trim().trim_matches(|c| c == '\'' || c == '"');
                runtime.pending_mut().method = Some(method.to_uppercase());
                runtime.send_pending_request(location).await
            }
            StepKeyword::Path => {
                let value = runtime.eval(&format!("[{rest}]"))?;
                if let Json::Array(segments) = value {
                    for segment in segments {
                        if let Some(s) = segment.as_str() {
                            runtime.pending_mut().path_segments.push(s.to_string());
                        } else {
                            runtime.pending_mut().path_segments.push(segment.to_string());
                        }
                    }
                }
                Ok(())
            }
            StepKeyword::Param => {
                let (name, value) = Self::split_name_value(rest, runtime)?;
                runtime.pending_mut().params.push((name, Self::json_to_param(&value)));
                Ok(())
            }
            StepKeyword::Header => {
                let (name, value) = Self::split_name_value(rest, runtime)?;
                runtime.pending_mut().headers.insert(name, Self::json_to_param(&value));
                Ok(())
            }
            StepKeyword::Cookie => {
                let (name, value) = Self::split_name_value(rest, runtime)?;
                runtime.pending_mut().cookies.insert(name, Self::json_to_param(&value));
                Ok(())
            }
            StepKeyword::FormField => {
                let (name, value) = Self::split_name_value(rest, runtime)?;
                runtime.pending_mut().form_fields.push((name, Self::json_to_param(&value)));
                Ok(())
            }
            StepKeyword::Request => {
                let value = runtime.eval(rest)?;
                runtime.pending_mut().body = Some(value);
                runtime.send_pending_request(location).await
            }
            StepKeyword::Status => {
                let expected = runtime.eval(rest)?;
                let actual = runtime
                    .scope()
                    .get("responseStatus")
                    .and_then(ScopeValue::as_json)
                    .cloned()
                    .unwrap_or(Json::Null);
                if actual != expected {
                    return Err(Error::Step(StepError::assertion(
                        location,
                        format!("expected status {expected}, got {actual}"),
                    )));
                }
                Ok(())
            }
            StepKeyword::Match => Self::run_match(rest, step, runtime, location),
            StepKeyword::Assert => {
                let value = runtime.eval(rest)?;
                if ScopeValue::Json(value.clone()).is_truthy() {
                    Ok(())
                } else {
                    Err(Error::Step(StepError::assertion(location, format!("assert failed: {rest} was {value}"))))
                }
            }
            StepKeyword::Print => {
                let value = runtime.eval(rest)?;
                log_lines.push(render_print(&value));
                Ok(())
            }
            StepKeyword::Call | StepKeyword::CallOnce | StepKeyword::CallSingle => {
                // A called feature's own steps can themselves contain a
                // `call`, so this edge must be boxed once to keep the
                // mutually-recursive `call_feature` -> step execution ->
                // `call_feature` cycle's future a statically known size.
                // Assigned form (`def x = call ...`) is isolated scope;
                // bare form is shared scope (spec §4.4).
                let shared = assign_to.is_none();
                let outcome = Box::pin(runtime.call_feature(keyword, rest, location, shared)).await?;
                if let Some(name) = assign_to {
                    let value = bundle_result_variables(&outcome.result_variables);
                    runtime.scope_mut().set(name, value);
                } else {
                    runtime.scope_mut().merge_new(outcome.result_variables);
                }
                Ok(())
            }
            StepKeyword::Read => {
                let value = runtime.eval(rest)?;
                if let Some(name) = assign_to {
                    runtime.scope_mut().set(name, ScopeValue::Json(value));
                }
                Ok(())
            }
            StepKeyword::Configure => {
                let value = runtime.eval(rest)?;
                runtime.apply_configure(&value);
                Ok(())
            }
            StepKeyword::Driver => {
                let url = runtime.eval(rest)?;
                let handle = runtime.ensure_driver()?;
                handle.invoke("navigate", &[url])?;
                Ok(())
            }
            StepKeyword::Eval => {
                runtime.eval(rest)?;
                Ok(())
            }
            StepKeyword::Doc => {
                let rendered = render_doc(rest, step.doc_string.as_ref());
                embeds.push(Embed { mime_type: "text/html".to_string(), data: rendered.into_bytes() });
                Ok(())
            }
        }
    }

    fn split_name_value(rest: &str, runtime: &mut ScenarioRuntime) -> Result<(String, Json)> {
        let (name, expr) = rest
            .split_once('=')
            .ok_or_else(|| StepError::no_match(format!("expected `name = value`, got: {rest}")))?;
        let name = name.trim().to_string();
        let value = runtime.eval(expr.trim())?;
        Ok((name, value))
    }

    fn json_to_param(value: &Json) -> String {
        match value {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn run_match(rest: &str, step: &Step, runtime: &mut ScenarioRuntime, location: &str) -> Result<()> {
        let rest = rest.trim();
        let each = rest.starts_with("each ");
        let rest = rest.strip_prefix("each ").unwrap_or(rest).trim();

        let (actual_expr, rest) = rest
            .split_once(' ')
            .ok_or_else(|| StepError::no_match(format!("malformed match step: {rest}")))?;
        let (op, expected_expr) = MatchOp::parse(rest)
            .ok_or_else(|| StepError::no_match(format!("unrecognised match operator in: {rest}")))?;

        let actual = runtime.eval(actual_expr)?;
        let expected = if expected_expr.trim().is_empty() {
            match &step.doc_string {
                Some(DocString { content, .. }) => runtime.eval(content)?,
                None => return Err(StepError::no_match("match operator needs an expected value").into()),
            }
        } else {
            runtime.eval(expected_expr)?
        };

        let passed = op.evaluate(each, &actual, &expected);
        if passed {
            Ok(())
        } else {
            Err(Error::Step(StepError::assertion(
                location,
                format!("{actual_expr} {actual} does not satisfy {op:?} {expected}"),
            )))
        }
    }
}

fn bundle_result_variables(vars: &std::collections::HashMap<String, ScopeValue>) -> ScopeValue {
    let obj: serde_json::Map<String, Json> = vars
        .iter()
        .filter_map(|(k, v)| v.as_json().map(|j| (k.clone(), j.clone())))
        .collect();
    ScopeValue::Json(Json::Object(obj))
}

fn render_print(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_doc(inline: &str, doc_string: Option<&DocString>) -> String {
    let markdown = doc_string.map(|d| d.content.as_str()).unwrap_or(inline);
    let parser = pulldown_cmark::Parser::new(markdown);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}
