//! HTTP request building and the `HttpResponse` host object.
//!
//! The real HTTP client is an external collaborator (spec §1); this
//! module only builds a [`reqwest::Request`] from the pieces the `url`/
//! `method`/`path`/`param`/`header`/`cookie`/`form field`/`request`
//! keyword handlers accumulate, sends it, and wraps the result as a
//! [`HostObject`] the script engine can read back via `response.*`.

use std::collections::HashMap;
use std::time::Instant;

use reqwest::Method;
use serde_json::Value as Json;

use crate::error::{Error, MockError, Result, StepError};
use crate::host::HostObject;
use crate::perf::PerfHook;

/// Accumulates the pieces of an HTTP request across successive steps
/// (`url`, `path`, `param`, `header`, `cookie`, `method`, `request`)
/// before the `request`-send that actually performs the call (or a
/// bare `method` step does, if no explicit `request` follows — the
/// runtime treats `method` as the trigger, matching how the product
/// family this spec distills from triggers the call).
#[derive(Clone, Debug, Default)]
pub struct PendingRequest {
    pub base_url: String,
    pub path_segments: Vec<String>,
    pub params: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub form_fields: Vec<(String, String)>,
    pub body: Option<Json>,
    pub method: Option<String>,
}

impl PendingRequest {
    /// Builds the full URL from `base_url`, accumulated path segments,
    /// and query params.
    #[must_use]
    pub fn build_url(&self) -> String {
        let mut url = self.base_url.trim_end_matches('/').to_string();
        for segment in &self.path_segments {
            url.push('/');
            url.push_str(segment.trim_matches('/'));
        }
        if !self.params.is_empty() {
            url.push('?');
            let query: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
                .collect();
            url.push_str(&query.join("&"));
        }
        url
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// A received HTTP response, bridged into script as a host object with
/// `status`, `headers`, `header(name)`, and `body` (auto-parsed as
/// JSON when the `Content-Type` indicates it, else left as a string).
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body_text: String,
    pub body_json: Option<Json>,
}

impl HostObject for HttpResponse {
    fn type_name(&self) -> &'static str {
        "HttpResponse"
    }

    fn get_property(&self, name: &str) -> Result<Option<Json>> {
        Ok(match name {
            "status" => Some(Json::from(self.status)),
            "headers" => Some(Json::Object(
                self.headers.iter().map(|(k, v)| (k.clone(), Json::String(v.clone()))).collect(),
            )),
            "body" => Some(self.body_json.clone().unwrap_or(Json::String(self.body_text.clone()))),
            _ => None,
        })
    }

    fn invoke(&self, name: &str, args: &[Json]) -> Result<Json> {
        match name {
            "header" => {
                let key = args.first().and_then(Json::as_str).unwrap_or_default();
                Ok(self
                    .headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| Json::String(v.clone()))
                    .unwrap_or(Json::Null))
            }
            other => Err(Error::Step(StepError::no_match(format!("HttpResponse.{other}(...)")))),
        }
    }
}

/// Sends an accumulated [`PendingRequest`], reporting timing through an
/// optional [`PerfHook`] and resolving the reported request name against
/// `uri_patterns` (spec §4.8).
pub async fn send(
    client: &reqwest::Client,
    pending: &PendingRequest,
    uri_patterns: &[String],
    perf_hook: Option<&dyn PerfHook>,
) -> Result<HttpResponse> {
    let method_str = pending.method.clone().unwrap_or_else(|| "GET".to_string());
    let method = Method::from_bytes(method_str.as_bytes())
        .map_err(|e| Error::Step(StepError::evaluate("<http>", e.to_string())))?;
    let url = pending.build_url();

    let path_only = reqwest::Url::parse(&url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.clone());
    let request_name = crate::perf::resolve_request_name(uri_patterns, &path_only);

    let mut builder = client.request(method, &url);
    for (k, v) in &pending.headers {
        builder = builder.header(k, v);
    }
    if !pending.cookies.is_empty() {
        let cookie_header = pending
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header("Cookie", cookie_header);
    }
    if !pending.form_fields.is_empty() {
        builder = builder.form(&pending.form_fields);
    } else if let Some(body) = &pending.body {
        builder = builder.json(body);
    }

    let start = Instant::now();
    let start_ms = epoch_ms();
    let outcome = builder.send().await;
    let end_ms = epoch_ms();

    match outcome {
        Ok(response) => {
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect::<HashMap<_, _>>();
            let content_type = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            let body_text = response.text().await.unwrap_or_default();
            let body_json = if content_type.contains("json") {
                serde_json::from_str(&body_text).ok()
            } else {
                None
            };
            if let Some(hook) = perf_hook {
                hook.record(&request_name, start_ms, end_ms, Some(status), status < 400, None);
            }
            let _ = start.elapsed();
            Ok(HttpResponse { status, headers, body_text, body_json })
        }
        Err(err) => {
            if let Some(hook) = perf_hook {
                hook.record(&request_name, start_ms, end_ms, None, false, Some(&err.to_string()));
            }
            Err(Error::Mock(MockError::handler(err.to_string())))
        }
    }
}

fn epoch_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_joins_segments_and_params() {
        let pending = PendingRequest {
            base_url: "http://localhost:8080".to_string(),
            path_segments: vec!["users".to_string(), "42".to_string()],
            params: vec![("verbose".to_string(), "true".to_string())],
            ..Default::default()
        };
        assert_eq!(pending.build_url(), "http://localhost:8080/users/42?verbose=true");
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("a b&c"), "a%20b%26c");
    }
}
