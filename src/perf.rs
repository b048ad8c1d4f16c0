//! Per-HTTP-call timing callback for external metric sinks (spec §4.8).

/// Called by the HTTP step handler at request start and end.
///
/// `request_name` is resolved by walking configured URI patterns (e.g.
/// `/users/{id}`) and returning the matching template, falling back to
/// the raw path when nothing matches.
pub trait PerfHook: Send + Sync {
    /// Reports one completed HTTP call.
    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        request_name: &str,
        start_ms: u128,
        end_ms: u128,
        status_code: Option<u16>,
        ok: bool,
        error_message: Option<&str>,
    );
}

/// Resolves a raw path to the configured URI template it matches, per
/// spec §4.8, falling back to the raw path if nothing matches.
///
/// Patterns use `{name}` segments, e.g. `/users/{id}` matches
/// `/users/42`.
#[must_use]
pub fn resolve_request_name(patterns: &[String], raw_path: &str) -> String {
    'pattern: for pattern in patterns {
        let pat_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();
        let path_segments: Vec<&str> = raw_path.trim_matches('/').split('/').collect();
        if pat_segments.len() != path_segments.len() {
            continue;
        }
        for (p, s) in pat_segments.iter().zip(path_segments.iter()) {
            if !(p.starts_with('{') && p.ends_with('}')) && p != s {
                continue 'pattern;
            }
        }
        return pattern.clone();
    }
    raw_path.to_string()
}
