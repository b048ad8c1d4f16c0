//! Keyword-vs-expression classification (spec §3, §4.2 item 2).

/// Every reserved DSL keyword a step's left-hand side may name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepKeyword {
    Def,
    Url,
    Method,
    Path,
    Param,
    Header,
    Cookie,
    FormField,
    Request,
    Status,
    Match,
    Assert,
    Print,
    Call,
    CallOnce,
    CallSingle,
    Read,
    Configure,
    Driver,
    Eval,
    Doc,
}

impl StepKeyword {
    const ALL: &'static [(&'static str, StepKeyword)] = &[
        ("def", StepKeyword::Def),
        ("url", StepKeyword::Url),
        ("method", StepKeyword::Method),
        ("path", StepKeyword::Path),
        ("param", StepKeyword::Param),
        ("header", StepKeyword::Header),
        ("cookie", StepKeyword::Cookie),
        ("form field", StepKeyword::FormField),
        ("request", StepKeyword::Request),
        ("status", StepKeyword::Status),
        ("match", StepKeyword::Match),
        ("assert", StepKeyword::Assert),
        ("print", StepKeyword::Print),
        ("callonce", StepKeyword::CallOnce),
        ("callSingle", StepKeyword::CallSingle),
        ("call", StepKeyword::Call),
        ("read", StepKeyword::Read),
        ("configure", StepKeyword::Configure),
        ("driver", StepKeyword::Driver),
        ("eval", StepKeyword::Eval),
        ("doc", StepKeyword::Doc),
    ];

    fn word(self) -> &'static str {
        Self::ALL.iter().find(|(_, k)| *k == self).unwrap().0
    }
}

/// The result of classifying a step's text.
#[derive(Clone, Debug)]
pub enum Dispatch {
    /// A recognised keyword handler, with the text remaining after the
    /// keyword (and, for assignment form, the assigned name).
    Keyword {
        keyword: StepKeyword,
        assign_to: Option<String>,
        rest: String,
    },
    /// A bare script expression, evaluated for side effects only.
    Expression(String),
}

/// Classifies a step's text into a keyword dispatch or a bare
/// expression.
///
/// Disambiguation rule (spec §3): `cookie foo = 'bar'` is a keyword
/// (the text after `cookie` starts with an identifier then `=`, not an
/// open-paren call); `cookie({...})` is a call expression because the
/// token immediately following the keyword word is `(`.
#[must_use]
pub fn classify(text: &str) -> Dispatch {
    let trimmed = text.trim_start();

    // Assignment form: `<ident> = <expr>` where ident is a known
    // assign-keyword, e.g. `url = 'http://...'` or a plain `def x = 1`.
    if let Some((head, rest)) = trimmed.split_once('=') {
        let head = head.trim();
        // `==`/`!=` inside an expression must not be mistaken for
        // assignment; only a single, unparenthesised `=` with a simple
        // left-hand identifier counts.
        if !head.is_empty()
            && !head.ends_with('!')
            && !rest.starts_with('=')
            && head.chars().all(|c| c.is_alphanumeric() || c == ' ' || c == '_')
        {
            if let Some((kw_word, assign_to)) = split_leading_keyword(head) {
                if let Some((_, keyword)) = StepKeyword::ALL.iter().find(|(w, _)| *w == kw_word) {
                    return Dispatch::Keyword {
                        keyword: *keyword,
                        assign_to: assign_to.map(str::to_string),
                        rest: rest.trim().to_string(),
                    };
                }
            }
            // `def x = call feature arg` — `def` always wins at the head.
            if head.starts_with("def ") || head == "def" {
                let name = head.strip_prefix("def").unwrap_or("").trim();
                return Dispatch::Keyword {
                    keyword: StepKeyword::Def,
                    assign_to: if name.is_empty() { None } else { Some(name.to_string()) },
                    rest: rest.trim().to_string(),
                };
            }
        }
    }

    // Bare keyword form: `match x == y`, `print 'hi'`, `call feature arg`,
    // but NOT `cookie({...})` — a call expression, left as-is.
    for (word, keyword) in StepKeyword::ALL {
        if let Some(rest) = trimmed.strip_prefix(word) {
            let next = rest.chars().next();
            let is_call_expr = next == Some('(');
            if !is_call_expr && (next.is_none() || next.unwrap().is_whitespace()) {
                return Dispatch::Keyword {
                    keyword: *keyword,
                    assign_to: None,
                    rest: rest.trim().to_string(),
                };
            }
        }
    }

    Dispatch::Expression(trimmed.to_string())
}

/// Splits `"cookie foo"` into `("cookie", Some("foo"))`, or `"url"` into
/// `("url", None)`, matching against the reserved-word table longest
/// match first (`"form field"` before a bare identifier split would).
fn split_leading_keyword(head: &str) -> Option<(&'static str, Option<&str>)> {
    let mut candidates: Vec<&'static str> = StepKeyword::ALL.iter().map(|(w, _)| *w).collect();
    candidates.sort_by_key(|w| std::cmp::Reverse(w.len()));
    for word in candidates {
        if head == word {
            return Some((word, None));
        }
        if let Some(rest) = head.strip_prefix(word) {
            if rest.starts_with(' ') {
                return Some((word, Some(rest.trim())));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_keyword_with_space_is_keyword() {
        match classify("cookie foo = 'bar'") {
            Dispatch::Keyword { keyword, assign_to, .. } => {
                assert_eq!(keyword, StepKeyword::Cookie);
                assert_eq!(assign_to.as_deref(), Some("foo"));
            }
            Dispatch::Expression(_) => panic!("expected keyword"),
        }
    }

    #[test]
    fn call_expression_with_paren_is_expression() {
        match classify("cookie({name: 'foo'})") {
            Dispatch::Expression(_) => {}
            Dispatch::Keyword { .. } => panic!("expected expression"),
        }
    }

    #[test]
    fn def_assignment_is_keyword() {
        match classify("def x = call read('helper.feature')") {
            Dispatch::Keyword { keyword, assign_to, rest } => {
                assert_eq!(keyword, StepKeyword::Def);
                assert_eq!(assign_to.as_deref(), Some("x"));
                assert!(rest.contains("call"));
            }
            Dispatch::Expression(_) => panic!("expected keyword"),
        }
    }

    #[test]
    fn plain_expression_passes_through() {
        match classify("1 + 1") {
            Dispatch::Expression(e) => assert_eq!(e, "1 + 1"),
            Dispatch::Keyword { .. } => panic!("expected expression"),
        }
    }
}
