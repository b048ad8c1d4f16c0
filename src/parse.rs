//! Bridges the external [`gherkin`] parser's AST into this crate's
//! [`Step`] model and performs Scenario Outline expansion (spec §3
//! "ScenarioOutline", §6 "Feature file format").
//!
//! Parsing and lexing themselves are the `gherkin` crate's job (spec §1
//! "Out of scope: the Gherkin lexer/parser"); this module only adapts
//! its output.

use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};
use crate::feature::FeatureId;
use crate::step::{DocString, Step};
use crate::tag::Tag;

/// One runnable scenario: its display name, tags (including inherited
/// feature tags), and the Background+Scenario steps merged in source
/// order.
#[derive(Clone, Debug)]
pub struct RunnableScenario {
    pub name: String,
    pub tags: Vec<Tag>,
    pub steps: Vec<Step>,
    /// Number of leading entries of `steps` that came from Background,
    /// used by the mock dispatcher (spec §4.7) to isolate a scenario's
    /// own predicate+response steps from the Background it was merged
    /// with for ordinary scenario execution.
    pub background_len: usize,
}

impl RunnableScenario {
    /// The scenario's own steps, excluding any merged-in Background
    /// steps (spec §4.7 "Each scenario's first `Given` step is a
    /// predicate expression").
    #[must_use]
    pub fn own_steps(&self) -> &[Step] {
        &self.steps[self.background_len..]
    }
}

/// A parsed feature reduced to what the execution core needs: its
/// identity, its own tags, and every runnable scenario (outlines
/// already expanded to one [`RunnableScenario`] per Examples row).
#[derive(Clone, Debug)]
pub struct ParsedFeature {
    pub id: FeatureId,
    pub name: String,
    pub tags: Vec<Tag>,
    pub scenarios: Vec<RunnableScenario>,
    /// Background steps, kept separate for the mock dispatcher's "mock
    /// root" (spec §4.7 item 1), which evaluates them once and shares
    /// the result across every request instead of re-running them per
    /// scenario.
    pub background: Vec<Step>,
}

/// Parses a feature file from disk.
pub fn parse_path(path: impl AsRef<Path>) -> Result<ParsedFeature> {
    let path = path.as_ref();
    let feature = gherkin::Feature::parse_path(path, gherkin::GherkinEnv::default())
        .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
    Ok(convert(feature, FeatureId::from_path(path)))
}

/// Parses inline feature text (spec §6 "inline string (for tests)").
pub fn parse_inline(text: &str) -> Result<ParsedFeature> {
    let feature = gherkin::Feature::parse(text, gherkin::GherkinEnv::default())
        .map_err(|e| Error::Parse(e.to_string()))?;
    Ok(convert(feature, FeatureId::from_inline(text)))
}

fn convert(feature: gherkin::Feature, id: FeatureId) -> ParsedFeature {
    let feature_tags: Vec<Tag> = feature.tags.iter().map(|t| Tag::parse(t)).collect();
    let background_steps: Vec<Step> = feature
        .background
        .as_ref()
        .map(|bg| bg.steps.iter().map(convert_step).collect())
        .unwrap_or_default();

    let mut scenarios = Vec::new();
    for scenario in &feature.scenarios {
        scenarios.extend(expand_scenario(scenario, &background_steps, &feature_tags));
    }
    for rule in &feature.rules {
        let rule_bg: Vec<Step> = rule
            .background
            .as_ref()
            .map(|bg| bg.steps.iter().map(convert_step).collect())
            .unwrap_or_else(|| background_steps.clone());
        for scenario in &rule.scenarios {
            scenarios.extend(expand_scenario(scenario, &rule_bg, &feature_tags));
        }
    }

    ParsedFeature { id, name: feature.name.clone(), tags: feature_tags, scenarios, background: background_steps }
}

fn expand_scenario(
    scenario: &gherkin::Scenario,
    background_steps: &[Step],
    feature_tags: &[Tag],
) -> Vec<RunnableScenario> {
    let scenario_tags: Vec<Tag> = scenario.tags.iter().map(|t| Tag::parse(t)).collect();
    let mut all_tags = feature_tags.to_vec();
    all_tags.extend(scenario_tags);
    let background_len = background_steps.len();

    let Some(examples) = scenario.examples.as_ref() else {
        let mut steps = background_steps.to_vec();
        steps.extend(scenario.steps.iter().map(convert_step));
        return vec![RunnableScenario { name: scenario.name.clone(), tags: all_tags, steps, background_len }];
    };

    let Some((header, rows)) = examples.table.rows.split_first() else {
        let mut steps = background_steps.to_vec();
        steps.extend(scenario.steps.iter().map(convert_step));
        return vec![RunnableScenario { name: scenario.name.clone(), tags: all_tags, steps, background_len }];
    };

    // Header columns ending in `!` are typed: substituted verbatim so the
    // row value is evaluated as an expression (number, boolean, object
    // literal, ...). Plain columns substitute as quoted string literals
    // (spec §3 "plain columns substitute as strings").
    let columns: Vec<(String, bool)> =
        header.iter().map(|h| (h.trim_end_matches('!').to_string(), h.ends_with('!'))).collect();

    rows.iter()
        .map(|row| {
            // Raw values, used for the scenario's display name: a plain
            // column reads back as its literal text there, not as a
            // quoted expression fragment.
            let raw: Vec<(String, String)> =
                columns.iter().zip(row.iter()).map(|((name, _), value)| (name.clone(), value.clone())).collect();
            // Expression-context values, used inside step text/doc
            // strings/tables: typed columns substitute verbatim, plain
            // columns substitute as a quoted string literal.
            let evaluated: Vec<(String, String)> = columns
                .iter()
                .zip(row.iter())
                .map(|((name, typed), value)| {
                    let rendered = if *typed { value.clone() } else { quote_string_literal(value) };
                    (name.clone(), rendered)
                })
                .collect();

            let mut steps = background_steps.to_vec();
            steps.extend(scenario.steps.iter().map(|s| substitute_step(s, &evaluated)));
            RunnableScenario {
                name: substitute_text(&scenario.name, &raw),
                tags: all_tags.clone(),
                steps,
                background_len,
            }
        })
        .collect()
}

/// Renders `value` as a single-quoted JS string literal, escaping
/// backslashes, single quotes, and newlines so the substituted text
/// stays a valid expression fragment regardless of its content.
fn quote_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn substitute_text(text: &str, substitutions: &[(String, String)]) -> String {
    let placeholder = Regex::new(r"<([^<>]+)>").unwrap();
    placeholder
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            substitutions
                .iter()
                .find(|(col, _)| col == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn substitute_step(step: &gherkin::Step, substitutions: &[(String, String)]) -> Step {
    let mut converted = convert_step(step);
    converted.text = substitute_text(&converted.text, substitutions);
    if let Some(doc) = &mut converted.doc_string {
        doc.content = substitute_text(&doc.content, substitutions);
    }
    if let Some(table) = &mut converted.table {
        for row in table.iter_mut() {
            for cell in row.iter_mut() {
                *cell = substitute_text(cell, substitutions);
            }
        }
    }
    converted
}

fn convert_step(step: &gherkin::Step) -> Step {
    Step {
        prefix: format!("{:?}", step.ty),
        text: step.value.clone(),
        doc_string: step.docstring.as_ref().map(|content| DocString {
            content: content.clone(),
            line: step.position.line as u32,
        }),
        table: step.table.as_ref().map(|t| t.rows.clone()),
        line: step.position.line as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLINE: &str = r#"Feature: arithmetic
  Scenario Outline: add <a>+<b>=<sum>
    * def result = <a> + <b>
    * match result == <sum>

    Examples:
      | a! | b! | sum! |
      | 1  | 2  | 3    |
      | 5  | 5  | 10   |
      | 0  | 0  | 0    |
"#;

    #[test]
    fn outline_expands_to_one_scenario_per_row() {
        let parsed = parse_inline(OUTLINE).unwrap();
        assert_eq!(parsed.scenarios.len(), 3);
        assert!(parsed.scenarios[0].steps[0].text.contains("1 + 2"));
        assert!(parsed.scenarios[1].steps[1].text.contains("10"));
    }

    #[test]
    fn feature_tags_are_inherited_by_scenarios() {
        const SRC: &str = "@smoke\nFeature: f\n  Scenario: s\n    * print 'hi'\n";
        let parsed = parse_inline(SRC).unwrap();
        assert!(parsed.scenarios[0].tags.iter().any(|t| t.name == "smoke"));
    }

    const PLAIN_COLUMN_OUTLINE: &str = r#"Feature: greeting
  Scenario Outline: greet <name>
    * def greeting = 'hi ' + <name>
    * match greeting == <expected>

    Examples:
      | name  | expected!        |
      | Alice | 'hi Alice'       |
      | Bob   | 'hi Bob'         |
"#;

    #[test]
    fn plain_columns_substitute_as_quoted_string_literals() {
        let parsed = parse_inline(PLAIN_COLUMN_OUTLINE).unwrap();
        assert_eq!(parsed.scenarios.len(), 2);
        // Step text substitution quotes the plain `name` column...
        assert!(parsed.scenarios[0].steps[0].text.contains("'hi ' + 'Alice'"));
        // ...but the typed `expected!` column substitutes verbatim.
        assert!(parsed.scenarios[0].steps[1].text.contains("== 'hi Alice'"));
        // The scenario's display name uses the raw, unquoted value.
        assert_eq!(parsed.scenarios[0].name, "greet Alice");
    }
}
