//! Thin command-line surface (spec §1 Non-goals: "the CLI command
//! surface" is explicitly out of scope for behavior — but the ambient
//! rule still asks for flags that populate [`Config`] and
//! [`SuiteConfig`], wired the way the teacher's `cli::Opts` wires its
//! own [`clap::Parser`] struct). Unlike the teacher's generic
//! `Opts<Parser, Runner, Writer, Custom>` composition, this crate has a
//! single fixed runner rather than a pluggable parser/runner/writer
//! stack, so `Cli` is a flat, non-generic struct.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::config::Config;
use crate::suite::SuiteConfig;
use crate::tag::TagExpr;

/// Command-line options for running a suite of feature files.
#[derive(Clone, Debug, Parser)]
#[command(name = "bddcore", about = "Run behaviour-driven API/UI test suites")]
pub struct Cli {
    /// Feature files or directories to run.
    #[arg(required = true, value_name = "path")]
    pub paths: Vec<PathBuf>,

    /// Tag expression to filter scenarios by, e.g. `@smoke && ~@slow`.
    #[arg(long, short = 't', value_name = "tagexpr")]
    pub tags: Option<String>,

    /// Worker pool size; defaults to the number of available CPUs.
    #[arg(long, value_name = "n")]
    pub threads: Option<usize>,

    /// Directory reports are written to.
    #[arg(long, value_name = "dir", default_value = "target/bddcore-reports")]
    pub output_dir: PathBuf,

    /// Write a JUnit XML report per feature (requires the `output-junit` feature).
    #[arg(long)]
    pub junit: bool,

    /// Write a line-delimited JSON event stream (requires the `output-jsonl` feature).
    #[arg(long)]
    pub jsonl: bool,

    /// Move aside any existing output directory before writing new reports.
    #[arg(long)]
    pub backup_output: bool,

    /// Call-stack depth limit for `call`/`callonce`/`callSingle`.
    #[arg(long, value_name = "n")]
    pub max_call_depth: Option<usize>,
}

impl Cli {
    /// Shortcut for [`clap::Parser::parse()`], which doesn't require the
    /// trait being imported.
    #[must_use]
    pub fn parsed() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Builds the process-wide [`Config`] this invocation asked for,
    /// layering flags over [`Config::default()`].
    #[must_use]
    pub fn to_config(&self) -> Config {
        let defaults = Config::default();
        Config {
            threads: self.threads.unwrap_or(defaults.threads),
            output_dir: self.output_dir.clone(),
            tag_filter: self.tags.clone().unwrap_or_default(),
            max_call_depth: self.max_call_depth.unwrap_or(defaults.max_call_depth),
            backup_output: self.backup_output,
            ..defaults
        }
    }

    /// Builds a [`SuiteConfig`] ready for [`crate::suite::SuiteRunner::new`],
    /// with `listeners` and `perf_hook` left for the caller to attach
    /// (spec §9: report writers are opt-in per Cargo feature, so this
    /// module can't unconditionally wire them in without pulling every
    /// writer feature into the `default` set).
    #[must_use]
    pub fn to_suite_config(&self) -> SuiteConfig {
        let config = self.to_config();
        let tag_filter = TagExpr::parse(&config.tag_filter);
        SuiteConfig {
            paths: self.paths.clone(),
            tag_filter,
            listeners: Vec::new(),
            perf_hook: None,
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_and_tags() {
        let cli = Cli::try_parse_from(["bddcore", "features/", "--tags", "@smoke"]).unwrap();
        assert_eq!(cli.paths, vec![PathBuf::from("features/")]);
        assert_eq!(cli.tags.as_deref(), Some("@smoke"));
    }

    #[test]
    fn requires_at_least_one_path() {
        assert!(Cli::try_parse_from(["bddcore"]).is_err());
    }

    #[test]
    fn to_config_overrides_defaults_from_flags() {
        let cli = Cli::try_parse_from(["bddcore", "f.feature", "--threads", "2", "--backup-output"]).unwrap();
        let config = cli.to_config();
        assert_eq!(config.threads, 2);
        assert!(config.backup_output);
    }

    #[test]
    fn to_config_falls_back_to_defaults_when_unset() {
        let cli = Cli::try_parse_from(["bddcore", "f.feature"]).unwrap();
        let config = cli.to_config();
        assert_eq!(config.max_call_depth, Config::default().max_call_depth);
        assert!(!config.backup_output);
    }

    #[test]
    fn to_suite_config_parses_tag_expression() {
        let cli = Cli::try_parse_from(["bddcore", "f.feature", "--tags", "@a && @b"]).unwrap();
        let suite_config = cli.to_suite_config();
        assert!(suite_config.tag_filter.matches(&["a", "b"]));
        assert!(!suite_config.tag_filter.matches(&["a"]));
    }
}
