//! Execution core for a behaviour-driven API/UI test runner.
//!
//! This crate implements the suite/feature/scenario scheduler, the
//! feature-call graph (isolated/shared/once/single semantics), the
//! scenario runtime that evaluates steps against an embedded script
//! engine, and the mock-server dispatcher that reuses that same
//! runtime to serve HTTP requests from scenario definitions.
//!
//! Out of scope (external collaborators, consumed only): the Gherkin
//! lexer/parser (the [`gherkin`] crate), the embedded script engine's
//! language semantics (a thin [`engine::ScriptEngine`] adapter over
//! `boa_engine`), the real HTTP client and browser-automation
//! subsystems, report writers beyond JUnit XML and JSONL, and legacy
//! compatibility shims. The [`cli`] module is deliberately thin: flags
//! that populate [`Config`](config::Config) and
//! [`SuiteConfig`](suite::SuiteConfig), not a full command surface
//! (no `init`/`mock` sub-commands).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod call_registry;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod feature;
pub mod host;
pub mod http;
pub mod listener;
pub mod lock_manager;
pub mod mock;
pub mod parse;
pub mod perf;
pub mod result;
pub mod runtime;
pub mod scope;
pub mod step;
pub mod suite;
pub mod tag;
#[cfg(feature = "tracing")]
pub mod tracing_support;
pub mod value;
pub mod writer;

#[cfg(feature = "macros")]
pub use bddcore_codegen::host_fn;

pub use error::{Error, Result};
pub use result::{FeatureResult, ScenarioResult, SuiteResult};
pub use suite::{SuiteConfig, SuiteRunner};
