//! Consolidated error handling for the execution core.
//!
//! Errors are organized by the domain that raises them. Each submodule
//! owns one error enum; [`core::Error`] consolidates them into the
//! single type threaded through the public API.
//!
//! # Modules
//!
//! - [`core`] — top-level [`Error`](core::Error) and [`Result`](core::Result)
//! - [`step`] — step dispatch/evaluation errors
//! - [`call`] — feature-call (`call`/`callonce`/`callSingle`) errors
//! - [`lock`] — named/wildcard lock errors
//! - [`mock`] — mock dispatcher errors
//! - [`config`] — suite/feature configuration errors

pub mod call;
pub mod config;
pub mod core;
pub mod lock;
pub mod mock;
pub mod step;

pub use call::CallError;
pub use config::ConfigError;
pub use core::{Error, Result};
pub use lock::LockError;
pub use mock::MockError;
pub use step::StepError;
