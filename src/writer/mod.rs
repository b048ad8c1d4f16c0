//! Report writers: a [`ResultListener`](crate::listener::ResultListener)
//! that streams JSONL events live, and a one-shot JUnit XML pass over a
//! finished [`SuiteResult`](crate::result::SuiteResult) (spec §9
//! "Supplemented Features" — both gated behind their own Cargo feature,
//! matching the teacher's own writer family being opt-in per format).

#[cfg(feature = "output-jsonl")]
pub mod jsonl;
#[cfg(feature = "output-junit")]
pub mod junit;

#[cfg(feature = "output-jsonl")]
pub use jsonl::JsonlWriter;
