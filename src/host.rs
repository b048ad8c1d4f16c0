//! Host/script bridging: the capability set exposed to the embedded
//! script engine for opaque Rust-side objects (HTTP request/response,
//! browser driver session, etc.) per the "Host/script bridging" design
//! note — explicit dispatch tables, no reflection.

use std::fmt;

#[cfg(feature = "macros")]
pub use inventory;
use serde_json::Value as Json;

use crate::error::Result;

/// Capability set a host object exposes to script code.
///
/// Implementors back property reads/writes and method calls coming from
/// the script engine without ever handing the engine a raw Rust
/// reference. Each variant (`HttpRequest`, `HttpResponse`, `Driver`, ...)
/// implements this trait explicitly; there is no reflection layer.
pub trait HostObject: fmt::Debug + Send + Sync {
    /// Short type tag used in diagnostics (`"HttpResponse"`, `"Driver"`, ...).
    fn type_name(&self) -> &'static str;

    /// Reads a named property, returning `Ok(None)` if the property does
    /// not exist on this object (as opposed to existing-but-null).
    fn get_property(&self, name: &str) -> Result<Option<Json>>;

    /// Writes a named property. Default: unsupported (most host objects,
    /// like an `HttpResponse` already returned to script, are read-only).
    fn set_property(&self, name: &str, _value: Json) -> Result<()> {
        let _ = name;
        Ok(())
    }

    /// Invokes a named method with positional JSON arguments.
    fn invoke(&self, name: &str, args: &[Json]) -> Result<Json> {
        let _ = args;
        Err(crate::error::Error::Step(crate::error::StepError::no_match(format!(
            "{}.{}(...)",
            self.type_name(),
            name
        ))))
    }
}

/// A native function registered via `#[host_fn]`, collected through
/// `inventory` and bound into every [`ScriptEngine`](crate::engine::ScriptEngine)
/// a [`ScenarioRuntime`](crate::runtime::ScenarioRuntime) constructs.
#[cfg(feature = "macros")]
pub struct NativeFnReg {
    /// The name the function is callable under from script.
    pub name: &'static str,
    /// The underlying function pointer.
    pub func: fn(&[Json]) -> Json,
}

#[cfg(feature = "macros")]
inventory::collect!(NativeFnReg);

/// Returns every native function registered anywhere in the program via
/// `#[host_fn]`.
#[cfg(feature = "macros")]
pub fn native_functions() -> impl Iterator<Item = &'static NativeFnReg> {
    inventory::iter::<NativeFnReg>.into_iter()
}
