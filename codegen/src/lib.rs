// Code generation for the `bddcore` crate.
//
// Provides a single attribute, `#[host_fn]`, used to register a native
// Rust function as a callable host function inside feature-file script
// expressions. A function decorated this way is collected via
// `inventory` and bound into every `ScriptEngine` a `ScenarioRuntime`
// constructs, the same way the teacher crate auto-wires `#[given]`/
// `#[when]`/`#[then]` functions into a `World`'s step `Collection`.

#![forbid(unsafe_code)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemFn, parse_macro_input};

/// Registers a function as a host-callable native function.
///
/// ```ignore
/// #[host_fn]
/// fn sha256_hex(input: String) -> String {
///     // ...
/// }
/// ```
///
/// The function is collected at program start via `inventory` and made
/// available to scenario scripts under its own name.
#[proc_macro_attribute]
pub fn host_fn(_args: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemFn);
    let ident = &item.sig.ident;
    let name = ident.to_string();

    let expanded = quote! {
        #item

        ::bddcore::host::inventory::submit! {
            ::bddcore::host::NativeFnReg {
                name: #name,
                func: #ident,
            }
        }
    };

    expanded.into()
}
