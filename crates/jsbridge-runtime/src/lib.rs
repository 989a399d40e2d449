//! jsbridge runtime - QuickJS embedding bridge
//!
//! This library embeds the QuickJS engine and exposes it through a small set
//! of host objects:
//! - Memory-bounded engine instances and execution contexts
//! - Compiled scripts reusable across contexts of one engine instance
//! - Value conversion between host data and engine values
//! - Translation of script exceptions and engine failures into host errors

/// jsbridge runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
mod bridge;
pub mod error;
mod ffi;
pub mod value;

// Re-export commonly used types
pub use api::{CompiledScript, Context, ContextOptions, Runtime};
pub use error::{catch_script_error, parse_stack, BridgeError, ErrorKind, Result, ScriptError, StackFrame};
pub use value::{Callable, Value, ValueMap};
