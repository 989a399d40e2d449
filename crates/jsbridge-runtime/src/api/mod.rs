//! Public embedding API
//!
//! This module provides the host-facing objects of the bridge:
//! - [`Runtime`]: one engine instance with a fixed memory quota
//! - [`Context`]: execution environment with its own global object
//! - [`CompiledScript`]: compiled unit dispatchable to any context of its runtime
//! - [`NativeFunctionBuilder`] and [`JsFunction`]: functions crossing the boundary
//! - [`FromValue`]: typed conversion out of bridged values
//!
//! # Examples
//!
//! ```
//! use jsbridge_runtime::api::{FromValue, Runtime};
//!
//! let runtime = Runtime::new(4 * 1024 * 1024).unwrap();
//! let context = runtime.new_context().unwrap();
//!
//! context.execute("function add(x, y) { return x + y; }").unwrap();
//! let sum = context.call("add", &[1.into(), 2.into()]).unwrap();
//! assert_eq!(i64::from_value(&sum).unwrap(), 3);
//! ```

pub mod compiled;
pub mod context;
pub mod conversion;
pub mod function;
pub mod native;
pub(crate) mod request;
pub mod runtime;

// Re-export main types for convenience
pub use compiled::CompiledScript;
pub use context::{Context, ContextOptions, ErrorReporter};
pub use conversion::{ConversionError, FromValue};
pub use function::JsFunction;
pub use native::{BuildError, HostFunction, NativeFunctionBuilder};
pub use runtime::{MemoryStats, Runtime, RuntimeId};
