//! Native function registration and builder
//!
//! This module provides infrastructure for exposing Rust closures to scripts
//! as callable functions. Native functions can be registered with fixed
//! arity (specific argument count) or variadic (any argument count).
//!
//! # Examples
//!
//! ```
//! use jsbridge_runtime::api::{NativeFunctionBuilder, Runtime};
//! use jsbridge_runtime::{BridgeError, Value};
//!
//! // Fixed arity function (2 arguments)
//! let add = NativeFunctionBuilder::new("add")
//!     .with_arity(2)
//!     .with_implementation(|_ctx, args| match (args[0].as_f64(), args[1].as_f64()) {
//!         (Some(a), Some(b)) => Ok(Value::Float(a + b)),
//!         _ => Err(BridgeError::InvalidArgument("Expected numbers".to_string())),
//!     })
//!     .build()
//!     .unwrap();
//!
//! // Variadic function (any number of arguments)
//! let count = NativeFunctionBuilder::new("count")
//!     .variadic()
//!     .with_implementation(|_ctx, args| Ok(Value::Int(args.len() as i64)))
//!     .build()
//!     .unwrap();
//!
//! let context = Runtime::new(4 * 1024 * 1024).unwrap().new_context().unwrap();
//! context.set_global("add", add).unwrap();
//! context.set_global("count", count).unwrap();
//! assert_eq!(context.execute("add(1, 2) + count(7, 8, 9)").unwrap(), Value::Int(6));
//! ```

use crate::api::context::{Context, ContextInner};
use crate::bridge::ValueBridge;
use crate::error::{BridgeError, Result};
use crate::value::{Callable, Value};
use log::warn;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Value as JsValue};
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;

/// Type alias for native function implementation
type NativeFnImpl = Rc<dyn Fn(&Context, &[Value]) -> Result<Value>>;

/// Builder for constructing native functions with arity validation
///
/// Supports both fixed-arity functions (must be called with exact argument
/// count) and variadic functions (can be called with any number of arguments).
pub struct NativeFunctionBuilder {
    name: String,
    arity: Option<usize>,
    implementation: Option<NativeFnImpl>,
}

impl NativeFunctionBuilder {
    /// Create a new native function builder with the given name
    ///
    /// The name is reported by the engine as the function's `name` property
    /// and used in error messages.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: None,
            implementation: None,
        }
    }

    /// Set the function's arity (required argument count)
    ///
    /// Calls with too few or too many arguments raise a `TypeError` in the
    /// script before the implementation runs. Overrides `variadic()`.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Mark this function as variadic (accepts any number of arguments)
    ///
    /// Variadic functions validate argument count and types themselves.
    pub fn variadic(mut self) -> Self {
        self.arity = None;
        self
    }

    /// Set the function implementation
    ///
    /// The closure receives the context the call was made from and the
    /// converted arguments. For fixed-arity functions, the argument count has
    /// already been validated when this closure is called.
    pub fn with_implementation<F>(mut self, implementation: F) -> Self
    where
        F: Fn(&Context, &[Value]) -> Result<Value> + 'static,
    {
        self.implementation = Some(Rc::new(implementation));
        self
    }

    /// Build the function handle
    pub fn build_function(self) -> std::result::Result<HostFunction, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        let implementation = self
            .implementation
            .ok_or_else(|| BuildError::MissingImplementation(self.name.clone()))?;

        Ok(HostFunction {
            name: Rc::from(self.name),
            arity: self.arity,
            implementation,
        })
    }

    /// Build the function as a bridged value ready to be set as a global
    pub fn build(self) -> std::result::Result<Value, BuildError> {
        self.build_function()
            .map(|f| Value::Function(Callable::Host(f)))
    }
}

/// Errors that can occur when building a native function
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// No implementation was provided
    #[error("Native function '{0}' has no implementation")]
    MissingImplementation(String),
    /// The function name is empty
    #[error("Native function name must not be empty")]
    EmptyName,
}

/// Rust closure callable from scripts
///
/// Cloning shares the closure; equality is closure identity.
#[derive(Clone)]
pub struct HostFunction {
    name: Rc<str>,
    arity: Option<usize>,
    implementation: NativeFnImpl,
}

impl HostFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Required argument count, `None` when variadic
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Invoke the closure directly from the host
    pub fn call(&self, context: &Context, args: &[Value]) -> Result<Value> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(BridgeError::InvalidArgument(format!(
                    "Function '{}' expects {} argument{}, got {}",
                    self.name,
                    expected,
                    if expected == 1 { "" } else { "s" },
                    args.len()
                )));
            }
        }
        (self.implementation)(context, args)
    }

    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.implementation, &other.implementation)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Wrap `function` in an engine function object owned by `ctx`
///
/// The wrapper holds only a weak reference to its context so the engine heap
/// never keeps the context alive.
pub(crate) fn to_engine_function<'js>(
    ctx: &Ctx<'js>,
    function: &HostFunction,
    context: Weak<ContextInner>,
) -> rquickjs::Result<Function<'js>> {
    let host = function.clone();
    let wrapper = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            dispatch(&ctx, &host, &context, args.0)
        },
    )?;
    wrapper.with_name(function.name())
}

fn dispatch<'js>(
    ctx: &Ctx<'js>,
    host: &HostFunction,
    context: &Weak<ContextInner>,
    args: Vec<JsValue<'js>>,
) -> rquickjs::Result<JsValue<'js>> {
    let Some(inner) = context.upgrade() else {
        return Err(Exception::throw_internal(
            ctx,
            &format!("context of '{}' has been destroyed", host.name()),
        ));
    };

    let result = (|| -> Result<JsValue<'js>> {
        let bridge = ValueBridge::new(&inner);
        let args = args
            .into_iter()
            .map(|arg| bridge.to_host(ctx, arg))
            .collect::<Result<Vec<_>>>()?;
        let handle = Context {
            inner: inner.clone(),
        };
        let value = host.call(&handle, &args)?;
        bridge.to_engine(ctx, &value)
    })();

    result.map_err(|err| rethrow(ctx, host.name(), err))
}

/// Raise `err` as a script exception on `ctx`
fn rethrow(ctx: &Ctx<'_>, name: &str, err: BridgeError) -> rquickjs::Error {
    warn!("host function '{}' failed: {}", name, err);
    match err {
        BridgeError::InvalidArgument(message) => Exception::throw_type(ctx, &message),
        BridgeError::Conversion(conversion) => Exception::throw_type(ctx, &conversion.to_string()),
        BridgeError::ResourceExhausted(_) => Exception::throw_internal(ctx, "out of memory"),
        BridgeError::Script(script) => match Exception::from_message(ctx.clone(), &script.message)
        {
            Ok(exception) => {
                if !script.name.is_empty() {
                    // Best effort; the message survives either way.
                    let _ = exception.as_object().set("name", script.name.as_str());
                }
                ctx.throw(exception.into_value())
            }
            Err(e) => e,
        },
        other => Exception::throw_message(ctx, &other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Runtime;
    use pretty_assertions::assert_eq;

    fn context() -> Context {
        Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap()
    }

    #[test]
    fn test_builder_missing_implementation() {
        let result = NativeFunctionBuilder::new("nothing").with_arity(1).build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::MissingImplementation("nothing".to_string())
        );
    }

    #[test]
    fn test_builder_empty_name() {
        let result = NativeFunctionBuilder::new("")
            .with_implementation(|_, _| Ok(Value::Null))
            .build();
        assert_eq!(result.unwrap_err(), BuildError::EmptyName);
    }

    #[test]
    fn test_arity_enforced_on_host_call() {
        let ctx = context();
        let add = NativeFunctionBuilder::new("add")
            .with_arity(2)
            .with_implementation(|_, _| Ok(Value::Null))
            .build_function()
            .unwrap();

        let err = add.call(&ctx, &[Value::Int(1)]).unwrap_err();
        assert_eq!(
            err,
            BridgeError::InvalidArgument("Function 'add' expects 2 arguments, got 1".to_string())
        );
    }

    #[test]
    fn test_singular_argument_message() {
        let ctx = context();
        let neg = NativeFunctionBuilder::new("neg")
            .with_arity(1)
            .with_implementation(|_, _| Ok(Value::Null))
            .build_function()
            .unwrap();
        let err = neg.call(&ctx, &[]).unwrap_err();
        assert!(err.to_string().contains("expects 1 argument, got 0"));
    }

    #[test]
    fn test_variadic_accepts_any_count() {
        let ctx = context();
        ctx.register_variadic("count", |_, args| Ok(Value::Int(args.len() as i64)))
            .unwrap();
        assert_eq!(ctx.execute("count()").unwrap(), Value::Int(0));
        assert_eq!(ctx.execute("count(1, 'a', null)").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_arity_error_is_type_error_in_script() {
        let ctx = context();
        ctx.register_function("pair", 2, |_, _| Ok(Value::Null))
            .unwrap();
        let caught = ctx
            .execute("try { pair(1); 'no' } catch (e) { e instanceof TypeError ? e.message : 'other' }")
            .unwrap();
        assert_eq!(
            caught,
            Value::string("Function 'pair' expects 2 arguments, got 1")
        );
    }

    #[test]
    fn test_engine_sees_function_name() {
        let ctx = context();
        ctx.register_function("named", 0, |_, _| Ok(Value::Null))
            .unwrap();
        assert_eq!(ctx.execute("named.name").unwrap(), Value::string("named"));
        assert_eq!(ctx.execute("typeof named").unwrap(), Value::string("function"));
    }

    #[test]
    fn test_clones_are_identical() {
        let f = NativeFunctionBuilder::new("f")
            .with_implementation(|_, _| Ok(Value::Null))
            .build_function()
            .unwrap();
        let g = NativeFunctionBuilder::new("f")
            .with_implementation(|_, _| Ok(Value::Null))
            .build_function()
            .unwrap();
        assert!(f.ptr_eq(&f.clone()));
        assert!(!f.ptr_eq(&g));
    }

    #[test]
    fn test_script_error_keeps_name_when_rethrown() {
        let ctx = context();
        ctx.register_function("failing", 0, |ctx, _| {
            ctx.execute("throw new RangeError('too far')")
        })
        .unwrap();

        let err = ctx.execute("failing()").unwrap_err();
        let script = err.as_script().unwrap();
        assert_eq!(script.name, "RangeError");
        assert_eq!(script.message, "too far");
    }
}
