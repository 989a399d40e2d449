//! Script execution contexts
//!
//! A [`Context`] is an execution environment created from a [`Runtime`]. It
//! owns a global object, tracks its request depth and translates values and
//! errors crossing into and out of the engine.
//!
//! # Examples
//!
//! ```
//! use jsbridge_runtime::api::{ContextOptions, Runtime};
//! use jsbridge_runtime::Value;
//!
//! let runtime = Runtime::new(4 * 1024 * 1024).unwrap();
//! let context = runtime
//!     .new_context_with(ContextOptions::new().global("a", 111))
//!     .unwrap();
//!
//! assert_eq!(context.execute("a * 3").unwrap(), Value::Int(333));
//! ```
//!
//! A context cannot exist without a runtime:
//!
//! ```compile_fail
//! let context = jsbridge_runtime::api::Context::new();
//! ```

use crate::api::compiled::CompiledScript;
use crate::api::function::invoke;
use crate::api::native::NativeFunctionBuilder;
use crate::api::request::with_request;
use crate::api::runtime::{Runtime, RuntimeId, RuntimeInner};
use crate::bridge::ValueBridge;
use crate::error::{self, BridgeError, Result, ScriptError};
use crate::ffi::{self, ScriptSource};
use crate::value::{Value, ValueMap};
use jsbridge_config::{ContextConfig, DEFAULT_MAX_ARRAY_LENGTH, DEFAULT_MAX_CONVERSION_DEPTH};
use log::debug;
use rquickjs::{qjs, Ctx, Persistent, Value as JsValue};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

/// Filename reported for scripts passed to [`Context::execute`]
pub const DEFAULT_EXECUTE_FILENAME: &str = "<anonymous JavaScript>";

/// Filename reported for scripts passed to [`Context::compile`]
pub const DEFAULT_COMPILE_FILENAME: &str = "<anonymous compiled JavaScript>";

/// Smallest heap headroom in which a new context is attempted
const MIN_CONTEXT_HEADROOM: usize = 32 * 1024;

/// Callback receiving every script error translated on a context
pub type ErrorReporter = Rc<dyn Fn(&ScriptError)>;

/// Options for a new context
#[derive(Debug, Clone)]
pub struct ContextOptions {
    globals: ValueMap,
    strict: bool,
    max_conversion_depth: usize,
    max_array_length: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            globals: ValueMap::new(),
            strict: false,
            max_conversion_depth: DEFAULT_MAX_CONVERSION_DEPTH,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options taken from the `[context]` configuration table
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            strict: config.strict(),
            max_conversion_depth: config.max_conversion_depth(),
            max_array_length: config.max_array_length(),
            ..Self::default()
        }
    }

    /// Seed a global variable
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    /// Seed several global variables
    pub fn globals<K, V, I>(mut self, entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.globals
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Compile every script in strict mode
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Limit nesting of arrays and objects converted across the bridge
    pub fn max_conversion_depth(mut self, depth: usize) -> Self {
        self.max_conversion_depth = depth;
        self
    }

    /// Limit the length of engine arrays converted to host values
    pub fn max_array_length(mut self, length: usize) -> Self {
        self.max_array_length = length;
        self
    }
}

pub(crate) struct ContextInner {
    pub(crate) engine: rquickjs::Context,
    pub(crate) raw: NonNull<qjs::JSContext>,
    pub(crate) runtime: Rc<RuntimeInner>,
    pub(crate) depth: Cell<usize>,
    pub(crate) strict: bool,
    pub(crate) max_conversion_depth: usize,
    pub(crate) max_array_length: usize,
    reporter: RefCell<Option<ErrorReporter>>,
}

impl ContextInner {
    /// Translate an engine failure raised on this context
    pub(crate) fn translate(&self, ctx: &Ctx<'_>, err: rquickjs::Error) -> BridgeError {
        error::translate(
            ctx,
            err,
            || self.runtime.memory_usage().headroom() < MIN_CONTEXT_HEADROOM,
            |script| self.report(script),
        )
    }

    fn report(&self, script: &ScriptError) {
        let reporter = self.reporter.borrow().clone();
        if let Some(reporter) = reporter {
            reporter(script);
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let live = self.runtime.live_contexts.get().saturating_sub(1);
        self.runtime.live_contexts.set(live);
        debug!("destroyed context on {} ({} left)", self.runtime.id, live);
    }
}

/// Script execution environment bound to a [`Runtime`]
///
/// Cloning the handle is cheap and refers to the same environment.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Rc<ContextInner>,
}

impl Context {
    /// Create a context on `runtime`
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - a zero conversion limit, or the runtime is inside a request
    /// * `ResourceExhausted` - the engine cannot allocate the environment
    pub fn new(runtime: &Runtime, options: ContextOptions) -> Result<Self> {
        if options.max_conversion_depth == 0 {
            return Err(BridgeError::InvalidArgument(
                "max conversion depth must be at least 1".to_string(),
            ));
        }
        if options.max_array_length == 0 {
            return Err(BridgeError::InvalidArgument(
                "max array length must be at least 1".to_string(),
            ));
        }
        let rt = &runtime.inner;
        if rt.depth.get() > 0 {
            return Err(BridgeError::InvalidArgument(
                "cannot create a context while the runtime is executing".to_string(),
            ));
        }
        let usage = rt.memory_usage();
        if usage.headroom() < MIN_CONTEXT_HEADROOM {
            return Err(BridgeError::ResourceExhausted(format!(
                "{} bytes left under the quota of {} bytes",
                usage.headroom(),
                usage.quota
            )));
        }

        let engine = rquickjs::Context::full(&rt.engine).map_err(|e| match e {
            rquickjs::Error::Allocation => {
                BridgeError::ResourceExhausted("cannot allocate context".to_string())
            }
            other => BridgeError::Engine(other.to_string()),
        })?;
        let raw = engine.with(|ctx| ctx.as_raw());
        if rt.raw.get().is_none() {
            // SAFETY: `raw` is a live context of this runtime.
            rt.raw
                .set(NonNull::new(unsafe { qjs::JS_GetRuntime(raw.as_ptr()) }));
        }

        rt.live_contexts.set(rt.live_contexts.get() + 1);
        let context = Context {
            inner: Rc::new(ContextInner {
                engine,
                raw,
                runtime: rt.clone(),
                depth: Cell::new(0),
                strict: options.strict,
                max_conversion_depth: options.max_conversion_depth,
                max_array_length: options.max_array_length,
                reporter: RefCell::new(None),
            }),
        };

        for (name, value) in options.globals {
            context.set_global(&name, value)?;
        }
        debug!(
            "created context on {} ({} live)",
            rt.id,
            rt.live_contexts.get()
        );
        Ok(context)
    }

    fn bridge(&self) -> ValueBridge<'_> {
        ValueBridge::new(&self.inner)
    }

    fn with_request<R, F>(&self, f: F) -> Result<R>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> Result<R>,
    {
        with_request(&self.inner, f)
    }

    /// Compile `source` for repeated execution
    pub fn compile(&self, source: &str) -> Result<CompiledScript> {
        self.compile_with(source, DEFAULT_COMPILE_FILENAME, 1)
    }

    /// Compile `source`, reporting locations relative to `filename` starting at `line`
    ///
    /// A syntax error surfaces as `BridgeError::Script` carrying the location.
    /// `line` may be at most 2^20; larger values fail with `InvalidArgument`.
    pub fn compile_with(&self, source: &str, filename: &str, line: u32) -> Result<CompiledScript> {
        let prepared =
            ScriptSource::new(source, filename, line).map_err(BridgeError::InvalidArgument)?;
        let inner = &self.inner;
        let (root, bytecode) = self.with_request(|ctx| {
            let compiled =
                ffi::compile(&ctx, &prepared, inner.strict).map_err(|e| inner.translate(&ctx, e))?;
            let bytecode =
                ffi::write_bytecode(&ctx, &compiled).map_err(|e| inner.translate(&ctx, e))?;
            Ok((Persistent::save(&ctx, compiled), bytecode))
        })?;
        debug!(
            "compiled {} ({} bytes of bytecode) on {}",
            filename,
            bytecode.len(),
            inner.runtime.id
        );
        Ok(CompiledScript::new(
            root,
            bytecode,
            self.inner.clone(),
            source,
            filename,
            line,
        ))
    }

    /// Compile and run `source` in one step
    pub fn execute(&self, source: &str) -> Result<Value> {
        self.execute_with(source, DEFAULT_EXECUTE_FILENAME, 1)
    }

    /// Compile and run `source`, reporting locations relative to `filename` starting at `line`
    pub fn execute_with(&self, source: &str, filename: &str, line: u32) -> Result<Value> {
        let prepared =
            ScriptSource::new(source, filename, line).map_err(BridgeError::InvalidArgument)?;
        let inner = &self.inner;
        let bridge = self.bridge();
        self.with_request(|ctx| {
            let value =
                ffi::eval(&ctx, &prepared, inner.strict).map_err(|e| inner.translate(&ctx, e))?;
            bridge.to_host(&ctx, value)
        })
    }

    /// Set a property of the global object
    pub fn set_global(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let inner = &self.inner;
        let bridge = self.bridge();
        self.with_request(|ctx| {
            let js = bridge.to_engine(&ctx, &value)?;
            ctx.globals()
                .set(name, js)
                .map_err(|e| inner.translate(&ctx, e))
        })
    }

    /// Read a property of the global object; `None` when it does not exist
    pub fn get_global(&self, name: &str) -> Result<Option<Value>> {
        let inner = &self.inner;
        let bridge = self.bridge();
        self.with_request(|ctx| {
            let globals = ctx.globals();
            if !globals
                .contains_key(name)
                .map_err(|e| inner.translate(&ctx, e))?
            {
                return Ok(None);
            }
            let value: JsValue = globals.get(name).map_err(|e| inner.translate(&ctx, e))?;
            bridge.to_host(&ctx, value).map(Some)
        })
    }

    /// Delete a property of the global object, returning its last value
    pub fn remove_global(&self, name: &str) -> Result<Option<Value>> {
        let previous = self.get_global(name)?;
        if previous.is_some() {
            let inner = &self.inner;
            self.with_request(|ctx| {
                ctx.globals()
                    .remove(name)
                    .map_err(|e| inner.translate(&ctx, e))
            })?;
        }
        Ok(previous)
    }

    /// Whether the global object has a property `name`
    pub fn has_global(&self, name: &str) -> Result<bool> {
        let inner = &self.inner;
        self.with_request(|ctx| {
            ctx.globals()
                .contains_key(name)
                .map_err(|e| inner.translate(&ctx, e))
        })
    }

    /// Call the global function `name` with `args`
    ///
    /// # Examples
    ///
    /// ```
    /// use jsbridge_runtime::api::Runtime;
    /// use jsbridge_runtime::Value;
    ///
    /// let context = Runtime::new(4 * 1024 * 1024).unwrap().new_context().unwrap();
    /// context.execute("function add(x, y) { return x + y; }").unwrap();
    ///
    /// let sum = context.call("add", &[1.into(), 2.into()]).unwrap();
    /// assert_eq!(sum, Value::Int(3));
    /// ```
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let inner = &self.inner;
        self.with_request(|ctx| {
            let target: JsValue = ctx
                .globals()
                .get(name)
                .map_err(|e| inner.translate(&ctx, e))?;
            let Some(func) = target.as_function() else {
                return Err(BridgeError::InvalidArgument(format!(
                    "global '{}' is not a function (found {})",
                    name,
                    target.type_of().as_str()
                )));
            };
            invoke(inner, &ctx, func, args)
        })
    }

    /// Register a native function with fixed arity
    ///
    /// Calls with the wrong number of arguments raise a `TypeError` in the script.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsbridge_runtime::api::Runtime;
    /// use jsbridge_runtime::Value;
    ///
    /// let context = Runtime::new(4 * 1024 * 1024).unwrap().new_context().unwrap();
    /// context
    ///     .register_function("twice", 1, |_ctx, args| {
    ///         let n = args[0].as_f64().unwrap_or_default();
    ///         Ok(Value::Float(n * 2.0))
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(context.execute("twice(21)").unwrap(), Value::Int(42));
    /// ```
    pub fn register_function<F>(&self, name: &str, arity: usize, implementation: F) -> Result<()>
    where
        F: Fn(&Context, &[Value]) -> Result<Value> + 'static,
    {
        let function = NativeFunctionBuilder::new(name)
            .with_arity(arity)
            .with_implementation(implementation)
            .build()
            .map_err(|e| BridgeError::InvalidArgument(e.to_string()))?;
        self.set_global(name, function)
    }

    /// Register a native function accepting any number of arguments
    pub fn register_variadic<F>(&self, name: &str, implementation: F) -> Result<()>
    where
        F: Fn(&Context, &[Value]) -> Result<Value> + 'static,
    {
        let function = NativeFunctionBuilder::new(name)
            .variadic()
            .with_implementation(implementation)
            .build()
            .map_err(|e| BridgeError::InvalidArgument(e.to_string()))?;
        self.set_global(name, function)
    }

    /// Install a callback invoked with every script error raised on this context
    pub fn set_error_reporter<F>(&self, reporter: F)
    where
        F: Fn(&ScriptError) + 'static,
    {
        *self.inner.reporter.borrow_mut() = Some(Rc::new(reporter));
    }

    pub fn clear_error_reporter(&self) {
        *self.inner.reporter.borrow_mut() = None;
    }

    /// Current request depth of this context (0 when idle)
    pub fn request_depth(&self) -> usize {
        self.inner.depth.get()
    }

    pub fn is_idle(&self) -> bool {
        self.request_depth() == 0
    }

    /// Handle to the owning runtime
    pub fn runtime(&self) -> Runtime {
        Runtime {
            inner: self.inner.runtime.clone(),
        }
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.inner.runtime.id
    }

    /// Whether scripts are compiled in strict mode
    pub fn is_strict(&self) -> bool {
        self.inner.strict
    }

    /// Run a garbage collection on the owning runtime
    pub fn gc(&self) {
        self.inner.runtime.run_gc();
    }

    /// Whether both handles refer to the same environment
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("runtime", &self.inner.runtime.id)
            .field("depth", &self.inner.depth.get())
            .field("strict", &self.inner.strict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn runtime() -> Runtime {
        Runtime::new(8 * 1024 * 1024).unwrap()
    }

    #[test]
    fn test_execute_expression() {
        let ctx = runtime().new_context().unwrap();
        assert_eq!(ctx.execute("1 + 2").unwrap(), Value::Int(3));
        assert_eq!(ctx.execute("'a' + 'b'").unwrap(), Value::string("ab"));
        assert_eq!(ctx.execute("var x = 1;").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_state_persists_between_executions() {
        let ctx = runtime().new_context().unwrap();
        ctx.execute("var counter = 10;").unwrap();
        ctx.execute("counter += 5;").unwrap();
        assert_eq!(ctx.get_global("counter").unwrap(), Some(Value::Int(15)));
    }

    #[test]
    fn test_globals_round_trip() {
        let ctx = runtime().new_context().unwrap();
        ctx.set_global("x", 42).unwrap();
        assert!(ctx.has_global("x").unwrap());
        assert_eq!(ctx.get_global("x").unwrap(), Some(Value::Int(42)));
        assert_eq!(ctx.get_global("missing").unwrap(), None);
    }

    #[test]
    fn test_global_set_to_undefined_is_present() {
        let ctx = runtime().new_context().unwrap();
        ctx.set_global("u", Value::Undefined).unwrap();
        assert_eq!(ctx.get_global("u").unwrap(), Some(Value::Undefined));
    }

    #[test]
    fn test_remove_global() {
        let ctx = runtime().new_context().unwrap();
        ctx.set_global("gone", "bye").unwrap();
        assert_eq!(
            ctx.remove_global("gone").unwrap(),
            Some(Value::string("bye"))
        );
        assert!(!ctx.has_global("gone").unwrap());
        assert_eq!(ctx.remove_global("gone").unwrap(), None);
    }

    #[test]
    fn test_seeded_globals() {
        let ctx = runtime()
            .new_context_with(ContextOptions::new().globals([("a", 1), ("b", 2)]))
            .unwrap();
        assert_eq!(ctx.execute("a + b").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_strict_mode_rejects_undeclared_assignment() {
        let ctx = runtime()
            .new_context_with(ContextOptions::new().strict(true))
            .unwrap();
        let err = ctx.execute("undeclared = 1;").unwrap_err();
        assert_eq!(err.as_script().map(|s| s.name.as_str()), Some("ReferenceError"));

        let sloppy = runtime().new_context().unwrap();
        assert!(sloppy.execute("undeclared = 1;").is_ok());
    }

    #[test]
    fn test_call_script_function() {
        let ctx = runtime().new_context().unwrap();
        ctx.execute("function greet(name) { return 'hi ' + name; }")
            .unwrap();
        assert_eq!(
            ctx.call("greet", &[Value::string("bob")]).unwrap(),
            Value::string("hi bob")
        );
    }

    #[test]
    fn test_call_non_function() {
        let ctx = runtime().new_context().unwrap();
        ctx.set_global("n", 3).unwrap();
        let err = ctx.call("n", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_conversion_limits_rejected() {
        let err = runtime()
            .new_context_with(ContextOptions::new().max_conversion_depth(0))
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));

        let err = runtime()
            .new_context_with(ContextOptions::new().max_array_length(0))
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_options_from_config() {
        let config = ContextConfig {
            strict: Some(true),
            max_conversion_depth: Some(3),
            max_array_length: Some(2),
        };
        let ctx = runtime()
            .new_context_with(ContextOptions::from_config(&config))
            .unwrap();
        assert!(ctx.is_strict());
        assert_eq!(ctx.execute("[1, 2]").unwrap(), Value::array(vec![Value::Int(1), Value::Int(2)]));
        assert!(matches!(
            ctx.execute("[1, 2, 3]").unwrap_err(),
            BridgeError::ArrayTooLong { limit: 2, length: 3, .. }
        ));
    }

    #[test]
    fn test_context_outlives_runtime_handle() {
        let ctx = runtime().new_context().unwrap();
        assert_eq!(ctx.runtime().live_contexts(), 1);
        assert_eq!(ctx.execute("2 ** 10").unwrap(), Value::Int(1024));
    }

    #[test]
    fn test_reporter_sees_script_errors() {
        let ctx = runtime().new_context().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ctx.set_error_reporter(move |err| sink.borrow_mut().push(err.message.clone()));

        let _ = ctx.execute("throw new TypeError('first')");
        ctx.clear_error_reporter();
        let _ = ctx.execute("throw new TypeError('second')");

        assert_eq!(*seen.borrow(), vec!["first".to_string()]);
    }
}
