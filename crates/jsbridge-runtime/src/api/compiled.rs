//! Compiled scripts
//!
//! A [`CompiledScript`] is parsed once and can then be run any number of times
//! against its compiling context or any sibling context of the same runtime.
//! The compiled function object is rooted for the compiling context; sibling
//! contexts load the serialized bytecode so that global lookups resolve
//! against their own global object.
//!
//! # Examples
//!
//! ```
//! use jsbridge_runtime::api::{ContextOptions, Runtime};
//! use jsbridge_runtime::Value;
//!
//! let runtime = Runtime::new(8 * 1024 * 1024).unwrap();
//! let first = runtime.new_context_with(ContextOptions::new().global("a", 111)).unwrap();
//! let second = runtime.new_context_with(ContextOptions::new().global("a", 222)).unwrap();
//!
//! let script = first.compile("a * 3;").unwrap();
//! assert_eq!(script.execute().unwrap(), Value::Int(333));
//! assert_eq!(script.execute_in(&second).unwrap(), Value::Int(666));
//! ```

use crate::api::context::{Context, ContextInner};
use crate::api::request::with_request;
use crate::api::runtime::RuntimeId;
use crate::bridge::ValueBridge;
use crate::error::{BridgeError, Result};
use crate::ffi;
use crate::value::Value;
use log::debug;
use rquickjs::{Persistent, Value as JsValue};
use std::fmt;
use std::rc::Rc;

/// Reusable compiled script
pub struct CompiledScript {
    // Must drop before `context` releases the runtime.
    root: Persistent<JsValue<'static>>,
    bytecode: Vec<u8>,
    context: Rc<ContextInner>,
    source: String,
    filename: String,
    line: u32,
}

impl CompiledScript {
    pub(crate) fn new(
        root: Persistent<JsValue<'static>>,
        bytecode: Vec<u8>,
        context: Rc<ContextInner>,
        source: &str,
        filename: &str,
        line: u32,
    ) -> Self {
        Self {
            root,
            bytecode,
            context,
            source: source.to_string(),
            filename: filename.to_string(),
            line,
        }
    }

    /// Run the script against the context that compiled it
    pub fn execute(&self) -> Result<Value> {
        self.run(&self.context)
    }

    /// Run the script against `context`
    ///
    /// # Errors
    ///
    /// `EngineMismatch` when `context` belongs to another runtime.
    pub fn execute_in(&self, context: &Context) -> Result<Value> {
        let found = context.inner.runtime.id;
        if found != self.runtime_id() {
            return Err(BridgeError::EngineMismatch {
                expected: self.runtime_id(),
                found,
            });
        }
        self.run(&context.inner)
    }

    fn run(&self, target: &Rc<ContextInner>) -> Result<Value> {
        let own = Rc::ptr_eq(target, &self.context);
        let bridge = ValueBridge::new(target);
        with_request(target, |ctx| {
            let compiled = if own {
                self.root.clone().restore(&ctx)
            } else {
                debug!("loading {} into a sibling context", self.filename);
                ffi::read_bytecode(&ctx, &self.bytecode)
            }
            .map_err(|e| target.translate(&ctx, e))?;

            let value = ffi::eval_compiled(&ctx, compiled).map_err(|e| target.translate(&ctx, e))?;
            bridge.to_host(&ctx, value)
        })
    }

    /// Source text the script was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Line number of the first source line
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Engine instance the script is bound to
    pub fn runtime_id(&self) -> RuntimeId {
        self.context.runtime.id
    }
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledScript")
            .field("filename", &self.filename)
            .field("line", &self.line)
            .field("runtime", &self.context.runtime.id)
            .field("bytecode_len", &self.bytecode.len())
            .finish()
    }
}
