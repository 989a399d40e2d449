//! Script functions held by the host
//!
//! A [`JsFunction`] keeps an engine function alive through one GC root. It is
//! produced whenever a script function crosses into the host and can be
//! called from Rust or handed back to any context of the same runtime.

use crate::api::context::{Context, ContextInner};
use crate::api::request::with_request;
use crate::api::runtime::RuntimeId;
use crate::bridge::ValueBridge;
use crate::error::{BridgeError, Result};
use crate::value::Value;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Persistent, Value as JsValue};
use std::fmt;
use std::rc::Rc;

struct RootedFunction {
    // Must drop before `context` releases the runtime.
    root: Persistent<Function<'static>>,
    name: String,
    context: Rc<ContextInner>,
}

/// Rooted handle to a script function
///
/// Clones alias the same root; it is released when the last clone drops.
#[derive(Clone)]
pub struct JsFunction(Rc<RootedFunction>);

impl JsFunction {
    pub(crate) fn new<'js>(ctx: &Ctx<'js>, function: Function<'js>, context: Rc<ContextInner>) -> Self {
        let name = function
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_default();
        JsFunction(Rc::new(RootedFunction {
            root: Persistent::save(ctx, function),
            name,
            context,
        }))
    }

    /// Restore the function inside a request on `target`
    pub(crate) fn restore<'js>(&self, ctx: &Ctx<'js>, target: &ContextInner) -> Result<Function<'js>> {
        let owner = self.0.context.runtime.id;
        if owner != target.runtime.id {
            return Err(BridgeError::EngineMismatch {
                expected: owner,
                found: target.runtime.id,
            });
        }
        self.0
            .root
            .clone()
            .restore(ctx)
            .map_err(|e| target.translate(ctx, e))
    }

    /// Call the function with `this` undefined
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let context = &self.0.context;
        with_request(context, |ctx| {
            let function = self.restore(&ctx, context)?;
            invoke(context, &ctx, &function, args)
        })
    }

    /// The function's `name` property at the time it was wrapped
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Context the function was received from
    pub fn context(&self) -> Context {
        Context {
            inner: self.0.context.clone(),
        }
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.0.context.runtime.id
    }

    /// Whether both handles alias the same root
    pub fn ptr_eq(&self, other: &JsFunction) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsFunction")
            .field("name", &self.0.name)
            .field("runtime", &self.0.context.runtime.id)
            .finish()
    }
}

/// Call `function` with converted `args` inside an active request on `context`
pub(crate) fn invoke<'js>(
    context: &Rc<ContextInner>,
    ctx: &Ctx<'js>,
    function: &Function<'js>,
    args: &[Value],
) -> Result<Value> {
    let bridge = ValueBridge::new(context);
    let args = args
        .iter()
        .map(|arg| bridge.to_engine(ctx, arg))
        .collect::<Result<Vec<JsValue<'js>>>>()?;
    let result: JsValue<'js> = function
        .call((Rest(args),))
        .map_err(|e| context.translate(ctx, e))?;
    bridge.to_host(ctx, result)
}

#[cfg(test)]
mod tests {
    use crate::api::Runtime;
    use crate::value::{Callable, Value};
    use pretty_assertions::assert_eq;

    fn script_function(value: Value) -> super::JsFunction {
        match value {
            Value::Function(Callable::Script(f)) => f,
            other => panic!("expected script function, got {:?}", other),
        }
    }

    #[test]
    fn test_call_from_host() {
        let ctx = Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap();
        let mul = script_function(ctx.execute("(function mul(a, b) { return a * b; })").unwrap());
        assert_eq!(mul.name(), "mul");
        assert_eq!(mul.call(&[6.into(), 7.into()]).unwrap(), Value::Int(42));
        assert!(ctx.is_idle());
    }

    #[test]
    fn test_closure_state_survives_between_calls() {
        let ctx = Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap();
        let next = script_function(
            ctx.execute("(() => { let n = 0; return () => ++n; })()")
                .unwrap(),
        );
        next.call(&[]).unwrap();
        next.call(&[]).unwrap();
        assert_eq!(next.call(&[]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_handle_keeps_context_alive() {
        let f = {
            let ctx = Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap();
            script_function(ctx.execute("x => x + 1").unwrap())
        };
        assert_eq!(f.call(&[Value::Int(1)]).unwrap(), Value::Int(2));
        assert_eq!(f.context().runtime().live_contexts(), 1);
    }

    #[test]
    fn test_pass_back_into_engine() {
        let ctx = Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap();
        let square = ctx.execute("x => x * x").unwrap();
        ctx.set_global("square", square.clone()).unwrap();
        assert_eq!(ctx.execute("square(9)").unwrap(), Value::Int(81));
        assert_eq!(ctx.execute("[1, 2, 3].map(square)[2]").unwrap(), Value::Int(9));
    }

    #[test]
    fn test_thrown_error_surfaces() {
        let ctx = Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap();
        let fail = script_function(ctx.execute("() => { throw new Error('nope'); }").unwrap());
        let err = fail.call(&[]).unwrap_err();
        assert_eq!(err.as_script().map(|s| s.message.as_str()), Some("nope"));
        assert!(ctx.is_idle());
    }

    #[test]
    fn test_engine_mismatch() {
        let first = Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap();
        let second = Runtime::new(8 * 1024 * 1024).unwrap().new_context().unwrap();
        let f = first.execute("() => 1").unwrap();
        let err = second.set_global("f", f).unwrap_err();
        assert!(matches!(err, crate::BridgeError::EngineMismatch { .. }));
    }
}
