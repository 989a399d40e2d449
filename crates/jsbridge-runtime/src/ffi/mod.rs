//! Raw engine entry points
//!
//! The safe `rquickjs` API evaluates source in one step. The bridge also needs
//! to compile without running, to serialize compiled bytecode and to evaluate
//! bytecode later, possibly in a sibling context. Those calls live here.
//!
//! # Safety
//!
//! Every function requires the caller to be inside a request on the context
//! behind `ctx`. Returned values are owned by the caller; `eval_compiled`
//! consumes its argument.

use rquickjs::{qjs, Ctx, Error, Result, Value};
use std::ffi::{c_int, CString};
use std::mem::MaybeUninit;

/// Highest first-line number a script may claim
///
/// The offset is applied by padding the source with newlines, so it costs
/// host memory proportional to the line number.
pub(crate) const MAX_FIRST_LINE: u32 = 1 << 20;

/// Source text and filename prepared for the engine
pub(crate) struct ScriptSource {
    text: CString,
    filename: CString,
}

impl ScriptSource {
    /// Prepare `source` so that its first line is reported as `line`
    ///
    /// Fails when the source or the filename contain an interior NUL byte, or
    /// when `line` is above [`MAX_FIRST_LINE`].
    pub(crate) fn new(source: &str, filename: &str, line: u32) -> std::result::Result<Self, String> {
        if line > MAX_FIRST_LINE {
            return Err(format!(
                "first line {} is above the limit of {}",
                line, MAX_FIRST_LINE
            ));
        }
        let padding = line.saturating_sub(1) as usize;
        let mut text = String::with_capacity(source.len() + padding);
        text.extend(std::iter::repeat('\n').take(padding));
        text.push_str(source);

        let text = CString::new(text).map_err(|_| "script source contains a NUL byte".to_string())?;
        let filename =
            CString::new(filename).map_err(|_| "script filename contains a NUL byte".to_string())?;
        Ok(Self { text, filename })
    }
}

fn check<'js>(ctx: &Ctx<'js>, raw: qjs::JSValue) -> Result<Value<'js>> {
    // SAFETY: the tag read is valid for any JSValue.
    if unsafe { qjs::JS_VALUE_GET_NORM_TAG(raw) } == qjs::JS_TAG_EXCEPTION {
        return Err(Error::Exception);
    }
    // SAFETY: `raw` is a fresh owned reference produced by the engine for `ctx`.
    Ok(unsafe { Value::from_raw(ctx.clone(), raw) })
}

/// Compile a global script without running it
///
/// The result is the engine's compiled function object; it is bound to the
/// realm of `ctx`.
pub(crate) fn compile<'js>(ctx: &Ctx<'js>, source: &ScriptSource, strict: bool) -> Result<Value<'js>> {
    let mut flags = qjs::JS_EVAL_TYPE_GLOBAL | qjs::JS_EVAL_FLAG_COMPILE_ONLY;
    if strict {
        flags |= qjs::JS_EVAL_FLAG_STRICT;
    }
    let bytes = source.text.as_bytes();
    // SAFETY: `text` is NUL-terminated at `bytes.len()` as JS_Eval requires.
    let raw = unsafe {
        qjs::JS_Eval(
            ctx.as_raw().as_ptr(),
            source.text.as_ptr(),
            bytes.len() as _,
            source.filename.as_ptr(),
            flags as c_int,
        )
    };
    check(ctx, raw)
}

/// Run a compiled function object
///
/// Consumes `compiled`. Global lookups resolve in the realm the function was
/// compiled or loaded in.
pub(crate) fn eval_compiled<'js>(ctx: &Ctx<'js>, compiled: Value<'js>) -> Result<Value<'js>> {
    // SAFETY: JS_EvalFunction consumes one reference, so take one for it and
    // let `compiled` release its own.
    let raw = unsafe { qjs::JS_DupValue(ctx.as_raw().as_ptr(), compiled.as_raw()) };
    drop(compiled);
    // SAFETY: `raw` is an owned reference handed to the engine.
    let result = unsafe { qjs::JS_EvalFunction(ctx.as_raw().as_ptr(), raw) };
    check(ctx, result)
}

/// Compile and run a global script in one step
pub(crate) fn eval<'js>(ctx: &Ctx<'js>, source: &ScriptSource, strict: bool) -> Result<Value<'js>> {
    let compiled = compile(ctx, source, strict)?;
    eval_compiled(ctx, compiled)
}

/// Serialize a compiled function object to bytecode
pub(crate) fn write_bytecode(ctx: &Ctx<'_>, compiled: &Value<'_>) -> Result<Vec<u8>> {
    let mut len = MaybeUninit::uninit();
    // SAFETY: JS_WriteObject borrows the value and returns a buffer owned by `ctx`.
    let buf = unsafe {
        qjs::JS_WriteObject(
            ctx.as_raw().as_ptr(),
            len.as_mut_ptr(),
            compiled.as_raw(),
            qjs::JS_WRITE_OBJ_BYTECODE as c_int,
        )
    };
    if buf.is_null() {
        return Err(Error::Exception);
    }
    // SAFETY: on success `len` holds the buffer length.
    let bytes = unsafe {
        let len = len.assume_init();
        std::slice::from_raw_parts(buf, len as usize).to_vec()
    };
    // SAFETY: `buf` was allocated by the engine for `ctx`.
    unsafe { qjs::js_free(ctx.as_raw().as_ptr(), buf as _) };
    Ok(bytes)
}

/// Load bytecode into `ctx`, producing a function object bound to its realm
pub(crate) fn read_bytecode<'js>(ctx: &Ctx<'js>, bytes: &[u8]) -> Result<Value<'js>> {
    // SAFETY: the engine copies what it needs out of `bytes`.
    let raw = unsafe {
        qjs::JS_ReadObject(
            ctx.as_raw().as_ptr(),
            bytes.as_ptr(),
            bytes.len() as _,
            qjs::JS_READ_OBJ_BYTECODE as c_int,
        )
    };
    check(ctx, raw)
}
