//! Error bridge
//!
//! Translates engine failures into host errors. A pending script exception is
//! drained from the engine and described as a [`ScriptError`]; allocation
//! failures and the engine's own out-of-memory exception become
//! [`BridgeError::ResourceExhausted`].
//!
//! When the heap is too full for the engine to build its `InternalError`, it
//! throws `null` instead. A pending `null` is therefore treated as memory
//! exhaustion when the runtime is close to its quota, and as an ordinary
//! script error otherwise.

use crate::api::conversion::ConversionError;
use crate::api::runtime::RuntimeId;
use regex::Regex;
use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Object, Type, Value as JsValue};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Coarse classification of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad arguments or an object that could not be constructed
    Construction,
    /// The engine ran out of memory under its quota
    ResourceExhaustion,
    /// A script raised an exception
    Script,
    /// A value or handle could not cross the boundary
    Bridge,
}

/// Errors surfaced by the bridge
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    /// Invalid construction argument or call
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Memory quota exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Exception raised by script code
    #[error("{0}")]
    Script(ScriptError),
    /// Engine value kind outside the bridged set
    #[error("Unsupported engine type: {type_name}")]
    UnsupportedType { type_name: String },
    /// Aggregate refers back to one of its ancestors
    #[error("Cyclic value at {path}")]
    CyclicValue { path: String },
    /// Aggregate nested deeper than the configured limit
    #[error("Value nested deeper than {limit} levels at {path}")]
    DepthExceeded { limit: usize, path: String },
    /// Engine array longer than the configured limit
    #[error("Array of length {length} at {path} exceeds the limit of {limit} elements")]
    ArrayTooLong {
        limit: usize,
        length: u64,
        path: String,
    },
    /// Engine string holding a lone UTF-16 surrogate, which host strings cannot carry
    #[error("String with an unpaired surrogate at {path}")]
    UnpairedSurrogate { path: String },
    /// Handle used with a context of another engine instance
    #[error("Engine mismatch: object belongs to {expected}, context belongs to {found}")]
    EngineMismatch { expected: RuntimeId, found: RuntimeId },
    /// Host-side typed conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    /// Any other engine failure
    #[error("Engine error: {0}")]
    Engine(String),
}

impl BridgeError {
    /// Taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::InvalidArgument(_) => ErrorKind::Construction,
            BridgeError::ResourceExhausted(_) => ErrorKind::ResourceExhaustion,
            BridgeError::Script(_) => ErrorKind::Script,
            BridgeError::UnsupportedType { .. }
            | BridgeError::CyclicValue { .. }
            | BridgeError::DepthExceeded { .. }
            | BridgeError::ArrayTooLong { .. }
            | BridgeError::UnpairedSurrogate { .. }
            | BridgeError::EngineMismatch { .. }
            | BridgeError::Conversion(_)
            | BridgeError::Engine(_) => ErrorKind::Bridge,
        }
    }

    /// The script error, if this is one
    pub fn as_script(&self) -> Option<&ScriptError> {
        match self {
            BridgeError::Script(err) => Some(err),
            _ => None,
        }
    }
}

/// One parsed line of an engine stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name, `None` for anonymous top-level code
    pub function: Option<String>,
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
}

/// Exception raised by script code, described on the host side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Constructor name (`TypeError`, `SyntaxError`, ...)
    pub name: String,
    pub message: String,
    /// File the exception was raised in
    pub file: Option<String>,
    /// 1-based line the exception was raised on
    pub line: Option<u32>,
    /// Raw stack text as produced by the engine
    pub stack: Option<String>,
    /// Parsed stack, innermost first
    pub frames: Vec<StackFrame>,
}

impl ScriptError {
    /// Build a script error without location
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            file: None,
            line: None,
            stack: None,
            frames: Vec::new(),
        }
    }

    /// Whether this is the engine's out-of-memory exception
    pub fn is_out_of_memory(&self) -> bool {
        self.name == "InternalError" && self.message == OUT_OF_MEMORY
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}: {}", self.name, self.message)?;
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " ({}:{})", file, line),
            (Some(file), None) => write!(f, " ({})", file),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for ScriptError {}

const OUT_OF_MEMORY: &str = "out of memory";

/// Drain the pending exception of `ctx`, if any, and describe it
pub fn catch_script_error(ctx: &Ctx<'_>) -> Option<ScriptError> {
    let exception = ctx.catch();
    if exception.type_of() == Type::Uninitialized {
        return None;
    }
    Some(describe_exception(&exception))
}

/// Describe a thrown engine value
pub(crate) fn describe_exception(exception: &JsValue<'_>) -> ScriptError {
    let Some(obj) = exception.as_object() else {
        let message = exception
            .get::<Coerced<String>>()
            .map(|c| c.0)
            .unwrap_or_else(|_| exception.type_of().as_str().to_string());
        return ScriptError::new("", message);
    };

    let name = string_prop(obj, "name").unwrap_or_else(|| "Error".to_string());
    let message = string_prop(obj, "message").unwrap_or_default();
    let stack = string_prop(obj, "stack");
    let frames = stack.as_deref().map(parse_stack).unwrap_or_default();

    let file = string_prop(obj, "fileName").or_else(|| frames.first().map(|f| f.file.clone()));
    let line = obj
        .get::<_, Option<i32>>("lineNumber")
        .ok()
        .flatten()
        .and_then(|l| u32::try_from(l).ok())
        .or_else(|| frames.first().map(|f| f.line));

    ScriptError {
        name,
        message,
        file,
        line,
        stack,
        frames,
    }
}

fn string_prop(obj: &Object<'_>, key: &str) -> Option<String> {
    obj.get::<_, Option<String>>(key).ok().flatten()
}

fn frame_regex() -> &'static Regex {
    static FRAME: OnceLock<Regex> = OnceLock::new();
    FRAME.get_or_init(|| {
        Regex::new(r"^\s*at\s+(?:(?P<func>[^(]*?)\s+\()?(?P<file>[^()]+?):(?P<line>\d+)(?::(?P<col>\d+))?\)?\s*$")
            .unwrap_or_else(|e| panic!("invalid stack frame pattern: {}", e))
    })
}

/// Parse engine stack text into frames; lines without a location are skipped
pub fn parse_stack(stack: &str) -> Vec<StackFrame> {
    let re = frame_regex();
    stack
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let line_no = caps.name("line")?.as_str().parse().ok()?;
            Some(StackFrame {
                function: caps
                    .name("func")
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|f| !f.is_empty()),
                file: caps.name("file")?.as_str().to_string(),
                line: line_no,
                column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
            })
        })
        .collect()
}

/// Translate an engine failure into a host error
///
/// `near_quota` is asked only when the pending exception is `null`, and
/// decides whether it is the engine's fallback for a failed allocation.
/// `report` is invoked with every script error before it is returned.
pub(crate) fn translate(
    ctx: &Ctx<'_>,
    error: rquickjs::Error,
    near_quota: impl FnOnce() -> bool,
    report: impl FnOnce(&ScriptError),
) -> BridgeError {
    match error {
        rquickjs::Error::Exception => {
            let exception = ctx.catch();
            match exception.type_of() {
                Type::Uninitialized => {
                    BridgeError::Engine("exception flagged but none pending".to_string())
                }
                Type::Null if near_quota() => {
                    BridgeError::ResourceExhausted(OUT_OF_MEMORY.to_string())
                }
                _ => {
                    let script = describe_exception(&exception);
                    if script.is_out_of_memory() {
                        return BridgeError::ResourceExhausted(script.message);
                    }
                    report(&script);
                    BridgeError::Script(script)
                }
            }
        }
        rquickjs::Error::Allocation => BridgeError::ResourceExhausted(OUT_OF_MEMORY.to_string()),
        other => BridgeError::Engine(other.to_string()),
    }
}
