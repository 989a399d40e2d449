//! Shared test utilities
//!
//! Common helpers for jsbridge integration tests to reduce boilerplate.

#![allow(dead_code)]

use jsbridge_runtime::{BridgeError, Context, Runtime, ScriptError, Value};

use pretty_assertions::assert_eq;

pub const MIB: usize = 1024 * 1024;

/// Runtime with a generous quota for ordinary tests
pub fn runtime() -> Runtime {
    Runtime::new(16 * MIB).expect("runtime")
}

/// Fresh context on its own runtime
pub fn context() -> Context {
    runtime().new_context().expect("context")
}

/// Assert that source code evaluates to `expected`
///
/// # Example
/// ```
/// assert_eval("1 + 2", Value::Int(3));
/// ```
pub fn assert_eval(source: &str, expected: impl Into<Value>) {
    let expected = expected.into();
    match context().execute(source) {
        Ok(value) => assert_eq!(value, expected, "evaluating {:?}", source),
        Err(e) => panic!("Expected {:?} from {:?}, got error {}", expected, source, e),
    }
}

/// Unwrap the script error carried by `err`
pub fn script_error(err: BridgeError) -> ScriptError {
    match err {
        BridgeError::Script(script) => script,
        other => panic!("Expected script error, got {:?}", other),
    }
}

/// Bytes a freshly created runtime allocates before any context exists
pub fn baseline_allocation() -> usize {
    Runtime::new(64 * MIB)
        .expect("runtime")
        .memory_usage()
        .allocated
}
