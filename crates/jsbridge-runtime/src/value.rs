//! Host-side value representation
//!
//! Values exchanged with the engine are plain host data:
//! - Undefined, Null, Bool, Int, Float: immediate values
//! - String: owned Unicode text
//! - Array / Object: owned trees, converted recursively at the boundary
//! - Function: a host closure or a rooted engine function
//! - Global: stands for the global object of whichever context the value is used with

use crate::api::function::JsFunction;
use crate::api::native::HostFunction;
use indexmap::IndexMap;
use std::fmt;

/// Ordered property map used for `Value::Object`
pub type ValueMap = IndexMap<String, Value>;

/// Bridged value type
#[derive(Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean value
    Bool(bool),
    /// Integral number
    Int(i64),
    /// IEEE 754 double-precision number
    Float(f64),
    /// String value
    String(String),
    /// Array value (owned, value semantics)
    Array(Vec<Value>),
    /// Plain object with own enumerable string-keyed properties, in engine order
    Object(ValueMap),
    /// Callable value
    Function(Callable),
    /// The global object of the context the value is converted in
    Global,
}

/// A function that can cross the bridge
#[derive(Clone)]
pub enum Callable {
    /// Rust closure exposed to scripts
    Host(HostFunction),
    /// Script function rooted on the host side
    Script(JsFunction),
}

impl Value {
    /// Create a new string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Create a new array value
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values)
    }

    /// Create an object value from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Global => "global",
        }
    }

    /// Numeric view of `Int` and `Float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl PartialEq for Value {
    /// Equality contract:
    ///
    /// - `Int` and `Float` share one numeric domain and compare by value
    /// - String, Bool, Null, Undefined, Global: primitive equality
    /// - Array and Object: structural equality (object key order is ignored)
    /// - Function: identity of the underlying closure or GC root
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Global, Value::Global) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Host(a), Callable::Host(b)) => a.ptr_eq(b),
            (Callable::Script(a), Callable::Script(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Callable {
    /// Function name as reported by the host or the engine
    pub fn name(&self) -> &str {
        match self {
            Callable::Host(f) => f.name(),
            Callable::Script(f) => f.name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                let elements: Vec<String> = arr.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            Value::Object(map) => {
                let entries: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
            Value::Global => write!(f, "<global>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(n) => write!(f, "Float({:?})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(arr) => f.debug_tuple("Array").field(arr).finish(),
            Value::Object(map) => f.debug_tuple("Object").field(map).finish(),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Global => write!(f, "Global"),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Host(func) => write!(f, "HostFunction({:?})", func.name()),
            Callable::Script(func) => write!(f, "ScriptFunction({:?})", func.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_and_float_compare_numerically() {
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::Float(-0.0), Value::Int(0));
        assert_ne!(Value::Int(3), Value::Float(3.5));
    }

    #[test]
    fn test_nan_is_not_equal_to_itself() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn test_object_equality_ignores_key_order() {
        let a = Value::object([("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = Value::object([("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_undefined_and_null_differ() {
        assert_ne!(Value::Undefined, Value::Null);
        assert!(Value::Undefined.is_nullish());
        assert!(Value::Null.is_nullish());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Int(1).type_name(), "number");
        assert_eq!(Value::Float(1.5).type_name(), "number");
        assert_eq!(Value::array(vec![]).type_name(), "array");
        assert_eq!(Value::object(Vec::<(String, Value)>::new()).type_name(), "object");
        assert_eq!(Value::Global.type_name(), "global");
    }

    #[test]
    fn test_display() {
        let value = Value::array(vec![Value::Int(1), Value::Float(2.5), Value::string("x")]);
        assert_eq!(value.to_string(), "[1, 2.5, x]");
        assert_eq!(Value::Float(4.0).to_string(), "4");
        assert_eq!(
            Value::object([("a", Value::Bool(true))]).to_string(),
            "{a: true}"
        );
    }
}
