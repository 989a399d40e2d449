//! Type conversion between Rust and bridged values
//!
//! Provides bidirectional conversion for plain Rust data:
//! - `From<T> for Value` - Convert Rust types to a bridged `Value`
//! - `FromValue` - Convert a bridged `Value` to Rust types
//!
//! # Examples
//!
//! ```
//! use jsbridge_runtime::api::FromValue;
//! use jsbridge_runtime::Value;
//!
//! // Rust to bridged value
//! let number: Value = 42.into();
//! let text: Value = "hello".into();
//!
//! // Bridged value to Rust
//! let n: i64 = FromValue::from_value(&number).unwrap();
//! let s: String = FromValue::from_value(&text).unwrap();
//! assert_eq!(n, 42);
//! assert_eq!(s, "hello");
//! ```

use crate::value::{Callable, Value, ValueMap};
use std::collections::HashMap;
use thiserror::Error;

/// Error type for value conversion failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    /// Number does not fit the target type
    #[error("Number {value} out of range for {target}")]
    OutOfRange { value: String, target: String },
    /// Array element type mismatch
    #[error("Array element type mismatch at index {index}: expected {expected}, found {found}")]
    ArrayElementTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    /// Object value type mismatch
    #[error("Object value type mismatch for key '{key}': expected {expected}, found {found}")]
    ObjectValueTypeMismatch {
        key: String,
        expected: String,
        found: String,
    },
}

/// Trait for converting a bridged `Value` to Rust types
pub trait FromValue: Sized {
    /// Convert from a bridged `Value` to a Rust type
    ///
    /// # Errors
    ///
    /// Returns `ConversionError` if the value cannot be converted to the target type.
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

fn mismatch(expected: &str, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        found: value.type_name().to_string(),
    }
}

// Numbers

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        value.as_f64().ok_or_else(|| mismatch("number", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) => Ok(*i),
            // The engine hands back integral floats for numbers outside i32.
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                Ok(*f as i64)
            }
            Value::Float(f) => Err(ConversionError::OutOfRange {
                value: f.to_string(),
                target: "i64".to_string(),
            }),
            _ => Err(mismatch("integer", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| ConversionError::OutOfRange {
            value: wide.to_string(),
            target: "i32".to_string(),
        })
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| ConversionError::OutOfRange {
            value: wide.to_string(),
            target: "u32".to_string(),
        })
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

// Strings

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

// Booleans

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// () maps to undefined, the result of a statement without a value

impl FromValue for () {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Undefined | Value::Null => Ok(()),
            _ => Err(mismatch("undefined", value)),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

// Option<T>: null and undefined are None

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            Ok(Some(T::from_value(value)?))
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            None => Value::Null,
            Some(v) => v.into(),
        }
    }
}

// Vec<T> (array)

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Array(items) => {
                let mut result = Vec::with_capacity(items.len());
                for (index, elem) in items.iter().enumerate() {
                    match T::from_value(elem) {
                        Ok(converted) => result.push(converted),
                        Err(ConversionError::TypeMismatch { expected, found }) => {
                            return Err(ConversionError::ArrayElementTypeMismatch {
                                index,
                                expected,
                                found,
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(result)
            }
            _ => Err(mismatch("array", value)),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

// HashMap<String, T> (object)

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Object(map) => {
                let mut result = HashMap::with_capacity(map.len());
                for (key, elem) in map {
                    match T::from_value(elem) {
                        Ok(converted) => {
                            result.insert(key.clone(), converted);
                        }
                        Err(ConversionError::TypeMismatch { expected, found }) => {
                            return Err(ConversionError::ObjectValueTypeMismatch {
                                key: key.clone(),
                                expected,
                                found,
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(result)
            }
            _ => Err(mismatch("object", value)),
        }
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(map: HashMap<String, T>) -> Self {
        Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Object(map)
    }
}

// Functions

impl FromValue for Callable {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Function(f) => Ok(f.clone()),
            _ => Err(mismatch("function", value)),
        }
    }
}

impl From<Callable> for Value {
    fn from(f: Callable) -> Self {
        Value::Function(f)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}
