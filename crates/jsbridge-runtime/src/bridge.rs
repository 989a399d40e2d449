//! Value bridge
//!
//! Converts between host [`Value`]s and engine values. Conversion is total over
//! the bridged tag set and recursive for arrays and objects. Every call must
//! happen inside a request on the bridge's context.
//!
//! Aggregates nest at most `max_conversion_depth` levels and engine arrays are
//! at most `max_array_length` long. An engine aggregate that contains one of
//! its own ancestors fails with `CyclicValue`; shared sub-objects that do not
//! form a cycle are copied once per occurrence.
//!
//! Host strings are UTF-8, so an engine string holding a lone surrogate fails
//! with `UnpairedSurrogate` instead of being altered.

use crate::api::context::ContextInner;
use crate::api::function::JsFunction;
use crate::api::native::to_engine_function;
use crate::error::{BridgeError, Result};
use crate::value::{Callable, Value, ValueMap};
use rquickjs::{Array, Ctx, Object, Type, Value as JsValue};
use std::fmt::Write as _;
use std::rc::Rc;

/// Location inside the value being converted, used in error messages
#[derive(Default)]
struct Path(Vec<Segment>);

enum Segment {
    Index(usize),
    Key(String),
}

impl Path {
    fn depth(&self) -> usize {
        self.0.len()
    }

    fn render(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.0 {
            // Writing into a String cannot fail.
            let _ = match segment {
                Segment::Index(i) => write!(out, "[{}]", i),
                Segment::Key(k) => write!(out, ".{}", k),
            };
        }
        out
    }
}

/// Converter bound to one context
pub(crate) struct ValueBridge<'a> {
    context: &'a Rc<ContextInner>,
}

impl<'a> ValueBridge<'a> {
    pub(crate) fn new(context: &'a Rc<ContextInner>) -> Self {
        Self { context }
    }

    fn limit(&self) -> usize {
        self.context.max_conversion_depth
    }

    // Host to engine

    /// Convert a host value into an engine value owned by `ctx`
    pub(crate) fn to_engine<'js>(&self, ctx: &Ctx<'js>, value: &Value) -> Result<JsValue<'js>> {
        let mut path = Path::default();
        self.value_to_engine(ctx, value, &mut path)
    }

    fn value_to_engine<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &Value,
        path: &mut Path,
    ) -> Result<JsValue<'js>> {
        let fail = |e: rquickjs::Error| self.context.translate(ctx, e);
        let js = match value {
            Value::Undefined => JsValue::new_undefined(ctx.clone()),
            Value::Null => JsValue::new_null(ctx.clone()),
            Value::Bool(b) => JsValue::new_bool(ctx.clone(), *b),
            Value::Int(i) => match i32::try_from(*i) {
                Ok(small) => JsValue::new_int(ctx.clone(), small),
                Err(_) => JsValue::new_float(ctx.clone(), *i as f64),
            },
            Value::Float(f) => JsValue::new_float(ctx.clone(), *f),
            Value::String(s) => rquickjs::String::from_str(ctx.clone(), s)
                .map_err(&fail)?
                .into_value(),
            Value::Array(items) => {
                self.enter(path)?;
                let array = Array::new(ctx.clone()).map_err(&fail)?;
                for (index, item) in items.iter().enumerate() {
                    path.0.push(Segment::Index(index));
                    let js = self.value_to_engine(ctx, item, path)?;
                    path.0.pop();
                    array.set(index, js).map_err(&fail)?;
                }
                array.into_value()
            }
            Value::Object(map) => {
                self.enter(path)?;
                let object = Object::new(ctx.clone()).map_err(&fail)?;
                for (key, item) in map {
                    path.0.push(Segment::Key(key.clone()));
                    let js = self.value_to_engine(ctx, item, path)?;
                    path.0.pop();
                    object.set(key.as_str(), js).map_err(&fail)?;
                }
                object.into_value()
            }
            Value::Function(Callable::Host(function)) => {
                to_engine_function(ctx, function, Rc::downgrade(self.context))
                    .map_err(&fail)?
                    .into_value()
            }
            Value::Function(Callable::Script(function)) => {
                function.restore(ctx, self.context)?.into_value()
            }
            Value::Global => ctx.globals().into_value(),
        };
        Ok(js)
    }

    fn enter(&self, path: &Path) -> Result<()> {
        if path.depth() >= self.limit() {
            return Err(BridgeError::DepthExceeded {
                limit: self.limit(),
                path: path.render(),
            });
        }
        Ok(())
    }

    // Engine to host

    /// Convert an engine value into a host value
    pub(crate) fn to_host<'js>(&self, ctx: &Ctx<'js>, value: JsValue<'js>) -> Result<Value> {
        let globals = ctx.globals().into_value();
        let mut ancestors = Vec::new();
        let mut path = Path::default();
        self.value_to_host(ctx, value, &globals, &mut ancestors, &mut path)
    }

    fn value_to_host<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: JsValue<'js>,
        globals: &JsValue<'js>,
        ancestors: &mut Vec<JsValue<'js>>,
        path: &mut Path,
    ) -> Result<Value> {
        let fail = |e: rquickjs::Error| self.context.translate(ctx, e);
        let converted = match value.type_of() {
            Type::Uninitialized | Type::Undefined => Value::Undefined,
            Type::Null => Value::Null,
            Type::Bool => Value::Bool(value.as_bool().unwrap_or_default()),
            Type::Int => Value::Int(i64::from(value.as_int().unwrap_or_default())),
            Type::Float => Value::Float(value.as_float().unwrap_or(f64::NAN)),
            Type::String => match value.as_string() {
                Some(s) => match s.to_string() {
                    Ok(text) => Value::String(text),
                    Err(rquickjs::Error::Utf8(_)) => {
                        return Err(BridgeError::UnpairedSurrogate {
                            path: path.render(),
                        })
                    }
                    Err(e) => return Err(fail(e)),
                },
                None => Value::string(""),
            },
            Type::Function | Type::Constructor => match value.as_function() {
                Some(function) => Value::Function(Callable::Script(JsFunction::new(
                    ctx,
                    function.clone(),
                    self.context.clone(),
                ))),
                None => return Err(unsupported(&value)),
            },
            Type::Array => {
                let Some(array) = value.as_object() else {
                    return Err(unsupported(&value));
                };
                // Lengths run up to 2^32 - 1, past the engine's small-int range.
                let length = array.get::<_, f64>("length").map_err(&fail)? as u32;
                if length as usize > self.context.max_array_length {
                    return Err(BridgeError::ArrayTooLong {
                        limit: self.context.max_array_length,
                        length: u64::from(length),
                        path: path.render(),
                    });
                }
                self.descend(&value, ancestors, path)?;
                let mut items = Vec::with_capacity(length as usize);
                for index in 0..length {
                    let item: JsValue = array.get(index).map_err(&fail)?;
                    path.0.push(Segment::Index(index as usize));
                    items.push(self.value_to_host(ctx, item, globals, ancestors, path)?);
                    path.0.pop();
                }
                ancestors.pop();
                Value::Array(items)
            }
            Type::Object | Type::Exception => {
                if value == *globals {
                    return Ok(Value::Global);
                }
                let Some(object) = value.as_object() else {
                    return Err(unsupported(&value));
                };
                self.descend(&value, ancestors, path)?;
                let mut map = ValueMap::new();
                for key in object.keys::<String>() {
                    let key = key.map_err(&fail)?;
                    let item: JsValue = object.get(key.as_str()).map_err(&fail)?;
                    path.0.push(Segment::Key(key.clone()));
                    let converted = self.value_to_host(ctx, item, globals, ancestors, path)?;
                    path.0.pop();
                    map.insert(key, converted);
                }
                ancestors.pop();
                Value::Object(map)
            }
            _ => return Err(unsupported(&value)),
        };
        Ok(converted)
    }

    /// Push an aggregate onto the ancestor stack after cycle and depth checks
    fn descend<'js>(
        &self,
        value: &JsValue<'js>,
        ancestors: &mut Vec<JsValue<'js>>,
        path: &Path,
    ) -> Result<()> {
        if ancestors.iter().any(|ancestor| ancestor == value) {
            return Err(BridgeError::CyclicValue {
                path: path.render(),
            });
        }
        self.enter(path)?;
        ancestors.push(value.clone());
        Ok(())
    }
}

fn unsupported(value: &JsValue<'_>) -> BridgeError {
    BridgeError::UnsupportedType {
        type_name: value.type_of().as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_rendering() {
        let path = Path(vec![
            Segment::Key("items".to_string()),
            Segment::Index(2),
            Segment::Key("name".to_string()),
        ]);
        assert_eq!(path.render(), "$.items[2].name");
        assert_eq!(Path::default().render(), "$");
    }
}
