//! Value coercion to declared member and parameter kinds
//!
//! Numeric widening and narrowing, string/primitive conversion and
//! element-wise array conversion. Typed object conversion goes through the
//! accelerator so that the target type's compiled shape is reused.

use bytes::Bytes;
use std::sync::Arc;

use super::compiled::CompiledType;
use super::descriptor::MemberKind;
use crate::amf::{AssocArray, Date, Object, Value, VectorItems};
use crate::error::CoercionError;

/// Source of compiled types for nested typed-object coercion
pub trait TypeLookup {
    fn compiled(&self, type_name: &str) -> Arc<CompiledType>;
}

/// Lookup that never converts nested objects
pub(crate) struct NoLookup;

impl TypeLookup for NoLookup {
    fn compiled(&self, type_name: &str) -> Arc<CompiledType> {
        Arc::new(CompiledType::fallback(type_name))
    }
}

fn mismatch(kind: &MemberKind, value: &Value) -> CoercionError {
    CoercionError::new(kind.to_string(), value.kind_name())
}

/// Convert `value` to `kind`
pub fn coerce(
    value: Value,
    kind: &MemberKind,
    types: &dyn TypeLookup,
) -> Result<Value, CoercionError> {
    match kind {
        MemberKind::Any => Ok(value),
        MemberKind::Boolean => to_boolean(value, kind),
        MemberKind::Integer => to_integer(value, kind),
        MemberKind::Double => to_double(value, kind),
        MemberKind::String => to_string(value, kind),
        MemberKind::Date => match value {
            Value::Date(_) | Value::Null | Value::Undefined => Ok(value),
            Value::Integer(i) => Ok(Value::Date(Date::from_millis(f64::from(i)))),
            Value::Double(n) => Ok(Value::Date(Date::from_millis(n))),
            other => Err(mismatch(kind, &other)),
        },
        MemberKind::Xml => match value {
            Value::Xml(_) | Value::Null | Value::Undefined => Ok(value),
            Value::String(s) => Ok(Value::Xml(s)),
            other => Err(mismatch(kind, &other)),
        },
        MemberKind::ByteArray => to_byte_array(value, kind),
        MemberKind::Array(inner) => to_array(value, kind, inner, types),
        MemberKind::Map => match value {
            Value::AssociativeArray(_) | Value::Null | Value::Undefined => Ok(value),
            Value::Object(obj) => {
                let mut map = AssocArray::new();
                for (k, v) in obj.fields() {
                    map.insert(k, v.clone());
                }
                Ok(map.into())
            }
            other => Err(mismatch(kind, &other)),
        },
        MemberKind::Object(None) => match value {
            Value::AssociativeArray(map) if map.dense.is_empty() => {
                Ok(Object::anonymous(map.entries.iter().cloned()).into())
            }
            Value::Object(_)
            | Value::Externalizable(_)
            | Value::Fault(_)
            | Value::Null
            | Value::Undefined => Ok(value),
            other => Err(mismatch(kind, &other)),
        },
        MemberKind::Object(Some(type_name)) => {
            to_typed_object(value, kind, &types.compiled(type_name), types)
        }
    }
}

/// Convert a value into an instance of the compiled type
pub(crate) fn to_typed_object(
    value: Value,
    kind: &MemberKind,
    compiled: &CompiledType,
    types: &dyn TypeLookup,
) -> Result<Value, CoercionError> {
    match value {
        Value::Object(ref obj) if obj.type_name() == Some(compiled.type_name()) => Ok(value),
        Value::Object(obj) => compiled
            .conform(&obj, types)
            .map(|o| Value::from(o.into_owned()))
            .map_err(|_| CoercionError::new(kind.to_string(), "Object")),
        Value::AssociativeArray(map) if map.dense.is_empty() => {
            let obj = Object::anonymous(map.entries.iter().cloned());
            compiled
                .conform(&obj, types)
                .map(|o| Value::from(o.into_owned()))
                .map_err(|_| CoercionError::new(kind.to_string(), "AssociativeArray"))
        }
        Value::Null | Value::Undefined => Ok(value),
        other => Err(mismatch(kind, &other)),
    }
}

/// Whether `value` can be converted to `kind`
pub fn is_assignable(value: &Value, kind: &MemberKind, types: &dyn TypeLookup) -> bool {
    coerce(value.clone(), kind, types).is_ok()
}

/// Default value of a member before any field is assigned
pub fn default_for(kind: &MemberKind) -> Value {
    match kind {
        MemberKind::Boolean => Value::Boolean(false),
        MemberKind::Integer => Value::Integer(0),
        MemberKind::Double => Value::Double(0.0),
        _ => Value::Null,
    }
}

fn to_boolean(value: Value, kind: &MemberKind) -> Result<Value, CoercionError> {
    match value {
        Value::Boolean(_) => Ok(value),
        Value::Integer(i) => Ok(Value::Boolean(i != 0)),
        Value::Double(n) => Ok(Value::Boolean(n != 0.0 && !n.is_nan())),
        Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" | "" => Ok(Value::Boolean(false)),
            _ => Err(mismatch(kind, &value)),
        },
        Value::Null | Value::Undefined => Ok(Value::Boolean(false)),
        other => Err(mismatch(kind, &other)),
    }
}

fn narrow(n: f64) -> Option<i32> {
    if n.is_finite() && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        Some(n.trunc() as i32)
    } else {
        None
    }
}

fn to_integer(value: Value, kind: &MemberKind) -> Result<Value, CoercionError> {
    match value {
        Value::Integer(_) => Ok(value),
        Value::Double(n) => narrow(n)
            .map(Value::Integer)
            .ok_or_else(|| mismatch(kind, &value)),
        Value::Boolean(b) => Ok(Value::Integer(i32::from(b))),
        Value::String(ref s) => {
            let s = s.trim();
            s.parse::<i32>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(narrow))
                .map(Value::Integer)
                .ok_or_else(|| mismatch(kind, &value))
        }
        Value::Null | Value::Undefined => Ok(Value::Integer(0)),
        other => Err(mismatch(kind, &other)),
    }
}

fn to_double(value: Value, kind: &MemberKind) -> Result<Value, CoercionError> {
    match value {
        Value::Double(_) => Ok(value),
        Value::Integer(i) => Ok(Value::Double(f64::from(i))),
        Value::Boolean(b) => Ok(Value::Double(if b { 1.0 } else { 0.0 })),
        Value::Date(d) => Ok(Value::Double(d.millis)),
        Value::String(ref s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| mismatch(kind, &value)),
        Value::Null | Value::Undefined => Ok(Value::Double(0.0)),
        other => Err(mismatch(kind, &other)),
    }
}

fn to_string(value: Value, kind: &MemberKind) -> Result<Value, CoercionError> {
    match value {
        Value::String(_) | Value::Null | Value::Undefined => Ok(value),
        Value::Integer(i) => Ok(Value::from(i.to_string())),
        Value::Double(n) => Ok(Value::from(n.to_string())),
        Value::Boolean(b) => Ok(Value::from(b.to_string())),
        Value::Xml(x) => Ok(Value::String(x)),
        other => Err(mismatch(kind, &other)),
    }
}

fn to_byte_array(value: Value, kind: &MemberKind) -> Result<Value, CoercionError> {
    match value {
        Value::ByteArray(_) | Value::Null | Value::Undefined => Ok(value),
        Value::Array(ref items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|v| v.as_i32().and_then(|i| u8::try_from(i).ok()))
                .collect();
            bytes
                .map(|b| Value::ByteArray(Bytes::from(b)))
                .ok_or_else(|| mismatch(kind, &value))
        }
        other => Err(mismatch(kind, &other)),
    }
}

fn to_array(
    value: Value,
    kind: &MemberKind,
    inner: &MemberKind,
    types: &dyn TypeLookup,
) -> Result<Value, CoercionError> {
    let items: Vec<Value> = match value {
        Value::Null | Value::Undefined => return Ok(value),
        Value::Array(_) if matches!(inner, MemberKind::Any) => return Ok(value),
        Value::Array(items) => items.as_ref().clone(),
        Value::AssociativeArray(ref map) if map.entries.is_empty() => map.dense.clone(),
        Value::Vector(ref vector) => match &vector.items {
            VectorItems::Int(v) => v.iter().map(|i| Value::Integer(*i)).collect(),
            VectorItems::Uint(v) => v.iter().map(|u| Value::from(*u)).collect(),
            VectorItems::Double(v) => v.iter().map(|n| Value::Double(*n)).collect(),
            VectorItems::Object { items, .. } => items.clone(),
        },
        other => return Err(mismatch(kind, &other)),
    };
    items
        .into_iter()
        .map(|item| coerce(item, inner, types))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::from)
}
