//! AMF value types
//!
//! Both AMF0 and AMF3 share a common value representation. This enum
//! provides a unified type that can be serialized to either format.
//!
//! Composite values are reference counted. Cloning a `Value` never copies
//! a composite payload, and the encoder uses the identity of the shared
//! allocation to emit back-references when the same node appears twice.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use super::class_def::ClassDefinition;
use super::externalizable::{externals_equal, Externalizable};
use super::fault::Fault;

/// Unified AMF value representation
#[derive(Clone, Default)]
pub enum Value {
    /// Undefined value (AMF0: 0x06, AMF3: 0x00)
    Undefined,

    /// Null value (AMF0: 0x05, AMF3: 0x01)
    #[default]
    Null,

    /// Boolean value (AMF0: 0x01, AMF3: 0x02/0x03)
    Boolean(bool),

    /// 29-bit signed integer on the AMF3 wire, a Number in AMF0
    Integer(i32),

    /// IEEE 754 double-precision floating point (AMF0: 0x00, AMF3: 0x05)
    Double(f64),

    /// UTF-8 string (AMF0: 0x02/0x0C, AMF3: 0x06)
    String(Arc<str>),

    /// Date as milliseconds since the Unix epoch (AMF0: 0x0B, AMF3: 0x08)
    Date(Date),

    /// XML document (AMF0: 0x0F, AMF3: 0x07/0x0B)
    Xml(Arc<str>),

    /// Raw byte array (AMF3 only: 0x0C)
    ByteArray(Bytes),

    /// Dense array (AMF0: 0x0A, AMF3: 0x09 without associative part)
    Array(Arc<Vec<Value>>),

    /// Ordered string-keyed mapping with an optional dense prefix
    /// (AMF0: 0x08, AMF3: 0x09 with associative part)
    AssociativeArray(Arc<AssocArray>),

    /// Homogeneous vector (AMF3 only: 0x0D-0x10)
    Vector(Arc<Vector>),

    /// Anonymous, typed or dynamic object (AMF0: 0x03/0x10, AMF3: 0x0A)
    Object(Arc<Object>),

    /// Value whose payload is written and read by the type itself
    Externalizable(Arc<dyn Externalizable>),

    /// Error-shaped response value
    Fault(Arc<Fault>),
}

/// Date with the (conventionally unused) AMF0 timezone field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Date {
    /// Milliseconds since 1970-01-01T00:00:00Z
    pub millis: f64,
    /// Timezone offset in minutes, only carried by AMF0
    pub timezone: i16,
}

impl Date {
    pub fn from_millis(millis: f64) -> Self {
        Self { millis, timezone: 0 }
    }
}

/// Associative array: dense prefix plus ordered string keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssocArray {
    pub dense: Vec<Value>,
    pub entries: Vec<(Arc<str>, Value)>,
}

impl AssocArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a keyed entry, keeping insertion order
    pub fn insert(&mut self, key: impl Into<Arc<str>>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.dense.len() + self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty() && self.entries.is_empty()
    }
}

/// AMF3 vector
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    /// Fixed-length flag carried on the wire
    pub fixed: bool,
    pub items: VectorItems,
}

/// Element storage of a vector, one variant per wire marker
#[derive(Debug, Clone, PartialEq)]
pub enum VectorItems {
    Int(Vec<i32>),
    Uint(Vec<u32>),
    Double(Vec<f64>),
    Object {
        /// Element type identifier, empty for `Vector.<*>`
        type_name: Arc<str>,
        items: Vec<Value>,
    },
}

impl VectorItems {
    pub fn len(&self) -> usize {
        match self {
            VectorItems::Int(v) => v.len(),
            VectorItems::Uint(v) => v.len(),
            VectorItems::Double(v) => v.len(),
            VectorItems::Object { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Object instance shaped by a [`ClassDefinition`]
///
/// Sealed values are stored positionally, so their order always matches the
/// class shape. Dynamic objects may carry extra trailing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    class: Arc<ClassDefinition>,
    sealed: Vec<Value>,
    dynamic: Vec<(Arc<str>, Value)>,
}

impl Object {
    /// Build from a class shape and its positional sealed values
    ///
    /// Missing sealed values are filled with `Null`, surplus ones dropped.
    /// Dynamic fields are dropped when the class is not dynamic.
    pub fn from_parts(
        class: Arc<ClassDefinition>,
        mut sealed: Vec<Value>,
        mut dynamic: Vec<(Arc<str>, Value)>,
    ) -> Self {
        sealed.resize(class.member_count(), Value::Null);
        if !class.is_dynamic() {
            dynamic.clear();
        }
        Self {
            class,
            sealed,
            dynamic,
        }
    }

    /// Anonymous dynamic object (`new Object()` on the ActionScript side)
    pub fn anonymous<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
    {
        Self {
            class: ClassDefinition::anonymous(),
            sealed: Vec::new(),
            dynamic: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sealed typed object whose members are the given fields, in order
    pub fn typed<K, V>(type_name: &str, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
    {
        let (members, sealed): (Vec<Arc<str>>, Vec<Value>) = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            class: Arc::new(ClassDefinition::new(type_name, members, false, false)),
            sealed,
            dynamic: Vec::new(),
        }
    }

    pub fn class(&self) -> &Arc<ClassDefinition> {
        &self.class
    }

    /// Type identifier, `None` for anonymous objects
    pub fn type_name(&self) -> Option<&str> {
        self.class.type_name()
    }

    pub fn is_dynamic(&self) -> bool {
        self.class.is_dynamic()
    }

    pub fn sealed_values(&self) -> &[Value] {
        &self.sealed
    }

    pub fn dynamic_fields(&self) -> &[(Arc<str>, Value)] {
        &self.dynamic
    }

    /// All fields: sealed members in class order, then dynamic fields
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.class
            .members()
            .iter()
            .map(|m| m.as_ref())
            .zip(self.sealed.iter())
            .chain(self.dynamic.iter().map(|(k, v)| (k.as_ref(), v)))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.class.member_index(name) {
            Some(idx) => self.sealed.get(idx),
            None => self
                .dynamic
                .iter()
                .find(|(k, _)| k.as_ref() == name)
                .map(|(_, v)| v),
        }
    }

    pub fn len(&self) -> usize {
        self.sealed.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Value {
    /// Strings, numbers, booleans and dates never enter a reference table
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::String(_)
                | Value::Integer(_)
                | Value::Double(_)
                | Value::Boolean(_)
                | Value::Date(_)
        )
    }

    /// Name of the variant, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "Undefined",
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::Xml(_) => "Xml",
            Value::ByteArray(_) => "ByteArray",
            Value::Array(_) => "Array",
            Value::AssociativeArray(_) => "AssociativeArray",
            Value::Vector(_) => "Vector",
            Value::Object(_) => "Object",
            Value::Externalizable(_) => "Externalizable",
            Value::Fault(_) => "Fault",
        }
    }

    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(n) => Some(*n),
            Value::Integer(i) => Some(f64::from(*i)),
            _ => None,
        }
    }

    /// Integer value, or a double with no fractional part that fits in i32
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Double(n)
                if n.fract() == 0.0 && *n >= f64::from(i32::MIN) && *n <= f64::from(i32::MAX) =>
            {
                Some(*n as i32)
            }
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_assoc(&self) -> Option<&AssocArray> {
        match self {
            Value::AssociativeArray(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Value::Fault(f) => Some(f),
            _ => None,
        }
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    /// Get a property from an object or associative array
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(o) => o.get(key),
            Value::AssociativeArray(a) => a.get(key),
            _ => None,
        }
    }

    /// Get a string property from an object value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a number property from an object value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_f64()
    }

    /// Address of the shared allocation backing a composite value
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(Arc::as_ptr(a) as *const u8 as usize),
            Value::AssociativeArray(a) => Some(Arc::as_ptr(a) as *const u8 as usize),
            Value::Vector(v) => Some(Arc::as_ptr(v) as *const u8 as usize),
            Value::Object(o) => Some(Arc::as_ptr(o) as *const u8 as usize),
            Value::Externalizable(e) => Some(Arc::as_ptr(e) as *const u8 as usize),
            Value::Fault(f) => Some(Arc::as_ptr(f) as *const u8 as usize),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Xml(a), Value::Xml(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::AssociativeArray(a), Value::AssociativeArray(b)) => {
                Arc::ptr_eq(a, b) || a == b
            }
            (Value::Vector(a), Value::Vector(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Externalizable(a), Value::Externalizable(b)) => {
                Arc::ptr_eq(a, b) || externals_equal(a.as_ref(), b.as_ref())
            }
            (Value::Fault(a), Value::Fault(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            Value::Double(n) => f.debug_tuple("Double").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Date(d) => f.debug_tuple("Date").field(d).finish(),
            Value::Xml(x) => f.debug_tuple("Xml").field(x).finish(),
            Value::ByteArray(b) => f.debug_tuple("ByteArray").field(&b.len()).finish(),
            Value::Array(a) => f.debug_tuple("Array").field(a).finish(),
            Value::AssociativeArray(a) => f.debug_tuple("AssociativeArray").field(a).finish(),
            Value::Vector(v) => f.debug_tuple("Vector").field(v).finish(),
            Value::Object(o) => f.debug_tuple("Object").field(o).finish(),
            Value::Externalizable(e) => f
                .debug_tuple("Externalizable")
                .field(&e.type_name())
                .finish(),
            Value::Fault(x) => f.debug_tuple("Fault").field(x).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        match i32::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Double(f64::from(v)),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(v: Arc<str>) -> Self {
        Value::String(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::ByteArray(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(Arc::new(v))
    }
}

impl From<AssocArray> for Value {
    fn from(v: AssocArray) -> Self {
        Value::AssociativeArray(Arc::new(v))
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Value::Vector(Arc::new(v))
    }
}

impl From<Fault> for Value {
    fn from(v: Fault) -> Self {
        Value::Fault(Arc::new(v))
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(v: Vec<V>) -> Self {
        Value::Array(Arc::new(v.into_iter().map(Into::into).collect()))
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(v: Option<V>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
