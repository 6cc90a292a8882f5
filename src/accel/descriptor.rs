//! Application type descriptors and type resolution
//!
//! Rust has no runtime reflection, so an application type is described once
//! by a [`TypeDescriptor`]: its identifier, its ordered members and their
//! declared kinds. A [`TypeResolver`] maps identifiers to descriptors; the
//! accelerator consults it on a cache miss.

use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use crate::amf::ClassDefinition;
use crate::error::CoercionError;

/// Declared kind of a member or method parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Any,
    Boolean,
    Integer,
    Double,
    String,
    Date,
    Xml,
    ByteArray,
    /// Sequence whose elements are coerced to the inner kind
    Array(Box<MemberKind>),
    /// String-keyed associative array
    Map,
    /// Object, optionally of a specific type identifier
    Object(Option<Arc<str>>),
}

impl MemberKind {
    pub fn array_of(kind: MemberKind) -> Self {
        MemberKind::Array(Box::new(kind))
    }

    pub fn object_of(type_name: &str) -> Self {
        MemberKind::Object(Some(type_name.into()))
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Any => f.write_str("Any"),
            MemberKind::Boolean => f.write_str("Boolean"),
            MemberKind::Integer => f.write_str("Integer"),
            MemberKind::Double => f.write_str("Double"),
            MemberKind::String => f.write_str("String"),
            MemberKind::Date => f.write_str("Date"),
            MemberKind::Xml => f.write_str("Xml"),
            MemberKind::ByteArray => f.write_str("ByteArray"),
            MemberKind::Array(inner) => write!(f, "Array<{inner}>"),
            MemberKind::Map => f.write_str("Map"),
            MemberKind::Object(None) => f.write_str("Object"),
            MemberKind::Object(Some(name)) => write!(f, "Object<{name}>"),
        }
    }
}

impl FromStr for MemberKind {
    type Err = CoercionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("Array<").and_then(|r| r.strip_suffix('>')) {
            return Ok(MemberKind::array_of(inner.parse()?));
        }
        if let Some(name) = s.strip_prefix("Object<").and_then(|r| r.strip_suffix('>')) {
            return Ok(MemberKind::object_of(name));
        }
        match s {
            "Any" => Ok(MemberKind::Any),
            "Boolean" => Ok(MemberKind::Boolean),
            "Integer" => Ok(MemberKind::Integer),
            "Double" => Ok(MemberKind::Double),
            "String" => Ok(MemberKind::String),
            "Date" => Ok(MemberKind::Date),
            "Xml" => Ok(MemberKind::Xml),
            "ByteArray" => Ok(MemberKind::ByteArray),
            "Map" => Ok(MemberKind::Map),
            "Object" => Ok(MemberKind::Object(None)),
            other => Err(CoercionError::new("member kind", other)),
        }
    }
}

/// One declared member
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescriptor {
    pub name: Arc<str>,
    pub kind: MemberKind,
}

/// Description of an application type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    name: Arc<str>,
    members: Vec<MemberDescriptor>,
    dynamic: bool,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            dynamic: false,
        }
    }

    /// Append a sealed member
    pub fn member(mut self, name: impl Into<Arc<str>>, kind: MemberKind) -> Self {
        self.members.push(MemberDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    /// Accept undeclared fields as trailing dynamic members
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Wire shape of this type
    pub fn class_definition(&self) -> ClassDefinition {
        ClassDefinition::new(
            self.name.clone(),
            self.members.iter().map(|m| m.name.clone()).collect(),
            false,
            self.dynamic,
        )
    }
}

/// Maps a type identifier to a loadable application type
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, type_name: &str) -> Option<Arc<TypeDescriptor>>;
}

/// In-memory resolver backed by a concurrent map
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: DashMap<Arc<str>, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by the global accelerator
    pub fn global() -> Arc<TypeRegistry> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(TypeRegistry::new())).clone()
    }

    /// Register a type; returns the descriptor it replaced, if any
    ///
    /// Compiled types are never invalidated, so a type should be registered
    /// before the first message carrying it is processed.
    pub fn register(&self, descriptor: TypeDescriptor) -> Option<Arc<TypeDescriptor>> {
        let name = descriptor.name.clone();
        self.types.insert(name, Arc::new(descriptor))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(type_name).map(|entry| entry.value().clone())
    }
}

impl<F> TypeResolver for F
where
    F: Fn(&str) -> Option<Arc<TypeDescriptor>> + Send + Sync,
{
    fn resolve(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self(type_name)
    }
}
