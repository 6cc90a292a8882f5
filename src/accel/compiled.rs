//! Compiled per-type marshalers
//!
//! A [`CompiledType`] is the cache entry for one type identifier. It wraps a
//! [`Marshaler`] that constructs instances, populates them from decoded wire
//! fields and shapes them for writing. Three kinds exist:
//!
//! - the temporary fallback published while a build is in flight,
//! - the named dynamic bag used for identifiers that do not resolve,
//! - a type compiled from a [`TypeDescriptor`](super::TypeDescriptor) by one
//!   of the build strategies.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::coerce::{default_for, TypeLookup};
use super::descriptor::MemberKind;
use crate::amf::{ClassDefinition, Object, Value};
use crate::config::CompilerStrategy;
use crate::error::{AmfError, CoercionError};

/// How a cache entry came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Placeholder visible while the real entry is being built
    Fallback,
    /// Identifier did not resolve to an application type
    DynamicBag,
    /// Built from a descriptor with the given strategy
    Compiled(CompilerStrategy),
}

/// Construct, read and write strategies for one type
pub trait Marshaler: Send + Sync {
    /// New instance with every declared member at its default
    fn construct(&self) -> Object;

    /// Populate an instance from decoded wire fields
    fn read(
        &self,
        wire: &Arc<ClassDefinition>,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
        types: &dyn TypeLookup,
    ) -> Result<Object, AmfError>;

    /// Shape an instance for writing, borrowing it when it already fits
    fn write<'a>(&self, obj: &'a Object, types: &dyn TypeLookup)
        -> Result<Cow<'a, Object>, AmfError>;

    /// Convert an arbitrary object into an instance of this type
    fn conform(&self, obj: &Object, types: &dyn TypeLookup) -> Result<Object, AmfError>;
}

/// Accelerator cache entry
pub struct CompiledType {
    type_name: Arc<str>,
    class: Option<Arc<ClassDefinition>>,
    origin: Origin,
    marshaler: Box<dyn Marshaler>,
}

impl CompiledType {
    pub(crate) fn fallback(type_name: &str) -> Self {
        Self::generic(type_name, Origin::Fallback)
    }

    pub(crate) fn dynamic_bag(type_name: &str) -> Self {
        Self::generic(type_name, Origin::DynamicBag)
    }

    fn generic(type_name: &str, origin: Origin) -> Self {
        let type_name: Arc<str> = type_name.into();
        Self {
            type_name: type_name.clone(),
            class: None,
            origin,
            marshaler: Box::new(PropertyBag { type_name }),
        }
    }

    pub(crate) fn compiled(
        class: Arc<ClassDefinition>,
        strategy: CompilerStrategy,
        marshaler: Box<dyn Marshaler>,
    ) -> Self {
        Self {
            type_name: class.name_arc().clone(),
            class: Some(class),
            origin: Origin::Compiled(strategy),
            marshaler,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared shape; `None` when fields take the shape of the wire
    pub fn class_definition(&self) -> Option<&Arc<ClassDefinition>> {
        self.class.as_ref()
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == Origin::Fallback
    }

    pub fn construct(&self) -> Object {
        self.marshaler.construct()
    }

    pub fn read(
        &self,
        wire: &Arc<ClassDefinition>,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
        types: &dyn TypeLookup,
    ) -> Result<Object, AmfError> {
        self.marshaler.read(wire, sealed, dynamic, types)
    }

    pub fn write<'a>(
        &self,
        obj: &'a Object,
        types: &dyn TypeLookup,
    ) -> Result<Cow<'a, Object>, AmfError> {
        self.marshaler.write(obj, types)
    }

    /// Convert `obj` into this type, borrowing it when it already is one
    pub fn conform<'a>(
        &self,
        obj: &'a Object,
        types: &dyn TypeLookup,
    ) -> Result<Cow<'a, Object>, AmfError> {
        if obj.type_name() == Some(self.type_name()) {
            return self.marshaler.write(obj, types);
        }
        self.marshaler.conform(obj, types).map(Cow::Owned)
    }
}

impl fmt::Debug for CompiledType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledType")
            .field("type_name", &self.type_name)
            .field("origin", &self.origin)
            .field("class", &self.class)
            .finish()
    }
}

/// Generic property bag: the object keeps whatever shape it arrived with
struct PropertyBag {
    type_name: Arc<str>,
}

impl PropertyBag {
    fn bag_class(&self) -> Arc<ClassDefinition> {
        Arc::new(ClassDefinition::new(
            self.type_name.clone(),
            Vec::new(),
            false,
            true,
        ))
    }
}

impl Marshaler for PropertyBag {
    fn construct(&self) -> Object {
        Object::from_parts(self.bag_class(), Vec::new(), Vec::new())
    }

    fn read(
        &self,
        wire: &Arc<ClassDefinition>,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
        _types: &dyn TypeLookup,
    ) -> Result<Object, AmfError> {
        Ok(Object::from_parts(wire.clone(), sealed, dynamic))
    }

    fn write<'a>(
        &self,
        obj: &'a Object,
        _types: &dyn TypeLookup,
    ) -> Result<Cow<'a, Object>, AmfError> {
        Ok(Cow::Borrowed(obj))
    }

    fn conform(&self, obj: &Object, _types: &dyn TypeLookup) -> Result<Object, AmfError> {
        let fields = obj
            .fields()
            .map(|(k, v)| (Arc::<str>::from(k), v.clone()))
            .collect();
        Ok(Object::from_parts(self.bag_class(), Vec::new(), fields))
    }
}

/// Per-member value conversion used by the compiled strategies
pub(crate) type Convert<'c> = dyn Fn(usize, Value) -> Result<Value, CoercionError> + 'c;

/// Declared shape of a compiled type and its member index
pub(crate) struct Layout {
    class: Arc<ClassDefinition>,
    kinds: Vec<MemberKind>,
    index: HashMap<Arc<str>, usize>,
}

impl Layout {
    pub(crate) fn new(class: Arc<ClassDefinition>, kinds: Vec<MemberKind>) -> Self {
        let index = class
            .members()
            .iter()
            .enumerate()
            .map(|(i, m)| (m.clone(), i))
            .collect();
        Self {
            class,
            kinds,
            index,
        }
    }

    pub(crate) fn class(&self) -> &Arc<ClassDefinition> {
        &self.class
    }

    fn defaults(&self) -> Vec<Value> {
        self.kinds.iter().map(default_for).collect()
    }

    fn member_error(&self, member: &str, source: CoercionError) -> AmfError {
        AmfError::Member {
            type_name: self.class.name().to_string(),
            member: member.to_string(),
            source,
        }
    }

    pub(crate) fn construct(&self) -> Object {
        Object::from_parts(self.class.clone(), self.defaults(), Vec::new())
    }

    /// Map wire fields onto declared slots by name
    ///
    /// Missing members keep their default, undeclared ones become dynamic
    /// fields when the type is dynamic and are dropped otherwise.
    pub(crate) fn read(
        &self,
        wire: &ClassDefinition,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
        convert: &Convert<'_>,
    ) -> Result<Object, AmfError> {
        let mut values = self.defaults();
        let mut extra = Vec::new();
        let same_shape = wire.members() == self.class.members();

        let fields = wire.members().iter().cloned().zip(sealed).chain(dynamic);
        for (position, (name, value)) in fields.enumerate() {
            let slot = if same_shape && position < values.len() {
                Some(position)
            } else {
                self.index.get(&name).copied()
            };
            match slot {
                Some(slot) => {
                    values[slot] = convert(slot, value).map_err(|e| self.member_error(&name, e))?;
                }
                None if self.class.is_dynamic() => extra.push((name, value)),
                None => {
                    warn!(
                        type_name = self.class.name(),
                        member = %name,
                        "Dropping undeclared member"
                    );
                }
            }
        }
        Ok(Object::from_parts(self.class.clone(), values, extra))
    }

    pub(crate) fn conform(&self, obj: &Object, convert: &Convert<'_>) -> Result<Object, AmfError> {
        let mut values = self.defaults();
        for (slot, member) in self.class.members().iter().enumerate() {
            if let Some(value) = obj.get(member) {
                values[slot] = convert(slot, value.clone())
                    .map_err(|e| self.member_error(member, e))?;
            }
        }
        let extra = if self.class.is_dynamic() {
            obj.fields()
                .filter(|(k, _)| !self.index.contains_key(*k))
                .map(|(k, v)| (Arc::<str>::from(k), v.clone()))
                .collect()
        } else {
            Vec::new()
        };
        Ok(Object::from_parts(self.class.clone(), values, extra))
    }

    pub(crate) fn write<'a>(
        &self,
        obj: &'a Object,
        convert: &Convert<'_>,
    ) -> Result<Cow<'a, Object>, AmfError> {
        if Arc::ptr_eq(obj.class(), &self.class) || **obj.class() == *self.class {
            return Ok(Cow::Borrowed(obj));
        }
        self.conform(obj, convert).map(Cow::Owned)
    }
}
