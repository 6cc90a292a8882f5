//! Emit build strategy
//!
//! One converter closure is bound per member at build time. Members of a
//! typed object kind bind the cache slot of their type directly, so they
//! see the final compiled entry once it replaces the placeholder.

use std::borrow::Cow;
use std::sync::{Arc, Weak};
use tracing::trace;

use super::coerce::{coerce, to_typed_object, NoLookup, TypeLookup};
use super::compiled::{CompiledType, Layout, Marshaler};
use super::descriptor::{MemberKind, TypeDescriptor};
use super::{Accelerator, TypeSlot};
use crate::amf::{ClassDefinition, Object, Value};
use crate::config::CompilerStrategy;
use crate::error::{AmfError, CoercionError};

type Setter = Box<dyn Fn(Value) -> Result<Value, CoercionError> + Send + Sync>;

fn setter(kind: &MemberKind, accelerator: &Accelerator) -> Setter {
    match kind {
        MemberKind::Any => Box::new(Ok::<Value, CoercionError>),
        MemberKind::Object(Some(type_name)) => {
            let slot: Weak<TypeSlot> = Arc::downgrade(&accelerator.slot(type_name));
            let kind = kind.clone();
            Box::new(move |value| match slot.upgrade() {
                Some(slot) => to_typed_object(value, &kind, &slot.load(), &NoLookup),
                None => Ok(value),
            })
        }
        MemberKind::Array(inner) => {
            let element = setter(inner, accelerator);
            let any = MemberKind::array_of(MemberKind::Any);
            Box::new(move |value| match coerce(value, &any, &NoLookup)? {
                Value::Array(items) => items
                    .iter()
                    .cloned()
                    .map(&element)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::from),
                other => Ok(other),
            })
        }
        other => {
            let kind = other.clone();
            Box::new(move |value| coerce(value, &kind, &NoLookup))
        }
    }
}

struct EmitMarshaler {
    layout: Layout,
    setters: Vec<Setter>,
}

impl EmitMarshaler {
    fn convert(&self, slot: usize, value: Value) -> Result<Value, CoercionError> {
        (self.setters[slot])(value)
    }
}

impl Marshaler for EmitMarshaler {
    fn construct(&self) -> Object {
        self.layout.construct()
    }

    fn read(
        &self,
        wire: &Arc<ClassDefinition>,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
        _types: &dyn TypeLookup,
    ) -> Result<Object, AmfError> {
        self.layout
            .read(wire, sealed, dynamic, &|slot, value| self.convert(slot, value))
    }

    fn write<'a>(
        &self,
        obj: &'a Object,
        _types: &dyn TypeLookup,
    ) -> Result<Cow<'a, Object>, AmfError> {
        self.layout.write(obj, &|slot, value| self.convert(slot, value))
    }

    fn conform(&self, obj: &Object, _types: &dyn TypeLookup) -> Result<Object, AmfError> {
        self.layout
            .conform(obj, &|slot, value| self.convert(slot, value))
    }
}

/// Build a compiled type by binding one setter per member
pub(crate) fn build(desc: &TypeDescriptor, accelerator: &Accelerator) -> CompiledType {
    let class = Arc::new(desc.class_definition());
    let setters = desc
        .members()
        .iter()
        .map(|m| setter(&m.kind, accelerator))
        .collect();
    let kinds = desc.members().iter().map(|m| m.kind.clone()).collect();
    trace!(type_name = desc.name(), members = desc.members().len(), "Bound member setters");

    let marshaler = EmitMarshaler {
        layout: Layout::new(class.clone(), kinds),
        setters,
    };
    CompiledType::compiled(class, CompilerStrategy::Emit, Box::new(marshaler))
}
