//! Per-message reference tables
//!
//! One table lives for exactly one encode or decode operation. The encode
//! side maps identities to the index they were first emitted at; the decode
//! side appends entries in first-sight order and resolves incoming indices.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AmfError;
use super::class_def::ClassDefinition;
use super::value::Value;

/// Outcome of registering a value with an encode-side table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// First occurrence, written inline at this index
    New(u32),
    /// Already written, emit a back-reference to this index
    Existing(u32),
}

/// Encode-side identity table
#[derive(Debug, Default)]
pub struct EncodeTable {
    objects: HashMap<usize, u32>,
    /// Keeps registered allocations alive so their addresses stay unique
    pinned: Vec<Value>,
    object_count: u32,
    strings: HashMap<Arc<str>, u32>,
    traits: HashMap<ClassDefinition, u32>,
    /// Write every composite inline, ignoring shared allocations
    inline_objects: bool,
}

impl EncodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that never emits object back-references
    ///
    /// Output then depends only on content, not on which values share an
    /// allocation. Strings and traits are still deduplicated by value.
    pub fn inline_objects() -> Self {
        Self {
            inline_objects: true,
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.pinned.clear();
        self.object_count = 0;
        self.strings.clear();
        self.traits.clear();
    }

    /// Register a composite value by identity
    ///
    /// Values without identity still consume an index, matching what the
    /// decoder appends for them.
    pub fn object(&mut self, value: &Value) -> Slot {
        if self.inline_objects {
            return Slot::New(self.reserve());
        }
        match value.identity() {
            Some(id) => {
                if let Some(idx) = self.objects.get(&id) {
                    return Slot::Existing(*idx);
                }
                let idx = self.reserve();
                self.objects.insert(id, idx);
                self.pinned.push(value.clone());
                Slot::New(idx)
            }
            None => Slot::New(self.reserve()),
        }
    }

    /// Consume an object index without an identity
    pub fn reserve(&mut self) -> u32 {
        let idx = self.object_count;
        self.object_count += 1;
        idx
    }

    /// Strings are deduplicated by value; the empty string is never indexed
    pub fn string(&mut self, s: &Arc<str>) -> Option<Slot> {
        if s.is_empty() {
            return None;
        }
        if let Some(idx) = self.strings.get(s) {
            return Some(Slot::Existing(*idx));
        }
        let idx = self.strings.len() as u32;
        self.strings.insert(s.clone(), idx);
        Some(Slot::New(idx))
    }

    pub fn class(&mut self, class: &ClassDefinition) -> Slot {
        if let Some(idx) = self.traits.get(class) {
            return Slot::Existing(*idx);
        }
        let idx = self.traits.len() as u32;
        self.traits.insert(class.clone(), idx);
        Slot::New(idx)
    }

    pub fn object_count(&self) -> u32 {
        self.object_count
    }
}

/// Decode-side table, filled in first-sight order
#[derive(Debug, Default)]
pub struct DecodeTable {
    /// `None` marks a value whose decoding has started but not finished
    objects: Vec<Option<Value>>,
    strings: Vec<Arc<str>>,
    traits: Vec<Arc<ClassDefinition>>,
}

impl DecodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.strings.clear();
        self.traits.clear();
    }

    /// Reserve an index for a composite value before its children are read
    pub fn begin_object(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len() - 1
    }

    pub fn finish_object(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.objects.get_mut(index) {
            *slot = Some(value);
        }
    }

    pub fn push_object(&mut self, value: Value) {
        self.objects.push(Some(value));
    }

    pub fn object(&self, index: u32) -> Result<Value, AmfError> {
        match self.objects.get(index as usize) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(AmfError::CyclicReference(index)),
            None => Err(AmfError::InvalidReference(index)),
        }
    }

    pub fn push_string(&mut self, s: Arc<str>) {
        self.strings.push(s);
    }

    pub fn string(&self, index: u32) -> Result<Arc<str>, AmfError> {
        self.strings
            .get(index as usize)
            .cloned()
            .ok_or(AmfError::InvalidReference(index))
    }

    pub fn push_class(&mut self, class: Arc<ClassDefinition>) {
        self.traits.push(class);
    }

    pub fn class(&self, index: u32) -> Result<Arc<ClassDefinition>, AmfError> {
        self.traits
            .get(index as usize)
            .cloned()
            .ok_or(AmfError::InvalidReference(index))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}
