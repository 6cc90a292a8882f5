//! AMF3 encoder and decoder
//!
//! AMF3 is the ActionScript 3.0 serialization format. Compared to AMF0 it
//! adds variable-length integers, string/object/traits reference tables,
//! sealed class shapes sent once per message, byte arrays and vectors.
//!
//! Type Markers:
//! ```text
//! 0x00 - Undefined
//! 0x01 - Null
//! 0x02 - False
//! 0x03 - True
//! 0x04 - Integer (U29, sign-extended from 29 bits)
//! 0x05 - Double
//! 0x06 - String
//! 0x07 - XML Document
//! 0x08 - Date
//! 0x09 - Array (associative part, then dense part)
//! 0x0A - Object
//! 0x0B - XML
//! 0x0C - ByteArray
//! 0x0D - Vector<int>
//! 0x0E - Vector<uint>
//! 0x0F - Vector<Number>
//! 0x10 - Vector<Object>
//! 0x11 - Dictionary
//! ```
//!
//! Associative arrays with keyed entries use the Array marker. One without
//! keyed entries would be indistinguishable from a dense Array there, so it is
//! written as a Dictionary keyed by dense index.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{trace, warn};

use super::class_def::ClassDefinition;
use super::externalizable::{DataInput, DataOutput, ARRAY_COLLECTION};
use super::fault::{Fault, ERROR_MESSAGE_CLASS};
use super::reference::{DecodeTable, EncodeTable, Slot};
use super::value::{AssocArray, Date, Object, Value, Vector, VectorItems};
use super::CodecContext;
use crate::error::AmfError;

// AMF3 type markers
const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_XML_DOCUMENT: u8 = 0x07;
const MARKER_DATE: u8 = 0x08;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;
const MARKER_XML: u8 = 0x0B;
const MARKER_BYTE_ARRAY: u8 = 0x0C;
const MARKER_VECTOR_INT: u8 = 0x0D;
const MARKER_VECTOR_UINT: u8 = 0x0E;
const MARKER_VECTOR_DOUBLE: u8 = 0x0F;
const MARKER_VECTOR_OBJECT: u8 = 0x10;
const MARKER_DICTIONARY: u8 = 0x11;

/// Range of integers representable as U29
const INTEGER_MIN: i32 = -(1 << 28);
const INTEGER_MAX: i32 = (1 << 28) - 1;
const U29_MAX: u32 = (1 << 29) - 1;

/// U29 handle of the empty string, also the end of an associative list
const EMPTY_STRING: u32 = 0x01;

/// AMF3 encoder
///
/// Reference tables live until [`finish`](Self::finish) or
/// [`reset`](Self::reset), so several values encoded in a row share them.
pub struct Amf3Encoder {
    buf: BytesMut,
    table: EncodeTable,
    ctx: CodecContext,
    depth: usize,
}

impl Amf3Encoder {
    /// Create a new encoder over the default codec context
    pub fn new() -> Self {
        Self::with_context(CodecContext::default())
    }

    pub fn with_context(ctx: CodecContext) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            table: EncodeTable::new(),
            ctx,
            depth: 0,
        }
    }

    /// Write shared composite values inline instead of as references
    pub fn without_object_references(mut self) -> Self {
        self.table = EncodeTable::inline_objects();
        self
    }

    pub fn context(&self) -> &CodecContext {
        &self.ctx
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.table.clear();
        self.depth = 0;
        self.buf.split().freeze()
    }

    /// Take the bytes written so far, keeping the reference tables
    pub(crate) fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Drop buffered output and reference tables
    pub fn reset(&mut self) {
        self.buf.clear();
        self.table.clear();
        self.depth = 0;
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Encode a single AMF3 value
    pub fn encode(&mut self, value: &Value) -> Result<(), AmfError> {
        self.depth += 1;
        if self.depth > self.ctx.config.max_depth {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }
        let result = self.encode_value(value);
        self.depth -= 1;
        result
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[Value]) -> Result<(), AmfError> {
        for value in values {
            self.encode(value)?;
        }
        Ok(())
    }

    fn encode_value(&mut self, value: &Value) -> Result<(), AmfError> {
        match value {
            Value::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            Value::Null => self.buf.put_u8(MARKER_NULL),
            Value::Boolean(b) => self.buf.put_u8(if *b { MARKER_TRUE } else { MARKER_FALSE }),
            Value::Integer(i) => {
                if (INTEGER_MIN..=INTEGER_MAX).contains(i) {
                    self.buf.put_u8(MARKER_INTEGER);
                    self.write_u29((*i as u32) & U29_MAX)?;
                } else {
                    // Outside the 29-bit range, fall back to a double
                    self.buf.put_u8(MARKER_DOUBLE);
                    self.buf.put_f64(f64::from(*i));
                }
            }
            Value::Double(n) => {
                self.buf.put_u8(MARKER_DOUBLE);
                self.buf.put_f64(*n);
            }
            Value::String(s) => {
                self.buf.put_u8(MARKER_STRING);
                self.write_string(s)?;
            }
            Value::Date(date) => {
                self.buf.put_u8(MARKER_DATE);
                self.table.reserve();
                self.write_u29(1)?;
                self.buf.put_f64(date.millis);
            }
            Value::Xml(xml) => {
                self.buf.put_u8(MARKER_XML);
                self.table.reserve();
                self.write_inline_bytes(xml.as_bytes())?;
            }
            Value::ByteArray(bytes) => {
                self.buf.put_u8(MARKER_BYTE_ARRAY);
                self.table.reserve();
                self.write_inline_bytes(bytes)?;
            }
            Value::Array(items) => {
                if self.ctx.config.use_legacy_collection {
                    self.write_array(value, items)?;
                } else {
                    self.write_collection(value, items)?;
                }
            }
            Value::AssociativeArray(map) if map.entries.is_empty() => {
                self.write_dictionary(value, map)?
            }
            Value::AssociativeArray(map) => self.write_assoc(value, map)?,
            Value::Vector(vector) => self.write_vector(value, vector)?,
            Value::Object(obj) => {
                self.buf.put_u8(MARKER_OBJECT);
                let slot = self.table.object(value);
                if !self.write_reference(slot)? {
                    self.write_object_body(obj)?;
                }
            }
            Value::Externalizable(ext) => {
                self.buf.put_u8(MARKER_OBJECT);
                let slot = self.table.object(value);
                if !self.write_reference(slot)? {
                    self.write_traits(&ClassDefinition::externalizable(ext.type_name()))?;
                    ext.write_external(&mut DataOutput::new(self))?;
                }
            }
            Value::Fault(fault) => {
                self.buf.put_u8(MARKER_OBJECT);
                let slot = self.table.object(value);
                if !self.write_reference(slot)? {
                    let obj = if self.ctx.config.use_legacy_thrown_exception {
                        fault.to_legacy_status()
                    } else {
                        fault.to_error_message()
                    };
                    self.write_object_body(&obj)?;
                }
            }
        }
        Ok(())
    }

    /// Write a back-reference for an existing slot; returns whether one was written
    fn write_reference(&mut self, slot: Slot) -> Result<bool, AmfError> {
        match slot {
            Slot::Existing(idx) => {
                self.write_u29(idx << 1)?;
                Ok(true)
            }
            Slot::New(_) => Ok(false),
        }
    }

    fn write_array(&mut self, value: &Value, items: &[Value]) -> Result<(), AmfError> {
        self.buf.put_u8(MARKER_ARRAY);
        let slot = self.table.object(value);
        if self.write_reference(slot)? {
            return Ok(());
        }
        self.write_length(items.len())?;
        self.write_u29(EMPTY_STRING)?;
        for item in items {
            self.encode(item)?;
        }
        Ok(())
    }

    /// Sequence wrapped in a `flex.messaging.io.ArrayCollection`
    fn write_collection(&mut self, value: &Value, items: &[Value]) -> Result<(), AmfError> {
        self.buf.put_u8(MARKER_OBJECT);
        self.table.reserve();
        self.write_traits(&ClassDefinition::externalizable(ARRAY_COLLECTION))?;
        self.write_array(value, items)
    }

    fn write_assoc(&mut self, value: &Value, map: &AssocArray) -> Result<(), AmfError> {
        self.buf.put_u8(MARKER_ARRAY);
        let slot = self.table.object(value);
        if self.write_reference(slot)? {
            return Ok(());
        }
        self.write_length(map.dense.len())?;
        for (key, item) in &map.entries {
            if key.is_empty() {
                warn!("Skipping associative entry with empty key");
                continue;
            }
            self.write_string(key)?;
            self.encode(item)?;
        }
        self.write_u29(EMPTY_STRING)?;
        for item in &map.dense {
            self.encode(item)?;
        }
        Ok(())
    }

    fn write_dictionary(&mut self, value: &Value, map: &AssocArray) -> Result<(), AmfError> {
        self.buf.put_u8(MARKER_DICTIONARY);
        let slot = self.table.object(value);
        if self.write_reference(slot)? {
            return Ok(());
        }
        self.write_length(map.dense.len())?;
        // Strong keys
        self.buf.put_u8(0);
        for (i, item) in map.dense.iter().enumerate() {
            let key = i32::try_from(i)
                .map_err(|_| AmfError::OutOfRange(format!("dictionary index {i}")))?;
            self.encode(&Value::Integer(key))?;
            self.encode(item)?;
        }
        Ok(())
    }

    fn write_vector(&mut self, value: &Value, vector: &Vector) -> Result<(), AmfError> {
        let marker = match &vector.items {
            VectorItems::Int(_) => MARKER_VECTOR_INT,
            VectorItems::Uint(_) => MARKER_VECTOR_UINT,
            VectorItems::Double(_) => MARKER_VECTOR_DOUBLE,
            VectorItems::Object { .. } => MARKER_VECTOR_OBJECT,
        };
        self.buf.put_u8(marker);
        let slot = self.table.object(value);
        if self.write_reference(slot)? {
            return Ok(());
        }
        self.write_length(vector.items.len())?;
        self.buf.put_u8(u8::from(vector.fixed));
        match &vector.items {
            VectorItems::Int(items) => items.iter().for_each(|i| self.buf.put_i32(*i)),
            VectorItems::Uint(items) => items.iter().for_each(|u| self.buf.put_u32(*u)),
            VectorItems::Double(items) => items.iter().for_each(|n| self.buf.put_f64(*n)),
            VectorItems::Object { type_name, items } => {
                self.write_string(type_name)?;
                for item in items {
                    self.encode(item)?;
                }
            }
        }
        Ok(())
    }

    fn write_object_body(&mut self, obj: &Object) -> Result<(), AmfError> {
        let shaped = self.ctx.accelerator.compiled_for_write(obj)?;
        let class = shaped.class().clone();
        self.write_traits(&class)?;
        for value in shaped.sealed_values() {
            self.encode(value)?;
        }
        if class.is_dynamic() {
            for (key, value) in shaped.dynamic_fields() {
                if key.is_empty() {
                    warn!(type_name = class.name(), "Skipping dynamic field with empty name");
                    continue;
                }
                self.write_string(key)?;
                self.encode(value)?;
            }
            self.write_u29(EMPTY_STRING)?;
        }
        Ok(())
    }

    fn write_traits(&mut self, class: &ClassDefinition) -> Result<(), AmfError> {
        match self.table.class(class) {
            Slot::Existing(idx) => self.write_u29((idx << 2) | 1),
            Slot::New(_) => {
                let header = traits_header(
                    class.member_count(),
                    class.is_dynamic(),
                    class.is_externalizable(),
                )?;
                self.write_u29(header)?;
                self.write_string(class.name_arc())?;
                for member in class.members() {
                    self.write_string(member)?;
                }
                Ok(())
            }
        }
    }

    fn write_string(&mut self, s: &Arc<str>) -> Result<(), AmfError> {
        match self.table.string(s) {
            None => self.write_u29(EMPTY_STRING),
            Some(Slot::Existing(idx)) => self.write_u29(idx << 1),
            Some(Slot::New(_)) => self.write_inline_bytes(s.as_bytes()),
        }
    }

    fn write_inline_bytes(&mut self, bytes: &[u8]) -> Result<(), AmfError> {
        self.write_length(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Inline handle: length shifted left with the low bit set
    fn write_length(&mut self, len: usize) -> Result<(), AmfError> {
        let len = u32::try_from(len)
            .ok()
            .filter(|l| *l <= U29_MAX >> 1)
            .ok_or_else(|| AmfError::OutOfRange(format!("length {len}")))?;
        self.write_u29((len << 1) | 1)
    }

    /// Write a variable-length 29-bit unsigned integer
    fn write_u29(&mut self, v: u32) -> Result<(), AmfError> {
        if v > U29_MAX {
            return Err(AmfError::OutOfRange(format!("U29 value {v}")));
        }
        if v < 0x80 {
            self.buf.put_u8(v as u8);
        } else if v < 0x4000 {
            self.buf.put_u8(((v >> 7) | 0x80) as u8);
            self.buf.put_u8((v & 0x7F) as u8);
        } else if v < 0x20_0000 {
            self.buf.put_u8(((v >> 14) | 0x80) as u8);
            self.buf.put_u8((((v >> 7) & 0x7F) | 0x80) as u8);
            self.buf.put_u8((v & 0x7F) as u8);
        } else {
            self.buf.put_u8(((v >> 22) | 0x80) as u8);
            self.buf.put_u8((((v >> 15) & 0x7F) | 0x80) as u8);
            self.buf.put_u8((((v >> 8) & 0x7F) | 0x80) as u8);
            self.buf.put_u8((v & 0xFF) as u8);
        }
        Ok(())
    }
}

impl Default for Amf3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF3 decoder
pub struct Amf3Decoder {
    table: DecodeTable,
    ctx: CodecContext,
    depth: usize,
}

impl Amf3Decoder {
    /// Create a new decoder over the default codec context
    pub fn new() -> Self {
        Self::with_context(CodecContext::default())
    }

    pub fn with_context(ctx: CodecContext) -> Self {
        Self {
            table: DecodeTable::new(),
            ctx,
            depth: 0,
        }
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.table.clear();
        self.depth = 0;
    }

    /// Decode a single AMF3 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > self.ctx.config.max_depth {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<Value>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<Value, AmfError> {
        trace!(marker, "Decoding AMF3 value");
        match marker {
            MARKER_UNDEFINED => Ok(Value::Undefined),
            MARKER_NULL => Ok(Value::Null),
            MARKER_FALSE => Ok(Value::Boolean(false)),
            MARKER_TRUE => Ok(Value::Boolean(true)),
            MARKER_INTEGER => self.decode_integer(buf),
            MARKER_DOUBLE => {
                need(buf, 8)?;
                Ok(Value::Double(buf.get_f64()))
            }
            MARKER_STRING => Ok(Value::String(self.read_string(buf)?)),
            MARKER_XML_DOCUMENT | MARKER_XML => self.decode_xml(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_ARRAY => self.decode_array(buf),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_BYTE_ARRAY => self.decode_byte_array(buf),
            MARKER_VECTOR_INT | MARKER_VECTOR_UINT | MARKER_VECTOR_DOUBLE
            | MARKER_VECTOR_OBJECT => self.decode_vector(marker, buf),
            MARKER_DICTIONARY => self.decode_dictionary(buf),
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    fn decode_integer(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let raw = read_u29(buf)?;
        // Sign-extend from 29 bits
        let value = if raw & 0x1000_0000 != 0 {
            (raw | 0xE000_0000) as i32
        } else {
            raw as i32
        };
        Ok(Value::Integer(value))
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.object(handle >> 1);
        }
        need(buf, 8)?;
        let value = Value::Date(Date::from_millis(buf.get_f64()));
        self.table.push_object(value.clone());
        Ok(value)
    }

    fn decode_xml(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.object(handle >> 1);
        }
        let bytes = read_bytes(buf, (handle >> 1) as usize)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| AmfError::InvalidUtf8)?;
        let value = Value::Xml(text.into());
        self.table.push_object(value.clone());
        Ok(value)
    }

    fn decode_byte_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.object(handle >> 1);
        }
        let value = Value::ByteArray(read_bytes(buf, (handle >> 1) as usize)?);
        self.table.push_object(value.clone());
        Ok(value)
    }

    fn decode_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.object(handle >> 1);
        }
        let len = (handle >> 1) as usize;
        let index = self.table.begin_object();

        let mut entries = Vec::new();
        loop {
            let key = self.read_string(buf)?;
            if key.is_empty() {
                break;
            }
            let value = self.decode(buf)?;
            entries.push((key, value));
        }

        let mut dense = Vec::with_capacity(len.min(1024)); // Cap initial allocation
        for _ in 0..len {
            dense.push(self.decode(buf)?);
        }

        let value = if entries.is_empty() {
            Value::Array(Arc::new(dense))
        } else {
            Value::from(AssocArray { dense, entries })
        };
        self.table.finish_object(index, value.clone());
        Ok(value)
    }

    fn decode_dictionary(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.object(handle >> 1);
        }
        let len = (handle >> 1) as usize;
        need(buf, 1)?;
        // Weak-keys flag has no meaning outside the player
        let _weak = buf.get_u8();
        let index = self.table.begin_object();

        let mut map = AssocArray::new();
        for _ in 0..len {
            let key = self.decode(buf)?;
            let value = self.decode(buf)?;
            match key {
                Value::Integer(i)
                    if map.entries.is_empty() && usize::try_from(i).ok() == Some(map.dense.len()) =>
                {
                    map.dense.push(value)
                }
                Value::Integer(i) => map.entries.push((i.to_string().into(), value)),
                Value::Double(d) => map.entries.push((d.to_string().into(), value)),
                Value::String(s) => map.entries.push((s, value)),
                other => {
                    return Err(AmfError::OutOfRange(format!(
                        "dictionary key {}",
                        other.kind_name()
                    )))
                }
            }
        }

        let value = Value::from(map);
        self.table.finish_object(index, value.clone());
        Ok(value)
    }

    fn decode_vector(&mut self, marker: u8, buf: &mut Bytes) -> Result<Value, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.object(handle >> 1);
        }
        let len = (handle >> 1) as usize;
        need(buf, 1)?;
        let fixed = buf.get_u8() != 0;
        let index = self.table.begin_object();

        let items = match marker {
            MARKER_VECTOR_INT => {
                need(buf, len * 4)?;
                VectorItems::Int((0..len).map(|_| buf.get_i32()).collect())
            }
            MARKER_VECTOR_UINT => {
                need(buf, len * 4)?;
                VectorItems::Uint((0..len).map(|_| buf.get_u32()).collect())
            }
            MARKER_VECTOR_DOUBLE => {
                need(buf, len * 8)?;
                VectorItems::Double((0..len).map(|_| buf.get_f64()).collect())
            }
            _ => {
                let type_name = self.read_string(buf)?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode(buf)?);
                }
                VectorItems::Object { type_name, items }
            }
        };

        let value = Value::from(Vector { fixed, items });
        self.table.finish_object(index, value.clone());
        Ok(value)
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.object(handle >> 1);
        }

        let class = if handle & 0x02 == 0 {
            self.table.class(handle >> 2)?
        } else {
            let externalizable = handle & 0x04 != 0;
            let dynamic = handle & 0x08 != 0;
            let count = (handle >> 4) as usize;
            let name = self.read_string(buf)?;
            let mut members = Vec::with_capacity(count.min(256));
            for _ in 0..count {
                members.push(self.read_string(buf)?);
            }
            let class = Arc::new(ClassDefinition::new(name, members, externalizable, dynamic));
            self.table.push_class(class.clone());
            class
        };

        let index = self.table.begin_object();
        let value = if class.is_externalizable() {
            self.read_external(&class, buf)?
        } else {
            let mut sealed = Vec::with_capacity(class.member_count());
            for _ in 0..class.member_count() {
                sealed.push(self.decode(buf)?);
            }
            let mut dynamic = Vec::new();
            if class.is_dynamic() {
                loop {
                    let key = self.read_string(buf)?;
                    if key.is_empty() {
                        break;
                    }
                    let value = self.decode(buf)?;
                    dynamic.push((key, value));
                }
            }
            self.build_object(class, sealed, dynamic)?
        };
        self.table.finish_object(index, value.clone());
        Ok(value)
    }

    fn read_external(
        &mut self,
        class: &ClassDefinition,
        buf: &mut Bytes,
    ) -> Result<Value, AmfError> {
        let reader = self
            .ctx
            .externals
            .get(class.name())
            .ok_or_else(|| AmfError::UnknownExternalizable(class.name().to_string()))?;
        let mut input = DataInput::new(self, buf);
        reader.read_external(class.name(), &mut input)
    }

    fn build_object(
        &self,
        class: Arc<ClassDefinition>,
        sealed: Vec<Value>,
        dynamic: Vec<(Arc<str>, Value)>,
    ) -> Result<Value, AmfError> {
        if class.name() == ERROR_MESSAGE_CLASS {
            let obj = Object::from_parts(class, sealed, dynamic);
            return Ok(match Fault::from_error_message(&obj) {
                Some(fault) => Value::from(fault),
                None => Value::from(obj),
            });
        }
        if class.is_typed() {
            let obj = self.ctx.accelerator.read_object(&class, sealed, dynamic)?;
            return Ok(Value::from(obj));
        }
        Ok(Value::from(Object::from_parts(class, sealed, dynamic)))
    }

    /// Read a string, inline or by reference
    fn read_string(&mut self, buf: &mut Bytes) -> Result<Arc<str>, AmfError> {
        let handle = read_u29(buf)?;
        if handle & 1 == 0 {
            return self.table.string(handle >> 1);
        }
        let len = (handle >> 1) as usize;
        if len == 0 {
            return Ok(Arc::from(""));
        }
        let bytes = read_bytes(buf, len)?;
        let s: Arc<str> = std::str::from_utf8(&bytes)
            .map_err(|_| AmfError::InvalidUtf8)?
            .into();
        self.table.push_string(s.clone());
        Ok(s)
    }
}

impl Default for Amf3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        return Err(AmfError::UnexpectedEof);
    }
    Ok(())
}

fn read_bytes(buf: &mut Bytes, len: usize) -> Result<Bytes, AmfError> {
    need(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Read a variable-length 29-bit unsigned integer
/// Inline traits header: member count, dynamic and externalizable flags
fn traits_header(count: usize, dynamic: bool, externalizable: bool) -> Result<u32, AmfError> {
    let count = u32::try_from(count)
        .ok()
        .filter(|c| *c <= U29_MAX >> 4)
        .ok_or_else(|| AmfError::OutOfRange(format!("member count {count}")))?;
    Ok((count << 4) | (u32::from(dynamic) << 3) | (u32::from(externalizable) << 2) | 0x03)
}

fn read_u29(buf: &mut Bytes) -> Result<u32, AmfError> {
    let mut result: u32 = 0;
    for _ in 0..3 {
        need(buf, 1)?;
        let byte = buf.get_u8();
        result = (result << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    // The fourth byte carries a full 8 bits
    need(buf, 1)?;
    Ok((result << 8) | u32::from(buf.get_u8()))
}

/// Convenience function to encode a single value
pub fn encode(value: &Value) -> Result<Bytes, AmfError> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<Value, AmfError> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<Value>, AmfError> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::{Accelerator, MemberKind, TypeDescriptor, TypeRegistry};
    use crate::amf::externalizable::{Externalizable, ExternalizableRegistry};
    use crate::config::{CodecConfig, CompilerStrategy};
    use std::any::Any;

    fn roundtrip(value: &Value) -> Value {
        let encoded = encode(value).unwrap();
        decode(&encoded).unwrap()
    }

    fn foo_context(strategy: CompilerStrategy) -> CodecContext {
        let registry = Arc::new(TypeRegistry::new());
        registry.register(
            TypeDescriptor::new("Foo")
                .member("a", MemberKind::Integer)
                .member("b", MemberKind::String),
        );
        CodecContext::default().with_accelerator(Arc::new(Accelerator::new(registry, strategy)))
    }

    #[test]
    fn test_integer_encoding() {
        let cases: [(i32, &[u8]); 7] = [
            (0, &[0x04, 0x00]),
            (127, &[0x04, 0x7F]),
            (128, &[0x04, 0x81, 0x00]),
            (0x3FFF, &[0x04, 0xFF, 0x7F]),
            (0x4000, &[0x04, 0x81, 0x80, 0x00]),
            (0x20_0000, &[0x04, 0x80, 0xC0, 0x80, 0x00]),
            (-1, &[0x04, 0xFF, 0xFF, 0xFF, 0xFF]),
        ];
        for (n, bytes) in cases {
            assert_eq!(encode(&Value::Integer(n)).unwrap().as_ref(), bytes, "{n}");
            assert_eq!(decode(bytes).unwrap(), Value::Integer(n));
        }
    }

    #[test]
    fn test_integer_range_boundaries() {
        assert_eq!(roundtrip(&Value::Integer(INTEGER_MIN)), Value::Integer(INTEGER_MIN));
        assert_eq!(roundtrip(&Value::Integer(INTEGER_MAX)), Value::Integer(INTEGER_MAX));

        let encoded = encode(&Value::Integer(INTEGER_MAX + 1)).unwrap();
        assert_eq!(encoded[0], MARKER_DOUBLE);
        assert_eq!(decode(&encoded).unwrap(), Value::Double(f64::from(INTEGER_MAX + 1)));
    }

    #[test]
    fn test_string_references() {
        let value = Value::from(vec!["abc", "abc", ""]);
        let encoded = encode(&value).unwrap();
        assert_eq!(
            encoded.as_ref(),
            &[0x09, 0x07, 0x01, 0x06, 0x07, b'a', b'b', b'c', 0x06, 0x00, 0x06, 0x01]
        );
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_shared_object_written_once() {
        let obj = Value::from(Object::anonymous([("a", 1)]));
        let value = Value::from(vec![obj.clone(), obj]);
        let encoded = encode(&value).unwrap();
        assert_eq!(
            encoded.as_ref(),
            &[0x09, 0x05, 0x01, 0x0A, 0x0B, 0x01, 0x03, b'a', 0x04, 0x01, 0x01, 0x0A, 0x02]
        );

        let decoded = decode(&encoded).unwrap();
        let items = decoded.as_array().unwrap();
        assert_eq!(items[0], items[1]);
        assert_eq!(items[0].identity(), items[1].identity());
    }

    #[test]
    fn test_traits_reference() {
        let value = Value::from(vec![
            Value::from(Object::anonymous([("a", 1)])),
            Value::from(Object::anonymous([("a", 2)])),
        ]);
        let encoded = encode(&value).unwrap();
        // Second object: traits reference 0, then key "a" by string reference
        assert!(encoded.ends_with(&[0x0A, 0x01, 0x00, 0x04, 0x02, 0x01]));
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_assoc_array_keeps_its_layout() {
        let empty = Value::from(AssocArray::new());
        let encoded = encode(&empty).unwrap();
        assert_eq!(&encoded[..], &[MARKER_DICTIONARY, 0x01, 0x00]);
        assert_eq!(decode(&encoded).unwrap(), empty);

        let mut dense = AssocArray::new();
        dense.dense.push(Value::from("a"));
        dense.dense.push(Value::Integer(2));
        let dense = Value::from(dense);
        assert_eq!(roundtrip(&dense), dense);

        let mut numeric = AssocArray::new();
        numeric.insert("0", "x");
        numeric.insert("1", "y");
        let numeric = Value::from(numeric);
        let decoded = roundtrip(&numeric);
        assert_eq!(decoded, numeric);
        assert!(decoded.as_assoc().unwrap().dense.is_empty());

        // Plain arrays keep the Array marker
        let array = Value::from(vec![Value::from("a")]);
        assert_eq!(encode(&array).unwrap()[0], MARKER_ARRAY);
        assert_eq!(roundtrip(&array), array);
    }

    #[test]
    fn test_dictionary_reference() {
        let map = Value::from(AssocArray::new());
        let value = Value::from(vec![map.clone(), map]);
        let decoded = roundtrip(&value);
        let items = decoded.as_array().unwrap();
        assert_eq!(items[0].identity(), items[1].identity());
    }

    #[test]
    fn test_nested_roundtrip() {
        let mut map = AssocArray::new();
        map.dense.push(Value::from("first"));
        map.insert("key", Value::from(vec![Value::Double(1.5), Value::Null]));

        let inner = Object::anonymous([
            ("map", Value::from(map)),
            ("when", Value::Date(Date::from_millis(1_700_000_000_000.0))),
        ]);
        let value = Value::from(vec![Value::from(vec![Value::from(inner)]), Value::Undefined]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_binary_values_roundtrip() {
        let values = [
            Value::ByteArray(Bytes::from_static(&[0, 1, 2, 255])),
            Value::Xml("<a b=\"1\"/>".into()),
            Value::from(Vector {
                fixed: true,
                items: VectorItems::Int(vec![-1, 0, i32::MAX]),
            }),
            Value::from(Vector {
                fixed: false,
                items: VectorItems::Uint(vec![0, u32::MAX]),
            }),
            Value::from(Vector {
                fixed: false,
                items: VectorItems::Double(vec![0.5, -2.25]),
            }),
            Value::from(Vector {
                fixed: false,
                items: VectorItems::Object {
                    type_name: "".into(),
                    items: vec![Value::from("x"), Value::Integer(3)],
                },
            }),
        ];
        for value in &values {
            assert_eq!(&roundtrip(value), value);
        }
    }

    #[test]
    fn test_repeated_date_uses_reference() {
        let date = Value::Date(Date::from_millis(5.0));
        let value = Value::from(vec![date.clone(), date]);
        let encoded = encode(&value).unwrap();
        // Dates have no identity, so both are inline but each takes an index
        assert_eq!(encoded.iter().filter(|b| **b == MARKER_DATE).count(), 2);
        assert_eq!(decode(&encoded).unwrap(), value);

        // Hand-built reference to the date at index 1
        let bytes = [
            0x09, 0x05, 0x01, 0x08, 0x01, 0x40, 0x14, 0, 0, 0, 0, 0, 0, 0x08, 0x02,
        ];
        let decoded = decode(&bytes).unwrap();
        let items = decoded.as_array().unwrap();
        assert_eq!(items[0], items[1]);
    }

    #[test]
    fn test_typed_object_idempotent_roundtrip() {
        for strategy in [CompilerStrategy::Plan, CompilerStrategy::Emit] {
            let ctx = foo_context(strategy);
            let value = Value::from(Object::typed("Foo", [("a", Value::from(1)), ("b", "x".into())]));

            let mut encoder = Amf3Encoder::with_context(ctx.clone());
            encoder.encode(&value).unwrap();
            let first = encoder.finish();

            let mut decoder = Amf3Decoder::with_context(ctx.clone());
            let decoded = decoder.decode(&mut first.clone()).unwrap();
            let obj = decoded.as_object().unwrap();
            assert_eq!(obj.type_name(), Some("Foo"));
            assert_eq!(obj.get("a"), Some(&Value::Integer(1)));
            assert_eq!(obj.get("b"), Some(&Value::from("x")));

            encoder.encode(&decoded).unwrap();
            assert_eq!(encoder.finish(), first);
        }
    }

    #[test]
    fn test_unknown_type_keeps_fields() {
        let value = Value::from(Object::typed(
            "com.example.Unregistered",
            [("id", Value::from(7)), ("label", "seven".into())],
        ));
        let decoded = roundtrip(&value);
        let obj = decoded.as_object().unwrap();
        assert_eq!(obj.type_name(), Some("com.example.Unregistered"));
        assert_eq!(obj.get("id"), Some(&Value::Integer(7)));
        assert_eq!(obj.get("label"), Some(&Value::from("seven")));
    }

    #[test]
    fn test_collection_mode() {
        let ctx = CodecContext::new(CodecConfig::flex());
        let value = Value::from(vec![Value::from(1), Value::from(vec![2])]);

        let mut encoder = Amf3Encoder::with_context(ctx.clone());
        encoder.encode(&value).unwrap();
        let encoded = encoder.finish();
        assert_eq!(&encoded[..2], &[MARKER_OBJECT, 0x07]);

        let mut decoder = Amf3Decoder::with_context(ctx);
        assert_eq!(decoder.decode(&mut encoded.clone()).unwrap(), value);
        // The legacy decoder reads the same bytes
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_fault_shapes() {
        let fault = Value::from(Fault::new("boom").with_code("App.Error"));
        assert_eq!(roundtrip(&fault), fault);

        let ctx = CodecContext::new(CodecConfig::legacy());
        let mut encoder = Amf3Encoder::with_context(ctx);
        encoder.encode(&fault).unwrap();
        let decoded = decode(&encoder.finish()).unwrap();
        assert_eq!(decoded.get_str("level"), Some("error"));
        assert_eq!(decoded.get_str("code"), Some("App.Error"));
        assert_eq!(decoded.get_str("description"), Some("boom"));
    }

    struct Point {
        x: i32,
        y: i32,
    }

    impl Externalizable for Point {
        fn type_name(&self) -> &str {
            "geo.Point"
        }

        fn write_external(&self, output: &mut DataOutput<'_>) -> Result<(), AmfError> {
            output.write_i32(self.x);
            output.write_i32(self.y);
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_custom_externalizable() {
        let registry = Arc::new(ExternalizableRegistry::new());
        registry.register_fn("geo.Point", |_, input| {
            let x = input.read_i32()?;
            let y = input.read_i32()?;
            Ok(Value::Externalizable(Arc::new(Point { x, y })))
        });
        let ctx = CodecContext::default().with_externals(registry);

        let value = Value::Externalizable(Arc::new(Point { x: 3, y: -4 }));
        let mut encoder = Amf3Encoder::with_context(ctx.clone());
        encoder.encode(&value).unwrap();
        let encoded = encoder.finish();

        let mut decoder = Amf3Decoder::with_context(ctx);
        let decoded = decoder.decode(&mut encoded.clone()).unwrap();
        assert_eq!(decoded, value);

        // Without a reader the payload extent is unknown
        assert_eq!(
            decode(&encoded),
            Err(AmfError::UnknownExternalizable("geo.Point".into()))
        );
    }

    #[test]
    fn test_traits_header_limits() {
        assert_eq!(traits_header(2, true, false), Ok(0x2B));
        assert_eq!(traits_header(0, false, true), Ok(0x07));
        let max = (U29_MAX >> 4) as usize;
        assert!(traits_header(max, false, false).is_ok());
        assert_eq!(
            traits_header(max + 1, false, false),
            Err(AmfError::OutOfRange(format!("member count {}", max + 1)))
        );
        assert!(traits_header(1 << 28, false, false).is_err());
    }

    #[test]
    fn test_protocol_errors() {
        assert_eq!(
            decode(&[MARKER_DICTIONARY, 0x03, 0x00, MARKER_NULL, MARKER_NULL]),
            Err(AmfError::OutOfRange("dictionary key Null".into()))
        );
        assert_eq!(decode(&[0x20]), Err(AmfError::UnknownMarker(0x20)));
        assert_eq!(decode(&[MARKER_ARRAY, 0x00]), Err(AmfError::InvalidReference(0)));
        assert_eq!(
            decode(&[MARKER_ARRAY, 0x03, 0x01, MARKER_ARRAY, 0x00]),
            Err(AmfError::CyclicReference(0))
        );
        assert_eq!(decode(&[MARKER_STRING, 0x07, b'a']), Err(AmfError::UnexpectedEof));
        assert_eq!(decode(&[MARKER_STRING, 0x03, 0xFF]), Err(AmfError::InvalidUtf8));
        assert_eq!(decode(&[]), Err(AmfError::UnexpectedEof));
    }

    #[test]
    fn test_nesting_limit() {
        let ctx = CodecContext::new(CodecConfig {
            max_depth: 3,
            ..CodecConfig::default()
        });
        let deep = Value::from(vec![Value::from(vec![Value::from(vec![Value::from(vec![1])])])]);

        let mut encoder = Amf3Encoder::with_context(ctx.clone());
        assert_eq!(encoder.encode(&deep), Err(AmfError::NestingTooDeep));

        let encoded = encode(&deep).unwrap();
        let mut decoder = Amf3Decoder::with_context(ctx);
        assert_eq!(
            decoder.decode(&mut encoded.clone()),
            Err(AmfError::NestingTooDeep)
        );
    }
}
