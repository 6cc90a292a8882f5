//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format used by Flash Remoting.
//! Reference: AMF0 File Format Specification (amf0-file-format-specification.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x04 - MovieClip (reserved, not supported)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x07 - Reference (16-bit index)
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! 0x0E - RecordSet (reserved, not supported)
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (switch to AMF3)
//! ```
//!
//! AMF3-only values (byte arrays, vectors, externalizable objects) are
//! written through the AVM+ marker. The embedded AMF3 reference tables are
//! shared by every AVM+ value of the same message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{trace, warn};

use super::amf3::{Amf3Decoder, Amf3Encoder};
use super::class_def::ClassDefinition;
use super::fault::{Fault, ERROR_MESSAGE_CLASS};
use super::reference::{DecodeTable, EncodeTable, Slot};
use super::value::{AssocArray, Date, Object, Value};
use super::CodecContext;
use crate::error::AmfError;

// AMF0 type markers
const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;
const MARKER_AVMPLUS: u8 = 0x11;

/// AMF0 decoder
pub struct Amf0Decoder {
    /// Reference table for object references
    table: DecodeTable,
    /// Embedded AMF3 decoder for AVM+ values
    amf3: Amf3Decoder,
    ctx: CodecContext,
    /// Current nesting depth
    depth: usize,
}

impl Amf0Decoder {
    /// Create a new decoder over the default codec context
    pub fn new() -> Self {
        Self::with_context(CodecContext::default())
    }

    pub fn with_context(ctx: CodecContext) -> Self {
        Self {
            table: DecodeTable::new(),
            amf3: Amf3Decoder::with_context(ctx.clone()),
            ctx,
            depth: 0,
        }
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.table.clear();
        self.amf3.reset();
        self.depth = 0;
    }

    /// Decode a single AMF0 value from the buffer
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
        match marker {
            MARKER_NUMBER => {
                need(buf, 8)?;
                Ok(Value::Double(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                need(buf, 1)?;
                Ok(Value::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => Ok(Value::String(read_utf8(buf)?)),
            MARKER_LONG_STRING => Ok(Value::String(read_utf8_long(buf)?)),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_NULL => Ok(Value::Null),
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(Value::Undefined),
            MARKER_REFERENCE => {
                need(buf, 2)?;
                self.table.object(u32::from(buf.get_u16()))
            }
            MARKER_ECMA_ARRAY => self.decode_ecma_array(buf),
            MARKER_STRICT_ARRAY => self.decode_strict_array(buf),
            MARKER_DATE => {
                need(buf, 10)?;
                let millis = buf.get_f64();
                let timezone = buf.get_i16();
                Ok(Value::Date(Date { millis, timezone }))
            }
            MARKER_XML_DOCUMENT => Ok(Value::Xml(read_utf8_long(buf)?)),
            MARKER_TYPED_OBJECT => self.decode_typed_object(buf),
            MARKER_AVMPLUS => self.amf3.decode(buf),
            _ => {
                if self.ctx.config.lenient {
                    warn!(marker, "Skipping unknown AMF0 marker");
                    Ok(Value::Undefined)
                } else {
                    Err(AmfError::UnknownMarker(marker))
                }
            }
        }
    }

    /// Read key-value pairs up to the empty key and object end marker
    fn read_properties(&mut self, buf: &mut Bytes) -> Result<Vec<(Arc<str>, Value)>, AmfError> {
        let mut properties = Vec::new();
        loop {
            if buf.is_empty() && self.ctx.config.lenient {
                // Some peers stop without writing the end sequence
                break;
            }
            let key = read_utf8(buf)?;

            if key.is_empty() {
                let next = buf.first().copied();
                match next {
                    Some(MARKER_OBJECT_END) => {
                        buf.advance(1);
                        break;
                    }
                    _ if self.ctx.config.lenient => break,
                    Some(_) => return Err(AmfError::InvalidObjectEnd),
                    None => return Err(AmfError::UnexpectedEof),
                }
            }

            let value = self.decode(buf)?;
            properties.push((key, value));
        }
        Ok(properties)
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let index = self.table.begin_object();
        let properties = self.read_properties(buf)?;
        let value = Value::from(Object::anonymous(properties));
        self.table.finish_object(index, value.clone());
        Ok(value)
    }

    fn decode_typed_object(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        let class_name = read_utf8(buf)?;
        let index = self.table.begin_object();
        let (members, sealed): (Vec<Arc<str>>, Vec<Value>) =
            self.read_properties(buf)?.into_iter().unzip();
        trace!(class_name = %class_name, members = members.len(), "Decoded typed object");

        let class = Arc::new(ClassDefinition::new(class_name, members, false, false));
        let value = if class.name() == ERROR_MESSAGE_CLASS {
            let obj = Object::from_parts(class, sealed, Vec::new());
            match Fault::from_error_message(&obj) {
                Some(fault) => Value::from(fault),
                None => Value::from(obj),
            }
        } else {
            Value::from(self.ctx.accelerator.read_object(&class, sealed, Vec::new())?)
        };
        self.table.finish_object(index, value.clone());
        Ok(value)
    }

    fn decode_ecma_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        need(buf, 4)?;
        // Dense length of the array
        let dense_len = buf.get_u32() as usize;

        let index = self.table.begin_object();
        let mut map = AssocArray::new();
        for (key, value) in self.read_properties(buf)? {
            // Leading "0".."n-1" keys within the dense length form the dense part
            if map.entries.is_empty()
                && map.dense.len() < dense_len
                && key.parse::<usize>().ok() == Some(map.dense.len())
            {
                map.dense.push(value);
            } else {
                map.entries.push((key, value));
            }
        }

        let value = Value::from(map);
        self.table.finish_object(index, value.clone());
        Ok(value)
    }

    fn decode_strict_array(&mut self, buf: &mut Bytes) -> Result<Value, AmfError> {
        need(buf, 4)?;
        let count = buf.get_u32() as usize;

        let index = self.table.begin_object();
        let mut elements = Vec::with_capacity(count.min(1024)); // Cap initial allocation
        for _ in 0..count {
            elements.push(self.decode(buf)?);
        }

        let value = Value::from(elements);
        self.table.finish_object(index, value.clone());
        Ok(value)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
    table: EncodeTable,
    /// Embedded AMF3 encoder for AVM+ values
    amf3: Amf3Encoder,
    ctx: CodecContext,
    depth: usize,
}

impl Amf0Encoder {
    /// Create a new encoder over the default codec context
    pub fn new() -> Self {
        Self::with_context(CodecContext::default())
    }

    pub fn with_context(ctx: CodecContext) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            table: EncodeTable::new(),
            amf3: Amf3Encoder::with_context(ctx.clone()),
            ctx,
            depth: 0,
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.table.clear();
        self.amf3.reset();
        self.depth = 0;
        self.buf.split().freeze()
    }

    /// Drop buffered output and reference tables
    pub fn reset(&mut self) {
        self.buf.clear();
        self.table.clear();
        self.amf3.reset();
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

    /// Encode a single AMF0 value
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

    /// Switch to AMF3 for one value
    pub fn encode_avmplus(&mut self, value: &Value) -> Result<(), AmfError> {
        self.buf.put_u8(MARKER_AVMPLUS);
        self.amf3.encode(value)?;
        let bytes = self.amf3.take();
        self.buf.put_slice(&bytes);
        Ok(())
    }

    fn encode_value(&mut self, value: &Value) -> Result<(), AmfError> {
        match value {
            Value::Null => self.buf.put_u8(MARKER_NULL),
            Value::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            Value::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            Value::Double(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            Value::Integer(i) => {
                // AMF0 doesn't have integer type, encode as number
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(f64::from(*i));
            }
            Value::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.write_utf8_long(s)?;
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.write_utf8(s)?;
                }
            }
            Value::Date(date) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(date.millis);
                self.buf.put_i16(date.timezone);
            }
            Value::Xml(xml) => {
                self.buf.put_u8(MARKER_XML_DOCUMENT);
                self.write_utf8_long(xml)?;
            }
            Value::Array(items) => {
                if self.write_reference(value)? {
                    return Ok(());
                }
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(count(items.len())?);
                for item in items.iter() {
                    self.encode(item)?;
                }
            }
            Value::AssociativeArray(map) => {
                if self.write_reference(value)? {
                    return Ok(());
                }
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(count(map.dense.len())?);
                for (i, item) in map.dense.iter().enumerate() {
                    self.write_utf8(&i.to_string())?;
                    self.encode(item)?;
                }
                for (key, item) in &map.entries {
                    self.write_utf8(key)?;
                    self.encode(item)?;
                }
                self.write_object_end();
            }
            Value::Object(obj) => {
                if self.write_reference(value)? {
                    return Ok(());
                }
                self.write_object(obj)?;
            }
            Value::Fault(fault) => {
                if self.write_reference(value)? {
                    return Ok(());
                }
                let obj = if self.ctx.config.use_legacy_thrown_exception {
                    fault.to_legacy_status()
                } else {
                    fault.to_error_message()
                };
                self.write_object(&obj)?;
            }
            Value::ByteArray(_) | Value::Vector(_) | Value::Externalizable(_) => {
                self.encode_avmplus(value)?;
            }
        }
        Ok(())
    }

    /// Write a back-reference if the value was already written
    fn write_reference(&mut self, value: &Value) -> Result<bool, AmfError> {
        match self.table.object(value) {
            Slot::Existing(idx) => {
                let idx = u16::try_from(idx)
                    .map_err(|_| AmfError::OutOfRange(format!("reference {idx}")))?;
                self.buf.put_u8(MARKER_REFERENCE);
                self.buf.put_u16(idx);
                Ok(true)
            }
            Slot::New(_) => Ok(false),
        }
    }

    fn write_object(&mut self, obj: &Object) -> Result<(), AmfError> {
        match obj.type_name() {
            Some(type_name) => {
                self.buf.put_u8(MARKER_TYPED_OBJECT);
                self.write_utf8(type_name)?;
            }
            None => self.buf.put_u8(MARKER_OBJECT),
        }
        let shaped = self.ctx.accelerator.compiled_for_write(obj)?;
        for (key, value) in shaped.fields() {
            if key.is_empty() {
                warn!("Skipping object field with empty name");
                continue;
            }
            self.write_utf8(key)?;
            self.encode(value)?;
        }
        self.write_object_end();
        Ok(())
    }

    fn write_object_end(&mut self) {
        self.buf.put_u16(0); // Empty key
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) -> Result<(), AmfError> {
        let len = u16::try_from(s.len())
            .map_err(|_| AmfError::OutOfRange(format!("string length {}", s.len())))?;
        self.buf.put_u16(len);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    /// Write UTF-8 string with 32-bit length prefix (no type marker)
    fn write_utf8_long(&mut self, s: &str) -> Result<(), AmfError> {
        self.buf.put_u32(count(s.len())?);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn count(len: usize) -> Result<u32, AmfError> {
    u32::try_from(len).map_err(|_| AmfError::OutOfRange(format!("length {len}")))
}

fn need(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        return Err(AmfError::UnexpectedEof);
    }
    Ok(())
}

fn utf8(bytes: Bytes) -> Result<Arc<str>, AmfError> {
    std::str::from_utf8(&bytes)
        .map(Arc::from)
        .map_err(|_| AmfError::InvalidUtf8)
}

/// Read UTF-8 string with 16-bit length prefix
pub(crate) fn read_utf8(buf: &mut Bytes) -> Result<Arc<str>, AmfError> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    need(buf, len)?;
    utf8(buf.copy_to_bytes(len))
}

/// Read UTF-8 string with 32-bit length prefix
fn read_utf8_long(buf: &mut Bytes) -> Result<Arc<str>, AmfError> {
    need(buf, 4)?;
    let len = buf.get_u32() as usize;
    need(buf, len)?;
    utf8(buf.copy_to_bytes(len))
}

/// Convenience function to encode a single value
pub fn encode(value: &Value) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[Value]) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<Value, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<Value>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}
