//! Externalizable values
//!
//! An externalizable type owns its payload: the codec writes the traits
//! header and then hands the stream to the type. Reading requires a reader
//! registered for the type identifier, since the payload extent is only
//! known to the type itself.

use bytes::{Buf, BufMut, Bytes};
use dashmap::DashMap;
use std::any::Any;
use std::sync::{Arc, OnceLock};

use super::amf3::{Amf3Decoder, Amf3Encoder};
use super::value::Value;
use crate::error::AmfError;

pub const ARRAY_COLLECTION: &str = "flex.messaging.io.ArrayCollection";
pub const ARRAY_LIST: &str = "flex.messaging.io.ArrayList";
pub const OBJECT_PROXY: &str = "flex.messaging.io.ObjectProxy";

/// A value that serializes its own payload
pub trait Externalizable: Send + Sync + 'static {
    /// Type identifier written in the traits header
    fn type_name(&self) -> &str;

    fn write_external(&self, output: &mut DataOutput<'_>) -> Result<(), AmfError>;

    fn as_any(&self) -> &dyn Any;
}

/// Two externalizable values are equal when they have the same type
/// identifier and produce the same standalone payload
pub(crate) fn externals_equal(a: &dyn Externalizable, b: &dyn Externalizable) -> bool {
    if a.type_name() != b.type_name() {
        return false;
    }
    match (standalone_payload(a), standalone_payload(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

fn standalone_payload(value: &dyn Externalizable) -> Result<Bytes, AmfError> {
    let mut encoder = Amf3Encoder::new();
    value.write_external(&mut DataOutput::new(&mut encoder))?;
    Ok(encoder.finish())
}

/// Output stream handed to [`Externalizable::write_external`]
pub struct DataOutput<'a> {
    encoder: &'a mut Amf3Encoder,
}

impl<'a> DataOutput<'a> {
    pub(crate) fn new(encoder: &'a mut Amf3Encoder) -> Self {
        Self { encoder }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.encoder.buf_mut().put_u8(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    pub fn write_i16(&mut self, v: i16) {
        self.encoder.buf_mut().put_i16(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.encoder.buf_mut().put_u16(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.encoder.buf_mut().put_i32(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.encoder.buf_mut().put_u32(v);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.encoder.buf_mut().put_f32(v);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.encoder.buf_mut().put_f64(v);
    }

    /// UTF-8 string with a 16-bit length prefix
    pub fn write_utf(&mut self, s: &str) -> Result<(), AmfError> {
        let len = u16::try_from(s.len())
            .map_err(|_| AmfError::OutOfRange(format!("UTF string of {} bytes", s.len())))?;
        self.write_u16(len);
        self.encoder.buf_mut().put_slice(s.as_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.encoder.buf_mut().put_slice(bytes);
    }

    /// Nested AMF3 value sharing the enclosing reference tables
    pub fn write_object(&mut self, value: &Value) -> Result<(), AmfError> {
        self.encoder.encode(value)
    }
}

/// Input stream handed to an [`ExternalizableReader`]
pub struct DataInput<'a> {
    decoder: &'a mut Amf3Decoder,
    buf: &'a mut Bytes,
}

impl<'a> DataInput<'a> {
    pub(crate) fn new(decoder: &'a mut Amf3Decoder, buf: &'a mut Bytes) -> Self {
        Self { decoder, buf }
    }

    fn need(&self, n: usize) -> Result<(), AmfError> {
        if self.buf.remaining() < n {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn read_u8(&mut self) -> Result<u8, AmfError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, AmfError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, AmfError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_u16(&mut self) -> Result<u16, AmfError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i32(&mut self) -> Result<i32, AmfError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_u32(&mut self) -> Result<u32, AmfError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_f32(&mut self) -> Result<f32, AmfError> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64, AmfError> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    pub fn read_utf(&mut self) -> Result<String, AmfError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, AmfError> {
        self.need(len)?;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Nested AMF3 value sharing the enclosing reference tables
    pub fn read_object(&mut self) -> Result<Value, AmfError> {
        self.decoder.decode(self.buf)
    }
}

/// Reads the payload of one externalizable type
pub trait ExternalizableReader: Send + Sync {
    fn read_external(&self, type_name: &str, input: &mut DataInput<'_>)
        -> Result<Value, AmfError>;
}

impl<F> ExternalizableReader for F
where
    F: Fn(&str, &mut DataInput<'_>) -> Result<Value, AmfError> + Send + Sync,
{
    fn read_external(
        &self,
        type_name: &str,
        input: &mut DataInput<'_>,
    ) -> Result<Value, AmfError> {
        self(type_name, input)
    }
}

/// Collection wrappers carry their source array as the only payload
struct WrappedValue;

impl ExternalizableReader for WrappedValue {
    fn read_external(
        &self,
        _type_name: &str,
        input: &mut DataInput<'_>,
    ) -> Result<Value, AmfError> {
        input.read_object()
    }
}

/// Readers keyed by type identifier
pub struct ExternalizableRegistry {
    readers: DashMap<Arc<str>, Arc<dyn ExternalizableReader>>,
}

impl ExternalizableRegistry {
    /// Registry with no readers at all
    pub fn empty() -> Self {
        Self {
            readers: DashMap::new(),
        }
    }

    /// Registry with the Flex collection and proxy wrappers
    pub fn new() -> Self {
        let registry = Self::empty();
        for name in [ARRAY_COLLECTION, ARRAY_LIST, OBJECT_PROXY] {
            registry.register(name, WrappedValue);
        }
        registry
    }

    pub fn global() -> Arc<ExternalizableRegistry> {
        static GLOBAL: OnceLock<Arc<ExternalizableRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(ExternalizableRegistry::new()))
            .clone()
    }

    pub fn register(&self, type_name: &str, reader: impl ExternalizableReader + 'static) {
        self.readers.insert(type_name.into(), Arc::new(reader));
    }

    /// Register a closure as the reader for a type
    pub fn register_fn<F>(&self, type_name: &str, reader: F)
    where
        F: Fn(&str, &mut DataInput<'_>) -> Result<Value, AmfError> + Send + Sync + 'static,
    {
        self.register(type_name, reader);
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn ExternalizableReader>> {
        self.readers.get(type_name).map(|r| r.value().clone())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.readers.contains_key(type_name)
    }
}

impl Default for ExternalizableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExternalizableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.readers.iter().map(|r| r.key().to_string()).collect();
        f.debug_struct("ExternalizableRegistry")
            .field("types", &names)
            .finish()
    }
}
