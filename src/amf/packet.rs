//! AMF packet envelope
//!
//! ```text
//! u16 version (0 or 3)
//! u16 header count
//!   header: UTF name, u8 must-understand, u32 length, AMF0 value
//! u16 body count
//!   body: UTF target URI, UTF response URI, u32 length, AMF0 value
//! ```
//!
//! A length of `0xFFFFFFFF` means the writer did not know it; decoding never
//! relies on the length. Reference tables are reset before every header and
//! body value. Version 3 packets carry their body values through the AVM+
//! marker.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use super::amf0::{read_utf8, Amf0Decoder, Amf0Encoder};
use super::value::Value;
use super::CodecContext;
use crate::error::AmfError;

/// Length value written when the payload size is unknown
pub const UNKNOWN_LENGTH: u32 = 0xFFFF_FFFF;

pub const VERSION_AMF0: u16 = 0;
pub const VERSION_AMF3: u16 = 3;

/// Packet header
#[derive(Debug, Clone, PartialEq)]
pub struct AmfHeader {
    pub name: String,
    pub must_understand: bool,
    pub value: Value,
}

/// Packet body: one call or one response
#[derive(Debug, Clone, PartialEq)]
pub struct AmfBody {
    /// Call target (`Service.method`) or response target (`/1/onResult`)
    pub target: String,
    /// Response URI assigned by the caller, `null` on responses
    pub response: String,
    pub value: Value,
}

impl AmfBody {
    pub fn new(target: impl Into<String>, response: impl Into<String>, value: Value) -> Self {
        Self {
            target: target.into(),
            response: response.into(),
            value,
        }
    }
}

/// AMF remoting packet
#[derive(Debug, Clone, PartialEq)]
pub struct AmfPacket {
    pub version: u16,
    pub headers: Vec<AmfHeader>,
    pub bodies: Vec<AmfBody>,
}

impl AmfPacket {
    pub fn new(version: u16) -> Self {
        Self {
            version,
            headers: Vec::new(),
            bodies: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&AmfHeader> {
        self.headers.iter().find(|h| h.name == name)
    }

    /// Parse a packet from raw bytes
    pub fn decode(data: &[u8], ctx: &CodecContext) -> Result<AmfPacket, AmfError> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut decoder = Amf0Decoder::with_context(ctx.clone());

        let version = read_u16(&mut buf)?;
        let mut packet = AmfPacket::new(version);

        let header_count = read_u16(&mut buf)?;
        for _ in 0..header_count {
            decoder.reset();
            let name = read_utf8(&mut buf)?.to_string();
            need(&buf, 5)?;
            let must_understand = buf.get_u8() != 0;
            let _length = buf.get_u32();
            let value = decoder.decode(&mut buf)?;
            packet.headers.push(AmfHeader {
                name,
                must_understand,
                value,
            });
        }

        let body_count = read_u16(&mut buf)?;
        for _ in 0..body_count {
            decoder.reset();
            let target = read_utf8(&mut buf)?.to_string();
            let response = read_utf8(&mut buf)?.to_string();
            need(&buf, 4)?;
            let _length = buf.get_u32();
            let value = decoder.decode(&mut buf)?;
            packet.bodies.push(AmfBody {
                target,
                response,
                value,
            });
        }

        if buf.has_remaining() {
            debug!(trailing = buf.remaining(), "Ignoring trailing packet bytes");
        }
        Ok(packet)
    }

    /// Serialize the packet
    pub fn encode(&self, ctx: &CodecContext) -> Result<Bytes, AmfError> {
        let mut out = BytesMut::with_capacity(256);
        let mut encoder = Amf0Encoder::with_context(ctx.clone());

        out.put_u16(self.version);
        out.put_u16(count(self.headers.len(), "headers")?);
        for header in &self.headers {
            write_utf8(&mut out, &header.name)?;
            out.put_u8(u8::from(header.must_understand));
            encoder.encode(&header.value)?;
            write_value(&mut out, encoder.finish());
        }

        out.put_u16(count(self.bodies.len(), "bodies")?);
        for body in &self.bodies {
            write_utf8(&mut out, &body.target)?;
            write_utf8(&mut out, &body.response)?;
            if self.version == VERSION_AMF3 {
                encoder.encode_avmplus(&body.value)?;
            } else {
                encoder.encode(&body.value)?;
            }
            write_value(&mut out, encoder.finish());
        }
        Ok(out.freeze())
    }
}

fn count(len: usize, what: &str) -> Result<u16, AmfError> {
    u16::try_from(len).map_err(|_| AmfError::InvalidPacket(format!("too many {what}: {len}")))
}

fn need(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        return Err(AmfError::UnexpectedEof);
    }
    Ok(())
}

fn read_u16(buf: &mut Bytes) -> Result<u16, AmfError> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

fn write_utf8(out: &mut BytesMut, s: &str) -> Result<(), AmfError> {
    let len = u16::try_from(s.len())
        .map_err(|_| AmfError::InvalidPacket(format!("name too long: {} bytes", s.len())))?;
    out.put_u16(len);
    out.put_slice(s.as_bytes());
    Ok(())
}

fn write_value(out: &mut BytesMut, value: Bytes) {
    out.put_u32(u32::try_from(value.len()).unwrap_or(UNKNOWN_LENGTH));
    out.put_slice(&value);
}
