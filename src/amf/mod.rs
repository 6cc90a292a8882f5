//! AMF (Action Message Format) implementation
//!
//! AMF is Adobe's binary serialization format used by Flash Remoting and
//! Flex messaging. This module implements both AMF0 (original format) and
//! AMF3 (ActionScript 3.0 format) over a shared [`Value`] model.
//!
//! AMF3 values can be carried inside an AMF0 stream via the avmplus-object
//! marker (0x11).

pub mod amf0;
pub mod amf3;
pub mod class_def;
pub mod externalizable;
pub mod fault;
pub mod packet;
pub mod reference;
pub mod value;

use std::sync::Arc;

use crate::accel::Accelerator;
use crate::config::CodecConfig;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use amf3::{Amf3Decoder, Amf3Encoder};
pub use class_def::ClassDefinition;
pub use externalizable::{
    DataInput, DataOutput, Externalizable, ExternalizableReader, ExternalizableRegistry,
};
pub use fault::Fault;
pub use packet::{AmfBody, AmfHeader, AmfPacket};
pub use value::{AssocArray, Date, Object, Value, Vector, VectorItems};

/// Shared collaborators of every encoder and decoder
///
/// Cloning is cheap; the accelerator and the externalizable registry are
/// shared, the configuration is copied.
#[derive(Debug, Clone)]
pub struct CodecContext {
    pub config: CodecConfig,
    pub accelerator: Arc<Accelerator>,
    pub externals: Arc<ExternalizableRegistry>,
}

impl CodecContext {
    /// Context over the process-wide accelerator for the configured strategy
    pub fn new(config: CodecConfig) -> Self {
        let accelerator = Accelerator::global(config.compiler);
        Self {
            config,
            accelerator,
            externals: ExternalizableRegistry::global(),
        }
    }

    pub fn with_accelerator(mut self, accelerator: Arc<Accelerator>) -> Self {
        self.accelerator = accelerator;
        self
    }

    pub fn with_externals(mut self, externals: Arc<ExternalizableRegistry>) -> Self {
        self.externals = externals;
        self
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}
