//! AMF packet gateway
//!
//! Answers every body of a request packet through a [`RemotingAdapter`].
//! Body targets name `Service.method`; the body value is the argument array.
//! Each response body targets `<response>/onResult` or `<response>/onStatus`.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

use super::adapter::{CallOutcome, RemotingAdapter};
use super::message::RemotingMessage;
use super::security::Authorizer;
use crate::amf::fault::codes;
use crate::amf::{AmfBody, AmfPacket, CodecContext, Fault, Value};
use crate::error::AmfError;

pub const ON_RESULT: &str = "/onResult";
pub const ON_STATUS: &str = "/onStatus";

/// Response URI of reply bodies
const NULL_RESPONSE: &str = "null";

#[derive(Debug)]
pub struct AmfGateway {
    adapter: Arc<RemotingAdapter>,
    codec: CodecContext,
}

impl AmfGateway {
    pub fn new(adapter: Arc<RemotingAdapter>) -> Self {
        Self {
            adapter,
            codec: CodecContext::default(),
        }
    }

    pub fn with_codec(mut self, codec: CodecContext) -> Self {
        self.codec = codec;
        self
    }

    pub fn adapter(&self) -> &Arc<RemotingAdapter> {
        &self.adapter
    }

    /// Decode a request, answer it and encode the response packet
    pub fn handle(&self, data: &[u8], caller: &dyn Authorizer) -> Result<Bytes, AmfError> {
        let request = AmfPacket::decode(data, &self.codec)?;
        self.process(&request, caller).encode(&self.codec)
    }

    /// Answer every body of `request`, in order
    pub fn process(&self, request: &AmfPacket, caller: &dyn Authorizer) -> AmfPacket {
        debug!(
            version = request.version,
            headers = request.headers.len(),
            bodies = request.bodies.len(),
            "Processing packet"
        );
        let mut response = AmfPacket::new(request.version);
        for body in &request.bodies {
            let outcome = self.answer(body, caller);
            let suffix = if outcome.is_fault() { ON_STATUS } else { ON_RESULT };
            response.bodies.push(AmfBody::new(
                format!("{}{suffix}", body.response),
                NULL_RESPONSE,
                outcome.into_value(),
            ));
        }
        response
    }

    fn answer(&self, body: &AmfBody, caller: &dyn Authorizer) -> CallOutcome {
        let args = match &body.value {
            Value::Array(items) => items.to_vec(),
            Value::Null | Value::Undefined => Vec::new(),
            other => vec![other.clone()],
        };
        match RemotingMessage::from_target(&body.target, args) {
            Some(message) => self.adapter.invoke(&message, caller),
            None => {
                warn!(target = %body.target, "Unroutable body target");
                CallOutcome::Faulted(
                    Fault::new(format!("Invalid target: {}", body.target))
                        .with_code(codes::RESOURCE_UNAVAILABLE),
                )
            }
        }
    }
}
