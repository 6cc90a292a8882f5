//! Remote call messages and destinations

use crate::amf::Value;

/// Source name matching any requested service
pub const WILDCARD: &str = "*";

/// Configured endpoint of a remoting adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id: String,
    /// Service name served by this destination, or `*` to accept the
    /// source named by each call
    pub source: String,
}

impl Destination {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Destination accepting any source named by the call
    pub fn wildcard(id: impl Into<String>) -> Self {
        Self::new(id, WILDCARD)
    }

    pub fn is_wildcard(&self) -> bool {
        self.source == WILDCARD
    }
}

/// One remote call
#[derive(Debug, Clone, PartialEq)]
pub struct RemotingMessage {
    /// Explicit service name requested by the caller
    pub source: Option<String>,
    pub operation: String,
    /// Positional arguments
    pub body: Vec<Value>,
}

impl RemotingMessage {
    pub fn new(operation: impl Into<String>, body: Vec<Value>) -> Self {
        Self {
            source: None,
            operation: operation.into(),
            body,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Parse a `Service.method` target, splitting at the last dot
    pub fn from_target(target: &str, body: Vec<Value>) -> Option<Self> {
        let (source, operation) = target.rsplit_once('.')?;
        if source.is_empty() || operation.is_empty() {
            return None;
        }
        Some(Self::new(operation, body).with_source(source))
    }

    /// Requested source, treating an empty name as absent
    pub fn requested_source(&self) -> Option<&str> {
        self.source.as_deref().filter(|s| !s.is_empty())
    }
}
