//! Unified error types for amf-remoting

use thiserror::Error;

use crate::amf::fault::{codes, Fault};

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all codec and remoting operations
#[derive(Debug, Error)]
pub enum Error {
    /// AMF encoding/decoding error
    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),
    /// Value could not be converted to a declared type
    #[error("Coercion error: {0}")]
    Coercion(#[from] CoercionError),
    /// Remote call could not be dispatched
    #[error("Remoting error: {0}")]
    Remoting(#[from] RemotingError),
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// AMF encoding/decoding errors
///
/// Every variant is fatal for the message being processed and never touches
/// state shared with other messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AmfError {
    #[error("Unknown AMF marker: 0x{0:02x}")]
    UnknownMarker(u8),
    #[error("Unexpected end of AMF data")]
    UnexpectedEof,
    #[error("Invalid UTF-8 in AMF string")]
    InvalidUtf8,
    #[error("Invalid AMF reference: {0}")]
    InvalidReference(u32),
    #[error("AMF reference {0} points at a value still being decoded")]
    CyclicReference(u32),
    #[error("AMF nesting too deep")]
    NestingTooDeep,
    #[error("Invalid object end marker")]
    InvalidObjectEnd,
    #[error("No externalizable reader registered for {0}")]
    UnknownExternalizable(String),
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    #[error("Invalid AMF packet: {0}")]
    InvalidPacket(String),
    #[error("Invalid member value for {type_name}.{member}: {source}")]
    Member {
        type_name: String,
        member: String,
        #[source]
        source: CoercionError,
    },
}

/// A value could not be converted to the declared member or parameter kind
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {found} to {expected}")]
pub struct CoercionError {
    pub expected: String,
    pub found: String,
}

impl CoercionError {
    pub fn new(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Failures of the remoting pipeline
///
/// These are expected failures and always end up as a [`Fault`] returned to
/// the caller; see [`RemotingError::to_fault`].
#[derive(Debug, Error)]
pub enum RemotingError {
    #[error("Destination source {destination} does not match requested source {requested}")]
    TypeMismatch {
        destination: String,
        requested: String,
    },
    #[error("Service not found: {0}")]
    ServiceNotFound(String),
    #[error("No suitable method {operation} found on {service}")]
    MissingMethod { service: String, operation: String },
    #[error("Access denied to {0}")]
    Unauthorized(String),
    #[error("Factory failed to provide {service}: {reason}")]
    Factory { service: String, reason: String },
    #[error("Invalid argument {index} for {operation}: {source}")]
    Argument {
        operation: String,
        index: usize,
        #[source]
        source: CoercionError,
    },
    #[error("Invocation hook failed: {0}")]
    Hook(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RemotingError {
    /// Fault code reported to the client for this failure
    pub fn fault_code(&self) -> &'static str {
        match self {
            RemotingError::ServiceNotFound(_)
            | RemotingError::MissingMethod { .. }
            | RemotingError::Factory { .. } => codes::RESOURCE_UNAVAILABLE,
            RemotingError::Unauthorized(_) => codes::AUTHORIZATION,
            RemotingError::TypeMismatch { .. }
            | RemotingError::Argument { .. }
            | RemotingError::Hook(_)
            | RemotingError::Internal(_) => codes::PROCESSING,
        }
    }

    /// Convert into the wire fault shape
    pub fn to_fault(&self) -> Fault {
        Fault::new(self.to_string()).with_code(self.fault_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_error_display() {
        let err = Error::Amf(AmfError::UnknownMarker(0xFF));
        assert!(err.to_string().contains("AMF error"));
        assert!(err.to_string().contains("0xff"));

        let err = Error::Coercion(CoercionError::new("Integer", "String"));
        assert!(err.to_string().contains("cannot convert String to Integer"));

        let err = Error::Remoting(RemotingError::ServiceNotFound("Echo".into()));
        assert!(err.to_string().contains("Remoting error"));
        assert!(err.to_string().contains("Echo"));

        let err = Error::Config("bad strategy".into());
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_from_conversions() {
        let err: Error = AmfError::UnexpectedEof.into();
        assert!(matches!(err, Error::Amf(_)));

        let err: Error = CoercionError::new("Double", "Null").into();
        assert!(matches!(err, Error::Coercion(_)));

        let err: Error = RemotingError::Hook("boom".into()).into();
        assert!(matches!(err, Error::Remoting(_)));
    }

    #[test]
    fn test_amf_error_display() {
        assert!(AmfError::UnknownMarker(0xAB).to_string().contains("0xab"));
        assert!(AmfError::UnexpectedEof.to_string().contains("end of AMF"));
        assert!(AmfError::InvalidUtf8.to_string().contains("UTF-8"));
        assert!(AmfError::InvalidReference(42).to_string().contains("42"));
        assert!(AmfError::CyclicReference(3).to_string().contains("still being decoded"));
        assert!(AmfError::NestingTooDeep.to_string().contains("deep"));
        assert!(AmfError::InvalidObjectEnd.to_string().contains("end"));
        assert!(AmfError::UnknownExternalizable("a.B".into())
            .to_string()
            .contains("a.B"));
    }

    #[test]
    fn test_member_error_source() {
        let err = AmfError::Member {
            type_name: "Foo".into(),
            member: "a".into(),
            source: CoercionError::new("Integer", "String"),
        };
        assert!(err.to_string().contains("Foo.a"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn test_remoting_fault_codes() {
        assert_eq!(
            RemotingError::Unauthorized("x".into()).fault_code(),
            codes::AUTHORIZATION
        );
        assert_eq!(
            RemotingError::MissingMethod {
                service: "S".into(),
                operation: "op".into()
            }
            .fault_code(),
            codes::RESOURCE_UNAVAILABLE
        );
        let fault = RemotingError::Internal("oops".into()).to_fault();
        assert_eq!(fault.code.as_deref(), Some(codes::PROCESSING));
        assert!(fault.message.contains("oops"));
    }
}
