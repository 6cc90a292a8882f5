//! Fault values
//!
//! A fault is the error-shaped value returned in place of a result. Two wire
//! shapes exist: the Flex `ErrorMessage` typed object and the legacy Flash
//! Remoting status object (`code`/`level`/`description`).

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use super::class_def::ClassDefinition;
use super::value::{Object, Value};

/// Well-known fault codes
pub mod codes {
    pub const PROCESSING: &str = "Server.Processing";
    pub const RESOURCE_UNAVAILABLE: &str = "Server.ResourceUnavailable";
    pub const AUTHORIZATION: &str = "Client.Authorization";
}

/// Type identifier of the modern fault shape
pub const ERROR_MESSAGE_CLASS: &str = "flex.messaging.messages.ErrorMessage";

const MEMBER_CODE: &str = "faultCode";
const MEMBER_STRING: &str = "faultString";
const MEMBER_DETAIL: &str = "faultDetail";

/// Error-shaped response value
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub message: String,
    pub detail: Option<String>,
    pub code: Option<String>,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Build from an error, unwrapping to its root cause
    ///
    /// The message is the innermost cause; the detail lists the chain from
    /// the outermost error inwards.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        if let Some(fault) = err.downcast_ref::<Fault>() {
            return fault.clone();
        }
        let mut chain = vec![err.to_string()];
        let mut root = err;
        while let Some(next) = root.source() {
            if let Some(fault) = next.downcast_ref::<Fault>() {
                return fault.clone();
            }
            chain.push(next.to_string());
            root = next;
        }
        let fault = Fault::new(root.to_string()).with_code(codes::PROCESSING);
        if chain.len() > 1 {
            fault.with_detail(chain.join(": "))
        } else {
            fault
        }
    }

    /// Code to report, defaulting to `Server.Processing`
    pub fn code_or_default(&self) -> &str {
        self.code.as_deref().unwrap_or(codes::PROCESSING)
    }

    pub(crate) fn error_message_class() -> Arc<ClassDefinition> {
        Arc::new(ClassDefinition::new(
            ERROR_MESSAGE_CLASS,
            vec![MEMBER_CODE.into(), MEMBER_STRING.into(), MEMBER_DETAIL.into()],
            false,
            false,
        ))
    }

    /// Modern `ErrorMessage` typed object
    pub fn to_error_message(&self) -> Object {
        Object::from_parts(
            Self::error_message_class(),
            vec![
                Value::from(self.code.clone()),
                Value::from(self.message.as_str()),
                Value::from(self.detail.clone()),
            ],
            Vec::new(),
        )
    }

    /// Legacy Flash Remoting status object
    pub fn to_legacy_status(&self) -> Object {
        Object::anonymous([
            ("code", Value::from(self.code_or_default())),
            ("level", Value::from("error")),
            ("description", Value::from(self.message.as_str())),
            ("details", Value::from(self.detail.clone())),
            ("type", Value::from("Fault")),
        ])
    }

    /// Recognize a decoded `ErrorMessage` object
    pub fn from_error_message(obj: &Object) -> Option<Fault> {
        if obj.type_name() != Some(ERROR_MESSAGE_CLASS) {
            return None;
        }
        Some(Fault {
            message: obj
                .get(MEMBER_STRING)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            detail: obj.get(MEMBER_DETAIL).and_then(Value::as_str).map(String::from),
            code: obj.get(MEMBER_CODE).and_then(Value::as_str).map(String::from),
        })
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_or_default(), self.message)
    }
}

impl StdError for Fault {}
