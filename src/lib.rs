//! amf-remoting: AMF0/AMF3 codec and remoting dispatch
//!
//! This library provides:
//! - AMF0 and AMF3 readers and writers over a shared [`Value`] model
//! - Per-message reference tables for shared strings, objects and traits
//! - A type marshaling accelerator caching one compiled read/write strategy
//!   per type identifier, built at most once under concurrent first use
//! - An invocation dispatcher running ordered callback and result hooks
//! - A remoting adapter with pluggable factories, role checks and a result
//!   cache, plus a gateway answering AMF packets
//!
//! # Example: Calling a Service
//!
//! ```no_run
//! use std::sync::Arc;
//! use amf_remoting::accel::MemberKind;
//! use amf_remoting::remoting::{
//!     Destination, FactoryScope, Principal, RemotingAdapter, RemotingMessage,
//!     ServiceDefinition, ServiceFactory,
//! };
//! use amf_remoting::{RemotingConfig, Value};
//!
//! struct Greeter;
//!
//! let greeter = ServiceDefinition::builder("Greeter", || Greeter)
//!     .method("greet")
//!     .param(MemberKind::String)
//!     .handler(|_: &mut Greeter, args| {
//!         Ok(Value::from(format!("hello {}", args[0].as_str().unwrap_or("?"))))
//!     })
//!     .build();
//!
//! let factory = ServiceFactory::new().with_service(greeter, FactoryScope::Request);
//! let adapter = RemotingAdapter::new(
//!     Destination::wildcard("amf"),
//!     Arc::new(factory),
//!     RemotingConfig::default(),
//! );
//!
//! let call = RemotingMessage::new("greet", vec![Value::from("bob")]).with_source("Greeter");
//! let outcome = adapter.invoke(&call, &Principal::anonymous());
//! println!("{:?}", outcome.into_value());
//! ```

pub mod accel;
pub mod amf;
pub mod config;
pub mod error;
pub mod invocation;
pub mod remoting;
pub mod stats;

// Re-export main types for convenience
pub use accel::{Accelerator, TypeDescriptor, TypeRegistry};
pub use amf::{AmfPacket, CodecContext, Fault, Object, Value};
pub use config::{CodecConfig, CompilerStrategy, RemotingConfig};
pub use error::{AmfError, CoercionError, Error, RemotingError, Result};
pub use invocation::{InvocationContext, InvocationHandler};
pub use remoting::{AmfGateway, CallOutcome, RemotingAdapter};
