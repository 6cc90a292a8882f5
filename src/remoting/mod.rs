//! Remoting layer
//!
//! Locates services by name, leases instances from a factory, authorizes,
//! coerces and invokes, with an optional result cache in front.

pub mod adapter;
pub mod cache;
pub mod factory;
pub mod gateway;
pub mod message;
pub mod security;
pub mod service;

pub use adapter::{CallOutcome, RemotingAdapter};
pub use cache::{CacheKey, LruResultCache, ResultCache};
pub use factory::{FactoryScope, Lease, ObjectFactory, ServiceFactory, ServiceInstance};
pub use gateway::AmfGateway;
pub use message::{Destination, RemotingMessage, WILDCARD};
pub use security::{Authorizer, Principal};
pub use service::{MethodBuilder, ServiceBuilder, ServiceDefinition};
