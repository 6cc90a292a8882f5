//! Service instance factories
//!
//! An [`ObjectFactory`] hands out service instances by source name and takes
//! them back when the call is over. The adapter holds instances through a
//! [`Lease`], which returns the instance on drop, including while unwinding
//! from a panic in service code.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use super::service::ServiceDefinition;
use crate::error::RemotingError;

/// Service instance owned exclusively by one call
pub struct ServiceInstance {
    definition: Arc<ServiceDefinition>,
    object: Box<dyn Any + Send>,
}

impl ServiceInstance {
    /// Construct a fresh instance of `definition`
    pub fn new(definition: Arc<ServiceDefinition>) -> Result<Self, RemotingError> {
        let object = definition
            .construct()
            .map_err(|e| RemotingError::Factory {
                service: definition.name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { definition, object })
    }

    pub fn from_parts(definition: Arc<ServiceDefinition>, object: Box<dyn Any + Send>) -> Self {
        Self { definition, object }
    }

    pub fn definition(&self) -> &Arc<ServiceDefinition> {
        &self.definition
    }

    pub fn into_object(self) -> Box<dyn Any + Send> {
        self.object
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("service", &self.definition.name())
            .finish_non_exhaustive()
    }
}

/// Pluggable source of service instances
pub trait ObjectFactory: Send + Sync {
    /// Provide an instance of the service named `source`
    fn lookup(&self, source: &str) -> Result<ServiceInstance, RemotingError>;

    /// Take back an instance obtained from [`lookup`](Self::lookup)
    fn release(&self, instance: ServiceInstance);
}

/// Instance borrowed from a factory for the duration of one call
pub struct Lease<'f> {
    factory: &'f dyn ObjectFactory,
    instance: Option<ServiceInstance>,
}

impl<'f> Lease<'f> {
    pub fn acquire(factory: &'f dyn ObjectFactory, source: &str) -> Result<Self, RemotingError> {
        let instance = factory.lookup(source)?;
        Ok(Self {
            factory,
            instance: Some(instance),
        })
    }

    pub fn definition(&self) -> Option<&Arc<ServiceDefinition>> {
        self.instance.as_ref().map(ServiceInstance::definition)
    }

    pub fn object_mut(&mut self) -> Option<&mut dyn Any> {
        let instance = self.instance.as_mut()?;
        let object: &mut dyn Any = instance.object.as_mut();
        Some(object)
    }
}

impl fmt::Debug for Lease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("instance", &self.instance)
            .finish()
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.factory.release(instance);
        }
    }
}

/// Lifetime of the instances a [`ServiceFactory`] hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FactoryScope {
    /// A new instance for every call, dropped on release
    #[default]
    Request,
    /// Pooled instances reused across calls, each leased to one call at a time
    Application,
}

struct Registration {
    definition: Arc<ServiceDefinition>,
    scope: FactoryScope,
    pool: Mutex<Vec<Box<dyn Any + Send>>>,
}

/// Factory over registered [`ServiceDefinition`]s
#[derive(Default)]
pub struct ServiceFactory {
    services: DashMap<Arc<str>, Arc<Registration>>,
}

impl ServiceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any service of the same name
    pub fn register(&self, definition: ServiceDefinition, scope: FactoryScope) {
        let definition = Arc::new(definition);
        debug!(service = %definition.name(), ?scope, "Registered service");
        let name: Arc<str> = definition.name().into();
        self.services.insert(
            name,
            Arc::new(Registration {
                definition,
                scope,
                pool: Mutex::new(Vec::new()),
            }),
        );
    }

    pub fn with_service(self, definition: ServiceDefinition, scope: FactoryScope) -> Self {
        self.register(definition, scope);
        self
    }

    pub fn contains(&self, source: &str) -> bool {
        self.services.contains_key(source)
    }

    pub fn definition(&self, source: &str) -> Option<Arc<ServiceDefinition>> {
        self.services.get(source).map(|r| r.definition.clone())
    }

    /// Number of idle pooled instances of `source`
    pub fn idle(&self, source: &str) -> usize {
        self.services.get(source).map_or(0, |r| r.pool.lock().len())
    }

    fn registration(&self, source: &str) -> Option<Arc<Registration>> {
        self.services.get(source).map(|r| r.value().clone())
    }
}

impl ObjectFactory for ServiceFactory {
    fn lookup(&self, source: &str) -> Result<ServiceInstance, RemotingError> {
        let registration = self
            .registration(source)
            .ok_or_else(|| RemotingError::ServiceNotFound(source.to_string()))?;

        let pooled = match registration.scope {
            FactoryScope::Request => None,
            FactoryScope::Application => registration.pool.lock().pop(),
        };
        let definition = registration.definition.clone();
        match pooled {
            Some(object) => Ok(ServiceInstance::from_parts(definition, object)),
            None => ServiceInstance::new(definition).map_err(|e| {
                warn!(service = source, error = %e, "Service construction failed");
                e
            }),
        }
    }

    fn release(&self, instance: ServiceInstance) {
        let Some(registration) = self.registration(instance.definition.name()) else {
            return;
        };
        if registration.scope != FactoryScope::Application {
            return;
        }
        if !Arc::ptr_eq(&registration.definition, &instance.definition) {
            // Re-registered while leased
            return;
        }
        if thread::panicking() {
            warn!(service = %instance.definition.name(), "Discarding instance released during a panic");
            return;
        }
        registration.pool.lock().push(instance.into_object());
    }
}

impl fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFactory")
            .field("services", &self.services.len())
            .finish()
    }
}
