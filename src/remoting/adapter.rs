//! Remoting adapter
//!
//! Turns a named operation call into a method invocation on a service
//! instance:
//!
//! 1. Resolve the service from the destination and the call's source
//! 2. Answer from the result cache when the same call was cached
//! 3. Lease an instance from the factory (released on every exit path)
//! 4. Resolve the overload, check roles, coerce arguments
//! 5. Invoke through the [`InvocationHandler`]
//! 6. Cache cacheable results
//!
//! Every call ends in [`CallOutcome::Returned`] or [`CallOutcome::Faulted`];
//! no error or panic crosses the adapter boundary.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::cache::{CacheKey, ResultCache};
use super::factory::{Lease, ObjectFactory};
use super::message::{Destination, RemotingMessage};
use super::security::Authorizer;
use crate::accel::coerce;
use crate::amf::{CodecContext, Fault, Value};
use crate::config::RemotingConfig;
use crate::error::RemotingError;
use crate::invocation::InvocationHandler;
use crate::stats::{RemotingCounters, RemotingStats};

/// Terminal state of one call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Returned(Value),
    Faulted(Fault),
}

impl CallOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, CallOutcome::Faulted(_))
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            CallOutcome::Faulted(fault) => Some(fault),
            CallOutcome::Returned(_) => None,
        }
    }

    /// Response value; faults become [`Value::Fault`]
    pub fn into_value(self) -> Value {
        match self {
            CallOutcome::Returned(value) => value,
            CallOutcome::Faulted(fault) => Value::from(fault),
        }
    }
}

/// Adapter serving one destination
pub struct RemotingAdapter {
    destination: Destination,
    factory: Arc<dyn ObjectFactory>,
    cache: Option<Arc<dyn ResultCache>>,
    codec: CodecContext,
    config: RemotingConfig,
    counters: RemotingCounters,
}

impl RemotingAdapter {
    pub fn new(
        destination: Destination,
        factory: Arc<dyn ObjectFactory>,
        config: RemotingConfig,
    ) -> Self {
        Self {
            destination,
            factory,
            cache: None,
            codec: CodecContext::default(),
            config,
            counters: RemotingCounters::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Codec collaborators used for typed argument coercion
    pub fn with_codec(mut self, codec: CodecContext) -> Self {
        self.codec = codec;
        self
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn stats(&self) -> RemotingStats {
        self.counters.snapshot()
    }

    /// Run one call to completion
    pub fn invoke(&self, message: &RemotingMessage, caller: &dyn Authorizer) -> CallOutcome {
        self.counters.call();

        let result = if self.config.catch_panics {
            panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(message, caller)))
                .unwrap_or_else(|payload| {
                    let reason = panic_message(payload.as_ref());
                    error!(
                        destination = %self.destination.id,
                        operation = %message.operation,
                        %reason,
                        "Service panicked"
                    );
                    Err(RemotingError::Internal(reason))
                })
        } else {
            self.dispatch(message, caller)
        };

        match result {
            Ok(Value::Fault(fault)) => {
                self.counters.fault();
                CallOutcome::Faulted(Arc::unwrap_or_clone(fault))
            }
            Ok(value) => CallOutcome::Returned(value),
            Err(err) => {
                self.counters.fault();
                debug!(destination = %self.destination.id, error = %err, "Call faulted");
                let mut fault = err.to_fault();
                if self.config.include_fault_detail && fault.detail.is_none() {
                    fault = fault.with_detail(format!("{err:?}"));
                }
                CallOutcome::Faulted(fault)
            }
        }
    }

    fn dispatch(
        &self,
        message: &RemotingMessage,
        caller: &dyn Authorizer,
    ) -> Result<Value, RemotingError> {
        let source = self.resolve_source(message)?;
        let operation = format!("{source}.{}", message.operation);

        let key = self.cache_key(&operation, &message.body);
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if cache.contains(key) {
                if let Some(value) = cache.get(key) {
                    self.counters.cache_hit();
                    debug!(%operation, "Answered from result cache");
                    return Ok(value);
                }
            }
        }

        let mut lease = Lease::acquire(self.factory.as_ref(), source)?;
        let definition = lease
            .definition()
            .cloned()
            .ok_or_else(|| RemotingError::Internal(format!("empty lease for {source}")))?;

        let method = definition
            .resolve(&message.operation, &message.body, &*self.codec.accelerator)
            .ok_or_else(|| RemotingError::MissingMethod {
                service: source.to_string(),
                operation: message.operation.clone(),
            })?;

        if !method.roles().is_empty() && !caller.is_authorized(method.roles()) {
            self.counters.unauthorized();
            warn!(%operation, roles = ?method.roles(), "Caller not authorized");
            return Err(RemotingError::Unauthorized(operation));
        }

        let args = method
            .params()
            .iter()
            .zip(&message.body)
            .enumerate()
            .map(|(index, (kind, value))| {
                coerce(value.clone(), kind, &*self.codec.accelerator).map_err(|source| {
                    RemotingError::Argument {
                        operation: operation.clone(),
                        index,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let target: &mut dyn Any = lease
            .object_mut()
            .ok_or_else(|| RemotingError::Internal(format!("empty lease for {source}")))?;
        let result = InvocationHandler::new(method)
            .with_detail(self.config.include_fault_detail)
            .invoke(target, &args)?;

        if method.is_cacheable() && !matches!(result, Value::Fault(_)) {
            if let (Some(cache), Some(key)) = (&self.cache, key) {
                cache.put(key, result.clone());
            }
        }
        Ok(result)
    }

    /// Service name the call is routed to
    fn resolve_source<'a>(&'a self, message: &'a RemotingMessage) -> Result<&'a str, RemotingError> {
        let requested = message.requested_source();
        if self.destination.is_wildcard() {
            return requested.ok_or_else(|| {
                RemotingError::ServiceNotFound(format!(
                    "no source named for wildcard destination {}",
                    self.destination.id
                ))
            });
        }
        match requested {
            Some(requested) if requested != self.destination.source => {
                Err(RemotingError::TypeMismatch {
                    destination: self.destination.source.clone(),
                    requested: requested.to_string(),
                })
            }
            _ => Ok(self.destination.source.as_str()),
        }
    }

    fn cache_key(&self, operation: &str, args: &[Value]) -> Option<CacheKey> {
        self.cache.as_ref()?;
        match CacheKey::new(operation, args) {
            Ok(key) => Some(key),
            Err(err) => {
                debug!(%operation, error = %err, "Arguments not cacheable");
                None
            }
        }
    }
}

impl fmt::Debug for RemotingAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotingAdapter")
            .field("destination", &self.destination)
            .field("cached", &self.cache.is_some())
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "service panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::MemberKind;
    use crate::amf::fault::codes;
    use crate::remoting::cache::LruResultCache;
    use crate::remoting::factory::{FactoryScope, ServiceFactory};
    use crate::remoting::security::Principal;
    use crate::remoting::service::ServiceDefinition;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Inventory {
        invoked: Arc<AtomicUsize>,
    }

    fn inventory(invoked: Arc<AtomicUsize>) -> ServiceDefinition {
        ServiceDefinition::builder("Inventory", move || Inventory {
            invoked: invoked.clone(),
        })
        .method("count")
        .param(MemberKind::Integer)
        .cacheable()
        .handler(|inv: &mut Inventory, args| {
            inv.invoked.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Integer(args[0].as_i32().unwrap_or(0) * 10))
        })
        .method("remove")
        .param(MemberKind::String)
        .role("admin")
        .handler(|inv: &mut Inventory, _args| {
            inv.invoked.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Boolean(true))
        })
        .method("fail")
        .cacheable()
        .handler(|inv: &mut Inventory, _args| {
            inv.invoked.fetch_add(1, Ordering::SeqCst);
            Err("out of stock".into())
        })
        .method("explode")
        .handler(|_inv: &mut Inventory, _args| panic!("shelf collapsed"))
        .build()
    }

    fn adapter(destination: Destination, invoked: Arc<AtomicUsize>) -> RemotingAdapter {
        let factory =
            ServiceFactory::new().with_service(inventory(invoked), FactoryScope::Application);
        let cache = LruResultCache::new(NonZeroUsize::new(16).unwrap());
        RemotingAdapter::new(destination, Arc::new(factory), RemotingConfig::default())
            .with_cache(Arc::new(cache))
    }

    fn call(operation: &str, body: Vec<Value>) -> RemotingMessage {
        RemotingMessage::new(operation, body).with_source("Inventory")
    }

    #[test]
    fn test_returns_coerced_result() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let adapter = adapter(Destination::wildcard("remoting"), invoked);
        let outcome = adapter.invoke(&call("count", vec![Value::from("4")]), &Principal::anonymous());
        assert_eq!(outcome, CallOutcome::Returned(Value::Integer(40)));
    }

    #[test]
    fn test_cacheable_call_invokes_once() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let adapter = adapter(Destination::wildcard("remoting"), invoked.clone());
        let msg = call("count", vec![Value::Integer(3)]);

        let first = adapter.invoke(&msg, &Principal::anonymous());
        let second = adapter.invoke(&msg, &Principal::anonymous());
        assert_eq!(first, second);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.stats().cache_hits, 1);
        assert_eq!(adapter.stats().calls, 2);
    }

    #[test]
    fn test_faults_are_not_cached() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let adapter = adapter(Destination::wildcard("remoting"), invoked.clone());
        let msg = call("fail", vec![]);

        for _ in 0..2 {
            let outcome = adapter.invoke(&msg, &Principal::anonymous());
            assert_eq!(outcome.fault().unwrap().message, "out of stock");
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.stats().faults, 2);
    }

    #[test]
    fn test_unauthorized_before_invocation() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let adapter = adapter(Destination::wildcard("remoting"), invoked.clone());
        let msg = call("remove", vec![Value::from("widget")]);

        let outcome = adapter.invoke(&msg, &Principal::new("bob", ["clerk"]));
        assert_eq!(outcome.fault().unwrap().code.as_deref(), Some(codes::AUTHORIZATION));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.stats().unauthorized, 1);

        let outcome = adapter.invoke(&msg, &Principal::new("alice", ["admin"]));
        assert_eq!(outcome, CallOutcome::Returned(Value::Boolean(true)));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_source_resolution() {
        let invoked = Arc::new(AtomicUsize::new(0));

        let fixed = adapter(Destination::new("inv", "Inventory"), invoked.clone());
        let untargeted = RemotingMessage::new("count", vec![Value::Integer(1)]);
        assert!(!fixed.invoke(&untargeted, &Principal::anonymous()).is_fault());

        let mismatch = untargeted.clone().with_source("Billing");
        let fault = fixed.invoke(&mismatch, &Principal::anonymous());
        assert!(fault.fault().unwrap().message.contains("Billing"));

        let wildcard = adapter(Destination::wildcard("remoting"), invoked);
        let outcome = wildcard.invoke(&untargeted, &Principal::anonymous());
        assert_eq!(
            outcome.fault().unwrap().code.as_deref(),
            Some(codes::RESOURCE_UNAVAILABLE)
        );
    }

    #[test]
    fn test_missing_method_and_service() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let adapter = adapter(Destination::wildcard("remoting"), invoked);

        let outcome = adapter.invoke(&call("count", vec![]), &Principal::anonymous());
        assert!(outcome.fault().unwrap().message.contains("count"));

        let msg = RemotingMessage::new("x", vec![]).with_source("Nope");
        let outcome = adapter.invoke(&msg, &Principal::anonymous());
        assert_eq!(
            outcome.fault().unwrap().code.as_deref(),
            Some(codes::RESOURCE_UNAVAILABLE)
        );
    }

    #[test]
    fn test_panic_becomes_fault() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let adapter = adapter(Destination::wildcard("remoting"), invoked);
        let outcome = adapter.invoke(&call("explode", vec![]), &Principal::anonymous());
        let fault = outcome.fault().unwrap();
        assert_eq!(fault.code.as_deref(), Some(codes::PROCESSING));
        assert!(fault.message.contains("shelf collapsed"));

        // The adapter stays usable afterwards
        let outcome = adapter.invoke(&call("count", vec![Value::Integer(1)]), &Principal::anonymous());
        assert_eq!(outcome, CallOutcome::Returned(Value::Integer(10)));
    }

    #[test]
    fn test_outcome_into_value() {
        let fault = Fault::new("boom").with_code(codes::PROCESSING);
        let value = CallOutcome::Faulted(fault.clone()).into_value();
        assert_eq!(value.as_fault(), Some(&fault));
        assert_eq!(CallOutcome::Returned(Value::Null).into_value(), Value::Null);
    }
}
