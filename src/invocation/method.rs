//! Remotely callable method descriptors

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use super::handler::InvocationAttribute;
use crate::accel::MemberKind;
use crate::amf::Value;

/// Error type returned by service code and hooks
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Type-erased method body over the service instance
pub(crate) type MethodBody =
    Box<dyn Fn(&mut dyn Any, &[Value]) -> Result<Value, BoxError> + Send + Sync>;

/// A resolved, invocable method and everything registered with it
pub struct MethodDescriptor {
    service: Arc<str>,
    name: Arc<str>,
    params: Vec<MemberKind>,
    roles: Vec<String>,
    cacheable: bool,
    attributes: Vec<Arc<dyn InvocationAttribute>>,
    body: MethodBody,
}

impl MethodDescriptor {
    pub(crate) fn new(
        service: Arc<str>,
        name: Arc<str>,
        params: Vec<MemberKind>,
        roles: Vec<String>,
        cacheable: bool,
        attributes: Vec<Arc<dyn InvocationAttribute>>,
        body: MethodBody,
    ) -> Self {
        Self {
            service,
            name,
            params,
            roles,
            cacheable,
            attributes,
            body,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Service.method`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.service, self.name)
    }

    /// Declared parameter kinds, in order
    pub fn params(&self) -> &[MemberKind] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Roles of which the caller must hold at least one; empty when unguarded
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Hook attributes in declaration order
    pub fn attributes(&self) -> &[Arc<dyn InvocationAttribute>] {
        &self.attributes
    }

    pub(crate) fn call(&self, target: &mut dyn Any, args: &[Value]) -> Result<Value, BoxError> {
        (self.body)(target, args)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("service", &self.service)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("roles", &self.roles)
            .field("cacheable", &self.cacheable)
            .field("attributes", &self.attributes.len())
            .finish()
    }
}
