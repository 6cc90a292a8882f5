//! Service definitions
//!
//! A service is registered once with a constructor and its remotely callable
//! methods. Methods are declared through a builder that records parameter
//! kinds, required roles, the cacheable flag and hook attributes in
//! declaration order:
//!
//! ```ignore
//! let echo = ServiceDefinition::builder("Echo", Echo::default)
//!     .method("echo")
//!     .param(MemberKind::String)
//!     .cacheable()
//!     .handler(|svc: &mut Echo, args| Ok(args[0].clone()))
//!     .build();
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::accel::{is_assignable, MemberKind, TypeLookup};
use crate::amf::Value;
use crate::invocation::method::MethodBody;
use crate::invocation::{BoxError, InvocationAttribute, MethodDescriptor};

type Constructor = Box<dyn Fn() -> Result<Box<dyn Any + Send>, BoxError> + Send + Sync>;

/// A remotely callable service type
pub struct ServiceDefinition {
    name: Arc<str>,
    constructor: Constructor,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDefinition {
    /// Start declaring service `name` whose instances are built by `ctor`
    pub fn builder<S, F>(name: impl Into<Arc<str>>, ctor: F) -> ServiceBuilder<S>
    where
        S: Any + Send,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::try_builder(name, move || Ok(ctor()))
    }

    /// Like [`builder`](Self::builder) for constructors that can fail
    pub fn try_builder<S, F>(name: impl Into<Arc<str>>, ctor: F) -> ServiceBuilder<S>
    where
        S: Any + Send,
        F: Fn() -> Result<S, BoxError> + Send + Sync + 'static,
    {
        ServiceBuilder {
            name: name.into(),
            constructor: Box::new(move || -> Result<Box<dyn Any + Send>, BoxError> {
                Ok(Box::new(ctor()?))
            }),
            methods: Vec::new(),
            _service: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Build a fresh instance
    pub fn construct(&self) -> Result<Box<dyn Any + Send>, BoxError> {
        (self.constructor)()
    }

    /// Pick the overload of `operation` best matching `args`
    ///
    /// Candidates must have the same arity and accept every argument. Among
    /// those, the one with the most arguments already of the exact declared
    /// kind wins; ties go to the earliest declaration.
    pub fn resolve(
        &self,
        operation: &str,
        args: &[Value],
        types: &dyn TypeLookup,
    ) -> Option<&MethodDescriptor> {
        let mut best: Option<(&MethodDescriptor, usize)> = None;
        for method in &self.methods {
            if method.name() != operation || method.arity() != args.len() {
                continue;
            }
            let accepts = method
                .params()
                .iter()
                .zip(args)
                .all(|(kind, arg)| is_assignable(arg, kind, types));
            if !accepts {
                continue;
            }
            let score = method
                .params()
                .iter()
                .zip(args)
                .filter(|(kind, arg)| is_exact(arg, kind))
                .count();
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((method, score));
            }
        }
        best.map(|(method, _)| method)
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

fn is_exact(value: &Value, kind: &MemberKind) -> bool {
    match (kind, value) {
        (MemberKind::Boolean, Value::Boolean(_))
        | (MemberKind::Integer, Value::Integer(_))
        | (MemberKind::Double, Value::Double(_))
        | (MemberKind::String, Value::String(_))
        | (MemberKind::Date, Value::Date(_))
        | (MemberKind::Xml, Value::Xml(_))
        | (MemberKind::ByteArray, Value::ByteArray(_))
        | (MemberKind::Array(_), Value::Array(_))
        | (MemberKind::Map, Value::AssociativeArray(_))
        | (MemberKind::Object(None), Value::Object(_)) => true,
        (MemberKind::Object(Some(name)), Value::Object(obj)) => {
            obj.type_name() == Some(name.as_ref())
        }
        _ => false,
    }
}

/// Builder for a [`ServiceDefinition`] over service type `S`
pub struct ServiceBuilder<S> {
    name: Arc<str>,
    constructor: Constructor,
    methods: Vec<MethodDescriptor>,
    _service: PhantomData<fn() -> S>,
}

impl<S: Any + Send> ServiceBuilder<S> {
    /// Declare a method; finish it with [`MethodBuilder::handler`]
    pub fn method(self, name: impl Into<Arc<str>>) -> MethodBuilder<S> {
        MethodBuilder {
            service: self,
            name: name.into(),
            params: Vec::new(),
            roles: Vec::new(),
            cacheable: false,
            attributes: Vec::new(),
        }
    }

    pub fn build(self) -> ServiceDefinition {
        ServiceDefinition {
            name: self.name,
            constructor: self.constructor,
            methods: self.methods,
        }
    }
}

/// Builder for one method of service `S`
pub struct MethodBuilder<S> {
    service: ServiceBuilder<S>,
    name: Arc<str>,
    params: Vec<MemberKind>,
    roles: Vec<String>,
    cacheable: bool,
    attributes: Vec<Arc<dyn InvocationAttribute>>,
}

impl<S: Any + Send> MethodBuilder<S> {
    /// Append a parameter of the given kind
    pub fn param(mut self, kind: MemberKind) -> Self {
        self.params.push(kind);
        self
    }

    /// Require the caller to hold `role` (any one of the declared roles)
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles.extend(roles.iter().map(|r| r.to_string()));
        self
    }

    /// Store successful results in the adapter's result cache
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Attach a hook attribute; hooks run in the order they are attached
    pub fn hook(mut self, attribute: impl InvocationAttribute + 'static) -> Self {
        self.attributes.push(Arc::new(attribute));
        self
    }

    pub fn shared_hook(mut self, attribute: Arc<dyn InvocationAttribute>) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Set the method body and return to the service builder
    ///
    /// The handler receives coerced arguments, one per declared parameter.
    pub fn handler<F>(self, handler: F) -> ServiceBuilder<S>
    where
        F: Fn(&mut S, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let MethodBuilder {
            mut service,
            name,
            params,
            roles,
            cacheable,
            attributes,
        } = self;

        let service_name = service.name.clone();
        let body: MethodBody = Box::new(move |target: &mut dyn Any, args: &[Value]| {
            let instance = target.downcast_mut::<S>().ok_or_else(|| -> BoxError {
                format!("instance is not a {service_name} service").into()
            })?;
            handler(instance, args)
        });

        service.methods.push(MethodDescriptor::new(
            service.name.clone(),
            name,
            params,
            roles,
            cacheable,
            attributes,
            body,
        ));
        service
    }
}
