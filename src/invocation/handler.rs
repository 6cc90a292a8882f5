//! Invocation dispatcher
//!
//! Runs a resolved method and then its hook attributes: every callback in
//! declaration order, followed by every result handler in declaration order.
//! A method without attributes returns its value unchanged.

use std::any::Any;
use tracing::debug;

use super::context::InvocationContext;
use super::method::{BoxError, MethodDescriptor};
use crate::amf::{Fault, Value};
use crate::error::RemotingError;

/// Hook notified after the method returned
///
/// Callbacks may use the context's stack and properties; the result slot is
/// advisory to them.
pub trait InvocationCallback: Send + Sync {
    fn on_invoked(
        &self,
        ctx: &mut InvocationContext,
        method: &MethodDescriptor,
        target: &dyn Any,
        args: &[Value],
        result: &Value,
    ) -> Result<(), BoxError>;
}

/// Hook that may replace the call's result through the context
pub trait InvocationResultHandler: Send + Sync {
    fn handle_result(
        &self,
        ctx: &mut InvocationContext,
        method: &MethodDescriptor,
        target: &dyn Any,
        args: &[Value],
        result: &Value,
    ) -> Result<(), BoxError>;
}

/// Attribute attached to a method at registration time
///
/// An attribute exposes either capability, both, or neither.
///
/// # Example
///
/// ```ignore
/// struct Audit;
///
/// impl InvocationCallback for Audit {
///     fn on_invoked(&self, ctx: &mut InvocationContext, method: &MethodDescriptor,
///                   _target: &dyn Any, _args: &[Value], _result: &Value) -> Result<(), BoxError> {
///         ctx.push(Value::from(method.qualified_name()));
///         Ok(())
///     }
/// }
///
/// impl InvocationAttribute for Audit {
///     fn as_callback(&self) -> Option<&dyn InvocationCallback> {
///         Some(self)
///     }
/// }
/// ```
pub trait InvocationAttribute: Send + Sync {
    fn as_callback(&self) -> Option<&dyn InvocationCallback> {
        None
    }

    fn as_result_handler(&self) -> Option<&dyn InvocationResultHandler> {
        None
    }
}

/// Executes one method with its hooks
pub struct InvocationHandler<'m> {
    method: &'m MethodDescriptor,
    include_detail: bool,
}

impl<'m> InvocationHandler<'m> {
    pub fn new(method: &'m MethodDescriptor) -> Self {
        Self {
            method,
            include_detail: false,
        }
    }

    /// Report the debug rendering of method errors in the fault detail
    pub fn with_detail(mut self, include_detail: bool) -> Self {
        self.include_detail = include_detail;
        self
    }

    /// Call the method on `target` with already coerced arguments
    ///
    /// An error returned by the method itself becomes a fault value in the
    /// `Ok` result. Only hook failures are reported as `Err`.
    pub fn invoke(&self, target: &mut dyn Any, args: &[Value]) -> Result<Value, RemotingError> {
        debug!(method = %self.method.qualified_name(), args = args.len(), "Invoking method");

        let result = match self.method.call(target, args) {
            Ok(result) => result,
            Err(err) => {
                let fault = self.method_fault(&err);
                debug!(
                    method = %self.method.qualified_name(),
                    error = %fault,
                    "Method returned an error"
                );
                return Ok(Value::from(fault));
            }
        };

        let attributes = self.method.attributes();
        if attributes.is_empty() {
            return Ok(result);
        }

        let target: &dyn Any = target;
        let mut ctx = InvocationContext::new(result.clone());
        for callback in attributes.iter().filter_map(|a| a.as_callback()) {
            callback
                .on_invoked(&mut ctx, self.method, target, args, &result)
                .map_err(|e| RemotingError::Hook(e.to_string()))?;
        }
        for handler in attributes.iter().filter_map(|a| a.as_result_handler()) {
            handler
                .handle_result(&mut ctx, self.method, target, args, &result)
                .map_err(|e| RemotingError::Hook(e.to_string()))?;
        }
        Ok(ctx.into_result())
    }

    fn method_fault(&self, err: &BoxError) -> Fault {
        let fault = Fault::from_error(&**err);
        if self.include_detail && fault.detail.is_none() {
            let detail = format!("{err:?}");
            return fault.with_detail(detail);
        }
        fault
    }
}
