//! Invocation dispatch
//!
//! Executes a resolved [`MethodDescriptor`] with coerced arguments and runs
//! the hook attributes registered with it. See [`InvocationHandler`].

pub mod context;
pub mod handler;
pub mod method;

pub use context::InvocationContext;
pub use handler::{
    InvocationAttribute, InvocationCallback, InvocationHandler, InvocationResultHandler,
};
pub use method::{BoxError, MethodDescriptor};
