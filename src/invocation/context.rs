//! Invocation context
//!
//! Scratch state shared by the hooks of a single call.

use std::collections::HashMap;

use crate::amf::Value;

/// Per-call state passed to invocation hooks
///
/// Created fresh for every invocation that carries hooks and discarded when
/// the call returns. Callbacks communicate through the stack and the
/// properties; only result handlers are expected to replace the result.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    stack: Vec<Value>,
    properties: HashMap<String, Value>,
    result: Value,
}

impl InvocationContext {
    /// Create a context seeded with the method's return value
    pub fn new(result: Value) -> Self {
        Self {
            stack: Vec::new(),
            properties: HashMap::new(),
            result,
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<&Value> {
        self.stack.last()
    }

    /// Number of values on the scratch stack
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.properties.insert(name.into(), value)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// Current value of the result slot
    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = result;
    }

    pub fn into_result(self) -> Value {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        let ctx = InvocationContext::new(Value::from("r"));
        assert_eq!(ctx.result(), &Value::from("r"));
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.peek().is_none());
    }

    #[test]
    fn test_stack_is_lifo() {
        let mut ctx = InvocationContext::default();
        ctx.push(Value::Integer(1));
        ctx.push(Value::Integer(2));
        assert_eq!(ctx.peek(), Some(&Value::Integer(2)));
        assert_eq!(ctx.pop(), Some(Value::Integer(2)));
        assert_eq!(ctx.pop(), Some(Value::Integer(1)));
        assert_eq!(ctx.pop(), None);
    }

    #[test]
    fn test_properties_and_result() {
        let mut ctx = InvocationContext::new(Value::Null);
        assert!(ctx.set_property("user", Value::from("alice")).is_none());
        assert_eq!(ctx.property("user"), Some(&Value::from("alice")));
        assert_eq!(ctx.remove_property("user"), Some(Value::from("alice")));
        assert!(ctx.property("user").is_none());

        ctx.set_result(Value::Boolean(true));
        assert_eq!(ctx.into_result(), Value::Boolean(true));
    }
}
