//! Class definitions (AMF3 "traits")
//!
//! A class definition is the wire layout of one object type: its type
//! identifier, its ordered sealed member names and two flags. AMF3 sends a
//! definition once per message and references it by index afterwards.

use std::sync::{Arc, OnceLock};

/// Ordered member layout of an object type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassDefinition {
    name: Arc<str>,
    members: Vec<Arc<str>>,
    externalizable: bool,
    dynamic: bool,
}

impl ClassDefinition {
    pub fn new(
        name: impl Into<Arc<str>>,
        members: Vec<Arc<str>>,
        externalizable: bool,
        dynamic: bool,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            externalizable,
            dynamic,
        }
    }

    /// Shared shape of anonymous dynamic objects
    pub fn anonymous() -> Arc<ClassDefinition> {
        static ANONYMOUS: OnceLock<Arc<ClassDefinition>> = OnceLock::new();
        ANONYMOUS
            .get_or_init(|| Arc::new(ClassDefinition::new("", Vec::new(), false, true)))
            .clone()
    }

    /// Externalizable shape: no sealed members, payload owned by the type
    pub fn externalizable(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, Vec::new(), true, false)
    }

    /// Raw type identifier (empty for anonymous objects)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Type identifier, `None` for anonymous objects
    pub fn type_name(&self) -> Option<&str> {
        if self.name.is_empty() {
            None
        } else {
            Some(&self.name)
        }
    }

    pub fn is_typed(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn members(&self) -> &[Arc<str>] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.as_ref() == name)
    }

    pub fn is_externalizable(&self) -> bool {
        self.externalizable
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}
