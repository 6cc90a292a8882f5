//! Role-based authorization

use std::collections::HashSet;

/// Authorization capability of the caller
pub trait Authorizer: Send + Sync {
    /// Whether the caller holds at least one of `roles`
    fn is_authorized(&self, roles: &[String]) -> bool;
}

/// Authenticated caller and its roles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    roles: HashSet<String>,
}

impl Principal {
    pub fn new<I, R>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Unauthenticated caller without roles
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

impl Authorizer for Principal {
    fn is_authorized(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.roles.contains(r.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_roles() {
        let admin = Principal::new("alice", ["admin", "user"]);
        assert!(admin.has_role("admin"));
        assert!(admin.is_authorized(&["admin".into()]));
        assert!(admin.is_authorized(&["ops".into(), " user".into()]));
        assert!(!admin.is_authorized(&["ops".into()]));
        assert!(!admin.is_authorized(&[]));
    }

    #[test]
    fn test_anonymous_has_no_roles() {
        assert!(!Principal::anonymous().is_authorized(&["user".into()]));
    }
}
