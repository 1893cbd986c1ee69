use crate::behavior::RoleBehavior;
use crate::types::AgentProfile;
use cadre_core::{CadreError, CadreResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a role behavior for one agent descriptor.
pub type RoleFactory = Arc<dyn Fn(&AgentProfile) -> Arc<dyn RoleBehavior> + Send + Sync>;

/// Maps role names to behavior factories, so the set of roles is data-driven.
#[derive(Clone, Default)]
pub struct RoleRegistry {
    factories: HashMap<String, RoleFactory>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `role`, replacing any earlier factory.
    pub fn register<F>(&mut self, role: impl Into<String>, factory: F)
    where
        F: Fn(&AgentProfile) -> Arc<dyn RoleBehavior> + Send + Sync + 'static,
    {
        let role = role.into();
        info!(role = %role, "Registered role");
        self.factories.insert(role, Arc::new(factory));
    }

    /// Whether a factory is registered for `role`.
    pub fn contains(&self, role: &str) -> bool {
        self.factories.contains_key(role)
    }

    /// Build the behavior for `profile.role`.
    pub fn build(&self, profile: &AgentProfile) -> CadreResult<Arc<dyn RoleBehavior>> {
        let factory = self.factories.get(&profile.role).ok_or_else(|| {
            CadreError::Config(format!(
                "agent '{}' uses unknown role '{}'",
                profile.id, profile.role
            ))
        })?;
        Ok(factory(profile))
    }

    /// Registered role names, sorted.
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.factories.keys().cloned().collect();
        roles.sort();
        roles
    }

    /// Number of registered roles.
    pub fn role_count(&self) -> usize {
        self.factories.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::types::AgentTask;
    use async_trait::async_trait;

    struct Named(String);

    #[async_trait]
    impl RoleBehavior for Named {
        fn role(&self) -> &str {
            &self.0
        }

        async fn perform_action(
            &self,
            _agent: &Agent,
            _action: &str,
            _description: &str,
            _task: &AgentTask,
        ) -> CadreResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    #[test]
    fn test_build_known_role() {
        let mut registry = RoleRegistry::new();
        registry.register("scribe", |p: &AgentProfile| {
            Arc::new(Named(p.role.clone())) as Arc<dyn RoleBehavior>
        });

        let behavior = registry
            .build(&AgentProfile::new("s1", "scribe"))
            .unwrap();
        assert_eq!(behavior.role(), "scribe");
        assert_eq!(registry.roles(), vec!["scribe"]);
    }

    #[test]
    fn test_unknown_role_is_config_error() {
        let registry = RoleRegistry::new();
        let err = registry
            .build(&AgentProfile::new("x", "wizard"))
            .err()
            .unwrap();
        assert!(matches!(err, CadreError::Config(_)));
    }
}
