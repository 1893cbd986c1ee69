//! Built-in reference roles.

mod analyst;
mod developer;
mod reviewer;
mod tester;

pub use analyst::AnalystRole;
pub use developer::DeveloperRole;
pub use reviewer::ReviewerRole;
pub use tester::{TesterRole, DEFAULT_TEST_COMMAND};

use crate::behavior::RoleBehavior;
use crate::registry::RoleRegistry;
use crate::types::AgentProfile;
use std::sync::Arc;
use std::time::Duration;

/// Default wall-clock limit for a test run.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Register `analyst`, `developer`, `reviewer`, and `tester`.
pub fn register_builtin_roles(registry: &mut RoleRegistry, test_timeout: Duration) {
    registry.register("analyst", |_: &AgentProfile| {
        Arc::new(AnalystRole) as Arc<dyn RoleBehavior>
    });
    registry.register("developer", |_: &AgentProfile| {
        Arc::new(DeveloperRole) as Arc<dyn RoleBehavior>
    });
    registry.register("reviewer", |_: &AgentProfile| {
        Arc::new(ReviewerRole::new()) as Arc<dyn RoleBehavior>
    });
    registry.register("tester", move |_: &AgentProfile| {
        Arc::new(TesterRole::new(test_timeout)) as Arc<dyn RoleBehavior>
    });
}
