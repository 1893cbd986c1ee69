use cadre_agent::{AgentProfile, WorkflowStep};
use cadre_core::{CadreError, CadreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Engine-wide tunables, the `[settings]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_agent_history_capacity")]
    pub agent_history_capacity: usize,
    #[serde(default = "default_recent_messages")]
    pub recent_messages: usize,
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
}

impl Settings {
    /// `test_timeout_secs` as a [`Duration`].
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            agent_history_capacity: default_agent_history_capacity(),
            recent_messages: default_recent_messages(),
            test_timeout_secs: default_test_timeout_secs(),
        }
    }
}

fn default_history_capacity() -> usize {
    cadre_core::DEFAULT_HISTORY_CAPACITY
}

fn default_agent_history_capacity() -> usize {
    cadre_agent::DEFAULT_AGENT_HISTORY
}

fn default_recent_messages() -> usize {
    10
}

fn default_test_timeout_secs() -> u64 {
    300
}

/// An ordered list of steps run against one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    #[serde(default)]
    pub name: String,
    pub agent: String,
    pub steps: Vec<WorkflowStep>,
}

/// Static team description: settings, agents, and workflows.
///
/// Read once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentProfile>,
    #[serde(default)]
    pub workflows: BTreeMap<String, WorkflowDescriptor>,
}

impl TeamConfig {
    /// Parse and validate a TOML team file.
    ///
    /// Agent ids and names left out of a table default to the table key.
    pub fn from_toml_str(source: &str) -> CadreResult<Self> {
        let mut config: TeamConfig = toml::from_str(source)
            .map_err(|e| CadreError::Config(format!("invalid team file: {e}")))?;
        for (key, profile) in &mut config.agents {
            if profile.id.is_empty() {
                profile.id = key.clone();
            }
            if profile.name.is_empty() {
                profile.name = profile.id.clone();
            }
        }
        for (key, workflow) in &mut config.workflows {
            if workflow.name.is_empty() {
                workflow.name = key.clone();
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Read a team file from disk.
    pub async fn load(path: &Path) -> CadreResult<Self> {
        let source = tokio::fs::read_to_string(path).await.map_err(|e| {
            CadreError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&source)?;
        info!(
            path = %path.display(),
            agents = config.agents.len(),
            workflows = config.workflows.len(),
            "Team configuration loaded"
        );
        Ok(config)
    }

    /// Check cross references between agents and workflows.
    pub fn validate(&self) -> CadreResult<()> {
        for (key, profile) in &self.agents {
            if *key != profile.id {
                return Err(CadreError::Config(format!(
                    "agent table '{key}' declares id '{}'",
                    profile.id
                )));
            }
            if profile.role.is_empty() {
                return Err(CadreError::Config(format!("agent '{key}' has no role")));
            }
            for target in &profile.can_delegate_to {
                if !self.agents.contains_key(target) {
                    return Err(CadreError::Config(format!(
                        "agent '{key}' delegates to unknown agent '{target}'"
                    )));
                }
            }
            if let Some(lead) = &profile.reports_to {
                if !self.agents.contains_key(lead) {
                    return Err(CadreError::Config(format!(
                        "agent '{key}' reports to unknown agent '{lead}'"
                    )));
                }
            }
        }
        for (id, workflow) in &self.workflows {
            if !self.agents.contains_key(&workflow.agent) {
                return Err(CadreError::Config(format!(
                    "workflow '{id}' runs on unknown agent '{}'",
                    workflow.agent
                )));
            }
            if workflow.steps.is_empty() {
                return Err(CadreError::Config(format!("workflow '{id}' has no steps")));
            }
        }
        Ok(())
    }

    /// Built-in four-agent team used when no team file is present.
    pub fn default_team() -> Self {
        let agents = [
            AgentProfile::new("analyst", "analyst")
                .with_name("Requirements Analyst")
                .with_capabilities(["analyze_requirements", "write_user_stories", "summarize"])
                .with_delegates(["developer"]),
            AgentProfile::new("developer", "developer")
                .with_name("Developer")
                .with_capabilities(["scan_sources", "plan", "implement"])
                .with_delegates(["reviewer"])
                .reporting_to("analyst"),
            AgentProfile::new("reviewer", "reviewer")
                .with_name("Code Reviewer")
                .with_capabilities(["review_code", "security_audit"])
                .with_delegates(["developer"])
                .reporting_to("developer"),
            AgentProfile::new("tester", "tester")
                .with_name("Test Runner")
                .with_capabilities(["run_tests"])
                .with_delegates(["developer"])
                .reporting_to("developer"),
        ];

        let workflows = [
            (
                "requirements",
                WorkflowDescriptor {
                    name: "Requirements analysis".to_string(),
                    agent: "analyst".to_string(),
                    steps: vec![
                        WorkflowStep::new("analyze_requirements", "Extract requirements"),
                        WorkflowStep::new("write_user_stories", "Draft user stories"),
                        WorkflowStep::new("summarize", "Summarize"),
                    ],
                },
            ),
            (
                "feature",
                WorkflowDescriptor {
                    name: "Feature development".to_string(),
                    agent: "developer".to_string(),
                    steps: vec![
                        WorkflowStep::new("scan_sources", "Inspect the source tree"),
                        WorkflowStep::new("plan", "Plan the change"),
                        WorkflowStep::new("implement", "Implement and request review"),
                    ],
                },
            ),
            (
                "audit",
                WorkflowDescriptor {
                    name: "Code audit".to_string(),
                    agent: "reviewer".to_string(),
                    steps: vec![
                        WorkflowStep::new("review_code", "Review"),
                        WorkflowStep::new("security_audit", "Security audit"),
                    ],
                },
            ),
        ];

        let mut agents_by_id = BTreeMap::new();
        for mut profile in agents {
            profile.workflows = workflows
                .iter()
                .filter(|(_, w)| w.agent == profile.id)
                .map(|(id, _)| id.to_string())
                .collect();
            agents_by_id.insert(profile.id.clone(), profile);
        }

        Self {
            settings: Settings::default(),
            agents: agents_by_id,
            workflows: workflows
                .into_iter()
                .map(|(id, w)| (id.to_string(), w))
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const TEAM: &str = r#"
[settings]
history_capacity = 50

[agents.lead]
role = "analyst"
capabilities = ["summarize"]
can_delegate_to = ["dev"]

[agents.dev]
name = "Dev"
role = "developer"
capabilities = ["plan"]
reports_to = "lead"

[agents.dev.prompts]
system = "You write Rust."

[workflows.plan_it]
agent = "dev"
steps = [{ id = "plan", name = "Plan" }]
"#;

    #[test]
    fn test_sample_team_file_matches_builtin_team() {
        let sample = include_str!("../../../cadre.example.toml");
        let config = TeamConfig::from_toml_str(sample).unwrap();
        assert_eq!(config, TeamConfig::default_team());
    }

    #[test]
    fn test_parse_fills_defaults() {
        let config = TeamConfig::from_toml_str(TEAM).unwrap();
        assert_eq!(config.settings.history_capacity, 50);
        assert_eq!(config.settings.recent_messages, 10);
        assert_eq!(config.settings.test_timeout(), Duration::from_secs(300));

        let lead = &config.agents["lead"];
        assert_eq!(lead.id, "lead");
        assert_eq!(lead.name, "lead");
        assert_eq!(config.agents["dev"].prompts["system"], "You write Rust.");
        assert_eq!(config.workflows["plan_it"].name, "plan_it");
    }

    #[test]
    fn test_mismatched_id_rejected() {
        let source = "[agents.a]\nid = \"b\"\nrole = \"analyst\"\n";
        let err = TeamConfig::from_toml_str(source).unwrap_err();
        assert!(matches!(err, CadreError::Config(_)));
    }

    #[test]
    fn test_unknown_references_rejected() {
        let delegate = "[agents.a]\nrole = \"analyst\"\ncan_delegate_to = [\"ghost\"]\n";
        assert!(TeamConfig::from_toml_str(delegate).is_err());

        let lead = "[agents.a]\nrole = \"analyst\"\nreports_to = \"ghost\"\n";
        assert!(TeamConfig::from_toml_str(lead).is_err());

        let workflow = "[workflows.w]\nagent = \"ghost\"\nsteps = [{ id = \"x\", name = \"X\" }]\n";
        assert!(TeamConfig::from_toml_str(workflow).is_err());
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let source = "[agents.a]\nrole = \"analyst\"\n\n[workflows.w]\nagent = \"a\"\nsteps = []\n";
        let err = TeamConfig::from_toml_str(source).unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            TeamConfig::from_toml_str("[agents.a\nrole ="),
            Err(CadreError::Config(_))
        ));
    }

    #[test]
    fn test_default_team_is_valid() {
        let team = TeamConfig::default_team();
        team.validate().unwrap();
        assert_eq!(team.agents.len(), 4);
        assert_eq!(team.workflows.len(), 3);
        assert_eq!(team.agents["developer"].workflows, vec!["feature"]);
        assert!(team.agents["tester"].workflows.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadre.toml");
        tokio::fs::write(&path, TEAM).await.unwrap();
        let config = TeamConfig::load(&path).await.unwrap();
        assert_eq!(config.agents.len(), 2);

        let missing = TeamConfig::load(&dir.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(CadreError::Config(_))));
    }
}
