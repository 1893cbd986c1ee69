use crate::agent::Agent;
use crate::behavior::{describe, RoleBehavior};
use crate::types::{AgentTask, StepOutcome, WorkflowStep};
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, Message, TaskCompletion, TaskFailure};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SKIPPED_DIRS: &[&str] = &["target", ".git", "node_modules"];

/// Cap on files visited by one scan.
const MAX_SCANNED_FILES: usize = 5_000;

/// Source-tree inspection and implementation planning.
///
/// `implement` hands its plan to every delegation target with a `review_code`
/// assignment; the verdicts come back later as completion messages.
pub struct DeveloperRole;

impl DeveloperRole {
    async fn scan(root: &Path) -> CadreResult<serde_json::Value> {
        if !tokio::fs::try_exists(root).await? {
            return Err(CadreError::NotFound(format!(
                "source path '{}'",
                root.display()
            )));
        }

        let mut by_extension: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut files = 0usize;
        let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

        'scan: while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    let name = entry.file_name();
                    if !SKIPPED_DIRS.iter().any(|s| name == *s) {
                        stack.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                files += 1;
                if files > MAX_SCANNED_FILES {
                    warn!(root = %root.display(), "Scan truncated at file limit");
                    break 'scan;
                }
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_string();
                // Binary files count as zero lines.
                let lines = tokio::fs::read_to_string(&path)
                    .await
                    .map(|s| s.lines().count())
                    .unwrap_or(0);
                let slot = by_extension.entry(ext).or_insert((0, 0));
                slot.0 += 1;
                slot.1 += lines;
            }
        }

        let total_lines: usize = by_extension.values().map(|(_, l)| l).sum();
        let breakdown: serde_json::Map<String, serde_json::Value> = by_extension
            .into_iter()
            .map(|(ext, (count, lines))| {
                let key = if ext.is_empty() { "(none)".to_string() } else { ext };
                (key, serde_json::json!({ "files": count, "lines": lines }))
            })
            .collect();

        Ok(serde_json::json!({
            "root": root.display().to_string(),
            "files": files.min(MAX_SCANNED_FILES),
            "lines": total_lines,
            "by_extension": breakdown,
        }))
    }

    fn plan(description: &str) -> Vec<String> {
        description
            .split(['.', '\n', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect()
    }

    async fn implement(agent: &Agent, description: &str) -> CadreResult<serde_json::Value> {
        let plan = Self::plan(description);
        let mut reviews = Vec::new();
        for target in agent.delegates() {
            let task_id = agent
                .delegate_to(&target, "review_code", &plan.join("\n"))
                .await?;
            reviews.push(serde_json::json!({ "agent": target, "task_id": task_id }));
        }
        Ok(serde_json::json!({ "plan": plan, "reviews_requested": reviews }))
    }
}

#[async_trait]
impl RoleBehavior for DeveloperRole {
    fn role(&self) -> &str {
        "developer"
    }

    async fn perform_action(
        &self,
        agent: &Agent,
        action: &str,
        description: &str,
        _task: &AgentTask,
    ) -> CadreResult<serde_json::Value> {
        match action {
            "scan_sources" => {
                let root = if description.trim().is_empty() {
                    "."
                } else {
                    description.trim()
                };
                Self::scan(Path::new(root)).await
            }
            "implement" => Self::implement(agent, description).await,
            "plan" => Ok(serde_json::json!({ "plan": Self::plan(description) })),
            other => Err(CadreError::TaskExecution(format!(
                "developer cannot perform '{other}'"
            ))),
        }
    }

    async fn execute_workflow_step(
        &self,
        agent: &Agent,
        step: &WorkflowStep,
        input: &serde_json::Value,
        previous: &[StepOutcome],
    ) -> CadreResult<serde_json::Value> {
        // Steps after a scan plan against what was found.
        let description = match previous.last() {
            Some(last) if step.id != "scan_sources" => {
                format!("{}\n{}", describe(input), last.result)
            }
            _ => describe(input),
        };
        agent.execute_task(&step.id, &description).await
    }

    async fn on_completion(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        if let Ok(done) = serde_json::from_value::<TaskCompletion>(message.payload.clone()) {
            info!(
                agent_id = %agent.id(),
                from = %message.from,
                task_id = %done.task_id,
                "Delegated work completed"
            );
        }
        Ok(())
    }

    async fn on_error(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        if let Ok(failure) = serde_json::from_value::<TaskFailure>(message.payload.clone()) {
            warn!(
                agent_id = %agent.id(),
                from = %message.from,
                task_id = ?failure.task_id,
                error = %failure.error,
                "Delegated work failed"
            );
        }
        Ok(())
    }
}
