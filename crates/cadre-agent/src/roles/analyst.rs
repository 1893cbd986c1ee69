use crate::agent::Agent;
use crate::behavior::{describe, RoleBehavior};
use crate::types::{AgentTask, StepOutcome, WorkflowStep};
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, Message, MessageType};
use std::collections::HashMap;

/// Words that mark a sentence as a requirement.
const REQUIREMENT_MARKERS: &[&str] = &["must", "should", "shall", "need", "needs", "require"];

const STOP_WORDS: &[&str] = &[
    "about", "after", "their", "there", "these", "which", "would", "could", "should", "must",
    "shall", "with", "from", "that", "this", "have", "will", "when", "where", "into",
];

/// Heuristic requirements analysis over plain text.
pub struct AnalystRole;

impl AnalystRole {
    fn sentences(text: &str) -> Vec<String> {
        text.split(['.', '!', '?', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    fn requirements(text: &str) -> Vec<String> {
        Self::sentences(text)
            .into_iter()
            .filter(|s| {
                s.split_whitespace().any(|w| {
                    let w = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
                    REQUIREMENT_MARKERS.contains(&w.as_str())
                })
            })
            .collect()
    }

    fn keywords(text: &str, limit: usize) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.len() > 4 && !STOP_WORDS.contains(&word.as_str()) {
                *counts.entry(word).or_default() += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(limit).map(|(w, _)| w).collect()
    }

    fn analyze(text: &str) -> serde_json::Value {
        let requirements = Self::requirements(text);
        serde_json::json!({
            "word_count": text.split_whitespace().count(),
            "sentence_count": Self::sentences(text).len(),
            "requirements": requirements,
            "keywords": Self::keywords(text, 8),
            "clarity": if requirements.is_empty() { "vague" } else { "actionable" },
        })
    }

    fn user_stories(text: &str) -> serde_json::Value {
        let stories: Vec<String> = Self::requirements(text)
            .iter()
            .map(|r| format!("As a user, I want {}", r.to_lowercase()))
            .collect();
        serde_json::json!({ "stories": stories })
    }
}

#[async_trait]
impl RoleBehavior for AnalystRole {
    fn role(&self) -> &str {
        "analyst"
    }

    async fn perform_action(
        &self,
        _agent: &Agent,
        action: &str,
        description: &str,
        _task: &AgentTask,
    ) -> CadreResult<serde_json::Value> {
        match action {
            "analyze_requirements" => Ok(Self::analyze(description)),
            "write_user_stories" => Ok(Self::user_stories(description)),
            "summarize" => Ok(serde_json::json!({
                "summary": Self::sentences(description).into_iter().take(3).collect::<Vec<_>>(),
            })),
            other => Err(CadreError::TaskExecution(format!(
                "analyst cannot perform '{other}'"
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
        // Later steps work from the requirements found earlier when there are any.
        let found: Vec<String> = previous
            .iter()
            .filter_map(|o| o.result.get("requirements"))
            .filter_map(|r| r.as_array())
            .flatten()
            .filter_map(|r| r.as_str().map(String::from))
            .collect();
        let description = if found.is_empty() {
            describe(input)
        } else {
            found.join(". ")
        };
        agent.execute_task(&step.id, &description).await
    }

    async fn on_question(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        let text = describe(&message.payload);
        agent
            .reply_to(message, MessageType::StatusUpdate, Self::analyze(&text))
            .await?;
        Ok(())
    }
}
