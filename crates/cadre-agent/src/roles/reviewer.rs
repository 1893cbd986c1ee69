use crate::agent::Agent;
use crate::behavior::{describe, RoleBehavior};
use crate::types::AgentTask;
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult, Message, MessageType};
use regex::Regex;
use serde::Serialize;
use std::path::Path;

/// (id, severity, pattern, advice)
const RULES: &[(&str, &str, &str, &str)] = &[
    ("unwrap", "warning", r"\.unwrap\(\)", "propagate the error instead of unwrapping"),
    ("expect", "warning", r"\.expect\(", "propagate the error instead of expecting"),
    ("panic", "error", r"\bpanic!\(", "return an error instead of panicking"),
    ("unsafe", "error", r"\bunsafe\s*\{", "document the safety invariant or remove unsafe"),
    ("debug_print", "info", r"\b(println|dbg)!\(", "use tracing instead of printing"),
    ("todo", "info", r"\b(TODO|FIXME|XXX)\b", "resolve or ticket the pending work"),
    ("secret", "error", r#"(?i)(api[_-]?key|password|secret)\s*=\s*["'][^"']+["']"#, "load secrets from the environment"),
];

#[derive(Debug, Clone, Serialize)]
struct Finding {
    rule: &'static str,
    severity: &'static str,
    line: usize,
    advice: &'static str,
}

/// Pattern-based code review.
pub struct ReviewerRole {
    rules: Vec<(&'static str, &'static str, Regex, &'static str)>,
}

impl ReviewerRole {
    /// Reviewer with the built-in rule table.
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(id, severity, pattern, advice)| {
                Regex::new(pattern)
                    .ok()
                    .map(|re| (*id, *severity, re, *advice))
            })
            .collect();
        Self { rules }
    }

    fn review(&self, source: &str) -> serde_json::Value {
        let mut findings = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            for (rule, severity, re, advice) in &self.rules {
                if re.is_match(line) {
                    findings.push(Finding {
                        rule: *rule,
                        severity: *severity,
                        line: idx + 1,
                        advice: *advice,
                    });
                }
            }
        }
        let errors = findings.iter().filter(|f| f.severity == "error").count();
        let warnings = findings.iter().filter(|f| f.severity == "warning").count();
        let score = 100usize.saturating_sub(errors * 20 + warnings * 5);
        serde_json::json!({
            "approved": errors == 0,
            "score": score,
            "findings": findings,
        })
    }

    /// The description is either a path to a readable file or inline source.
    async fn load(description: &str) -> CadreResult<String> {
        let candidate = description.trim();
        let looks_like_path = !candidate.is_empty()
            && !candidate.contains('\n')
            && tokio::fs::metadata(Path::new(candidate))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
        if looks_like_path {
            Ok(tokio::fs::read_to_string(candidate).await?)
        } else {
            Ok(description.to_string())
        }
    }
}

impl Default for ReviewerRole {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleBehavior for ReviewerRole {
    fn role(&self) -> &str {
        "reviewer"
    }

    async fn perform_action(
        &self,
        _agent: &Agent,
        action: &str,
        description: &str,
        _task: &AgentTask,
    ) -> CadreResult<serde_json::Value> {
        match action {
            "review_code" | "security_audit" => {
                let source = Self::load(description).await?;
                if source.trim().is_empty() {
                    return Err(CadreError::TaskExecution(
                        "nothing to review".to_string(),
                    ));
                }
                let mut report = self.review(&source);
                if action == "security_audit" {
                    if let Some(findings) = report["findings"].as_array_mut() {
                        findings.retain(|f| f["severity"] == "error");
                    }
                }
                Ok(report)
            }
            other => Err(CadreError::TaskExecution(format!(
                "reviewer cannot perform '{other}'"
            ))),
        }
    }

    async fn on_review_request(&self, agent: &Agent, message: &Message) -> CadreResult<()> {
        let source = message
            .payload
            .get("content")
            .map(describe)
            .unwrap_or_else(|| describe(&message.payload));
        agent
            .reply_to(message, MessageType::ReviewFeedback, self.review(&source))
            .await?;
        Ok(())
    }
}
