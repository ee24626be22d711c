use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Declared risk of invoking a tool, independent of any particular call's
/// arguments. Ordered so `Low < Medium < High < Critical` compares the way
/// a threshold check expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

/// What the policy engine decided for one `(tool_name, arguments)` request.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    AutoAllow,
    Deny { reason: String },
    Prompt { risk: RiskLevel, preview: Option<String> },
}

/// The human's (or session's) answer to a `Decision::Prompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PromptResponse {
    AllowOnce,
    Session,
    Remember,
    Deny,
}

/// A per-tool rule. `None` falls through to the risk-based default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Allow,
    Deny,
}

/// One entry in the persisted policy file: `{decision, granted_at}` per §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub decision: Rule,
    pub granted_at: DateTime<Utc>,
}

/// On-disk shape is a flat map keyed by `tool_name`, per the §6 contract
/// `{ [tool_name]: {decision, granted_at} }` — no wrapper field.
pub type PolicyFile = HashMap<String, PolicyEntry>;

/// Evaluates `(tool_name, args)` against declared risk, session state, and
/// the persisted policy file, per the order: session → remembered →
/// default-by-risk.
///
/// Concurrency: the caller (the `ToolExecutor`) is responsible for holding
/// at most one pending prompt at a time — this type itself is not
/// reentrant-safe for interleaved prompts on the same tool.
pub struct PermissionManager {
    policy_path: Option<PathBuf>,
    remembered: PolicyFile,
    session: HashMap<String, Rule>,
}

impl PermissionManager {
    /// Loads the policy file at `~/.<app_dir>/policies.json`, if present.
    /// A missing file is not an error — it means no rules have been
    /// remembered yet.
    pub fn load(app_dir: &str) -> Self {
        let policy_path = dirs::home_dir().map(|home| home.join(format!(".{app_dir}")).join("policies.json"));

        let remembered = policy_path
            .as_ref()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|raw| match serde_json::from_str::<PolicyFile>(&raw) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(error = %e, "policy file is corrupt, starting from an empty policy");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            policy_path,
            remembered,
            session: HashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            policy_path: None,
            remembered: HashMap::new(),
            session: HashMap::new(),
        }
    }

    pub fn evaluate(&self, tool_name: &str, declared_risk: RiskLevel, args: &Value) -> Decision {
        if declared_risk == RiskLevel::Safe {
            return Decision::AutoAllow;
        }

        if let Some(rule) = self.session.get(tool_name) {
            return self.rule_to_decision(*rule, declared_risk);
        }
        if let Some(entry) = self.remembered.get(tool_name) {
            return self.rule_to_decision(entry.decision, declared_risk);
        }

        Decision::Prompt {
            risk: declared_risk,
            preview: (declared_risk == RiskLevel::High).then(|| Self::build_preview(args)).flatten(),
        }
    }

    /// High-risk prompts carry a preview of the destination file and the
    /// intended change for the UI to render before the choice is taken.
    /// Built generically from whichever of these fields a tool's arguments
    /// happen to carry, since the manager has no per-tool knowledge.
    fn build_preview(args: &Value) -> Option<String> {
        let path = args.get("path").and_then(Value::as_str);
        let new_text = args.get("new_text").or_else(|| args.get("content")).and_then(Value::as_str);
        match (path, new_text) {
            (Some(path), Some(text)) => Some(format!("{path}: {} bytes of new content", text.len())),
            (Some(path), None) => Some(path.to_string()),
            (None, _) => None,
        }
    }

    fn rule_to_decision(&self, rule: Rule, risk: RiskLevel) -> Decision {
        match rule {
            Rule::Allow => Decision::AutoAllow,
            Rule::Deny => Decision::Deny {
                reason: format!("denied by policy (risk={risk:?})"),
            },
        }
    }

    /// Commits a prompt response. Returns whether the call should proceed.
    pub fn commit_response(&mut self, tool_name: &str, response: PromptResponse) -> bool {
        match response {
            PromptResponse::AllowOnce => true,
            PromptResponse::Session => {
                self.session.insert(tool_name.to_string(), Rule::Allow);
                true
            }
            PromptResponse::Remember => {
                self.remembered
                    .insert(tool_name.to_string(), PolicyEntry { decision: Rule::Allow, granted_at: Utc::now() });
                if let Err(e) = self.save() {
                    warn!(error = %e, "failed to persist remembered policy");
                }
                true
            }
            PromptResponse::Deny => false,
        }
    }

    fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.policy_path else {
            debug!("no policy path configured, skipping save");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.remembered)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        fs::write(path, serialized)
    }
}

/// Rejects obviously unsafe arguments before permission evaluation even
/// runs: absolute paths, `..` traversal, out-of-bounds numeric inputs.
/// Tool definitions opt into this by wiring it as their `validator`.
pub fn reject_path_escape(path: &str) -> bool {
    !path.starts_with('/') && !path.split('/').any(|seg| seg == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_tools_auto_allow() {
        let pm = PermissionManager::in_memory();
        let decision = pm.evaluate("read_file", RiskLevel::Safe, &Value::Null);
        assert_eq!(decision, Decision::AutoAllow);
    }

    #[test]
    fn unseen_risky_tool_prompts() {
        let pm = PermissionManager::in_memory();
        let decision = pm.evaluate("write_file", RiskLevel::Medium, &Value::Null);
        assert!(matches!(decision, Decision::Prompt { risk: RiskLevel::Medium, .. }));
    }

    #[test]
    fn session_allow_sticks_for_process_lifetime() {
        let mut pm = PermissionManager::in_memory();
        assert!(pm.commit_response("write_file", PromptResponse::Session));
        let decision = pm.evaluate("write_file", RiskLevel::Medium, &Value::Null);
        assert_eq!(decision, Decision::AutoAllow);
    }

    #[test]
    fn path_validator_rejects_traversal_and_absolute() {
        assert!(!reject_path_escape("/etc/passwd"));
        assert!(!reject_path_escape("../secrets.txt"));
        assert!(reject_path_escape("src/lib.rs"));
    }

    #[test]
    fn high_risk_prompt_carries_a_preview_of_the_destination() {
        let pm = PermissionManager::in_memory();
        let args = serde_json::json!({"path": "src/lib.rs", "content": "fn main() {}"});
        let decision = pm.evaluate("write_file", RiskLevel::High, &args);
        match decision {
            Decision::Prompt { risk: RiskLevel::High, preview: Some(preview) } => {
                assert!(preview.contains("src/lib.rs"));
            }
            other => panic!("expected a preview-carrying prompt, got {other:?}"),
        }
    }

    #[test]
    fn low_risk_prompt_carries_no_preview() {
        let pm = PermissionManager::in_memory();
        let args = serde_json::json!({"task_id": "abc"});
        let decision = pm.evaluate("approve_task", RiskLevel::Low, &args);
        assert!(matches!(decision, Decision::Prompt { preview: None, .. }));
    }

    #[test]
    fn policy_file_serializes_to_a_flat_tool_keyed_map() {
        let mut file: PolicyFile = HashMap::new();
        file.insert(
            "write_file".to_string(),
            PolicyEntry { decision: Rule::Allow, granted_at: "2026-01-01T00:00:00Z".parse().unwrap() },
        );
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["write_file"]["decision"], "allow");
        assert_eq!(value["write_file"]["granted_at"], "2026-01-01T00:00:00Z");
        assert!(value.get("remembered").is_none());
    }
}
