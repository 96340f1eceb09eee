//! Agent manifests: the static configuration that determines what an agent
//! is allowed to do, and how deep a sub-agent chain may recurse (§3, §4.7,
//! §10.3).

use serde::{Deserialize, Serialize};

fn default_max_depth() -> u32 {
    3
}

fn default_max_children_per_turn() -> u32 {
    5
}

fn default_max_duration_ms() -> u64 {
    30_000
}

/// Recursion and fan-out bounds for sub-agent spawning (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLimits {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_children_per_turn")]
    pub max_children_per_turn: u32,
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_children_per_turn: default_max_children_per_turn(),
            max_duration_ms: default_max_duration_ms(),
        }
    }
}

/// One allow/deny rule. Matching is prefix-based and case-insensitive,
/// mirroring tool-name matching elsewhere in the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRule {
    pub prefix: String,
}

impl ToolRule {
    fn matches(&self, tool_name: &str) -> bool {
        tool_name
            .to_ascii_lowercase()
            .starts_with(&self.prefix.to_ascii_lowercase())
    }
}

/// Allow/deny policy gating which tools a manifest's agent may call.
/// Deny always wins over allow when both match (§4.7 "a manifest names
/// the tools its agent may call").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub allow: Vec<ToolRule>,
    #[serde(default)]
    pub deny: Vec<ToolRule>,
}

impl ToolPolicy {
    /// An empty `allow` list means "allow everything not explicitly denied".
    pub fn permits(&self, tool_name: &str) -> bool {
        if self.deny.iter().any(|r| r.matches(tool_name)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|r| r.matches(tool_name))
    }
}

/// Static configuration for one agent (§3: `manifest_id`/`manifest_version`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifest {
    pub id: String,
    pub version: String,
    pub system_prompt: String,
    #[serde(default)]
    pub tool_policy: ToolPolicy,
    #[serde(default)]
    pub limits: AgentLimits,
    /// Manifest ids this agent is permitted to spawn as sub-agents via
    /// `agent.run` (§4.7).
    #[serde(default)]
    pub allowed_sub_agents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_wins_over_allow_on_same_prefix() {
        let policy = ToolPolicy {
            allow: vec![ToolRule { prefix: "exec".into() }],
            deny: vec![ToolRule { prefix: "exec.rm".into() }],
        };
        assert!(policy.permits("exec.ls"));
        assert!(!policy.permits("exec.rm"));
    }

    #[test]
    fn empty_allow_list_permits_everything_not_denied() {
        let policy = ToolPolicy {
            allow: vec![],
            deny: vec![ToolRule { prefix: "web".into() }],
        };
        assert!(policy.permits("exec.ls"));
        assert!(!policy.permits("web.search"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let policy = ToolPolicy {
            allow: vec![ToolRule { prefix: "Exec".into() }],
            deny: vec![],
        };
        assert!(policy.permits("exec.ls"));
    }

    #[test]
    fn default_limits_match_spec_defaults() {
        let limits = AgentLimits::default();
        assert_eq!(limits.max_depth, 3);
        assert_eq!(limits.max_children_per_turn, 5);
        assert_eq!(limits.max_duration_ms, 30_000);
    }

    #[test]
    fn manifest_deserializes_with_defaulted_policy_and_limits() {
        let toml_str = r#"
            id = "root"
            version = "1"
            system_prompt = "you are an agent"
        "#;
        let manifest: AgentManifest = toml::from_str(toml_str).unwrap();
        assert_eq!(manifest.limits.max_depth, 3);
        assert!(manifest.tool_policy.permits("anything"));
    }
}
