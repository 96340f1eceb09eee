//! Layered runtime configuration (§10.3): `RunOptions` defaults, store
//! paths, and the agent manifest map.

use std::collections::HashMap;
use std::path::PathBuf;

use corun_domain::AgentManifest;
use serde::{Deserialize, Serialize};

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_lock_ttl_ms() -> u64 {
    30_000
}

fn default_state_ttl_secs() -> u64 {
    86_400
}

/// Per-call options recognized by `orchestrate_run`/`cancel_run` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default = "default_poll_interval_ms")]
    pub cancellation_poll_interval_ms: u64,
    #[serde(default = "default_lock_ttl_ms")]
    pub agent_run_lock_ttl_ms: u64,
    #[serde(default)]
    pub agent_timeout_ms: Option<u64>,
    #[serde(default = "default_state_ttl_secs")]
    pub agent_state_ttl_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cancellation_poll_interval_ms: default_poll_interval_ms(),
            agent_run_lock_ttl_ms: default_lock_ttl_ms(),
            agent_timeout_ms: None,
            agent_state_ttl_secs: default_state_ttl_secs(),
        }
    }
}

/// Options recognized by a cancellation request (§4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelOptions {
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub lock_ttl_ms: Option<u64>,
}

/// Top-level config loaded from `toml` (serde), analogous to the teacher's
/// layered `Config`: store paths plus the static agent manifest map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub run_options: RunOptions,
    #[serde(default)]
    pub agents: HashMap<String, AgentManifest>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".corun"),
            run_options: RunOptions::default(),
            agents: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn load_from_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
