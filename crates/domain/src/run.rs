//! The persisted run record (§3) — the single source of truth the state
//! store (C1) reads and writes, and every other component reasons about.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::Message;

/// Schema version of [`RunRecord`]. Bump whenever a field is added or
/// removed in a way that changes on-disk meaning; readers reject mismatches.
pub const RUN_RECORD_SCHEMA_VERSION: u32 = 1;

/// Opaque, unique, stable identifier for a run. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a run. `Completed | Failed | Cancelled` are terminal
/// and monotonic — once reached, no further transition is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// An open approval request awaiting a human decision (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub approval_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// One entry in a parent→child suspension chain (§3, §GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackEntry {
    pub run_id: RunId,
    pub manifest_id: String,
    pub manifest_version: String,
    pub tool_call_id: String,
}

/// An unbroken parent-to-child chain describing how a sub-agent suspension
/// reached this run. The deepest entry is the leaf that is actually
/// suspended on a human decision.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SuspensionStack {
    pub entries: Vec<StackEntry>,
}

impl SuspensionStack {
    /// The leaf (deepest) entry — the run actually awaiting a decision.
    pub fn leaf(&self) -> Option<&StackEntry> {
        self.entries.last()
    }
}

/// A tool-result entry produced within a step but not yet folded into
/// `messages` (§3). Folded in by the step loop once the interleaver (C5)
/// returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// The persisted record for one run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub messages: Vec<Message>,
    pub manifest_id: String,
    pub manifest_version: String,
    pub root_manifest_id: String,
    pub pending_tool_results: Vec<PendingToolResult>,
    pub suspensions: Vec<Suspension>,
    pub suspension_stacks: Vec<SuspensionStack>,
    pub elapsed_execution_ms: u64,
    pub steps: u32,
    pub child_state_ids: HashSet<RunId>,
    pub current_step_number: u32,
    /// Parent run id, if this is a sub-agent run. Not part of the
    /// distilled spec's field list but required to bubble results
    /// upward (§4.7) without re-deriving lineage from the stack alone.
    pub parent_run_id: Option<RunId>,
    /// Populated when `status` is `failed` or the run ended in error.
    pub error: Option<RunError>,
    /// Populated when `status` is `cancelled`, mirrors the reason stored
    /// in the cancellation signal, when one was present.
    pub cancel_reason: Option<String>,
}

/// Terminal error detail (§7: "Terminal results carry exactly one status
/// plus, for error/failed, an error object").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl RunRecord {
    /// Create a fresh `running` record for a new top-level or sub-agent run.
    pub fn new(
        manifest_id: impl Into<String>,
        manifest_version: impl Into<String>,
        root_manifest_id: impl Into<String>,
        now: DateTime<Utc>,
        parent_run_id: Option<RunId>,
    ) -> Self {
        Self {
            id: RunId::new(),
            schema_version: RUN_RECORD_SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
            started_at: now,
            status: RunStatus::Running,
            messages: Vec::new(),
            manifest_id: manifest_id.into(),
            manifest_version: manifest_version.into(),
            root_manifest_id: root_manifest_id.into(),
            pending_tool_results: Vec::new(),
            suspensions: Vec::new(),
            suspension_stacks: Vec::new(),
            elapsed_execution_ms: 0,
            steps: 0,
            child_state_ids: HashSet::new(),
            current_step_number: 0,
            parent_run_id,
            error: None,
            cancel_reason: None,
        }
    }

    /// `status = suspended` ⇔ (`suspensions` non-empty OR `suspension_stacks`
    /// non-empty) — the invariant every writer must preserve.
    pub fn invariant_suspended_matches_fields(&self) -> bool {
        let has_suspension_data = !self.suspensions.is_empty() || !self.suspension_stacks.is_empty();
        (self.status == RunStatus::Suspended) == has_suspension_data
    }

    /// Close out the current running segment: fold its wall-clock duration
    /// into `elapsed_execution_ms` and stamp `updated_at`.
    pub fn close_running_segment(&mut self, now: DateTime<Utc>) {
        let delta = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.elapsed_execution_ms += delta;
        self.updated_at = now;
    }

    /// Begin (or resume) a running segment — resets `started_at`, used by
    /// crash detection (`D = now − started_at`).
    pub fn begin_running_segment(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Running;
        self.started_at = now;
        self.updated_at = now;
    }

    pub fn mark_suspended(
        &mut self,
        now: DateTime<Utc>,
        suspensions: Vec<Suspension>,
        suspension_stacks: Vec<SuspensionStack>,
    ) {
        self.close_running_segment(now);
        self.status = RunStatus::Suspended;
        self.suspensions = suspensions;
        self.suspension_stacks = suspension_stacks;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.close_running_segment(now);
        self.status = RunStatus::Completed;
        self.suspensions.clear();
        self.suspension_stacks.clear();
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: RunError) {
        self.close_running_segment(now);
        self.status = RunStatus::Failed;
        self.error = Some(error);
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>, reason: Option<String>) {
        self.close_running_segment(now);
        self.status = RunStatus::Cancelled;
        self.cancel_reason = reason;
    }

    /// `D = now − (started_at ∨ created_at)` used by crash detection (§4.8).
    pub fn running_duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    use chrono::TimeZone;

    #[test]
    fn new_record_is_running_with_no_suspensions() {
        let r = RunRecord::new("m1", "v1", "m1", now(), None);
        assert_eq!(r.status, RunStatus::Running);
        assert!(r.invariant_suspended_matches_fields());
        assert_eq!(r.schema_version, RUN_RECORD_SCHEMA_VERSION);
    }

    #[test]
    fn suspended_invariant_holds_after_mark_suspended() {
        let mut r = RunRecord::new("m1", "v1", "m1", now(), None);
        r.mark_suspended(
            now(),
            vec![Suspension {
                approval_id: "a1".into(),
                tool_call_id: "t1".into(),
                tool_name: "exec".into(),
                input: serde_json::json!({}),
            }],
            vec![],
        );
        assert_eq!(r.status, RunStatus::Suspended);
        assert!(r.invariant_suspended_matches_fields());
    }

    #[test]
    fn completed_clears_suspensions() {
        let mut r = RunRecord::new("m1", "v1", "m1", now(), None);
        r.mark_suspended(
            now(),
            vec![Suspension {
                approval_id: "a1".into(),
                tool_call_id: "t1".into(),
                tool_name: "exec".into(),
                input: serde_json::json!({}),
            }],
            vec![],
        );
        r.begin_running_segment(now());
        r.mark_completed(now());
        assert_eq!(r.status, RunStatus::Completed);
        assert!(r.suspensions.is_empty());
        assert!(r.invariant_suspended_matches_fields());
    }

    #[test]
    fn elapsed_execution_accumulates_across_segments() {
        let t0 = now();
        let t1 = t0 + chrono::Duration::milliseconds(500);
        let t2 = t1 + chrono::Duration::milliseconds(10_000); // suspended gap, not counted
        let t3 = t2 + chrono::Duration::milliseconds(300);

        let mut r = RunRecord::new("m1", "v1", "m1", t0, None);
        r.mark_suspended(t1, vec![Suspension {
            approval_id: "a1".into(),
            tool_call_id: "t1".into(),
            tool_name: "exec".into(),
            input: serde_json::json!({}),
        }], vec![]);
        assert_eq!(r.elapsed_execution_ms, 500);

        r.begin_running_segment(t2);
        r.mark_completed(t3);
        assert_eq!(r.elapsed_execution_ms, 500 + 300);
    }

    #[test]
    fn terminal_statuses_are_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Suspended.is_terminal());
    }

    #[test]
    fn suspension_stack_leaf_is_deepest_entry() {
        let stack = SuspensionStack {
            entries: vec![
                StackEntry {
                    run_id: RunId::new(),
                    manifest_id: "root".into(),
                    manifest_version: "1".into(),
                    tool_call_id: "t0".into(),
                },
                StackEntry {
                    run_id: RunId::new(),
                    manifest_id: "child".into(),
                    manifest_version: "1".into(),
                    tool_call_id: "t1".into(),
                },
            ],
        };
        assert_eq!(stack.leaf().unwrap().manifest_id, "child");
    }

    #[test]
    fn run_id_roundtrips_through_display_and_from_str() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_id_roundtrips_through_json() {
        let id = RunId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn record_serde_roundtrip_preserves_fields() {
        let mut r = RunRecord::new("m1", "v1", "m1", now(), None);
        r.steps = 3;
        r.current_step_number = 3;
        r.child_state_ids.insert(RunId::new());
        let json = serde_json::to_string(&r).unwrap();
        let back: RunRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, r.id);
        assert_eq!(back.steps, 3);
        assert_eq!(back.child_state_ids, r.child_state_ids);
    }
}
