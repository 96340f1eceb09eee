//! Run-orchestration core: the state machine over persisted run records,
//! the cancellation protocol, the parallel tool-execution interleaver, and
//! the sub-agent recursion boundary (§1, §2).

pub mod cancel_action;
pub mod cancel_signal;
pub mod config;
pub mod context;
pub mod interleaver;
pub mod llm;
pub mod observers;
pub mod orchestrator;
pub mod poller;
pub mod run_lock;
pub mod state_store;
pub mod step_loop;
pub mod tools;

pub use cancel_action::{CancelDeps, CancelOutcome};
pub use cancel_signal::{CancellationSignal, CancellationSignalStore, InMemoryCancellationSignalStore};
pub use config::{CancelOptions, RunOptions, RuntimeConfig};
pub use context::ExecutionContext;
pub use interleaver::{InterleaveResult, SuspendedBranch, ToolResultPart};
pub use llm::{LlmClient, ScriptedLlmClient};
pub use observers::{Event, Observer, ObserverChain};
pub use orchestrator::{cancel_run, orchestrate_run, signal_cancellation, Deps, OrchestrateHandle, OrchestrateInput};
pub use poller::PollerGuard;
pub use run_lock::{InMemoryRunLock, LockHandle, RunLock};
pub use state_store::{FileStateStore, InMemoryStateStore, StateStore};
pub use step_loop::{StepEvent, StepOutcome};
pub use tools::{ScriptedToolExecutor, ToolExecutor, ToolOutcome};
