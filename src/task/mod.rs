//! Gallery task state machine
//!
//! A [`GalleryTask`] wraps one gallery: it runs link discovery once, then
//! drives a bounded worker pool of item fetches, updating its in-memory
//! ledger and emitting progress/status events. The state machine is:
//!
//! ```text
//! Waiting → Running → {Paused, Completed, Failed, Cancelled}
//! Paused  → Running (resume) | Cancelled
//! Waiting → Cancelled
//! ```
//!
//! Terminal states (Completed, Failed, Cancelled) reject every operation.
//! Cancellation is cooperative: it is observed at item-fetch checkpoints, so
//! an in-flight transfer finishes (or fails) before the task visibly reaches
//! Cancelled.

mod gate;
pub(crate) mod worker;

pub(crate) use gate::{Checkpoint, PauseGate, checkpoint};

use crate::ledger::TaskLedger;
use crate::types::{TaskId, TaskInfo, TaskState};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// What a successful `start()` requires of the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StartAction {
    /// First start: the caller must spawn the worker
    SpawnWorker,
    /// The existing worker was unblocked (resume from Paused, or a parked
    /// worker re-promoted from Waiting)
    Unblocked,
    /// The operation was invalid in the current state
    Rejected,
}

/// What `cancel()` achieved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CancelAction {
    /// No worker was ever spawned: the task is Cancelled now
    Immediate,
    /// The worker will observe the token at its next checkpoint
    Deferred,
    /// The operation was invalid in the current state
    Rejected,
}

/// Mutable task state, guarded by the per-task lock
pub(crate) struct TaskData {
    /// Current lifecycle state
    pub(crate) state: TaskState,
    /// Resolved gallery title (None until discovery)
    pub(crate) title: Option<String>,
    /// Last human-readable status message
    pub(crate) message: String,
    /// Items accounted for so far in this run
    pub(crate) completed: usize,
    /// Items this run will attempt
    pub(crate) total: usize,
    /// Gallery output directory (None until discovery resolves the title)
    pub(crate) output_dir: Option<PathBuf>,
    /// In-memory ledger, flushed on completion or cancellation
    pub(crate) ledger: TaskLedger,
    /// Items to fetch (discovered, or resume targets)
    pub(crate) items: Vec<crate::types::ItemLink>,
    /// Whether a worker has ever been spawned for this task
    pub(crate) worker_spawned: bool,
    /// When the last Progress event was emitted (coalescing)
    pub(crate) last_progress_emit: Option<Instant>,
}

/// State shared between the task handle and its worker
pub(crate) struct TaskShared {
    /// Per-task lock over the mutable state
    pub(crate) data: tokio::sync::Mutex<TaskData>,
    /// Pause gate consulted at item checkpoints
    pub(crate) gate: PauseGate,
    /// Cooperative cancellation token
    pub(crate) cancel: CancellationToken,
}

/// One gallery download task
pub(crate) struct GalleryTask {
    /// Unique task identifier
    pub(crate) id: TaskId,
    /// Source listing URL
    pub(crate) url: String,
    /// Listing URL to discover, or None when the item list was preloaded
    /// from a ledger (resume)
    pub(crate) listing_url: Option<String>,
    /// When the task was registered
    pub(crate) created_at: DateTime<Utc>,
    /// Shared mutable state
    pub(crate) shared: Arc<TaskShared>,
}

impl GalleryTask {
    /// Create a fresh task for a listing URL
    pub(crate) fn new(id: TaskId, url: String) -> Self {
        Self {
            id,
            url: url.clone(),
            listing_url: Some(url.clone()),
            created_at: Utc::now(),
            shared: Arc::new(TaskShared {
                data: tokio::sync::Mutex::new(TaskData {
                    state: TaskState::Waiting,
                    title: None,
                    message: "Waiting".to_string(),
                    completed: 0,
                    total: 0,
                    output_dir: None,
                    ledger: TaskLedger::new("", url),
                    items: Vec::new(),
                    worker_spawned: false,
                    last_progress_emit: None,
                }),
                gate: PauseGate::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Reconstruct a task from a loaded ledger (resume).
    ///
    /// The worker skips discovery: `items` are the resume targets, bound to
    /// the ledger's original output directory.
    pub(crate) fn from_ledger(
        id: TaskId,
        ledger: TaskLedger,
        items: Vec<crate::types::ItemLink>,
        output_dir: PathBuf,
    ) -> Self {
        let url = ledger.url.clone();
        let title = ledger.title.clone();
        let total = items.len();
        Self {
            id,
            url: url.clone(),
            listing_url: None,
            created_at: Utc::now(),
            shared: Arc::new(TaskShared {
                data: tokio::sync::Mutex::new(TaskData {
                    state: TaskState::Waiting,
                    title: (!title.is_empty()).then_some(title),
                    message: format!("Resuming {total} items"),
                    completed: 0,
                    total,
                    output_dir: Some(output_dir),
                    ledger,
                    items,
                    worker_spawned: false,
                    last_progress_emit: None,
                }),
                gate: PauseGate::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Current state
    pub(crate) async fn state(&self) -> TaskState {
        self.shared.data.lock().await.state
    }

    /// Start or resume the task.
    ///
    /// Valid from Waiting and Paused. Callers are responsible for reserving
    /// a concurrency slot *before* calling this.
    pub(crate) async fn start(&self) -> StartAction {
        let mut data = self.shared.data.lock().await;
        if self.shared.cancel.is_cancelled() {
            return StartAction::Rejected;
        }
        match data.state {
            TaskState::Waiting => {
                data.state = TaskState::Running;
                if data.worker_spawned {
                    // Paused worker that was parked back to Waiting: unblock it
                    self.shared.gate.open();
                    StartAction::Unblocked
                } else {
                    data.worker_spawned = true;
                    StartAction::SpawnWorker
                }
            }
            TaskState::Paused => {
                data.state = TaskState::Running;
                self.shared.gate.open();
                StartAction::Unblocked
            }
            _ => StartAction::Rejected,
        }
    }

    /// Pause the task. Valid only from Running.
    ///
    /// Closes the gate so workers block at their next checkpoint; the
    /// in-flight item (if any) completes or fails first.
    pub(crate) async fn pause(&self) -> bool {
        let mut data = self.shared.data.lock().await;
        // A pending cancellation must not be masked by re-closing the gate
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        if data.state != TaskState::Running {
            return false;
        }
        data.state = TaskState::Paused;
        data.message = "Paused".to_string();
        self.shared.gate.close();
        true
    }

    /// Park a Paused task back to Waiting (no concurrency slot available).
    ///
    /// The gate stays closed; a later promotion unblocks the worker.
    pub(crate) async fn park(&self) -> bool {
        let mut data = self.shared.data.lock().await;
        if self.shared.cancel.is_cancelled() || data.state != TaskState::Paused {
            return false;
        }
        data.state = TaskState::Waiting;
        data.message = "Waiting".to_string();
        true
    }

    /// Cancel the task. Valid from Waiting, Running, and Paused.
    ///
    /// Sets the terminal flag and opens the pause gate so a paused worker
    /// wakes only to observe cancellation.
    pub(crate) async fn cancel(&self) -> CancelAction {
        let mut data = self.shared.data.lock().await;
        if !data.state.can_cancel() {
            return CancelAction::Rejected;
        }
        self.shared.cancel.cancel();
        self.shared.gate.open();
        if data.worker_spawned {
            CancelAction::Deferred
        } else {
            data.state = TaskState::Cancelled;
            data.message = "Cancelled".to_string();
            CancelAction::Immediate
        }
    }

    /// Read-only snapshot for the control surface
    pub(crate) async fn snapshot(&self) -> TaskInfo {
        let data = self.shared.data.lock().await;
        TaskInfo {
            id: self.id,
            url: self.url.clone(),
            title: data.title.clone(),
            state: data.state,
            completed: data.completed,
            total: data.total,
            message: data.message.clone(),
            output_dir: data.output_dir.clone(),
            created_at: self.created_at,
        }
    }
}
