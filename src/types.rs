//! Core types for gallery-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a gallery task
///
/// Opaque token assigned by the downloader when a task is registered.
/// Process-scoped: ids are not stable across restarts (resume goes through
/// the ledger file, not the id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle state
///
/// Transitions:
/// `Waiting → Running → {Paused, Completed, Failed, Cancelled}`,
/// `Paused → Running` (resume) or `Paused → Cancelled`,
/// and `Waiting → Cancelled` / `Running → Cancelled`.
/// `Completed`, `Failed` and `Cancelled` are terminal: no transition leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Registered but not running (no concurrency slot held)
    Waiting,
    /// Worker active: discovering items or fetching them
    Running,
    /// Worker blocked at the pause gate
    Paused,
    /// All discovered items accounted for (success, skip, or failure)
    Completed,
    /// Task-level fatal error (listing unreachable or unparseable)
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl TaskState {
    /// True for Completed, Failed, and Cancelled — no transitions leave these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// True if `start()` is valid from this state
    pub fn can_start(&self) -> bool {
        matches!(self, TaskState::Waiting | TaskState::Paused)
    }

    /// True if `pause()` is valid from this state
    pub fn can_pause(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// True if `cancel()` is valid from this state
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            TaskState::Waiting | TaskState::Running | TaskState::Paused
        )
    }

    /// Lowercase state name, used in error messages and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Waiting => "waiting",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded status of one discovered item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Discovered but not yet fetched
    Pending,
    /// Payload downloaded (and converted, if applicable)
    Success,
    /// A matching artifact already existed on disk
    Skipped,
    /// Fetch failed with the given reason
    Failed(String),
}

impl ItemStatus {
    /// True for `Failed` or `Pending` — the statuses a resume re-fetches.
    pub fn needs_fetch(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Failed(_))
    }

    /// Parse the ledger representation produced by [`Display`](std::fmt::Display).
    ///
    /// Unknown values are treated as `Pending` so a hand-edited or truncated
    /// ledger errs on the side of re-fetching.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("success") {
            ItemStatus::Success
        } else if value.eq_ignore_ascii_case("skipped") {
            ItemStatus::Skipped
        } else if let Some(reason) = value
            .strip_prefix("failed")
            .or_else(|| value.strip_prefix("Failed"))
        {
            ItemStatus::Failed(reason.trim_start_matches(':').trim().to_string())
        } else {
            ItemStatus::Pending
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => f.write_str("pending"),
            ItemStatus::Success => f.write_str("success"),
            ItemStatus::Skipped => f.write_str("skipped"),
            ItemStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One discovered fetchable item
///
/// The sequence index is extracted from the trailing `-<sequence>` of the
/// identifier and uniquely determines the output filename stem, so concurrent
/// fetches never collide and a pre-existing artifact short-circuits a
/// redundant transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemLink {
    /// The item page URL (`scheme://host/s/<token>/<gallery-id>-<sequence>`)
    pub page_url: String,
    /// Stable sequence index within the gallery
    pub index: u32,
}

impl ItemLink {
    /// Parse an item page URL, extracting the sequence index from the
    /// trailing `-<sequence>` segment. Returns `None` if the URL does not
    /// carry a numeric sequence suffix.
    pub fn from_page_url(url: &str) -> Option<Self> {
        let (_, suffix) = url.rsplit_once('-')?;
        let index: u32 = suffix.parse().ok()?;
        Some(Self {
            page_url: url.to_string(),
            index,
        })
    }
}

/// Read-only snapshot of a task, returned by `get_task_info` / `list_tasks`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Unique task identifier
    pub id: TaskId,

    /// Source listing URL
    pub url: String,

    /// Resolved gallery title (None until discovery has run)
    pub title: Option<String>,

    /// Current state
    pub state: TaskState,

    /// Items accounted for so far (success + skip + failure)
    pub completed: usize,

    /// Total discovered items (0 until discovery has run)
    pub total: usize,

    /// Last human-readable status message
    pub message: String,

    /// Output directory (None until discovery resolves the title)
    pub output_dir: Option<PathBuf>,

    /// When the task was registered
    pub created_at: DateTime<Utc>,
}

/// Event emitted during task lifecycle
///
/// Consumers subscribe via `GalleryDownloader::subscribe()`. State
/// transitions are emitted for every change; `Progress` events are coalesced
/// inside the task to bound observer load under high fan-out.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task registered with the downloader
    TaskAdded {
        /// Task ID
        id: TaskId,
        /// Source listing URL
        url: String,
    },

    /// Task transitioned to a new state (never coalesced)
    StateChanged {
        /// Task ID
        id: TaskId,
        /// The state the task entered
        state: TaskState,
    },

    /// Item-completion progress (coalesced)
    Progress {
        /// Task ID
        id: TaskId,
        /// Items accounted for so far
        completed: usize,
        /// Total discovered items
        total: usize,
    },

    /// Task removed from the registry
    TaskRemoved {
        /// Task ID
        id: TaskId,
    },

    /// Global concurrency limit changed
    ConcurrencyLimitChanged {
        /// The new limit
        limit: usize,
    },
}
