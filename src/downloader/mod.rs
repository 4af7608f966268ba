//! Core downloader implementation split into focused submodules.
//!
//! The `GalleryDownloader` struct and its methods are organized by domain:
//! - [`control`] - Task lifecycle control (start/pause/cancel/remove)
//! - [`slots`] - Concurrency slot accounting and Waiting-task promotion
//! - [`resume`] - Resuming partial work from a ledger file

mod control;
mod resume;
mod slots;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::archive::{Archiver, archiver_from_config};
use crate::client::{HttpClient, PageFetcher};
use crate::config::Config;
use crate::convert::{ImageConverter, converter_from_config};
use crate::error::{Result, TaskError};
use crate::task::{GalleryTask, worker::WorkerContext};
use crate::types::{Event, TaskId, TaskInfo};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Task registry and concurrency-slot bookkeeping
///
/// All mutations happen under one lock; observer events are emitted only
/// after the lock is released so a reentrant subscriber cannot deadlock.
///
/// Invariant: `active.len() <= limit` at all times.
pub(crate) struct Registry {
    /// All known tasks by id
    pub(crate) tasks: HashMap<TaskId, Arc<GalleryTask>>,
    /// Task ids in insertion order (promotion order)
    pub(crate) order: Vec<TaskId>,
    /// Tasks currently occupying a concurrency slot
    pub(crate) active: HashSet<TaskId>,
    /// Global concurrency limit
    pub(crate) limit: usize,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Owns the set of all gallery tasks, enforces the global concurrency cap,
/// and exposes the full control surface: `add`, `start`, `pause`, `cancel`,
/// `remove`, `set_concurrency_limit`, `get_task_info`, `list_tasks`, and
/// `resume`. Constructed once per process and passed to consumers by
/// reference or clone; there is no ambient global state.
#[derive(Clone)]
pub struct GalleryDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// HTTP fetch client shared by all tasks
    pub(crate) fetcher: Arc<dyn PageFetcher>,
    /// Image conversion collaborator
    pub(crate) converter: Arc<dyn ImageConverter>,
    /// Archive collaborator
    pub(crate) archiver: Arc<dyn Archiver>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Task registry and slot accounting
    pub(crate) registry: Arc<tokio::sync::Mutex<Registry>>,
    /// Next task id
    next_task_id: Arc<AtomicU64>,
}

impl GalleryDownloader {
    /// Create a new GalleryDownloader instance
    ///
    /// This validates the configuration, creates the output root directory,
    /// builds the shared HTTP client, and selects the conversion/archive
    /// collaborators (external binaries when available, no-op stubs
    /// otherwise).
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.output_dir)
            .await
            .map_err(|e| {
                crate::error::Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create output directory '{}': {}",
                        config.download.output_dir.display(),
                        e
                    ),
                ))
            })?;

        let fetcher = Arc::new(HttpClient::new(&config.network)?);

        let converter = converter_from_config(&config.conversion);
        let archiver = archiver_from_config(&config.archive);
        tracing::info!(
            converter = converter.name(),
            can_convert = converter.can_convert(),
            archiver = archiver.name(),
            can_archive = archiver.can_archive(),
            "Collaborators initialized"
        );

        // Buffered channel: slow subscribers lag rather than block downloads
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let registry = Registry {
            tasks: HashMap::new(),
            order: Vec::new(),
            active: HashSet::new(),
            limit: config.download.max_concurrent_tasks,
        };

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            converter,
            archiver,
            event_tx,
            registry: Arc::new(tokio::sync::Mutex::new(registry)),
            next_task_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Subscribe to task events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. Events are buffered, but a subscriber that falls more
    /// than 1000 events behind receives a `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Register a new task for a gallery listing URL
    ///
    /// The task starts in Waiting; if a concurrency slot is free it is
    /// started immediately (older Waiting tasks are promoted first).
    pub async fn add(&self, url: impl Into<String>) -> Result<TaskId> {
        let url = url.into();
        let id = TaskId::new(self.next_task_id.fetch_add(1, Ordering::SeqCst));
        let task = Arc::new(GalleryTask::new(id, url.clone()));

        {
            let mut registry = self.registry.lock().await;
            registry.tasks.insert(id, task);
            registry.order.push(id);
        }

        tracing::info!(task_id = id.0, url = %url, "Task added");
        self.emit_event(Event::TaskAdded { id, url });

        self.promote().await;
        Ok(id)
    }

    /// Register several gallery listing URLs at once
    ///
    /// Tasks are registered in the given order; as many as capacity allows
    /// start immediately.
    pub async fn add_many<I, S>(&self, urls: I) -> Result<Vec<TaskId>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids = Vec::new();
        for url in urls {
            ids.push(self.add(url).await?);
        }
        Ok(ids)
    }

    /// Read-only snapshot of one task
    pub async fn get_task_info(&self, id: TaskId) -> Result<TaskInfo> {
        let task = self.get_task(id).await?;
        Ok(task.snapshot().await)
    }

    /// Read-only snapshots of all tasks, in insertion order
    pub async fn list_tasks(&self) -> Vec<TaskInfo> {
        let tasks: Vec<Arc<GalleryTask>> = {
            let registry = self.registry.lock().await;
            registry
                .order
                .iter()
                .filter_map(|id| registry.tasks.get(id).cloned())
                .collect()
        };

        let mut infos = Vec::with_capacity(tasks.len());
        for task in tasks {
            infos.push(task.snapshot().await);
        }
        infos
    }

    /// Number of tasks currently occupying a concurrency slot
    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.active.len()
    }

    /// Current global concurrency limit
    pub async fn concurrency_limit(&self) -> usize {
        self.registry.lock().await.limit
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// downloads proceed whether or not anyone is listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Look up a task by id
    pub(crate) async fn get_task(&self, id: TaskId) -> Result<Arc<GalleryTask>> {
        let registry = self.registry.lock().await;
        registry
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound { id: id.0 }.into())
    }

    /// Spawn the worker for a task and hook its completion back into slot
    /// accounting.
    pub(crate) fn spawn_worker(&self, task: &GalleryTask) {
        let ctx = WorkerContext {
            id: task.id,
            shared: Arc::clone(&task.shared),
            listing_url: task.listing_url.clone(),
            fetcher: Arc::clone(&self.fetcher),
            converter: Arc::clone(&self.converter),
            archiver: Arc::clone(&self.archiver),
            config: Arc::clone(&self.config),
            event_tx: self.event_tx.clone(),
        };

        let downloader = self.clone();
        let id = task.id;
        tokio::spawn(async move {
            crate::task::worker::run(ctx).await;
            downloader.handle_task_finished(id).await;
        });
    }
}
