//! Concurrency slot accounting and Waiting-task promotion.
//!
//! The downloader caps how many tasks may be Running at once, independent of
//! each task's internal worker pool. Slots are explicit entries in the
//! registry's active set rather than semaphore permits so the limit can be
//! raised or lowered while tasks are in flight.

use super::{GalleryDownloader, Registry};
use crate::error::{Error, Result};
use crate::task::{GalleryTask, StartAction};
use crate::types::{Event, TaskState};
use std::sync::Arc;

impl GalleryDownloader {
    /// Update the global concurrency limit
    ///
    /// Raising the limit immediately promotes as many Waiting tasks as the
    /// new capacity allows, in insertion order. Lowering it never interrupts
    /// tasks that are already Running; the lower limit applies as slots free
    /// up.
    pub async fn set_concurrency_limit(&self, limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(Error::Config {
                message: "concurrency limit must be at least 1".to_string(),
                key: Some("download.max_concurrent_tasks".to_string()),
            });
        }

        let started = {
            let mut registry = self.registry.lock().await;
            registry.limit = limit;
            self.promote_locked(&mut registry).await
        };

        tracing::info!(limit = limit, "Concurrency limit changed");
        self.emit_event(Event::ConcurrencyLimitChanged { limit });
        self.dispatch_started(started);
        Ok(())
    }

    /// Release a finished task's slot and promote the next Waiting task(s).
    ///
    /// Called whenever a worker reaches a terminal state. Harmless for tasks
    /// that held no slot (e.g. a paused task cancelled while parked).
    pub(crate) async fn handle_task_finished(&self, id: crate::types::TaskId) {
        let started = {
            let mut registry = self.registry.lock().await;
            registry.active.remove(&id);
            self.promote_locked(&mut registry).await
        };
        self.dispatch_started(started);
    }

    /// Promote Waiting tasks up to the current limit.
    pub(crate) async fn promote(&self) {
        let started = {
            let mut registry = self.registry.lock().await;
            self.promote_locked(&mut registry).await
        };
        self.dispatch_started(started);
    }

    /// Promote Waiting tasks in insertion order while capacity remains.
    ///
    /// Must be called with the registry lock held; events for the promoted
    /// tasks are emitted by [`dispatch_started`](Self::dispatch_started)
    /// after the lock is released.
    pub(crate) async fn promote_locked(
        &self,
        registry: &mut Registry,
    ) -> Vec<(Arc<GalleryTask>, StartAction)> {
        let mut started = Vec::new();

        for id in registry.order.clone() {
            if registry.active.len() >= registry.limit {
                break;
            }
            if registry.active.contains(&id) {
                continue;
            }
            let Some(task) = registry.tasks.get(&id).cloned() else {
                continue;
            };
            if task.state().await != TaskState::Waiting {
                continue;
            }

            match task.start().await {
                action @ (StartAction::SpawnWorker | StartAction::Unblocked) => {
                    registry.active.insert(id);
                    started.push((task, action));
                }
                StartAction::Rejected => {
                    // Raced with a cancel; leave it alone
                }
            }
        }

        started
    }

    /// Emit events and spawn workers for freshly promoted tasks.
    ///
    /// Runs outside the registry lock so observer callbacks cannot deadlock
    /// against the control surface.
    pub(crate) fn dispatch_started(&self, started: Vec<(Arc<GalleryTask>, StartAction)>) {
        for (task, action) in started {
            tracing::info!(task_id = task.id.0, "Task started");
            self.emit_event(Event::StateChanged {
                id: task.id,
                state: TaskState::Running,
            });
            if action == StartAction::SpawnWorker {
                self.spawn_worker(&task);
            }
        }
    }
}
