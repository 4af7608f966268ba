//! Task lifecycle control — start, pause, cancel, remove, bulk operations.

use super::GalleryDownloader;
use crate::error::{Result, TaskError};
use crate::task::{CancelAction, StartAction};
use crate::types::{Event, TaskId, TaskState};

impl GalleryDownloader {
    /// Start or resume a task
    ///
    /// Valid from Waiting and Paused. A global concurrency slot is reserved
    /// first; when none is free the task remains (or, from Paused, returns)
    /// to Waiting and will be promoted when capacity opens up — that is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] for an unknown id and
    /// [`TaskError::InvalidState`] when the task is Running or terminal.
    pub async fn start(&self, id: TaskId) -> Result<()> {
        let task = self.get_task(id).await?;

        let state = task.state().await;
        if !state.can_start() {
            return Err(TaskError::InvalidState {
                id: id.0,
                operation: "start".to_string(),
                current_state: state.as_str().to_string(),
            }
            .into());
        }

        let reserved = {
            let mut registry = self.registry.lock().await;
            if !registry.active.contains(&id) && registry.active.len() < registry.limit {
                registry.active.insert(id);
                true
            } else {
                false
            }
        };

        if !reserved {
            tracing::info!(task_id = id.0, "No free concurrency slot, task stays waiting");
            if state == TaskState::Paused && task.park().await {
                self.emit_event(Event::StateChanged {
                    id,
                    state: TaskState::Waiting,
                });
            }
            return Ok(());
        }

        match task.start().await {
            StartAction::SpawnWorker => {
                tracing::info!(task_id = id.0, "Task started");
                self.emit_event(Event::StateChanged {
                    id,
                    state: TaskState::Running,
                });
                self.spawn_worker(&task);
                Ok(())
            }
            StartAction::Unblocked => {
                tracing::info!(task_id = id.0, "Task resumed");
                self.emit_event(Event::StateChanged {
                    id,
                    state: TaskState::Running,
                });
                Ok(())
            }
            StartAction::Rejected => {
                // Raced with a concurrent cancel; give the slot back
                let mut registry = self.registry.lock().await;
                registry.active.remove(&id);
                drop(registry);
                let current = task.state().await;
                Err(TaskError::InvalidState {
                    id: id.0,
                    operation: "start".to_string(),
                    current_state: current.as_str().to_string(),
                }
                .into())
            }
        }
    }

    /// Pause a Running task
    ///
    /// Closes the task's pause gate; its workers block at the next
    /// checkpoint, so the in-flight item (if any) completes or fails first.
    /// The task's concurrency slot is released and the next Waiting task is
    /// promoted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidState`] unless the task is Running.
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        let task = self.get_task(id).await?;

        if !task.pause().await {
            let state = task.state().await;
            return Err(TaskError::InvalidState {
                id: id.0,
                operation: "pause".to_string(),
                current_state: state.as_str().to_string(),
            }
            .into());
        }

        let started = {
            let mut registry = self.registry.lock().await;
            registry.active.remove(&id);
            self.promote_locked(&mut registry).await
        };

        tracing::info!(task_id = id.0, "Task paused");
        self.emit_event(Event::StateChanged {
            id,
            state: TaskState::Paused,
        });
        self.dispatch_started(started);
        Ok(())
    }

    /// Cancel a task
    ///
    /// Valid from Waiting, Running, and Paused. Cancellation is cooperative:
    /// a running worker observes it at its next item checkpoint, so callers
    /// must tolerate the current item completing or failing before the task
    /// visibly reaches Cancelled. The ledger is flushed on the way out.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidState`] for terminal tasks.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let task = self.get_task(id).await?;

        match task.cancel().await {
            CancelAction::Immediate => {
                // Never had a worker: terminal now, and it held no slot
                tracing::info!(task_id = id.0, "Task cancelled");
                self.emit_event(Event::StateChanged {
                    id,
                    state: TaskState::Cancelled,
                });
                Ok(())
            }
            CancelAction::Deferred => {
                tracing::info!(task_id = id.0, "Task cancellation requested");
                Ok(())
            }
            CancelAction::Rejected => {
                let state = task.state().await;
                Err(TaskError::InvalidState {
                    id: id.0,
                    operation: "cancel".to_string(),
                    current_state: state.as_str().to_string(),
                }
                .into())
            }
        }
    }

    /// Remove a task from the registry
    ///
    /// Permitted only when the task is not Running. Waiting and Paused tasks
    /// are cancelled first. Downloaded artifacts and the ledger stay on disk.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::StillRunning`] for Running tasks.
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        let task = self.get_task(id).await?;

        let state = task.state().await;
        if state == TaskState::Running {
            return Err(TaskError::StillRunning { id: id.0 }.into());
        }

        if matches!(state, TaskState::Waiting | TaskState::Paused) {
            // Wake any parked worker so it can flush its ledger and exit
            let _ = task.cancel().await;
        }

        {
            let mut registry = self.registry.lock().await;
            registry.tasks.remove(&id);
            registry.order.retain(|existing| *existing != id);
            registry.active.remove(&id);
        }

        tracing::info!(task_id = id.0, "Task removed");
        self.emit_event(Event::TaskRemoved { id });
        Ok(())
    }

    /// Start every Waiting and Paused task, up to the concurrency limit
    ///
    /// Tasks beyond the limit stay Waiting and are promoted as slots free up.
    pub async fn start_all(&self) -> Result<()> {
        let infos = self.list_tasks().await;
        let mut started = 0;

        for info in infos {
            if info.state.can_start() && self.start(info.id).await.is_ok() {
                started += 1;
            }
        }

        tracing::info!(started = started, "Started all eligible tasks");
        Ok(())
    }

    /// Pause every Running task
    pub async fn pause_all(&self) -> Result<()> {
        let infos = self.list_tasks().await;
        let mut paused = 0;

        for info in infos {
            if info.state == TaskState::Running {
                if let Err(e) = self.pause(info.id).await {
                    tracing::warn!(
                        task_id = info.id.0,
                        error = %e,
                        "Failed to pause task during pause_all"
                    );
                } else {
                    paused += 1;
                }
            }
        }

        tracing::info!(paused = paused, "Paused all running tasks");
        Ok(())
    }

    /// Remove every task in a terminal state, returning how many were removed
    pub async fn clear_finished(&self) -> Result<usize> {
        let infos = self.list_tasks().await;
        let mut removed = 0;

        for info in infos {
            if info.state.is_terminal() && self.remove(info.id).await.is_ok() {
                removed += 1;
            }
        }

        tracing::info!(removed = removed, "Cleared finished tasks");
        Ok(removed)
    }
}
