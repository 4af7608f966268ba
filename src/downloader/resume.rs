//! Resuming partial work from a ledger file.

use super::GalleryDownloader;
use crate::error::{Error, Result};
use crate::ledger::TaskLedger;
use crate::task::GalleryTask;
use crate::types::{Event, TaskId};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl GalleryDownloader {
    /// Resume a previously recorded task from its ledger file
    ///
    /// Loads the ledger, collects every item recorded `failed` or `pending`
    /// (plus any failed-list identifier absent from the status map), and
    /// registers a task bound to the ledger's original directory that
    /// re-fetches only that subset. Artifacts already materialized on disk
    /// are skipped by the per-item idempotency check. When the task
    /// finishes, the ledger is rewritten with counts recomputed from the
    /// full merged status map.
    ///
    /// Returns `Ok(None)` without registering anything when the ledger is
    /// already complete.
    pub async fn resume(&self, ledger_path: impl AsRef<Path>) -> Result<Option<TaskId>> {
        let ledger_path = ledger_path.as_ref();
        let ledger = TaskLedger::load(ledger_path).await?;

        let targets = ledger.resume_targets();
        if targets.is_empty() {
            tracing::info!(
                path = %ledger_path.display(),
                "Ledger is already complete, nothing to resume"
            );
            return Ok(None);
        }

        let output_dir = ledger_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "ledger path has no parent directory: {}",
                    ledger_path.display()
                ))
            })?;

        tracing::info!(
            path = %ledger_path.display(),
            targets = targets.len(),
            "Resuming from ledger"
        );

        let id = TaskId::new(self.next_task_id.fetch_add(1, Ordering::SeqCst));
        let url = ledger.url.clone();
        let task = Arc::new(GalleryTask::from_ledger(id, ledger, targets, output_dir));

        {
            let mut registry = self.registry.lock().await;
            registry.tasks.insert(id, task);
            registry.order.push(id);
        }

        self.emit_event(Event::TaskAdded { id, url });
        self.promote().await;
        Ok(Some(id))
    }
}
