//! Task worker — top-level lifecycle for a single gallery.
//!
//! Phases:
//! 1. Initial checkpoint (the task may already be paused or cancelled)
//! 2. Link discovery (skipped for resume tasks; failure here fails the task)
//! 3. Bounded worker pool over the item list, checkpointing before each item
//! 4. Finalization: flush the ledger, set the terminal state, archive hook

use super::{Checkpoint, TaskShared, checkpoint};
use crate::archive::Archiver;
use crate::client::PageFetcher;
use crate::config::Config;
use crate::convert::ImageConverter;
use crate::discovery;
use crate::error::Result;
use crate::fetcher::{self, FetchOutcome};
use crate::types::{Event, ItemLink, ItemStatus, TaskId, TaskState};
use crate::utils::sanitize_file_name;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum interval between Progress events for one task
///
/// State transitions are never coalesced; item progress is, so a gallery
/// with thousands of small items cannot flood observers.
const PROGRESS_NOTIFY_INTERVAL: Duration = Duration::from_millis(500);

/// Everything a worker needs, bundled to reduce parameter passing
pub(crate) struct WorkerContext {
    pub(crate) id: TaskId,
    pub(crate) shared: Arc<TaskShared>,
    /// Listing URL to discover; None when the item list was preloaded (resume)
    pub(crate) listing_url: Option<String>,
    pub(crate) fetcher: Arc<dyn PageFetcher>,
    pub(crate) converter: Arc<dyn ImageConverter>,
    pub(crate) archiver: Arc<dyn Archiver>,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl WorkerContext {
    fn emit(&self, event: Event) {
        // send() fails only when nobody subscribes, which is fine
        self.event_tx.send(event).ok();
    }
}

/// Run one task to a terminal state.
pub(crate) async fn run(ctx: WorkerContext) {
    // Phase 1: the task may have been paused or cancelled before we got here
    if checkpoint(&ctx.shared.gate, &ctx.shared.cancel).await == Checkpoint::Cancelled {
        finalize(&ctx, true).await;
        return;
    }

    // Phase 2: discovery (fresh tasks only; resume tasks carry their items)
    if let Some(listing_url) = ctx.listing_url.clone() {
        if !discover_items(&ctx, &listing_url).await {
            return; // Already marked Failed
        }
    }

    // Phase 3: bounded worker pool over the items
    let (items, output_dir) = {
        let data = ctx.shared.data.lock().await;
        (data.items.clone(), data.output_dir.clone())
    };

    let Some(output_dir) = output_dir else {
        fail(&ctx, "No output directory resolved".to_string()).await;
        return;
    };

    let max_workers = ctx.config.download.max_workers;
    futures::stream::iter(items)
        .for_each_concurrent(max_workers, |item| {
            let ctx = &ctx;
            let output_dir = &output_dir;
            async move {
                if checkpoint(&ctx.shared.gate, &ctx.shared.cancel).await == Checkpoint::Cancelled
                {
                    // Item stays pending in the ledger; a resume picks it up
                    return;
                }
                let result = fetcher::fetch_item(
                    ctx.fetcher.as_ref(),
                    &ctx.config.retry,
                    &ctx.config.conversion,
                    ctx.converter.as_ref(),
                    &item,
                    output_dir,
                )
                .await;
                record_outcome(ctx, &item, result).await;
            }
        })
        .await;

    // Phase 4: finalize based on whether cancellation arrived along the way
    let cancelled = ctx.shared.cancel.is_cancelled();
    finalize(&ctx, cancelled).await;
}

/// Run discovery and populate the task state. Returns false (after marking
/// the task Failed) when the listing cannot be fetched or parsed.
async fn discover_items(ctx: &WorkerContext, listing_url: &str) -> bool {
    {
        let mut data = ctx.shared.data.lock().await;
        data.message = "Fetching gallery information".to_string();
    }

    let gallery = match discovery::discover(
        ctx.fetcher.as_ref(),
        listing_url,
        ctx.config.download.page_delay,
    )
    .await
    {
        Ok(gallery) => gallery,
        Err(e) => {
            tracing::error!(task_id = ctx.id.0, error = %e, "Discovery failed");
            fail(ctx, format!("Discovery failed: {e}")).await;
            return false;
        }
    };

    let output_dir = ctx
        .config
        .download
        .output_dir
        .join(sanitize_file_name(&gallery.title));
    if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
        tracing::error!(
            task_id = ctx.id.0,
            path = %output_dir.display(),
            error = %e,
            "Failed to create output directory"
        );
        fail(ctx, format!("Failed to create output directory: {e}")).await;
        return false;
    }

    let total = gallery.items.len();
    tracing::info!(
        task_id = ctx.id.0,
        title = %gallery.title,
        items = total,
        "Gallery discovered"
    );

    {
        let mut data = ctx.shared.data.lock().await;
        data.title = Some(gallery.title.clone());
        data.output_dir = Some(output_dir);
        data.ledger.title = gallery.title;
        data.ledger.url = gallery.url;
        data.ledger.register_items(&gallery.items);
        data.items = gallery.items;
        data.total = total;
        data.message = format!("Found {total} items");
    }
    true
}

/// Record one item's outcome in the ledger and emit coalesced progress.
async fn record_outcome(ctx: &WorkerContext, item: &ItemLink, result: Result<FetchOutcome>) {
    let mut data = ctx.shared.data.lock().await;

    let status = match result {
        Ok(FetchOutcome::Downloaded) => ItemStatus::Success,
        Ok(FetchOutcome::Skipped) => ItemStatus::Skipped,
        Err(e) => {
            tracing::error!(
                task_id = ctx.id.0,
                index = item.index,
                error = %e,
                "Item fetch failed"
            );
            ItemStatus::Failed(e.to_string())
        }
    };
    data.ledger.record(item.index, &item.page_url, status);
    data.completed += 1;
    data.message = format!("Downloading {}/{}", data.completed, data.total);

    let now = Instant::now();
    let should_emit = data
        .last_progress_emit
        .is_none_or(|last| now.duration_since(last) >= PROGRESS_NOTIFY_INTERVAL);
    let event = if should_emit {
        data.last_progress_emit = Some(now);
        Some(Event::Progress {
            id: ctx.id,
            completed: data.completed,
            total: data.total,
        })
    } else {
        None
    };
    drop(data);

    if let Some(event) = event {
        ctx.emit(event);
    }
}

/// Mark the task Failed with a message.
async fn fail(ctx: &WorkerContext, message: String) {
    {
        let mut data = ctx.shared.data.lock().await;
        data.state = TaskState::Failed;
        data.message = message;
    }
    ctx.emit(Event::StateChanged {
        id: ctx.id,
        state: TaskState::Failed,
    });
}

/// Flush the ledger, set the terminal state, and run the archive hook.
///
/// The ledger is always produced, even on cancellation or partial failure —
/// it is what makes the task resumable later.
async fn finalize(ctx: &WorkerContext, cancelled: bool) {
    let final_state = if cancelled {
        TaskState::Cancelled
    } else {
        TaskState::Completed
    };

    let archive_dir = {
        let mut data = ctx.shared.data.lock().await;

        if let Some(dir) = data.output_dir.clone() {
            if let Err(e) = data.ledger.flush(&dir).await {
                tracing::warn!(task_id = ctx.id.0, error = %e, "Failed to flush ledger");
            }
        }

        data.state = final_state;
        data.message = if cancelled {
            "Cancelled".to_string()
        } else {
            format!(
                "Completed: {} downloaded, {} skipped, {} failed",
                data.ledger.downloaded, data.ledger.skipped, data.ledger.failed
            )
        };

        tracing::info!(
            task_id = ctx.id.0,
            state = %final_state,
            downloaded = data.ledger.downloaded,
            skipped = data.ledger.skipped,
            failed = data.ledger.failed,
            "Task finished"
        );

        (final_state == TaskState::Completed && ctx.config.archive.enabled)
            .then(|| data.output_dir.clone())
            .flatten()
    };

    ctx.emit(Event::StateChanged {
        id: ctx.id,
        state: final_state,
    });

    if let Some(dir) = archive_dir {
        archive_gallery(ctx, &dir).await;
    }
}

/// Archive a completed gallery directory. Failures are logged, never fatal.
async fn archive_gallery(ctx: &WorkerContext, dir: &std::path::Path) {
    if !ctx.archiver.can_archive() {
        tracing::warn!(
            task_id = ctx.id.0,
            "Archiving enabled but no archive tool is available"
        );
        return;
    }
    match ctx.archiver.archive(dir).await {
        Ok(archive_path) => {
            tracing::info!(
                task_id = ctx.id.0,
                path = %archive_path.display(),
                "Gallery archived"
            );
        }
        Err(e) => {
            tracing::warn!(
                task_id = ctx.id.0,
                archiver = ctx.archiver.name(),
                error = %e,
                "Archiving failed"
            );
        }
    }
}
