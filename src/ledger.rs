//! Durable per-task ledger
//!
//! Each gallery directory carries a `task_info.ini` recording the gallery
//! metadata, aggregate counts, the failed-identifier list, and the complete
//! sequence-index → item-status map. The file is the unit of resumability:
//! [`TaskLedger::resume_targets`] reconstructs exactly the work a later run
//! still owes.
//!
//! Aggregate counts are never maintained incrementally — [`TaskLedger::flush`]
//! recomputes them by scanning the status map, so they cannot drift from the
//! per-item records across repeated resumes.

use crate::error::{LedgerError, Result};
use crate::types::{ItemLink, ItemStatus};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the ledger within a gallery directory
pub const LEDGER_FILE_NAME: &str = "task_info.ini";

/// Timestamp format used for the `DownloadTime` key
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Recorded state of one discovered item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemEntry {
    /// The item page URL
    pub url: String,
    /// Recorded status
    pub status: ItemStatus,
}

/// Durable snapshot of a task's progress
///
/// Invariant: every item discovered for the task has exactly one entry in
/// `statuses`; the aggregate counts are recomputable from that map and are
/// refreshed on every flush.
#[derive(Clone, Debug, Default)]
pub struct TaskLedger {
    /// Gallery title
    pub title: String,
    /// Source listing URL
    pub url: String,
    /// When the ledger was last written
    pub download_time: Option<NaiveDateTime>,
    /// Total discovered items
    pub total: usize,
    /// Items downloaded by this or a previous run
    pub downloaded: usize,
    /// Items skipped because an artifact already existed
    pub skipped: usize,
    /// Items whose fetch failed
    pub failed: usize,
    /// Failed item identifiers
    pub failed_links: Vec<String>,
    /// Full sequence-index → item record map
    pub statuses: BTreeMap<u32, ItemEntry>,
}

impl TaskLedger {
    /// Create an empty ledger for a gallery.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Register discovered items as pending.
    ///
    /// Items already present (e.g. loaded from a previous run's ledger) keep
    /// their recorded status.
    pub fn register_items(&mut self, items: &[ItemLink]) {
        for item in items {
            self.statuses.entry(item.index).or_insert_with(|| ItemEntry {
                url: item.page_url.clone(),
                status: ItemStatus::Pending,
            });
        }
    }

    /// Record the outcome of one item.
    pub fn record(&mut self, index: u32, url: &str, status: ItemStatus) {
        self.statuses.insert(
            index,
            ItemEntry {
                url: url.to_string(),
                status,
            },
        );
    }

    /// Recompute the aggregate counts and the failed-link list by scanning
    /// the full status map.
    pub fn recompute_counts(&mut self) {
        self.total = self.statuses.len();
        self.downloaded = 0;
        self.skipped = 0;
        self.failed = 0;
        self.failed_links.clear();
        for entry in self.statuses.values() {
            match entry.status {
                ItemStatus::Success => self.downloaded += 1,
                ItemStatus::Skipped => self.skipped += 1,
                ItemStatus::Failed(_) => {
                    self.failed += 1;
                    self.failed_links.push(entry.url.clone());
                }
                ItemStatus::Pending => {}
            }
        }
    }

    /// Items a resume still owes: every entry recorded `failed` or `pending`,
    /// plus any failed-list identifier absent from the status map.
    pub fn resume_targets(&self) -> Vec<ItemLink> {
        let mut targets: Vec<ItemLink> = self
            .statuses
            .iter()
            .filter(|(_, entry)| entry.status.needs_fetch())
            .map(|(index, entry)| ItemLink {
                page_url: entry.url.clone(),
                index: *index,
            })
            .collect();

        for link in &self.failed_links {
            let known = self.statuses.values().any(|entry| &entry.url == link);
            if !known {
                match ItemLink::from_page_url(link) {
                    Some(item) => targets.push(item),
                    None => {
                        tracing::warn!(link = %link, "Failed link has no sequence index, skipping");
                    }
                }
            }
        }

        targets
    }

    /// True when a resume would have nothing to do.
    pub fn is_complete(&self) -> bool {
        self.resume_targets().is_empty()
    }

    /// Render the ledger in its durable key/value-section format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[Gallery]\n");
        out.push_str(&format!("Title = {}\n", self.title));
        out.push_str(&format!("URL = {}\n", self.url));
        if let Some(time) = self.download_time {
            out.push_str(&format!("DownloadTime = {}\n", time.format(TIME_FORMAT)));
        }
        out.push_str(&format!("TotalImages = {}\n", self.total));
        out.push_str(&format!("Downloaded = {}\n", self.downloaded));
        out.push_str(&format!("Skipped = {}\n", self.skipped));
        out.push_str(&format!("Failed = {}\n", self.failed));
        out.push('\n');

        if !self.failed_links.is_empty() {
            out.push_str("[FailedLinks]\n");
            for (i, link) in self.failed_links.iter().enumerate() {
                out.push_str(&format!("Link{} = {}\n", i + 1, link));
            }
            out.push('\n');
        }

        out.push_str("[ImageStatus]\n");
        for (index, entry) in &self.statuses {
            out.push_str(&format!("{} = {} | {}\n", index, entry.url, entry.status));
        }
        out
    }

    /// Parse a ledger file's content.
    ///
    /// Keys and section names are matched case-insensitively: files written
    /// by other tooling lowercase their keys.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut ledger = TaskLedger::default();
        let mut section = String::new();
        let mut saw_gallery = false;

        for (line_no, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.to_ascii_lowercase();
                if section == "gallery" {
                    saw_gallery = true;
                }
                continue;
            }

            let (key, value) = line.split_once('=').ok_or(LedgerError::MalformedLine {
                line: line_no + 1,
                content: raw_line.to_string(),
            })?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match section.as_str() {
                "gallery" => match key.as_str() {
                    "title" => ledger.title = value.to_string(),
                    "url" => ledger.url = value.to_string(),
                    "downloadtime" => {
                        ledger.download_time =
                            NaiveDateTime::parse_from_str(value, TIME_FORMAT).ok();
                    }
                    "totalimages" => ledger.total = value.parse().unwrap_or(0),
                    "downloaded" => ledger.downloaded = value.parse().unwrap_or(0),
                    "skipped" => ledger.skipped = value.parse().unwrap_or(0),
                    "failed" => ledger.failed = value.parse().unwrap_or(0),
                    _ => {}
                },
                "failedlinks" => {
                    ledger.failed_links.push(value.to_string());
                }
                "imagestatus" => {
                    let index: u32 = key.parse().map_err(|_| LedgerError::MalformedLine {
                        line: line_no + 1,
                        content: raw_line.to_string(),
                    })?;
                    let (url, status) = match value.split_once('|') {
                        Some((url, status)) => (url.trim(), ItemStatus::parse(status)),
                        // Status column missing: treat as never attempted
                        None => (value, ItemStatus::Pending),
                    };
                    ledger.record(index, url, status);
                }
                _ => {}
            }
        }

        if !saw_gallery {
            return Err(LedgerError::MissingSection {
                path: path.to_path_buf(),
                section: "Gallery".to_string(),
            }
            .into());
        }
        if ledger.url.is_empty() {
            return Err(LedgerError::MissingKey {
                path: path.to_path_buf(),
                key: "URL".to_string(),
            }
            .into());
        }

        Ok(ledger)
    }

    /// Load a ledger file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content, path)
    }

    /// Flush the ledger to `dir/task_info.ini`.
    ///
    /// Recomputes the aggregate counts from the status map and stamps the
    /// write time before rendering.
    pub async fn flush(&mut self, dir: &Path) -> Result<PathBuf> {
        self.recompute_counts();
        self.download_time = Some(chrono::Local::now().naive_local());
        let path = dir.join(LEDGER_FILE_NAME);
        tokio::fs::write(&path, self.render()).await?;
        tracing::debug!(path = %path.display(), "Ledger flushed");
        Ok(path)
    }
}
