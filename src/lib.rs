//! # gallery-dl
//!
//! Resumable download manager library for paginated remote image galleries.
//!
//! ## Design Philosophy
//!
//! gallery-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Resumable** - Every task writes a durable per-gallery ledger; failed
//!   or interrupted work can be picked up later from the ledger file
//! - **Bounded** - Two-level concurrency control: a worker pool per task,
//!   plus a global cap on how many tasks run at once
//!
//! ## Quick Start
//!
//! ```no_run
//! use gallery_dl::{Config, GalleryDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = GalleryDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Queue a gallery; it starts as soon as a concurrency slot is free
//!     let id = downloader.add("https://e-hentai.org/g/1234567/abcdef0123/").await?;
//!     println!("queued task {id}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Resuming
//!
//! Each gallery directory carries a `task_info.ini` with per-item status.
//! `GalleryDownloader::resume` re-fetches exactly the failed and pending
//! items recorded there; artifacts already on disk are skipped.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Gallery directory archiving
pub mod archive;
/// HTTP page fetching
pub mod client;
/// Configuration types
pub mod config;
/// Image format conversion
pub mod convert;
/// Gallery link discovery
pub mod discovery;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Resilient per-item fetching
pub mod fetcher;
/// Durable per-task ledger
pub mod ledger;
/// Retry logic with exponential backoff
pub mod retry;
pub(crate) mod task;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::{Archiver, CliArchiver, NoOpArchiver};
pub use client::{HttpClient, PageFetcher};
pub use config::{
    ArchiveConfig, Config, ConversionConfig, DownloadConfig, NetworkConfig, RetryConfig,
};
pub use convert::{CliImageConverter, ImageConverter, NoOpImageConverter};
pub use downloader::GalleryDownloader;
pub use error::{Error, LedgerError, Result, TaskError};
pub use ledger::{LEDGER_FILE_NAME, TaskLedger};
pub use types::{Event, ItemLink, ItemStatus, TaskId, TaskInfo, TaskState};
