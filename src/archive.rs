//! Gallery directory archiving
//!
//! Finished gallery directories can optionally be compressed. The work is
//! delegated through the [`Archiver`] trait:
//!
//! - [`CliArchiver`]: shells out to the external `7z` binary
//! - [`NoOpArchiver`]: stub used when no archive tool is available
//!
//! Archive failures are never fatal to a task — the directory is kept and
//! the failure is logged.

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Trait for archiving a finished gallery directory
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Compress `directory` into a sibling archive, returning the archive path.
    ///
    /// When `delete_source` is configured, the source directory is removed
    /// after the archive is written successfully.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive tool fails to execute, exits
    /// non-zero, or the operation is not supported by this implementation.
    async fn archive(&self, directory: &Path) -> Result<PathBuf>;

    /// Whether this implementation can actually archive anything
    fn can_archive(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// CLI-based archiver using the external `7z` binary
pub struct CliArchiver {
    binary_path: PathBuf,
    format: String,
    compression_level: u8,
    password: Option<String>,
    delete_source: bool,
}

impl CliArchiver {
    /// Create an archiver with an explicit binary path
    pub fn new(binary_path: PathBuf, config: &ArchiveConfig) -> Self {
        Self {
            binary_path,
            format: config.format.clone(),
            compression_level: config.compression_level,
            password: config.password.clone(),
            delete_source: config.delete_source,
        }
    }

    /// Attempt to find 7z in PATH (`7z`, then `7za`)
    pub fn from_path(config: &ArchiveConfig) -> Option<Self> {
        which::which("7z")
            .or_else(|_| which::which("7za"))
            .ok()
            .map(|path| Self::new(path, config))
    }
}

#[async_trait]
impl Archiver for CliArchiver {
    async fn archive(&self, directory: &Path) -> Result<PathBuf> {
        let archive_path = directory.with_extension(&self.format);

        let mut command = Command::new(&self.binary_path);
        command
            .arg("a")
            .arg(format!("-t{}", self.format))
            .arg(format!("-mx{}", self.compression_level));
        if let Some(password) = &self.password {
            command.arg(format!("-p{password}"));
        }
        command.arg(&archive_path).arg(directory);

        let output = command
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute 7z: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "7z exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        if self.delete_source {
            tokio::fs::remove_dir_all(directory).await?;
            tracing::info!(directory = %directory.display(), "Deleted source after archiving");
        }

        Ok(archive_path)
    }

    fn can_archive(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "cli-7z"
    }
}

/// No-op archiver used when no archive tool is available
pub struct NoOpArchiver;

#[async_trait]
impl Archiver for NoOpArchiver {
    async fn archive(&self, _directory: &Path) -> Result<PathBuf> {
        Err(Error::NotSupported(
            "archiving requires the external 7z binary. \
             Configure archive.tool_path or ensure 7z is in PATH."
                .into(),
        ))
    }

    fn can_archive(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Select an archiver based on the configuration.
///
/// Explicit `tool_path` wins; otherwise PATH is searched when allowed;
/// otherwise the no-op stub is used.
pub(crate) fn archiver_from_config(config: &ArchiveConfig) -> std::sync::Arc<dyn Archiver> {
    if let Some(path) = &config.tool_path {
        std::sync::Arc::new(CliArchiver::new(path.clone(), config))
    } else if config.search_path {
        CliArchiver::from_path(config)
            .map(|a| std::sync::Arc::new(a) as std::sync::Arc<dyn Archiver>)
            .unwrap_or_else(|| std::sync::Arc::new(NoOpArchiver))
    } else {
        std::sync::Arc::new(NoOpArchiver)
    }
}
