//! Image format conversion
//!
//! Downloaded WebP payloads can optionally be normalized to JPEG. The work
//! is delegated through the [`ImageConverter`] trait so the pipeline does
//! not depend on any particular tool:
//!
//! - [`CliImageConverter`]: shells out to an ImageMagick-compatible binary
//! - [`NoOpImageConverter`]: stub used when no converter is available
//!
//! Conversion failures are never fatal to a task — the original artifact is
//! kept and the failure is logged.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Trait for image format conversion
///
/// Implementations convert one artifact to JPEG and return the path of the
/// converted file. The caller removes the original on success.
#[async_trait]
pub trait ImageConverter: Send + Sync {
    /// Convert `input` to JPEG, returning the converted file's path.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversion tool fails to execute, exits
    /// non-zero, or the operation is not supported by this implementation.
    async fn convert(&self, input: &Path) -> Result<PathBuf>;

    /// Whether this implementation can actually convert anything
    fn can_convert(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// CLI-based converter using an ImageMagick-compatible binary
///
/// Runs `<binary> <input> -quality <q> <output>`, the invocation shared by
/// ImageMagick's `convert` and `magick` entry points.
pub struct CliImageConverter {
    binary_path: PathBuf,
    quality: u8,
}

impl CliImageConverter {
    /// Create a converter with an explicit binary path
    pub fn new(binary_path: PathBuf, quality: u8) -> Self {
        Self {
            binary_path,
            quality,
        }
    }

    /// Attempt to find an ImageMagick binary in PATH (`magick`, then `convert`)
    pub fn from_path(quality: u8) -> Option<Self> {
        which::which("magick")
            .or_else(|_| which::which("convert"))
            .ok()
            .map(|path| Self::new(path, quality))
    }
}

#[async_trait]
impl ImageConverter for CliImageConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf> {
        let output_path = input.with_extension("jpg");

        let output = Command::new(&self.binary_path)
            .arg(input)
            .arg("-quality")
            .arg(self.quality.to_string())
            .arg(&output_path)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute converter: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "Converter exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output_path)
    }

    fn can_convert(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "cli-imagemagick"
    }
}

/// No-op converter used when no conversion tool is available
///
/// Returns `Error::NotSupported` so callers keep the original artifact and
/// continue.
pub struct NoOpImageConverter;

#[async_trait]
impl ImageConverter for NoOpImageConverter {
    async fn convert(&self, _input: &Path) -> Result<PathBuf> {
        Err(Error::NotSupported(
            "image conversion requires an ImageMagick-compatible binary. \
             Configure conversion.tool_path or ensure magick/convert is in PATH."
                .into(),
        ))
    }

    fn can_convert(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Select a converter based on the configuration.
///
/// Explicit `tool_path` wins; otherwise PATH is searched when allowed;
/// otherwise the no-op stub is used.
pub(crate) fn converter_from_config(
    config: &crate::config::ConversionConfig,
) -> std::sync::Arc<dyn ImageConverter> {
    if let Some(path) = &config.tool_path {
        std::sync::Arc::new(CliImageConverter::new(path.clone(), config.jpg_quality))
    } else if config.search_path {
        CliImageConverter::from_path(config.jpg_quality)
            .map(|c| std::sync::Arc::new(c) as std::sync::Arc<dyn ImageConverter>)
            .unwrap_or_else(|| std::sync::Arc::new(NoOpImageConverter))
    } else {
        std::sync::Arc::new(NoOpImageConverter)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_converter_reports_not_supported() {
        let converter = NoOpImageConverter;
        assert!(!converter.can_convert());
        let result = converter.convert(Path::new("x.webp")).await;
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[tokio::test]
    async fn cli_converter_surfaces_missing_binary_as_external_tool_error() {
        let converter =
            CliImageConverter::new(PathBuf::from("/nonexistent/converter-binary"), 95);
        let result = converter.convert(Path::new("x.webp")).await;
        assert!(matches!(result, Err(Error::ExternalTool(_))));
    }

    #[test]
    fn explicit_tool_path_takes_precedence_over_search() {
        let config = crate::config::ConversionConfig {
            tool_path: Some(PathBuf::from("/opt/magick")),
            search_path: false,
            ..Default::default()
        };
        let converter = converter_from_config(&config);
        assert_eq!(converter.name(), "cli-imagemagick");
    }

    #[test]
    fn disabled_search_without_path_falls_back_to_noop() {
        let config = crate::config::ConversionConfig {
            tool_path: None,
            search_path: false,
            ..Default::default()
        };
        let converter = converter_from_config(&config);
        assert_eq!(converter.name(), "noop");
    }
}
