//! Resilient per-item fetching
//!
//! Downloads one item's payload: checks for a pre-existing artifact,
//! resolves the payload location from the item page, streams it to a
//! temporary path, and renames into place on full success. Transient
//! transport failures are retried with exponential backoff; a structurally
//! unexpected item page is a parse error and is never retried.

use crate::client::PageFetcher;
use crate::config::{ConversionConfig, RetryConfig};
use crate::convert::ImageConverter;
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use crate::types::ItemLink;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};

/// Extensions accepted by the idempotency check
///
/// An artifact with the item's sequence index under any of these extensions
/// short-circuits a redundant fetch.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "png", "webp"];

/// Outcome of fetching one item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Payload was transferred (and converted, if applicable)
    Downloaded,
    /// A matching artifact already existed on disk
    Skipped,
}

/// Fetch one item into `output_dir`.
///
/// Idempotent: returns [`FetchOutcome::Skipped`] without any network access
/// when an artifact for the item's sequence index already exists. On
/// success of a `.webp` payload with conversion enabled, the converter
/// collaborator runs and the original is removed only when it succeeds.
///
/// # Errors
///
/// - [`Error::Parse`] when the item page carries no payload link (not retried)
/// - [`Error::Network`] / [`Error::Io`] when the transfer keeps failing after
///   the configured retries
pub async fn fetch_item(
    fetcher: &dyn PageFetcher,
    retry: &RetryConfig,
    conversion: &ConversionConfig,
    converter: &dyn ImageConverter,
    item: &ItemLink,
    output_dir: &Path,
) -> Result<FetchOutcome> {
    if let Some(existing) = existing_artifact(output_dir, item.index) {
        tracing::debug!(
            index = item.index,
            path = %existing.display(),
            "Artifact already exists, skipping"
        );
        return Ok(FetchOutcome::Skipped);
    }

    let page_html = fetcher.fetch_text(&item.page_url).await?;
    let payload_url = extract_payload_url(&page_html).ok_or_else(|| {
        Error::Parse(format!("no payload image on item page {}", item.page_url))
    })?;

    let extension = payload_extension(&payload_url);
    let final_path = output_dir.join(format!("{}.{}", item.index, extension));
    let part_path = output_dir.join(format!("{}.{}.part", item.index, extension));

    let transfer = fetch_with_retry(retry, || fetcher.fetch_to_file(&payload_url, &part_path)).await;

    match transfer {
        Ok(bytes) => {
            tokio::fs::rename(&part_path, &final_path).await?;
            tracing::debug!(
                index = item.index,
                bytes = bytes,
                path = %final_path.display(),
                "Item downloaded"
            );
        }
        Err(e) => {
            // Never leave partial data behind: the final path stays absent so
            // the idempotency check cannot mistake a failed transfer for done
            if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %part_path.display(),
                        error = %cleanup,
                        "Failed to remove partial download"
                    );
                }
            }
            return Err(e);
        }
    }

    if extension == "webp" && conversion.webp_to_jpg {
        convert_in_place(converter, &final_path).await;
    }

    Ok(FetchOutcome::Downloaded)
}

/// Run the converter on a downloaded artifact, removing the original only on
/// success. Conversion problems are logged, never propagated.
async fn convert_in_place(converter: &dyn ImageConverter, path: &Path) {
    if !converter.can_convert() {
        return;
    }
    match converter.convert(path).await {
        Ok(converted) => {
            tracing::debug!(
                from = %path.display(),
                to = %converted.display(),
                "Converted artifact"
            );
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove original after conversion");
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                converter = converter.name(),
                error = %e,
                "Conversion failed, keeping original"
            );
        }
    }
}

/// Find an existing artifact for a sequence index under any accepted extension.
pub(crate) fn existing_artifact(output_dir: &Path, index: u32) -> Option<PathBuf> {
    ACCEPTED_EXTENSIONS.iter().find_map(|ext| {
        let candidate = output_dir.join(format!("{index}.{ext}"));
        candidate.exists().then_some(candidate)
    })
}

/// Extract the payload URL from an item page: the `src` of `<img id="img">`.
fn extract_payload_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("img#img").ok()?;
    let img = document.select(&selector).next()?;
    img.value().attr("src").map(|s| s.to_string())
}

/// File extension of the payload URL's path, defaulting to `jpg`.
fn payload_extension(payload_url: &str) -> String {
    url::Url::parse(payload_url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
        })
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "jpg".to_string())
}
