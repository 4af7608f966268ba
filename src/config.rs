//! Configuration types for gallery-dl

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, pacing)
///
/// Groups settings related to how galleries are fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root output directory; each gallery gets its own subdirectory
    /// named after its sanitized title (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Worker pool size within a single task (default: 3)
    ///
    /// Bounds how many items of one gallery are fetched in parallel,
    /// independent of how many tasks run at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Maximum tasks in Running state simultaneously (default: 3)
    ///
    /// The downloader's global concurrency cap. Can be changed at runtime
    /// via `set_concurrency_limit`.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Delay between successive listing-page fetches (default: 1 second)
    #[serde(default = "default_page_delay", with = "duration_serde")]
    pub page_delay: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_workers: default_max_workers(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            page_delay: default_page_delay(),
        }
    }
}

/// HTTP client configuration (headers, timeouts)
///
/// The gallery site expects browser-like headers; extra opaque headers can be
/// carried for sites that need them (session cookies, etc.). No session
/// management happens here — headers are passed through as configured.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Referer header sent with every request (None = derived from the
    /// listing URL's origin)
    #[serde(default)]
    pub referer: Option<String>,

    /// Additional opaque headers sent with every request
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            referer: None,
            extra_headers: HashMap::new(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry configuration for transient payload-transfer failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (default: 1 second)
    ///
    /// The wait before retry attempt `n` is `base_delay * 2^n`, capped at
    /// `max_delay`.
    #[serde(default = "default_base_delay", with = "duration_serde")]
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

/// Image conversion settings
///
/// Conversion is delegated to an [`ImageConverter`](crate::convert::ImageConverter)
/// collaborator; these settings choose when it runs and which binary backs it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Convert downloaded WebP payloads to JPEG (default: true)
    #[serde(default = "default_true")]
    pub webp_to_jpg: bool,

    /// JPEG quality, 1-100 (default: 95)
    #[serde(default = "default_jpg_quality")]
    pub jpg_quality: u8,

    /// Path to the converter executable (auto-detected if None)
    #[serde(default)]
    pub tool_path: Option<PathBuf>,

    /// Whether to search PATH for the converter binary if no explicit path
    /// is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            webp_to_jpg: true,
            jpg_quality: default_jpg_quality(),
            tool_path: None,
            search_path: true,
        }
    }
}

/// Archive settings — compress a finished gallery directory
///
/// Archiving is delegated to an [`Archiver`](crate::archive::Archiver)
/// collaborator (external `7z` by default).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive finished galleries (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Path to the 7z executable (auto-detected if None)
    #[serde(default)]
    pub tool_path: Option<PathBuf>,

    /// Archive format passed to the tool (default: "zip")
    #[serde(default = "default_archive_format")]
    pub format: String,

    /// Compression level, 0-9 (default: 5)
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,

    /// Optional archive password
    #[serde(default)]
    pub password: Option<String>,

    /// Delete the source directory after a successful archive (default: false)
    #[serde(default)]
    pub delete_source: bool,

    /// Whether to search PATH for the archive binary if no explicit path
    /// is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tool_path: None,
            format: default_archive_format(),
            compression_level: default_compression_level(),
            password: None,
            delete_source: false,
            search_path: true,
        }
    }
}

/// Main configuration for [`GalleryDownloader`](crate::GalleryDownloader)
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) — directories, concurrency, pacing
/// - [`network`](NetworkConfig) — headers and timeouts
/// - [`retry`](RetryConfig) — backoff policy for transient failures
/// - [`conversion`](ConversionConfig) — WebP-to-JPEG conversion
/// - [`archive`](ArchiveConfig) — gallery directory compression
///
/// All fields have sensible defaults; `Config::default()` works out of the box.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// HTTP client settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Retry/backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Image conversion settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Archive settings
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl Config {
    /// Validate the configuration, returning the first problem found.
    ///
    /// Called once by `GalleryDownloader::new`; invalid values are rejected
    /// up front rather than surfacing mid-download.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.download.max_workers == 0 {
            return Err(crate::error::Error::Config {
                message: "max_workers must be at least 1".to_string(),
                key: Some("download.max_workers".to_string()),
            });
        }
        if self.download.max_concurrent_tasks == 0 {
            return Err(crate::error::Error::Config {
                message: "max_concurrent_tasks must be at least 1".to_string(),
                key: Some("download.max_concurrent_tasks".to_string()),
            });
        }
        if !(1..=100).contains(&self.conversion.jpg_quality) {
            return Err(crate::error::Error::Config {
                message: format!(
                    "jpg_quality must be between 1 and 100, got {}",
                    self.conversion.jpg_quality
                ),
                key: Some("conversion.jpg_quality".to_string()),
            });
        }
        if self.archive.compression_level > 9 {
            return Err(crate::error::Error::Config {
                message: format!(
                    "compression_level must be between 0 and 9, got {}",
                    self.archive.compression_level
                ),
                key: Some("archive.compression_level".to_string()),
            });
        }
        Ok(())
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_workers() -> usize {
    3
}

fn default_max_concurrent_tasks() -> usize {
    3
}

fn default_page_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_jpg_quality() -> u8 {
    95
}

fn default_archive_format() -> String {
    "zip".to_string()
}

fn default_compression_level() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (seconds as integer)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
