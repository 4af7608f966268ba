//! HTTP page fetching
//!
//! All network access goes through the [`PageFetcher`] trait so the
//! discovery and fetch logic can be exercised against test doubles. The
//! production implementation, [`HttpClient`], wraps a shared
//! `reqwest::Client` carrying the configured opaque headers.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Abstraction over HTTP fetching, enabling testability.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page and return its body as text.
    ///
    /// Non-success HTTP statuses are errors.
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Stream a payload to `dest`, returning the number of bytes written.
    ///
    /// The destination file is created (or truncated). Callers are
    /// responsible for writing to a temporary path and renaming on success.
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Production [`PageFetcher`] backed by `reqwest`
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Build an HTTP client from the network configuration.
    ///
    /// The configured User-Agent, Referer, and extra headers are attached to
    /// every request. Returns a configuration error if a header name or
    /// value is malformed.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(referer) = &config.referer {
            headers.insert(
                reqwest::header::REFERER,
                referer.parse().map_err(|_| Error::Config {
                    message: format!("invalid referer header value: {referer}"),
                    key: Some("network.referer".to_string()),
                })?,
            );
        }
        for (name, value) in &config.extra_headers {
            let header_name: reqwest::header::HeaderName =
                name.parse().map_err(|_| Error::Config {
                    message: format!("invalid header name: {name}"),
                    key: Some("network.extra_headers".to_string()),
                })?;
            let header_value = value.parse().map_err(|_| Error::Config {
                message: format!("invalid value for header {name}"),
                key: Some("network.extra_headers".to_string()),
            })?;
            headers.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_text_returns_page_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/g/123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gallery</html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&NetworkConfig::default()).unwrap();
        let body = client
            .fetch_text(&format!("{}/g/123", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html>gallery</html>");
    }

    #[tokio::test]
    async fn fetch_text_treats_http_errors_as_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(&NetworkConfig::default()).unwrap();
        let result = client.fetch_text(&server.uri()).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn fetch_to_file_streams_payload_bytes() {
        let server = MockServer::start().await;
        let payload = vec![0xAB_u8; 4096];
        Mock::given(method("GET"))
            .and(path("/img/1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1.jpg.part");

        let client = HttpClient::new(&NetworkConfig::default()).unwrap();
        let written = client
            .fetch_to_file(&format!("{}/img/1.jpg", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
    }

    #[tokio::test]
    async fn configured_headers_are_sent_with_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Referer", "https://example.org/"))
            .and(header("X-Custom", "opaque-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut config = NetworkConfig {
            referer: Some("https://example.org/".to_string()),
            ..Default::default()
        };
        config
            .extra_headers
            .insert("X-Custom".to_string(), "opaque-token".to_string());

        let client = HttpClient::new(&config).unwrap();
        let body = client.fetch_text(&server.uri()).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[test]
    fn invalid_extra_header_name_is_a_config_error() {
        let mut config = NetworkConfig::default();
        config
            .extra_headers
            .insert("bad header name".to_string(), "v".to_string());
        let result = HttpClient::new(&config);
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
