use super::*;
use crate::config::RetryConfig;
use crate::types::TaskState;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod control;
mod resume;

/// Build a downloader writing into a fresh temp directory.
///
/// External tools are disabled so the conversion/archive collaborators are
/// deterministic no-ops regardless of the host system.
pub(crate) async fn create_test_downloader(limit: usize) -> (GalleryDownloader, tempfile::TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.output_dir = temp.path().to_path_buf();
    config.download.max_concurrent_tasks = limit;
    config.download.page_delay = Duration::ZERO;
    config.retry = RetryConfig {
        max_retries: 1,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_secs(1),
        jitter: false,
    };
    config.conversion.search_path = false;
    config.archive.search_path = false;

    let downloader = GalleryDownloader::new(config).await.unwrap();
    (downloader, temp)
}

/// Listing URL for a mounted gallery
pub(crate) fn gallery_url(server: &MockServer, gid: u32) -> String {
    format!("{}/g/{gid}/tok/", server.uri())
}

/// Mount a complete gallery: listing page, item pages, and payloads.
///
/// Payload responses are delayed by `payload_delay` so tests can observe
/// tasks while they are Running.
pub(crate) async fn mount_gallery(
    server: &MockServer,
    gid: u32,
    title: &str,
    indices: &[u32],
    payload_delay: Duration,
) {
    let host = server.address().to_string();

    let links: String = indices
        .iter()
        .map(|i| format!(r#"<a href="http://{host}/s/abc123/{gid}-{i}">page {i}</a>"#))
        .collect();
    let listing = format!(
        "<html><head><title>{title}</title></head><body>{links}</body></html>"
    );
    Mock::given(method("GET"))
        .and(path(format!("/g/{gid}/tok/")))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing))
        .mount(server)
        .await;

    for i in indices {
        let item_page = format!(
            r#"<html><body><img id="img" src="http://{host}/img/{gid}/{i}.jpg"></body></html>"#
        );
        Mock::given(method("GET"))
            .and(path(format!("/s/abc123/{gid}-{i}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(item_page))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/img/{gid}/{i}.jpg")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![*i as u8; 64])
                    .set_delay(payload_delay),
            )
            .mount(server)
            .await;
    }
}

/// Poll until the task reaches `expected`, panicking after 10 seconds.
pub(crate) async fn wait_for_state(
    downloader: &GalleryDownloader,
    id: crate::types::TaskId,
    expected: TaskState,
) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let info = downloader.get_task_info(id).await.unwrap();
        if info.state == expected {
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "task {id} never reached {expected:?}, stuck at {:?} ({})",
            info.state,
            info.message
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the task reaches any terminal state, returning it.
pub(crate) async fn wait_terminal(
    downloader: &GalleryDownloader,
    id: crate::types::TaskId,
) -> TaskState {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let info = downloader.get_task_info(id).await.unwrap();
        if info.state.is_terminal() {
            return info.state;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "task {id} never reached a terminal state, stuck at {:?}",
            info.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
