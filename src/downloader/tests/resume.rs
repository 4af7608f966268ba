use super::*;
use crate::ledger::{LEDGER_FILE_NAME, TaskLedger};
use crate::types::ItemStatus;

/// Write a ledger file describing a partially-downloaded gallery whose item
/// pages live on `server`.
fn write_ledger(dir: &std::path::Path, server: &MockServer, entries: &[(u32, &str)]) {
    let host = server.address().to_string();
    let statuses: String = entries
        .iter()
        .map(|(i, status)| format!("{i} = http://{host}/s/abc123/8-{i} | {status}\n"))
        .collect();
    let failed: String = entries
        .iter()
        .filter(|(_, status)| status.starts_with("failed"))
        .enumerate()
        .map(|(n, (i, _))| format!("Link{} = http://{host}/s/abc123/8-{i}\n", n + 1))
        .collect();
    let failed_section = if failed.is_empty() {
        String::new()
    } else {
        format!("[FailedLinks]\n{failed}\n")
    };
    let content = format!(
        "[Gallery]\n\
         Title = Resumed Gallery\n\
         URL = http://{host}/g/8/tok/\n\
         DownloadTime = 2024-05-01 09:00:00\n\
         TotalImages = {}\n\
         Downloaded = 0\n\
         Skipped = 0\n\
         Failed = 0\n\n\
         {failed_section}\
         [ImageStatus]\n{statuses}",
        entries.len()
    );
    std::fs::write(dir.join(LEDGER_FILE_NAME), content).unwrap();
}

/// Mount one item (page + payload) of gallery 8.
async fn mount_item(server: &MockServer, index: u32, expected_fetches: u64) {
    let host = server.address().to_string();
    let item_page = format!(
        r#"<html><body><img id="img" src="http://{host}/img/8/{index}.jpg"></body></html>"#
    );
    Mock::given(method("GET"))
        .and(path(format!("/s/abc123/8-{index}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(item_page))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/img/8/{index}.jpg")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![index as u8; 24]))
        .expect(expected_fetches)
        .mount(server)
        .await;
}

#[tokio::test]
async fn resume_refetches_exactly_the_failed_and_pending_items() {
    let server = MockServer::start().await;
    let gallery_dir = tempfile::tempdir().unwrap();

    // Item 1 succeeded previously; 2 failed; 3 never ran
    write_ledger(
        gallery_dir.path(),
        &server,
        &[(1, "success"), (2, "failed: timeout"), (3, "pending")],
    );
    // Only items 2 and 3 may be fetched; item 1's pages are not even mounted,
    // so any request for it would fail the final count assertions
    mount_item(&server, 2, 1).await;
    mount_item(&server, 3, 1).await;

    let (downloader, _temp) = create_test_downloader(1).await;
    let id = downloader
        .resume(gallery_dir.path().join(LEDGER_FILE_NAME))
        .await
        .unwrap()
        .expect("incomplete ledger must produce a task");

    wait_for_state(&downloader, id, TaskState::Completed).await;

    let info = downloader.get_task_info(id).await.unwrap();
    assert_eq!(info.title.as_deref(), Some("Resumed Gallery"));
    assert_eq!(info.total, 2, "the task only owes the failed + pending items");

    assert!(gallery_dir.path().join("2.jpg").exists());
    assert!(gallery_dir.path().join("3.jpg").exists());

    // The rewritten ledger merges the old and new outcomes, with counts
    // recomputed from the full status map
    let ledger = TaskLedger::load(&gallery_dir.path().join(LEDGER_FILE_NAME))
        .await
        .unwrap();
    assert_eq!(ledger.total, 3);
    assert_eq!(ledger.downloaded, 3, "1 previous success + 2 resumed");
    assert_eq!(ledger.failed, 0);
    assert!(ledger.failed_links.is_empty());
    assert_eq!(ledger.statuses[&1].status, ItemStatus::Success);
    assert_eq!(ledger.statuses[&2].status, ItemStatus::Success);
    assert_eq!(ledger.statuses[&3].status, ItemStatus::Success);
}

#[tokio::test]
async fn resume_on_a_complete_ledger_is_a_noop() {
    let server = MockServer::start().await;
    let gallery_dir = tempfile::tempdir().unwrap();
    write_ledger(
        gallery_dir.path(),
        &server,
        &[(1, "success"), (2, "skipped")],
    );

    let (downloader, _temp) = create_test_downloader(1).await;
    let result = downloader
        .resume(gallery_dir.path().join(LEDGER_FILE_NAME))
        .await
        .unwrap();

    assert!(result.is_none(), "complete ledger must not create a task");
    assert!(downloader.list_tasks().await.is_empty());
}

#[tokio::test]
async fn resume_skips_items_already_materialized_on_disk() {
    let server = MockServer::start().await;
    let gallery_dir = tempfile::tempdir().unwrap();

    // Recorded pending, but the artifact is already on disk — the
    // idempotency check must skip it without touching the network
    write_ledger(gallery_dir.path(), &server, &[(1, "pending")]);
    std::fs::write(gallery_dir.path().join("1.webp"), b"already here").unwrap();

    let (downloader, _temp) = create_test_downloader(1).await;
    let id = downloader
        .resume(gallery_dir.path().join(LEDGER_FILE_NAME))
        .await
        .unwrap()
        .unwrap();

    wait_for_state(&downloader, id, TaskState::Completed).await;

    let ledger = TaskLedger::load(&gallery_dir.path().join(LEDGER_FILE_NAME))
        .await
        .unwrap();
    assert_eq!(ledger.skipped, 1);
    assert_eq!(ledger.downloaded, 0);
}

#[tokio::test]
async fn resume_includes_failed_links_missing_from_the_status_map() {
    let server = MockServer::start().await;
    let host = server.address().to_string();
    let gallery_dir = tempfile::tempdir().unwrap();

    // Item 5 appears only in [FailedLinks], not in [ImageStatus]
    let content = format!(
        "[Gallery]\n\
         Title = Orphan Links\n\
         URL = http://{host}/g/8/tok/\n\
         TotalImages = 2\n\
         Downloaded = 1\n\
         Skipped = 0\n\
         Failed = 1\n\n\
         [FailedLinks]\n\
         Link1 = http://{host}/s/abc123/8-5\n\n\
         [ImageStatus]\n\
         1 = http://{host}/s/abc123/8-1 | success\n"
    );
    std::fs::write(gallery_dir.path().join(LEDGER_FILE_NAME), content).unwrap();
    mount_item(&server, 5, 1).await;

    let (downloader, _temp) = create_test_downloader(1).await;
    let id = downloader
        .resume(gallery_dir.path().join(LEDGER_FILE_NAME))
        .await
        .unwrap()
        .unwrap();

    wait_for_state(&downloader, id, TaskState::Completed).await;

    assert!(gallery_dir.path().join("5.jpg").exists());
    let ledger = TaskLedger::load(&gallery_dir.path().join(LEDGER_FILE_NAME))
        .await
        .unwrap();
    assert_eq!(ledger.statuses[&5].status, ItemStatus::Success);
    assert_eq!(ledger.total, 2, "orphan link joins the status map on rewrite");
    assert_eq!(ledger.downloaded, 2);
    assert_eq!(ledger.failed, 0);
}

#[tokio::test]
async fn resume_with_missing_ledger_file_errors() {
    let (downloader, _temp) = create_test_downloader(1).await;
    let result = downloader.resume("/nonexistent/task_info.ini").await;
    assert!(result.is_err());
}
