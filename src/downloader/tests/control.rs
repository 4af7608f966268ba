use super::*;
use crate::error::{Error, TaskError};

#[tokio::test]
async fn operations_on_unknown_task_return_not_found() {
    let (downloader, _temp) = create_test_downloader(3).await;
    let bogus = crate::types::TaskId::new(999);

    assert!(matches!(
        downloader.start(bogus).await,
        Err(Error::Task(TaskError::NotFound { id: 999 }))
    ));
    assert!(matches!(
        downloader.pause(bogus).await,
        Err(Error::Task(TaskError::NotFound { .. }))
    ));
    assert!(matches!(
        downloader.cancel(bogus).await,
        Err(Error::Task(TaskError::NotFound { .. }))
    ));
    assert!(downloader.get_task_info(bogus).await.is_err());
}

#[tokio::test]
async fn pause_is_invalid_for_a_waiting_task() {
    let server = MockServer::start().await;
    mount_gallery(&server, 1, "Busy", &[1, 2, 3], Duration::from_millis(300)).await;
    mount_gallery(&server, 2, "Queued", &[1], Duration::ZERO).await;

    let (downloader, _temp) = create_test_downloader(1).await;
    let first = downloader.add(gallery_url(&server, 1)).await.unwrap();
    let second = downloader.add(gallery_url(&server, 2)).await.unwrap();

    wait_for_state(&downloader, first, TaskState::Running).await;

    // The slot is taken: the second task sits in Waiting, where pause is a no-op
    let err = downloader.pause(second).await.unwrap_err();
    assert!(
        matches!(err, Error::Task(TaskError::InvalidState { .. })),
        "expected InvalidState, got {err}"
    );

    downloader.cancel(first).await.unwrap();
    wait_terminal(&downloader, first).await;
    wait_terminal(&downloader, second).await;
}

#[tokio::test]
async fn cancel_from_waiting_is_immediate_and_final() {
    let server = MockServer::start().await;
    mount_gallery(&server, 1, "Busy", &[1, 2, 3], Duration::from_millis(300)).await;
    mount_gallery(&server, 2, "Doomed", &[1], Duration::ZERO).await;

    let (downloader, _temp) = create_test_downloader(1).await;
    let first = downloader.add(gallery_url(&server, 1)).await.unwrap();
    let second = downloader.add(gallery_url(&server, 2)).await.unwrap();

    wait_for_state(&downloader, first, TaskState::Running).await;

    downloader.cancel(second).await.unwrap();
    let info = downloader.get_task_info(second).await.unwrap();
    assert_eq!(
        info.state,
        TaskState::Cancelled,
        "a Waiting task has no worker and cancels immediately"
    );

    // Terminal: every further operation is rejected
    assert!(downloader.cancel(second).await.is_err());
    assert!(downloader.start(second).await.is_err());
    assert_eq!(
        downloader.get_task_info(second).await.unwrap().state,
        TaskState::Cancelled,
        "rejected operations must leave the state unchanged"
    );

    downloader.cancel(first).await.unwrap();
    wait_terminal(&downloader, first).await;
}

#[tokio::test]
async fn cancel_running_task_reaches_cancelled_and_flushes_ledger() {
    let server = MockServer::start().await;
    let indices: Vec<u32> = (1..=12).collect();
    mount_gallery(&server, 1, "Long Gallery", &indices, Duration::from_millis(200)).await;

    let (downloader, temp) = create_test_downloader(1).await;
    let id = downloader.add(gallery_url(&server, 1)).await.unwrap();

    // With 12 items, 3 workers, and 200ms per payload, the run takes ~800ms;
    // cancelling at ~250ms lands while later items are still pending
    wait_for_state(&downloader, id, TaskState::Running).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    downloader.cancel(id).await.unwrap();
    let final_state = wait_terminal(&downloader, id).await;
    assert_eq!(final_state, TaskState::Cancelled);

    // The ledger must be produced even on cancellation
    let ledger_path = temp.path().join("Long Gallery").join(crate::ledger::LEDGER_FILE_NAME);
    let ledger = crate::ledger::TaskLedger::load(&ledger_path).await.unwrap();
    assert_eq!(ledger.total, 12);
    assert!(
        ledger.statuses.values().any(|e| e.status == crate::types::ItemStatus::Pending),
        "items not reached before the checkpoint stay pending for a later resume"
    );
}

#[tokio::test]
async fn pause_then_resume_completes_the_gallery() {
    let server = MockServer::start().await;
    let indices: Vec<u32> = (1..=8).collect();
    mount_gallery(&server, 1, "Pausable", &indices, Duration::from_millis(150)).await;

    let (downloader, temp) = create_test_downloader(1).await;
    let id = downloader.add(gallery_url(&server, 1)).await.unwrap();

    // 8 items / 3 workers / 150ms per payload: the run takes ~450ms, so a
    // pause at ~170ms lands while later items are still ahead of their
    // checkpoints
    wait_for_state(&downloader, id, TaskState::Running).await;
    tokio::time::sleep(Duration::from_millis(170)).await;

    downloader.pause(id).await.unwrap();
    assert_eq!(
        downloader.get_task_info(id).await.unwrap().state,
        TaskState::Paused
    );

    // Pausing twice is invalid
    assert!(downloader.pause(id).await.is_err());

    downloader.start(id).await.unwrap();
    wait_for_state(&downloader, id, TaskState::Completed).await;

    let gallery_dir = temp.path().join("Pausable");
    for i in 1..=8 {
        assert!(
            gallery_dir.join(format!("{i}.jpg")).exists(),
            "item {i} missing after pause/resume"
        );
    }
}

#[tokio::test]
async fn remove_rejects_running_tasks_and_removes_others() {
    let server = MockServer::start().await;
    mount_gallery(&server, 1, "Running One", &[1, 2, 3], Duration::from_millis(300)).await;
    mount_gallery(&server, 2, "Waiting One", &[1], Duration::ZERO).await;

    let (downloader, _temp) = create_test_downloader(1).await;
    let first = downloader.add(gallery_url(&server, 1)).await.unwrap();
    let second = downloader.add(gallery_url(&server, 2)).await.unwrap();

    wait_for_state(&downloader, first, TaskState::Running).await;

    let err = downloader.remove(first).await.unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::StillRunning { .. })));

    // Waiting tasks are cancelled first, then deleted from the registry
    downloader.remove(second).await.unwrap();
    assert!(matches!(
        downloader.get_task_info(second).await,
        Err(Error::Task(TaskError::NotFound { .. }))
    ));
    assert_eq!(downloader.list_tasks().await.len(), 1);

    downloader.cancel(first).await.unwrap();
    wait_terminal(&downloader, first).await;
    downloader.remove(first).await.unwrap();
    assert!(downloader.list_tasks().await.is_empty());
}

#[tokio::test]
async fn clear_finished_removes_only_terminal_tasks() {
    let server = MockServer::start().await;
    mount_gallery(&server, 1, "Quick", &[1], Duration::ZERO).await;
    mount_gallery(&server, 2, "Slow", &[1, 2, 3], Duration::from_millis(300)).await;

    let (downloader, _temp) = create_test_downloader(2).await;
    let quick = downloader.add(gallery_url(&server, 1)).await.unwrap();
    let slow = downloader.add(gallery_url(&server, 2)).await.unwrap();

    wait_for_state(&downloader, quick, TaskState::Completed).await;

    let removed = downloader.clear_finished().await.unwrap();
    assert_eq!(removed, 1, "only the completed task is cleared");
    assert!(downloader.get_task_info(quick).await.is_err());
    assert!(downloader.get_task_info(slow).await.is_ok());

    downloader.cancel(slow).await.unwrap();
    wait_terminal(&downloader, slow).await;
}

#[tokio::test]
async fn discovery_failure_marks_the_task_failed() {
    let server = MockServer::start().await;
    // No listing mounted: the listing fetch 404s

    let (downloader, _temp) = create_test_downloader(1).await;
    let id = downloader.add(gallery_url(&server, 7)).await.unwrap();

    let final_state = wait_terminal(&downloader, id).await;
    assert_eq!(final_state, TaskState::Failed);

    let info = downloader.get_task_info(id).await.unwrap();
    assert!(
        info.message.contains("Discovery failed"),
        "message should explain the failure, got: {}",
        info.message
    );

    // Terminal: start is rejected
    assert!(downloader.start(id).await.is_err());
}
