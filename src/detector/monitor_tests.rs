use super::*;
use crate::detector::EntryKind;
use std::fs;
use std::time::Duration;

fn pdf_only() -> EntryFilter {
    EntryFilter::new(Arc::new(|ext: &str| ext == "pdf"))
}

#[test]
fn test_start_fails_for_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = DirectoryMonitor::new(dir.path().join("missing"), pdf_only());
    let err = monitor.start_monitoring().unwrap_err();
    assert!(matches!(err, AutoShelfError::WatchTarget { .. }));
    assert!(err.is_fatal());
    assert!(!monitor.is_monitoring());
}

#[test]
fn test_existing_entries_are_not_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("old.pdf"), b"x").unwrap();

    let mut monitor = DirectoryMonitor::new(dir.path(), pdf_only());
    let stream = monitor.start_monitoring().unwrap();
    assert!(stream.try_next_batch().is_none());
    assert!(monitor.rescan().is_empty());
}

#[test]
fn test_new_pdf_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = DirectoryMonitor::new(dir.path(), pdf_only());
    monitor.start_monitoring().unwrap();
    // Drive rescans by hand so the notify thread cannot race the assertions
    monitor.stop_monitoring();

    let path = dir.path().join("report.pdf");
    fs::write(&path, b"%PDF").unwrap();

    assert_eq!(
        monitor.rescan(),
        vec![ChangeEvent::Added {
            path,
            kind: EntryKind::File
        }]
    );
    assert!(monitor.rescan().is_empty(), "second rescan must be quiet");
}

#[test]
fn test_hidden_staging_directory_produces_no_events() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = DirectoryMonitor::new(dir.path(), pdf_only());
    let stream = monitor.start_monitoring().unwrap();

    let staging = dir.path().join(".tmp_download");
    fs::create_dir(&staging).unwrap();
    assert!(monitor.rescan().is_empty());
    fs::remove_dir(&staging).unwrap();
    assert!(monitor.rescan().is_empty());

    monitor.stop_monitoring();
    while let Some(batch) = stream.try_next_batch() {
        assert!(batch.is_empty(), "unexpected events: {:?}", batch);
    }
}

#[test]
fn test_partial_download_is_filtered_but_finished_file_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = DirectoryMonitor::new(dir.path(), pdf_only());
    monitor.start_monitoring().unwrap();
    monitor.stop_monitoring();

    let partial = dir.path().join("report.pdf.crdownload");
    fs::write(&partial, b"%P").unwrap();
    assert!(monitor.rescan().is_empty());

    let finished = dir.path().join("report.pdf");
    fs::rename(&partial, &finished).unwrap();
    assert_eq!(
        monitor.rescan(),
        vec![ChangeEvent::Added {
            path: finished,
            kind: EntryKind::File
        }]
    );
}

#[test]
fn test_removed_directory_is_reported_with_its_kind() {
    let dir = tempfile::tempdir().unwrap();
    let album = dir.path().join("Album");
    fs::create_dir(&album).unwrap();

    let mut monitor = DirectoryMonitor::new(dir.path(), pdf_only());
    monitor.start_monitoring().unwrap();
    monitor.stop_monitoring();

    fs::remove_dir(&album).unwrap();
    assert_eq!(
        monitor.rescan(),
        vec![ChangeEvent::Removed {
            path: album,
            kind: EntryKind::Directory
        }]
    );
}

#[test]
fn test_stop_is_idempotent_and_ends_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = DirectoryMonitor::new(dir.path(), pdf_only());
    monitor.stop_monitoring();

    let stream = monitor.start_monitoring().unwrap();
    assert!(monitor.is_monitoring());
    monitor.stop_monitoring();
    monitor.stop_monitoring();
    assert!(!monitor.is_monitoring());
    assert!(stream.is_closed());
}

#[tokio::test]
async fn test_notification_delivers_added_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = DirectoryMonitor::new(dir.path(), pdf_only());
    let stream = monitor.start_monitoring().unwrap();

    let path = dir.path().join("invoice.pdf");
    fs::write(&path, b"%PDF").unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), stream.next_batch())
        .await
        .expect("no change notification within 5s")
        .expect("stream ended early");
    assert_eq!(
        batch,
        vec![ChangeEvent::Added {
            path,
            kind: EntryKind::File
        }]
    );
}
