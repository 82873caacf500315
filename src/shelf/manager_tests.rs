use super::*;
use crate::shelf::fake::{FakePlatform, FakeWindow};
use tokio::task::LocalSet;

fn settings(auto_close_secs: u64) -> ShelfSettings {
    ShelfSettings {
        auto_close: Duration::from_secs(auto_close_secs),
        settle_delay: Duration::from_millis(100),
        service_name: "Send to Dropshelf".to_string(),
    }
}

/// Let spawned local tasks observe the latest channel messages
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_new_file_is_handed_off_tracked_and_auto_closed() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));
            let path = PathBuf::from("/Users/me/Downloads/report.pdf");

            let id = manager.add_item(&path).await.unwrap();

            {
                let state = platform.state.borrow();
                assert_eq!(state.hand_offs.len(), 1);
                assert_eq!(state.hand_offs[0].0, vec![path.clone()]);
                assert_eq!(state.hand_offs[0].1, "Send to Dropshelf");
                assert_eq!(state.observed, vec![FakeWindow(100)]);
            }

            let shelves = manager.shelves();
            assert_eq!(shelves.len(), 1);
            assert_eq!(shelves[0].id, id);
            assert_eq!(shelves[0].file_name, "report.pdf");

            tokio::time::sleep(Duration::from_secs(29)).await;
            assert_eq!(manager.count(), 1, "closed before the timeout");

            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(manager.count(), 0);
            assert_eq!(platform.state.borrow().pressed, vec![FakeWindow(100)]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_destruction_before_timeout_removes_immediately() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));

            manager
                .add_item(Path::new("/tmp/photo.png"))
                .await
                .unwrap();
            platform.destroy(FakeWindow(100));
            settle().await;
            assert_eq!(manager.count(), 0);

            // The timer still fires but has nothing left to do
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert!(platform.state.borrow().pressed.is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_explicit_remove_makes_timeout_a_no_op() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(10));
            let path = PathBuf::from("/tmp/archive.zip");

            manager.add_item(&path).await.unwrap();
            assert_eq!(manager.remove_item(&path), 1);
            assert_eq!(manager.count(), 0);
            assert_eq!(manager.remove_item(&path), 0);

            tokio::time::sleep(Duration::from_secs(20)).await;
            assert_eq!(platform.state.borrow().pressed.len(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_close_all_empties_the_roster() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));

            manager.add_item(Path::new("/tmp/a.pdf")).await.unwrap();
            manager.add_item(Path::new("/tmp/b.pdf")).await.unwrap();
            assert_eq!(manager.count(), 2);

            assert_eq!(manager.close_all(), 2);
            assert_eq!(manager.count(), 0);
            assert_eq!(manager.close_all(), 0);

            tokio::time::sleep(Duration::from_secs(60)).await;
            assert_eq!(platform.state.borrow().pressed.len(), 2);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_hand_off_tracks_nothing() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            platform.state.borrow_mut().fail_hand_off = true;
            let manager = ShelfManager::new(platform.clone(), settings(30));

            let err = manager
                .add_item(Path::new("/tmp/report.pdf"))
                .await
                .unwrap_err();
            assert!(matches!(err, AutoShelfError::HandOff { .. }));
            assert!(!err.is_fatal());
            assert_eq!(manager.count(), 0);
            assert!(platform.state.borrow().observed.is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_no_new_window_is_a_recoverable_failure() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            platform.state.borrow_mut().open_window_on_hand_off = false;
            let manager = ShelfManager::new(platform.clone(), settings(30));

            let err = manager
                .add_item(Path::new("/tmp/report.pdf"))
                .await
                .unwrap_err();
            assert!(matches!(err, AutoShelfError::NoNewWindow { .. }));
            assert_eq!(manager.count(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_same_window_is_never_tracked_twice() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));

            manager.add_item(Path::new("/tmp/a.pdf")).await.unwrap();

            // The shelf app reuses the existing window instead of opening one
            platform.state.borrow_mut().open_window_on_hand_off = false;
            let err = manager.add_item(Path::new("/tmp/b.pdf")).await.unwrap_err();
            assert!(matches!(err, AutoShelfError::NoNewWindow { .. }));
            assert_eq!(manager.count(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_adds_each_get_their_own_window() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));

            let first_path = PathBuf::from("/tmp/a.pdf");
            let second_path = PathBuf::from("/tmp/b.pdf");
            let (first, second) =
                tokio::join!(manager.add_item(&first_path), manager.add_item(&second_path));
            first.unwrap();
            second.unwrap();

            let shelves = manager.shelves();
            assert_eq!(shelves.len(), 2);
            assert_ne!(shelves[0].id, shelves[1].id);
            assert_eq!(platform.state.borrow().observed.len(), 2);
            assert_ne!(
                platform.state.borrow().observed[0],
                platform.state.borrow().observed[1]
            );
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_close_control_still_removes_shelf() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            platform.state.borrow_mut().missing_close_control = true;
            let manager = ShelfManager::new(platform.clone(), settings(5));

            manager.add_item(Path::new("/tmp/a.pdf")).await.unwrap();
            tokio::time::sleep(Duration::from_secs(6)).await;
            assert_eq!(manager.count(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_roster_changes() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));
            let mut rx = manager.subscribe();
            assert!(rx.borrow().is_empty());

            manager.add_item(Path::new("/tmp/a.pdf")).await.unwrap();
            assert!(rx.has_changed().unwrap());
            assert_eq!(rx.borrow_and_update().len(), 1);

            manager.close_all();
            assert!(rx.has_changed().unwrap());
            assert!(rx.borrow_and_update().is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_updated_settings_apply_to_next_item() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));
            manager.update_settings(ShelfSettings {
                service_name: "Send to Yoink".to_string(),
                ..settings(5)
            });

            manager.add_item(Path::new("/tmp/a.pdf")).await.unwrap();
            assert_eq!(platform.state.borrow().hand_offs[0].1, "Send to Yoink");

            tokio::time::sleep(Duration::from_secs(6)).await;
            assert_eq!(manager.count(), 0);
        })
        .await;
}

#[test]
fn test_settings_follow_preferences() {
    let prefs = Preferences {
        auto_close_duration_seconds: Some(12.0),
        shelf_service_name: Some("Send to Yoink".to_string()),
        ..Default::default()
    };
    let settings = ShelfSettings::from_preferences(&prefs);
    assert_eq!(settings.auto_close, Duration::from_secs(12));
    assert_eq!(settings.service_name, "Send to Yoink");
}

#[tokio::test(start_paused = true)]
async fn test_removal_during_settle_delay_closes_window_untracked() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));
            let path = PathBuf::from("/Users/me/Downloads/report.pdf");

            let adding = {
                let manager = manager.clone();
                let path = path.clone();
                tokio::task::spawn_local(async move { manager.add_item(&path).await })
            };
            // Hand-off happened, the settle delay is still running
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(platform.state.borrow().hand_offs.len(), 1);

            assert_eq!(manager.remove_item(&path), 0);

            let err = adding.await.unwrap().unwrap_err();
            assert!(matches!(err, AutoShelfError::ItemRemoved { .. }));
            assert!(!err.is_fatal());
            assert_eq!(manager.count(), 0);

            let state = platform.state.borrow();
            assert_eq!(state.pressed, vec![FakeWindow(100)]);
            assert!(state.windows.is_empty());
            assert!(state.observed.is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_removal_while_queued_skips_hand_off() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));
            let first = PathBuf::from("/tmp/a.pdf");
            let second = PathBuf::from("/tmp/b.pdf");

            let (a, b) = {
                let (m1, m2) = (manager.clone(), manager.clone());
                let (p1, p2) = (first.clone(), second.clone());
                (
                    tokio::task::spawn_local(async move { m1.add_item(&p1).await }),
                    tokio::task::spawn_local(async move { m2.add_item(&p2).await }),
                )
            };
            tokio::time::sleep(Duration::from_millis(10)).await;
            manager.remove_item(&second);

            assert!(a.await.unwrap().is_ok());
            assert!(matches!(
                b.await.unwrap(),
                Err(AutoShelfError::ItemRemoved { .. })
            ));

            let state = platform.state.borrow();
            assert_eq!(state.hand_offs.len(), 1, "queued request still handed off");
            assert_eq!(state.hand_offs[0].0, vec![first.clone()]);
            drop(state);
            assert_eq!(manager.shelves()[0].path, first);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_removal_after_tracking_does_not_cancel_later_request() {
    LocalSet::new()
        .run_until(async {
            let platform = FakePlatform::new();
            let manager = ShelfManager::new(platform.clone(), settings(30));
            let path = PathBuf::from("/tmp/a.pdf");

            manager.add_item(&path).await.unwrap();
            assert_eq!(manager.remove_item(&path), 1);

            // The same name downloaded again gets a fresh shelf
            manager.add_item(&path).await.unwrap();
            assert_eq!(manager.count(), 1);
        })
        .await;
}
