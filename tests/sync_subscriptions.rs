mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{Harness, TestResult, WatcherCall, init_tracing, with_timeout};
use filesync::errors::FileSyncError;
use filesync::fs::mock::MockOp;
use filesync::sync::{Subscriber, channel_subscriber};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_watches_share_one_initial_sync() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "popular.md";
    h.fs.add_file(path, "hi");

    let mut receivers = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let (sub, rx) = channel_subscriber();
        receivers.push(rx);
        let manager = h.manager.clone();
        tasks.push(tokio::spawn(async move { manager.watch(path, sub).await }));
    }
    for task in tasks {
        let snapshot = with_timeout(task).await??;
        assert_eq!(snapshot.contents(), Some("hi"));
    }

    assert_eq!(h.fs.calls(MockOp::Stat, path), 1);
    assert_eq!(h.fs.calls(MockOp::Read, path), 1);
    assert_eq!(h.manager.subscriber_count(path), 16);
    assert_eq!(h.watcher.calls(), vec![WatcherCall::Arm(PathBuf::from(path))]);

    let mut tasks = Vec::new();
    for rx in receivers.iter() {
        let manager = h.manager.clone();
        let id = rx.id();
        tasks.push(tokio::spawn(async move { manager.unwatch(path, id).await }));
    }
    for task in tasks {
        assert!(with_timeout(task).await?);
    }

    assert!(!h.manager.is_tracked(path));
    assert_eq!(
        h.watcher.calls(),
        vec![
            WatcherCall::Arm(PathBuf::from(path)),
            WatcherCall::Disarm(PathBuf::from(path)),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn every_subscriber_receives_each_change() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "team.md";
    h.fs.add_file(path, "a");

    let (alice, mut alice_rx) = channel_subscriber();
    let (bob, mut bob_rx) = channel_subscriber();
    h.manager.watch(path, alice).await?;
    h.manager.watch(path, bob).await?;

    h.fs.add_file(path, "b");
    h.manager.reconcile(path).await?;
    h.manager.write(path, "c").await?;

    for rx in [&mut alice_rx, &mut bob_rx] {
        let seen: Vec<_> = rx
            .drain()
            .into_iter()
            .filter_map(|s| s.contents().map(str::to_owned))
            .collect();
        assert_eq!(seen, vec!["b".to_string(), "c".to_string()]);
    }
    Ok(())
}

#[tokio::test]
async fn watching_twice_with_same_subscriber_is_idempotent() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "once.md";
    h.fs.add_file(path, "x");

    let (sub, rx) = channel_subscriber();
    h.manager.watch(path, sub.clone()).await?;
    let again = h.manager.watch(path, sub).await?;
    assert_eq!(again.contents(), Some("x"));
    assert_eq!(h.manager.subscriber_count(path), 1);

    assert!(h.manager.unwatch(path, rx.id()).await);
    assert!(!h.manager.unwatch(path, rx.id()).await);
    assert!(!h.manager.is_tracked(path));
    Ok(())
}

#[tokio::test]
async fn concurrent_watches_by_one_subscriber_take_one_slot() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "twice.md";
    h.fs.add_file(path, "x");

    let gate = h.fs.pause(MockOp::Read, path);
    let (sub, rx) = channel_subscriber();
    let (first, second, _) = with_timeout(async {
        tokio::join!(
            h.manager.watch(path, sub.clone()),
            h.manager.watch(path, sub.clone()),
            async {
                gate.arrived(1).await;
                gate.release();
            },
        )
    })
    .await;

    assert_eq!(first?.contents(), Some("x"));
    assert_eq!(second?.contents(), Some("x"));
    assert_eq!(h.manager.subscriber_count(path), 1);
    assert_eq!(h.fs.calls(MockOp::Read, path), 1);

    assert!(h.manager.unwatch(path, rx.id()).await);
    assert!(!h.manager.is_tracked(path));
    assert!(h.watcher.armed().is_empty());
    assert!(!h.manager.unwatch(path, rx.id()).await);
    Ok(())
}

#[tokio::test]
async fn unwatch_of_unknown_subscriber_is_ignored() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "solo.md";
    h.fs.add_file(path, "x");

    let (sub, _rx) = channel_subscriber();
    h.manager.watch(path, sub).await?;
    let (stranger, _stranger_rx) = channel_subscriber();

    assert!(!h.manager.unwatch(path, stranger.id()).await);
    assert!(!h.manager.unwatch("elsewhere.md", stranger.id()).await);
    assert_eq!(h.manager.subscriber_count(path), 1);
    assert!(h.watcher.armed().contains(&PathBuf::from(path)));
    Ok(())
}

#[tokio::test]
async fn disconnected_subscriber_is_unwatched() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "tab.md";
    h.fs.add_file(path, "x");

    let (sub, rx) = channel_subscriber();
    h.manager.watch(path, sub).await?;
    assert_eq!(h.manager.subscriber_count(path), 1);

    drop(rx);
    h.wait_untracked(path).await;
    assert!(h.watcher.armed().is_empty());
    Ok(())
}

#[tokio::test]
async fn disconnect_keeps_other_subscribers() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "tab.md";
    h.fs.add_file(path, "x");

    let (leaving, leaving_rx) = channel_subscriber();
    let (staying, mut staying_rx) = channel_subscriber();
    h.manager.watch(path, leaving).await?;
    h.manager.watch(path, staying).await?;

    drop(leaving_rx);
    with_timeout(async {
        while h.manager.subscriber_count(path) != 1 {
            tokio::task::yield_now().await;
        }
    })
    .await;

    h.manager.write(path, "y").await?;
    assert_eq!(staying_rx.recv().await.and_then(|s| s.contents().map(str::to_owned)), Some("y".to_string()));
    Ok(())
}

#[tokio::test]
async fn path_can_be_watched_again_after_teardown() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "cycle.md";
    h.fs.add_file(path, "one");

    let (sub, rx) = channel_subscriber();
    h.manager.watch(path, sub).await?;
    assert!(h.manager.unwatch(path, rx.id()).await);
    assert!(!h.manager.is_tracked(path));

    h.fs.add_file(path, "two");
    let (sub, _rx) = channel_subscriber();
    let snapshot = h.manager.watch(path, sub).await?;
    assert_eq!(snapshot.contents(), Some("two"));
    assert_eq!(h.fs.calls(MockOp::Read, path), 2);
    assert_eq!(h.watcher.calls().len(), 3);
    Ok(())
}

#[tokio::test]
async fn failed_initial_sync_releases_the_slot() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "broken.md";
    h.fs.add_file(path, "x");
    h.fs.fail(MockOp::Read, path, "io error");

    let (sub, _rx) = channel_subscriber();
    assert!(h.manager.watch(path, sub).await.is_err());
    assert!(!h.manager.is_tracked(path));
    assert!(h.watcher.armed().is_empty());

    h.fs.clear_failure(MockOp::Read, path);
    let (sub, _rx) = channel_subscriber();
    assert_eq!(h.manager.watch(path, sub).await?.contents(), Some("x"));
    Ok(())
}

#[tokio::test]
async fn watch_still_serves_when_watcher_cannot_arm() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "/mnt/odd/file.md";
    h.fs.add_file(path, "x");
    h.watcher.fail_arming(path);

    let (sub, mut rx) = channel_subscriber();
    assert_eq!(h.manager.watch(path, sub).await?.contents(), Some("x"));
    assert!(h.watcher.calls().is_empty());

    // Manual reconciliation still works.
    h.fs.add_file(path, "y");
    h.manager.notify_change(path);
    h.manager.wait_idle().await;
    assert_eq!(rx.recv().await.and_then(|s| s.contents().map(str::to_owned)), Some("y".to_string()));

    assert!(h.manager.unwatch(path, rx.id()).await);
    // Never armed, so never disarmed.
    assert!(h.watcher.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancelled_watch_gives_its_slot_back() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let path = "slow.md";
    h.fs.add_file(path, "x");

    let gate = h.fs.pause(MockOp::Read, path);
    let (sub, _rx) = channel_subscriber();
    let watch = {
        let manager = h.manager.clone();
        let sub: Arc<dyn Subscriber> = sub;
        tokio::spawn(async move { manager.watch(path, sub).await })
    };
    with_timeout(gate.arrived(1)).await;
    watch.abort();
    assert!(watch.await.is_err());

    gate.release();
    h.wait_untracked(path).await;
    assert!(h.watcher.armed().is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_disarms_and_refuses_new_work() -> TestResult {
    init_tracing();
    let h = Harness::new();
    h.fs.add_file("a.md", "a");
    h.fs.add_file("b.md", "b");

    let (sub, _rx) = channel_subscriber();
    h.manager.watch("a.md", sub.clone()).await?;
    h.manager.watch("b.md", sub.clone()).await?;

    with_timeout(h.manager.shutdown()).await;

    assert!(h.watcher.armed().is_empty());
    assert!(!h.manager.is_tracked("a.md"));
    assert!(matches!(
        h.manager.watch("a.md", sub).await,
        Err(FileSyncError::ShutDown)
    ));
    assert!(matches!(
        h.manager.write("a.md", "late").await,
        Err(FileSyncError::ShutDown)
    ));
    assert_eq!(h.fs.contents("a.md").as_deref(), Some("a"));
    Ok(())
}
