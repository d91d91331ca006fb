mod common;

use std::path::PathBuf;

use common::{Harness, WatcherCall};
use filesync::fs::mock::MockOp;
use filesync::sync::channel_subscriber;
use proptest::prelude::*;

/// How a subscriber goes away.
#[derive(Debug, Clone, Copy)]
enum Leave {
    Unwatch,
    Disconnect,
}

fn leave_strategy() -> impl Strategy<Value = Leave> {
    prop_oneof![Just(Leave::Unwatch), Just(Leave::Disconnect)]
}

// N subscribers join concurrently, then leave in a random order and in
// random ways. The path must be synchronized exactly once, armed exactly
// once and fully torn down at the end.
fn scenario_strategy() -> impl Strategy<Value = Vec<(usize, Leave)>> {
    (1..12usize).prop_flat_map(|n| {
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        let leaves = proptest::collection::vec(leave_strategy(), n);
        (order, leaves).prop_map(|(order, leaves)| order.into_iter().zip(leaves).collect())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_watch_refcount_returns_to_zero(scenario in scenario_strategy()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let h = Harness::new();
            let path = "shared.md";
            h.fs.add_file(path, "content");

            let mut receivers = Vec::new();
            let mut joins = Vec::new();
            for _ in 0..scenario.len() {
                let (sub, rx) = channel_subscriber();
                receivers.push(Some(rx));
                let manager = h.manager.clone();
                joins.push(tokio::spawn(async move { manager.watch(path, sub).await }));
            }
            for join in joins {
                join.await.unwrap().unwrap();
            }

            assert_eq!(h.fs.calls(MockOp::Stat, path), 1);
            assert_eq!(h.manager.subscriber_count(path), scenario.len());

            for (remaining, (index, leave)) in scenario.iter().enumerate().map(|(i, s)| (scenario.len() - i - 1, s)) {
                let rx = receivers[*index].take().unwrap();
                match leave {
                    Leave::Unwatch => {
                        assert!(h.manager.unwatch(path, rx.id()).await);
                    }
                    Leave::Disconnect => {
                        drop(rx);
                        common::with_timeout(async {
                            while h.manager.subscriber_count(path) != remaining {
                                tokio::task::yield_now().await;
                            }
                        })
                        .await;
                    }
                }
                assert_eq!(h.manager.subscriber_count(path), remaining);
            }

            h.wait_untracked(path).await;
            assert_eq!(
                h.watcher.calls(),
                vec![
                    WatcherCall::Arm(PathBuf::from(path)),
                    WatcherCall::Disarm(PathBuf::from(path)),
                ]
            );
        });
    }
}
