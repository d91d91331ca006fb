// src/sync/subscriber.rs

//! Subscriber handles.
//!
//! The engine only needs three things from a subscriber: a stable identity,
//! a way to push a snapshot, and a future that resolves when the subscriber
//! goes away. The transport behind it (IPC, WebSocket, in-process channel)
//! is the implementor's business.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::types::{FileSnapshot, SubscriberId};

/// Future returned by [`Subscriber::closed`].
pub type ClosedFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

pub trait Subscriber: Send + Sync + fmt::Debug {
    fn id(&self) -> SubscriberId;

    /// Deliver a change. Must not block.
    fn notify(&self, snapshot: &FileSnapshot);

    /// Resolves once the subscriber has disconnected. The engine then
    /// unwatches every path this subscriber was registered for.
    fn closed(&self) -> ClosedFuture<'_>;
}

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique subscriber id.
pub fn next_subscriber_id() -> SubscriberId {
    SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
}

/// In-process subscriber backed by an unbounded Tokio channel.
#[derive(Debug)]
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<FileSnapshot>,
}

/// Receiving half of a [`ChannelSubscriber`].
///
/// Dropping it, or calling [`SubscriberReceiver::close`], disconnects the
/// subscriber.
#[derive(Debug)]
pub struct SubscriberReceiver {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<FileSnapshot>,
}

/// Create a connected subscriber/receiver pair.
pub fn channel_subscriber() -> (Arc<ChannelSubscriber>, SubscriberReceiver) {
    let id = next_subscriber_id();
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(ChannelSubscriber { id, tx }),
        SubscriberReceiver { id, rx },
    )
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn notify(&self, snapshot: &FileSnapshot) {
        // A closed receiver is handled by `closed()`; nothing to do here.
        let _ = self.tx.send(snapshot.clone());
    }

    fn closed(&self) -> ClosedFuture<'_> {
        Box::pin(self.tx.closed())
    }
}

impl SubscriberReceiver {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<FileSnapshot> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FileSnapshot> {
        self.rx.try_recv().ok()
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<FileSnapshot> {
        let mut out = Vec::new();
        while let Ok(snapshot) = self.rx.try_recv() {
            out.push(snapshot);
        }
        out
    }

    /// Disconnect while keeping already-delivered snapshots readable.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn closed_resolves_when_receiver_is_dropped() {
        let (sub, rx) = channel_subscriber();
        assert_eq!(sub.id(), rx.id());

        let waiter = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move { sub.closed().await })
        };
        drop(rx);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn notifications_arrive_in_order() {
        let (sub, mut rx) = channel_subscriber();
        sub.notify(&FileSnapshot::missing("a.md"));
        sub.notify(&FileSnapshot::missing("b.md"));

        let paths: Vec<std::path::PathBuf> = rx.drain().into_iter().map(|s| s.path).collect();
        let expected: Vec<std::path::PathBuf> = vec!["a.md".into(), "b.md".into()];
        assert_eq!(paths, expected);
    }

    #[test]
    fn ids_are_unique() {
        let (a, _ra) = channel_subscriber();
        let (b, _rb) = channel_subscriber();
        assert_ne!(a.id(), b.id());
    }
}
