//! Per-client session multiplexer.
//!
//! One session runs for each connected observer:
//!
//! 1. **Connecting** -- register on the snapshot hub and the ping hub.
//! 2. **Streaming** -- wait on both registrations and on the client at
//!    once. A snapshot becomes an `update` frame, a heartbeat becomes a
//!    `ping` frame. Each stream keeps its own publish order; the two may
//!    interleave freely.
//! 3. **Closing** -- on client close, a failed send, hub teardown, or
//!    process shutdown, release both registrations together.
//!
//! Registrations also release themselves on drop, so a cancelled or
//! panicking session cannot leak one either.
//!
//! The session is written against [`ClientChannel`] rather than a concrete
//! socket; [`crate::ws`] adapts Axum's `WebSocket` to it.

use std::future::Future;

use tasklog_core::{PingHub, Registration, Shutdown, SnapshotHub};
use tasklog_types::ClientMessage;
use tracing::{debug, warn};

/// A send on the client channel failed; the client is gone.
#[derive(Debug, thiserror::Error)]
#[error("client channel closed: {0}")]
pub struct ChannelError(pub String);

/// Something the client sent or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// A frame this feed does not act on.
    Ignored,
    /// The client closed the connection or it dropped.
    Closed,
}

/// An established, bidirectional per-client message channel.
pub trait ClientChannel: Send {
    /// Send one text frame.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Wait for the next inbound event.
    ///
    /// Must be cancel-safe: the session drops this future whenever a hub
    /// delivers first.
    fn recv(&mut self) -> impl Future<Output = Inbound> + Send;
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    ClientClosed,
    /// A send to the client failed.
    SendFailed,
    /// A hub was torn down.
    HubClosed,
    /// The process is shutting down.
    Shutdown,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Why the session ended.
    pub end: SessionEnd,
    /// Update frames sent.
    pub updates_sent: u64,
    /// Ping frames sent.
    pub pings_sent: u64,
    /// Snapshots dropped because this client's queue was full.
    pub snapshots_lagged: u64,
}

/// Watches one registration's lag counter and warns when it grows.
struct LagWatch {
    seen: u64,
}

impl LagWatch {
    const fn new() -> Self {
        Self { seen: 0 }
    }

    fn check<T>(&mut self, registration: &Registration<T>, stream: &'static str) {
        let lagged = registration.lagged();
        if lagged > self.seen {
            warn!(
                stream,
                skipped = lagged.saturating_sub(self.seen),
                "Client lagged, values dropped"
            );
            self.seen = lagged;
        }
    }
}

/// Encode and send one frame.
async fn send_frame<C: ClientChannel>(
    channel: &mut C,
    message: &ClientMessage<'_>,
) -> Result<(), ChannelError> {
    match message.to_json() {
        Ok(json) => channel.send_text(json).await,
        Err(e) => {
            // Nothing the client can do about it; skip the frame.
            warn!(error = %e, "Failed to serialize client message");
            Ok(())
        }
    }
}

/// Run a client session until it closes.
///
/// Both hub registrations are created before the first await and released
/// before returning, whatever the exit path.
pub async fn run_session<C: ClientChannel>(
    mut channel: C,
    snapshots: &SnapshotHub,
    pings: &PingHub,
    shutdown: &Shutdown,
) -> SessionSummary {
    // Connecting
    let mut snapshot_reg = snapshots.subscribe();
    let mut ping_reg = pings.subscribe();
    debug!(
        snapshot_subscribers = snapshots.subscriber_count(),
        ping_subscribers = pings.subscriber_count(),
        "Client session started"
    );

    let mut updates_sent: u64 = 0;
    let mut pings_sent: u64 = 0;
    let mut lag = LagWatch::new();

    // Streaming
    let end = loop {
        tokio::select! {
            snapshot = snapshot_reg.recv() => {
                let Some(snapshot) = snapshot else {
                    break SessionEnd::HubClosed;
                };
                lag.check(&snapshot_reg, "snapshots");
                if send_frame(&mut channel, &ClientMessage::Update(&*snapshot)).await.is_err() {
                    debug!("Client disconnected (update send failed)");
                    break SessionEnd::SendFailed;
                }
                updates_sent = updates_sent.saturating_add(1);
            }
            beat = ping_reg.recv() => {
                if beat.is_none() {
                    break SessionEnd::HubClosed;
                }
                if send_frame(&mut channel, &ClientMessage::Ping).await.is_err() {
                    debug!("Client disconnected (ping send failed)");
                    break SessionEnd::SendFailed;
                }
                pings_sent = pings_sent.saturating_add(1);
                debug!("Ping sent");
            }
            inbound = channel.recv() => {
                if inbound == Inbound::Closed {
                    debug!("Client disconnected");
                    break SessionEnd::ClientClosed;
                }
            }
            () = shutdown.wait() => break SessionEnd::Shutdown,
        }
    };

    // Closing: neither call can fail, so both always run.
    let snapshots_lagged = snapshot_reg.lagged();
    snapshots.unsubscribe(snapshot_reg);
    pings.unsubscribe(ping_reg);

    debug!(
        ?end,
        updates_sent,
        pings_sent,
        snapshot_subscribers = snapshots.subscriber_count(),
        ping_subscribers = pings.subscriber_count(),
        "Client session closed"
    );

    SessionSummary {
        end,
        updates_sent,
        pings_sent,
        snapshots_lagged,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::Value;
    use tasklog_core::{Heartbeat, Hub};
    use tasklog_types::{CityId, CityStats, Snapshot};
    use tokio::sync::mpsc;

    use super::*;

    /// In-memory client: frames go to `sent`, dropping `close` closes it.
    struct TestChannel {
        sent: mpsc::UnboundedSender<String>,
        close: mpsc::UnboundedReceiver<()>,
        fail_sends: Arc<AtomicBool>,
    }

    struct TestClient {
        frames: mpsc::UnboundedReceiver<String>,
        close: mpsc::UnboundedSender<()>,
        fail_sends: Arc<AtomicBool>,
    }

    fn test_channel() -> (TestChannel, TestClient) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        (
            TestChannel {
                sent: sent_tx,
                close: close_rx,
                fail_sends: Arc::clone(&fail_sends),
            },
            TestClient {
                frames: sent_rx,
                close: close_tx,
                fail_sends,
            },
        )
    }

    impl ClientChannel for TestChannel {
        async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
            if self.fail_sends.load(Ordering::Acquire) {
                return Err(ChannelError("broken pipe".to_owned()));
            }
            self.sent
                .send(text)
                .map_err(|e| ChannelError(e.to_string()))
        }

        async fn recv(&mut self) -> Inbound {
            match self.close.recv().await {
                Some(()) => Inbound::Ignored,
                None => Inbound::Closed,
            }
        }
    }

    impl TestClient {
        async fn next_frame(&mut self) -> Value {
            let text = tokio::time::timeout(Duration::from_secs(1), self.frames.recv())
                .await
                .unwrap()
                .unwrap();
            serde_json::from_str(&text).unwrap()
        }
    }

    fn hubs() -> (SnapshotHub, PingHub, Arc<Shutdown>) {
        hubs_with_capacity(8)
    }

    fn hubs_with_capacity(capacity: usize) -> (SnapshotHub, PingHub, Arc<Shutdown>) {
        (
            Hub::new("snapshots", capacity),
            Hub::new("pings", capacity),
            Arc::new(Shutdown::new()),
        )
    }

    fn empty_snapshot() -> Arc<Snapshot> {
        Arc::new(Snapshot {
            date: Utc::now(),
            cities: Vec::new(),
        })
    }

    fn spawn_session(
        channel: TestChannel,
        snapshots: &SnapshotHub,
        pings: &PingHub,
        shutdown: &Arc<Shutdown>,
    ) -> tokio::task::JoinHandle<SessionSummary> {
        let snapshots = snapshots.clone();
        let pings = pings.clone();
        let shutdown = Arc::clone(shutdown);
        tokio::spawn(async move { run_session(channel, &snapshots, &pings, &shutdown).await })
    }

    async fn wait_for_subscribers(hub: &SnapshotHub, count: usize) {
        for _ in 0..100 {
            if hub.subscriber_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hub.subscriber_count(), count);
    }

    #[tokio::test]
    async fn forwards_updates_and_pings() {
        let (snapshots, pings, shutdown) = hubs();
        let (channel, mut client) = test_channel();
        let session = spawn_session(channel, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 1).await;

        let snapshot = Snapshot {
            date: Utc::now(),
            cities: vec![CityStats::new(CityId::new(1))],
        };
        snapshots.publish(Arc::new(snapshot));
        let frame = client.next_frame().await;
        assert_eq!(frame["action"], "update");
        assert_eq!(frame["data"]["cities"][0]["city_id"], 1);

        pings.publish(Heartbeat);
        let frame = client.next_frame().await;
        assert_eq!(frame, serde_json::json!({ "action": "ping" }));

        drop(client.close);
        let summary = session.await.unwrap();
        assert_eq!(summary.end, SessionEnd::ClientClosed);
        assert_eq!(summary.updates_sent, 1);
        assert_eq!(summary.pings_sent, 1);
    }

    #[tokio::test]
    async fn disconnect_releases_both_registrations() {
        let (snapshots, pings, shutdown) = hubs();
        let (channel, client) = test_channel();
        let session = spawn_session(channel, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 1).await;
        assert_eq!(pings.subscriber_count(), 1);

        drop(client.close);
        session.await.unwrap();

        assert_eq!(snapshots.subscriber_count(), 0);
        assert_eq!(pings.subscriber_count(), 0);
        assert_eq!(snapshots.publish(empty_snapshot()), 0);
        assert_eq!(pings.publish(Heartbeat), 0);
    }

    #[tokio::test]
    async fn send_failure_on_ping_releases_both_registrations() {
        let (snapshots, pings, shutdown) = hubs();
        let (channel, client) = test_channel();
        let session = spawn_session(channel, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 1).await;

        client.fail_sends.store(true, Ordering::Release);
        pings.publish(Heartbeat);

        let summary = session.await.unwrap();
        assert_eq!(summary.end, SessionEnd::SendFailed);
        assert_eq!(snapshots.subscriber_count(), 0);
        assert_eq!(pings.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn send_failure_on_update_releases_both_registrations() {
        let (snapshots, pings, shutdown) = hubs();
        let (channel, client) = test_channel();
        let session = spawn_session(channel, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 1).await;

        client.fail_sends.store(true, Ordering::Release);
        snapshots.publish(empty_snapshot());

        let summary = session.await.unwrap();
        assert_eq!(summary.end, SessionEnd::SendFailed);
        assert_eq!(summary.updates_sent, 0);
        assert_eq!(snapshots.subscriber_count(), 0);
        assert_eq!(pings.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_is_counted_as_lag() {
        let (snapshots, pings, shutdown) = hubs_with_capacity(1);
        let (channel, mut client) = test_channel();
        let session = spawn_session(channel, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 1).await;

        // No await between publishes: the session cannot drain in between,
        // so only the first fits in its queue.
        assert_eq!(snapshots.publish(empty_snapshot()), 1);
        assert_eq!(snapshots.publish(empty_snapshot()), 0);
        assert_eq!(snapshots.publish(empty_snapshot()), 0);

        assert_eq!(client.next_frame().await["action"], "update");

        drop(client.close);
        let summary = session.await.unwrap();
        assert_eq!(summary.end, SessionEnd::ClientClosed);
        assert_eq!(summary.updates_sent, 1);
        assert_eq!(summary.snapshots_lagged, 2);
    }

    #[tokio::test]
    async fn shutdown_ends_session() {
        let (snapshots, pings, shutdown) = hubs();
        let (channel, _client) = test_channel();
        let session = spawn_session(channel, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 1).await;

        shutdown.trigger();

        let summary = session.await.unwrap();
        assert_eq!(summary.end, SessionEnd::Shutdown);
        assert_eq!(pings.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn aborted_session_leaks_nothing() {
        let (snapshots, pings, shutdown) = hubs();
        let (channel, _client) = test_channel();
        let session = spawn_session(channel, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 1).await;

        session.abort();
        assert!(session.await.unwrap_err().is_cancelled());

        assert_eq!(snapshots.subscriber_count(), 0);
        assert_eq!(pings.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn one_closing_client_does_not_disturb_another() {
        let (snapshots, pings, shutdown) = hubs();
        let (first, first_client) = test_channel();
        let (second, mut second_client) = test_channel();
        let first_session = spawn_session(first, &snapshots, &pings, &shutdown);
        let _second_session = spawn_session(second, &snapshots, &pings, &shutdown);
        wait_for_subscribers(&snapshots, 2).await;

        drop(first_client.close);
        first_session.await.unwrap();
        wait_for_subscribers(&snapshots, 1).await;

        pings.publish(Heartbeat);
        assert_eq!(second_client.next_frame().await["action"], "ping");
    }
}
