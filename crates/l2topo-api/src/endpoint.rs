// ── Endpoint abstraction ──
//
// One endpoint per physical device. A started endpoint publishes into two
// single-slot `watch` channels: the latest snapshot and the latest error.
// An unread value is overwritten by the next one; only the newest state per
// device matters downstream. Dropping the senders closes both streams.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::Error;
use crate::lldp::Snapshot;

/// Receiving half of a device's snapshot slot.
pub type SnapshotSlot = watch::Receiver<Option<Arc<Snapshot>>>;

/// Receiving half of a device's error slot.
pub type ErrorSlot = watch::Receiver<Option<Arc<Error>>>;

/// A source of LLDP snapshots for a single device.
///
/// Implementations own their transport, addressing and credentials; the
/// consumer only ever sees the two output streams.
pub trait Endpoint: Send {
    /// Stable label for this device, used as its key and in logs.
    fn name(&self) -> &str;

    /// Spawn the polling worker and hand out its output streams.
    ///
    /// Fails with [`Error::AlreadyStarted`] if called twice.
    fn start(&mut self) -> Result<EndpointStreams, Error>;

    /// Ask the worker to terminate. The worker closes both streams once it
    /// observes the request. Calling this more than once is harmless.
    fn stop(&mut self);
}

/// The two independently closable output streams of a started endpoint.
pub struct EndpointStreams {
    pub snapshots: SnapshotSlot,
    pub errors: ErrorSlot,
}

/// One item of a device's merged output.
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    Snapshot(Arc<Snapshot>),
    Error(Arc<Error>),
    /// Both streams have closed; nothing more will arrive.
    Closed,
}

/// Boxed stream of [`EndpointEvent`]s, always terminated by `Closed`.
pub type EndpointEvents = Pin<Box<dyn Stream<Item = EndpointEvent> + Send>>;

impl EndpointStreams {
    /// Merge both slots into one event stream.
    ///
    /// Only values published after the slots were created are yielded.
    /// The stream ends with a single [`EndpointEvent::Closed`] once both
    /// senders are gone.
    pub fn into_events(self) -> EndpointEvents {
        let snapshots = WatchStream::from_changes(self.snapshots)
            .filter_map(|slot| slot.map(EndpointEvent::Snapshot));
        let errors =
            WatchStream::from_changes(self.errors).filter_map(|slot| slot.map(EndpointEvent::Error));

        Box::pin(
            snapshots
                .merge(errors)
                .chain(tokio_stream::once(EndpointEvent::Closed)),
        )
    }
}

// ── Sending half ─────────────────────────────────────────────────────

/// Sending half held by an endpoint worker.
pub(crate) struct SlotSender {
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
    errors: watch::Sender<Option<Arc<Error>>>,
}

impl SlotSender {
    /// Replace the pending snapshot. Works with zero receivers.
    pub(crate) fn publish_snapshot(&self, snapshot: Snapshot) {
        self.snapshots.send_replace(Some(Arc::new(snapshot)));
    }

    /// Replace the pending error.
    pub(crate) fn publish_error(&self, error: Error) {
        self.errors.send_replace(Some(Arc::new(error)));
    }

    /// `true` once every receiver has been dropped.
    pub(crate) fn is_closed(&self) -> bool {
        self.snapshots.is_closed() && self.errors.is_closed()
    }
}

/// Create a fresh pair of single-slot channels.
pub(crate) fn slots() -> (SlotSender, EndpointStreams) {
    let (snap_tx, snap_rx) = watch::channel(None);
    let (err_tx, err_rx) = watch::channel(None);
    (
        SlotSender {
            snapshots: snap_tx,
            errors: err_tx,
        },
        EndpointStreams {
            snapshots: snap_rx,
            errors: err_rx,
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lldp::LocalSystemData;

    #[tokio::test]
    async fn unread_snapshot_is_superseded() {
        let (tx, mut streams) = slots();
        tx.publish_snapshot(Snapshot::new(LocalSystemData::new("aa", "first")));
        tx.publish_snapshot(Snapshot::new(LocalSystemData::new("aa", "second")));

        streams.snapshots.changed().await.unwrap();
        let latest = streams.snapshots.borrow_and_update().clone().unwrap();
        assert_eq!(latest.local.name, "second");
    }

    #[tokio::test]
    async fn events_end_with_closed() {
        let (tx, streams) = slots();
        let mut events = streams.into_events();

        tx.publish_error(Error::Timeout {
            device: "sw1".into(),
            timeout_ms: 10,
        });
        let first = events.next().await.unwrap();
        assert!(matches!(first, EndpointEvent::Error(_)));

        drop(tx);
        assert!(matches!(events.next().await, Some(EndpointEvent::Closed)));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn snapshot_published_before_subscription_is_delivered() {
        let (tx, streams) = slots();
        tx.publish_snapshot(Snapshot::new(LocalSystemData::new("aa", "sw1")));
        let mut events = streams.into_events();

        match events.next().await.unwrap() {
            EndpointEvent::Snapshot(s) => assert_eq!(s.local.name, "sw1"),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }
}
