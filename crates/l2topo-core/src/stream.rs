// ── Reactive topology stream ──
//
// Subscription type for consuming graph changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::graph::GraphState;

/// A subscription to the topology graph.
///
/// Provides both point-in-time access and reactive change notification via
/// [`changed`](Self::changed) or by converting to a `Stream`. Intermediate
/// versions may be skipped; the latest one is never missed.
pub struct TopologyStream {
    current: Arc<GraphState>,
    receiver: watch::Receiver<Arc<GraphState>>,
}

impl TopologyStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<GraphState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The state captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<GraphState> {
        &self.current
    }

    /// The latest published state.
    pub fn latest(&self) -> Arc<GraphState> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published state.
    /// Returns `None` once the graph has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<GraphState>> {
        self.receiver.changed().await.ok()?;
        let state = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&state);
        Some(state)
    }

    /// Convert into a `Stream` that yields the current state first, then
    /// every subsequently published one.
    pub fn into_stream(self) -> TopologyWatchStream {
        TopologyWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct TopologyWatchStream {
    inner: WatchStream<Arc<GraphState>>,
}

impl Stream for TopologyWatchStream {
    type Item = Arc<GraphState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_stream::StreamExt;

    use crate::{NewNode, TopologyGraph};

    #[tokio::test]
    async fn stream_yields_current_state_then_changes() {
        let graph = TopologyGraph::new();
        graph.add_node(NewNode::new("aa")).unwrap();
        let mut states = graph.subscribe().into_stream();

        let first = states.next().await.unwrap();
        assert_eq!(first.node_count(), 1);

        graph.add_node(NewNode::new("bb")).unwrap();
        let second = states.next().await.unwrap();
        assert_eq!(second.node_count(), 2);
        assert!(second.version() > first.version());
    }

    #[tokio::test]
    async fn changed_tracks_current() {
        let graph = TopologyGraph::new();
        let mut topology = graph.subscribe();
        assert_eq!(topology.current().node_count(), 0);

        graph.add_node(NewNode::new("aa")).unwrap();
        let state = topology.changed().await.unwrap();
        assert_eq!(state.node_count(), 1);
        assert_eq!(topology.current().version(), state.version());
    }
}
