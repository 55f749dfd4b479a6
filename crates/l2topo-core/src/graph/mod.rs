// ── Concurrency-safe topology graph ──
//
// Copy-on-write over `Arc<GraphState>`. A writer holds the write lock for
// the whole clone-mutate-publish sequence, so writers are serialized and no
// reader can load a state mid-mutation. Readers only hold the read lock long
// enough to clone the `Arc`, then work on that version lock-free.

mod state;

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::CoreError;
use crate::model::{ChassisId, Edge, Link, NewNode, Node, NodeId};
use crate::stream::TopologyStream;

pub use state::{GraphState, Neighbors, RemovedNode};

/// Node and link counts of one graph version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphCounts {
    pub nodes: usize,
    pub links: usize,
    pub version: u64,
}

/// Shared, thread-safe topology graph.
///
/// All methods take `&self`; wrap the graph in an `Arc` to share it. Every
/// successful mutation bumps the version and publishes the new state to
/// every [`TopologyStream`]. Failed mutations change nothing.
pub struct TopologyGraph {
    state: RwLock<Arc<GraphState>>,
    published: watch::Sender<Arc<GraphState>>,
}

impl Default for TopologyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyGraph {
    pub fn new() -> Self {
        let initial = Arc::new(GraphState::default());
        let (published, _) = watch::channel(Arc::clone(&initial));
        Self {
            state: RwLock::new(initial),
            published,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The current state (cheap `Arc` clone). Later mutations never affect it.
    pub fn snapshot(&self) -> Arc<GraphState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    pub fn counts(&self) -> GraphCounts {
        let state = self.snapshot();
        GraphCounts {
            nodes: state.node_count(),
            links: state.edge_count(),
            version: state.version(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.snapshot().node(id).cloned()
    }

    pub fn node_by_chassis(&self, chassis_id: &ChassisId) -> Option<Node> {
        self.snapshot().node_by_chassis(chassis_id).cloned()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.snapshot().nodes().cloned().collect()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.snapshot().edges().cloned().collect()
    }

    /// The link on `port` of `node`, oriented so that `x == node`.
    pub fn link_at(&self, node: NodeId, port: &str) -> Option<Edge> {
        self.snapshot()
            .link_at(node, port)
            .and_then(|edge| edge.oriented_from(node))
    }

    /// Every link between `a` and `b`, oriented from `a`.
    pub fn links_between(&self, a: NodeId, b: NodeId) -> Vec<Edge> {
        self.snapshot()
            .links_between(a, b)
            .into_iter()
            .filter_map(|edge| edge.oriented_from(a))
            .collect()
    }

    /// Lazy iterator over the distinct neighbors of `id`, read from the
    /// state current at the time of the call.
    pub fn neighbors(&self, id: NodeId) -> Result<Neighbors, CoreError> {
        Neighbors::of(self.snapshot(), id)
    }

    /// Subscribe to published states.
    pub fn subscribe(&self) -> TopologyStream {
        TopologyStream::new(self.published.subscribe())
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub fn add_node(&self, node: NewNode) -> Result<NodeId, CoreError> {
        let id = self.write(|state| state.insert_node(node))?;
        debug!(node = %id, "node added");
        Ok(id)
    }

    /// Replace a node's name and description. Returns `false` if both were
    /// already equal, in which case the version is not bumped.
    pub fn update_node(&self, id: NodeId, name: &str, description: &str) -> Result<bool, CoreError> {
        self.write(|state| state.update_node(id, name, description))
    }

    /// Remove a node and every link touching it.
    pub fn remove_node(&self, id: NodeId) -> Result<RemovedNode, CoreError> {
        let removed = self.write(|state| state.remove_node(id))?;
        debug!(node = %id, links = removed.links.len(), "node removed");
        Ok(removed)
    }

    /// Link port `link.port_x` of `x` to port `link.port_y` of `y`.
    ///
    /// Fails if either port already carries a different link. Adding the
    /// same port pair again overwrites the stored attributes.
    pub fn add_link(&self, x: NodeId, y: NodeId, link: Link) -> Result<(), CoreError> {
        self.write(|state| state.insert_link(x, y, link))?;
        trace!(%x, %y, "link added");
        Ok(())
    }

    /// Like [`add_link`](Self::add_link), but evicts whatever currently
    /// occupies either port. Returns the evicted links.
    pub fn replace_link(&self, x: NodeId, y: NodeId, link: Link) -> Result<Vec<Edge>, CoreError> {
        self.write(|state| state.replace_link(x, y, link))
    }

    /// Remove every link between `x` and `y`.
    pub fn remove_link(&self, x: NodeId, y: NodeId) -> Result<Vec<Edge>, CoreError> {
        let removed = self.write(|state| state.remove_links_between(x, y))?;
        trace!(%x, %y, count = removed.len(), "links removed");
        Ok(removed)
    }

    /// Remove the link on one specific port.
    pub fn remove_link_at(&self, node: NodeId, port: &str) -> Result<Edge, CoreError> {
        self.write(|state| state.remove_link_at(node, port))
    }

    pub fn set_link_properties(
        &self,
        node: NodeId,
        port: &str,
        properties: serde_json::Value,
    ) -> Result<(), CoreError> {
        self.write(|state| state.set_link_properties(node, port, properties))
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Apply `f` to a private copy and publish it if the version moved.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut GraphState) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = GraphState::clone(&guard);
        let result = f(&mut next)?;

        if next.version() != guard.version() {
            debug_assert!(next.validate().is_ok(), "{:?}", next.validate());
            let next = Arc::new(next);
            *guard = Arc::clone(&next);
            // `send_replace` updates unconditionally, even with zero receivers.
            self.published.send_replace(next);
        }
        Ok(result)
    }
}
