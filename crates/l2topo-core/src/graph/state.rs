// ── Graph state ──
//
// One immutable-once-published value holding every node and link. Writers
// clone it, mutate the clone and publish the result; readers hold an `Arc`
// to whichever version they loaded and never see a half-applied change.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use crate::error::CoreError;
use crate::model::{ChassisId, Edge, Link, LinkKey, NewNode, Node, NodeId, PortRef};

/// A node removed from the graph together with the links that went with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub node: Node,
    pub links: Vec<Edge>,
}

/// Point-in-time contents of a [`TopologyGraph`](super::TopologyGraph).
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    nodes: BTreeMap<NodeId, Node>,
    by_chassis: HashMap<ChassisId, NodeId>,
    edges: BTreeMap<LinkKey, Edge>,
    /// Port occupancy: each linked port maps to the one link using it.
    ports: HashMap<PortRef, LinkKey>,
    /// Symmetric adjacency: `adjacency[a][b] == adjacency[b][a]`, holding
    /// the keys of every link between `a` and `b`.
    adjacency: BTreeMap<NodeId, BTreeMap<NodeId, BTreeSet<LinkKey>>>,
    next_id: u64,
    version: u64,
}

impl GraphState {
    // ── Queries ──────────────────────────────────────────────────────

    /// Bumped once per successful mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_by_chassis(&self, chassis_id: &ChassisId) -> Option<&Node> {
        self.by_chassis
            .get(chassis_id)
            .and_then(|id| self.nodes.get(id))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All links in key order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The link occupying `port` on `node`, if any.
    pub fn link_at(&self, node: NodeId, port: &str) -> Option<&Edge> {
        let key = self.ports.get(&PortRef::new(node, port))?;
        self.edges.get(key)
    }

    /// Every link between `a` and `b` (parallel links included).
    pub fn links_between(&self, a: NodeId, b: NodeId) -> Vec<&Edge> {
        self.adjacency
            .get(&a)
            .and_then(|peers| peers.get(&b))
            .into_iter()
            .flatten()
            .filter_map(|key| self.edges.get(key))
            .collect()
    }

    /// Number of distinct neighbors of `node` (0 for unknown nodes).
    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency.get(&node).map_or(0, BTreeMap::len)
    }

    // ── Mutations ────────────────────────────────────────────────────
    //
    // Every mutation validates fully before touching anything, so an
    // error return leaves `self` exactly as it was.

    pub(crate) fn insert_node(&mut self, new: NewNode) -> Result<NodeId, CoreError> {
        if new.chassis_id.is_empty() {
            return Err(CoreError::InvalidChassisId);
        }
        if let Some(&existing) = self.by_chassis.get(&new.chassis_id) {
            return Err(CoreError::DuplicateNode {
                chassis_id: new.chassis_id,
                existing,
            });
        }

        self.next_id += 1;
        let id = NodeId::new(self.next_id);
        self.by_chassis.insert(new.chassis_id.clone(), id);
        self.nodes.insert(id, new.into_node(id));
        self.version += 1;
        Ok(id)
    }

    /// Returns `false` (and leaves the version alone) when nothing changed.
    pub(crate) fn update_node(
        &mut self,
        id: NodeId,
        name: &str,
        description: &str,
    ) -> Result<bool, CoreError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(CoreError::NodeNotFound { id })?;
        if node.name == name && node.description == description {
            return Ok(false);
        }
        name.clone_into(&mut node.name);
        description.clone_into(&mut node.description);
        self.version += 1;
        Ok(true)
    }

    pub(crate) fn remove_node(&mut self, id: NodeId) -> Result<RemovedNode, CoreError> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or(CoreError::NodeNotFound { id })?;
        self.by_chassis.remove(&node.chassis_id);

        let keys: Vec<LinkKey> = self
            .adjacency
            .get(&id)
            .into_iter()
            .flat_map(BTreeMap::values)
            .flatten()
            .cloned()
            .collect();
        let links = keys.iter().filter_map(|key| self.detach(key)).collect();
        self.adjacency.remove(&id);

        self.version += 1;
        Ok(RemovedNode { node, links })
    }

    /// Add a link. Re-adding the exact same port pair updates the stored
    /// attributes in place.
    pub(crate) fn insert_link(&mut self, x: NodeId, y: NodeId, link: Link) -> Result<(), CoreError> {
        let edge = self.check_link(x, y, link)?;
        let key = edge.key();
        for port in [edge.port_x(), edge.port_y()] {
            if let Some(existing) = self.ports.get(&port) {
                if *existing != key {
                    return Err(CoreError::PortAlreadyLinked {
                        node: port.node,
                        port: port.port,
                    });
                }
            }
        }
        self.attach(edge);
        self.version += 1;
        Ok(())
    }

    /// Add a link, first removing whatever occupies either of its ports.
    /// Returns the links that were displaced.
    pub(crate) fn replace_link(
        &mut self,
        x: NodeId,
        y: NodeId,
        link: Link,
    ) -> Result<Vec<Edge>, CoreError> {
        let edge = self.check_link(x, y, link)?;
        let key = edge.key();

        let mut displaced = Vec::new();
        for port in [edge.port_x(), edge.port_y()] {
            let occupant = self.ports.get(&port).filter(|k| **k != key).cloned();
            if let Some(occupant) = occupant {
                if let Some(old) = self.detach(&occupant) {
                    displaced.push(old);
                }
            }
        }
        self.attach(edge);
        self.version += 1;
        Ok(displaced)
    }

    /// Remove every link between `x` and `y`.
    pub(crate) fn remove_links_between(
        &mut self,
        x: NodeId,
        y: NodeId,
    ) -> Result<Vec<Edge>, CoreError> {
        self.require(x)?;
        self.require(y)?;
        let keys: Vec<LinkKey> = self
            .adjacency
            .get(&x)
            .and_then(|peers| peers.get(&y))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        if keys.is_empty() {
            return Err(CoreError::LinkNotFound { x, y });
        }

        let removed = keys.iter().filter_map(|key| self.detach(key)).collect();
        self.version += 1;
        Ok(removed)
    }

    pub(crate) fn remove_link_at(&mut self, node: NodeId, port: &str) -> Result<Edge, CoreError> {
        self.require(node)?;
        let key = self
            .ports
            .get(&PortRef::new(node, port))
            .cloned()
            .ok_or_else(|| CoreError::PortNotLinked {
                node,
                port: port.to_owned(),
            })?;
        let edge = self.detach(&key).ok_or_else(|| CoreError::InvariantViolated {
            message: format!("port {node}/{port} points at a missing link"),
        })?;
        self.version += 1;
        Ok(edge)
    }

    pub(crate) fn set_link_properties(
        &mut self,
        node: NodeId,
        port: &str,
        properties: serde_json::Value,
    ) -> Result<(), CoreError> {
        self.require(node)?;
        let key = self
            .ports
            .get(&PortRef::new(node, port))
            .ok_or_else(|| CoreError::PortNotLinked {
                node,
                port: port.to_owned(),
            })?;
        let edge = self
            .edges
            .get_mut(key)
            .ok_or_else(|| CoreError::InvariantViolated {
                message: format!("port {node}/{port} points at a missing link"),
            })?;
        edge.link.properties = properties;
        self.version += 1;
        Ok(())
    }

    // ── Invariants ───────────────────────────────────────────────────

    /// Check every structural invariant: chassis index matches the node
    /// table, link ends exist, each port carries at most one link and
    /// adjacency is symmetric and agrees with the link table.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |message: String| Err(CoreError::InvariantViolated { message });

        if self.by_chassis.len() != self.nodes.len() {
            return fail("chassis index size differs from node count".into());
        }
        for (id, node) in &self.nodes {
            if node.id != *id {
                return fail(format!("node {} stored under {id}", node.id));
            }
            if self.by_chassis.get(&node.chassis_id) != Some(id) {
                return fail(format!("chassis {} not indexed to {id}", node.chassis_id));
            }
            if id.get() > self.next_id {
                return fail(format!("node {id} beyond id counter {}", self.next_id));
            }
        }

        if self.ports.len() != self.edges.len() * 2 {
            return fail("port index size is not twice the link count".into());
        }
        for (key, edge) in &self.edges {
            if edge.key() != *key {
                return fail(format!("link stored under the wrong key: {key:?}"));
            }
            if edge.x == edge.y {
                return fail(format!("self-link on {}", edge.x));
            }
            for end in [edge.x, edge.y] {
                if !self.nodes.contains_key(&end) {
                    return fail(format!("link references missing node {end}"));
                }
            }
            for port in [edge.port_x(), edge.port_y()] {
                if self.ports.get(&port) != Some(key) {
                    return fail(format!("port {port} not indexed to its link"));
                }
            }
            let listed = |a: NodeId, b: NodeId| {
                self.adjacency
                    .get(&a)
                    .and_then(|peers| peers.get(&b))
                    .is_some_and(|keys| keys.contains(key))
            };
            if !listed(edge.x, edge.y) || !listed(edge.y, edge.x) {
                return fail(format!("link {}-{} missing from adjacency", edge.x, edge.y));
            }
        }

        for (a, peers) in &self.adjacency {
            if peers.is_empty() {
                return fail(format!("empty adjacency entry for {a}"));
            }
            for (b, keys) in peers {
                if keys.is_empty() {
                    return fail(format!("empty adjacency entry {a}-{b}"));
                }
                let mirror = self.adjacency.get(b).and_then(|p| p.get(a));
                if mirror != Some(keys) {
                    return fail(format!("adjacency {a}-{b} is not symmetric"));
                }
                if keys.iter().any(|k| !self.edges.contains_key(k)) {
                    return fail(format!("adjacency {a}-{b} lists a missing link"));
                }
            }
        }
        Ok(())
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn require(&self, id: NodeId) -> Result<(), CoreError> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(CoreError::NodeNotFound { id })
        }
    }

    fn check_link(&self, x: NodeId, y: NodeId, link: Link) -> Result<Edge, CoreError> {
        if x == y {
            return Err(CoreError::SelfLink { id: x });
        }
        self.require(x)?;
        self.require(y)?;
        Ok(Edge::new(x, y, link))
    }

    /// Insert or overwrite `edge` and index both of its ports.
    fn attach(&mut self, edge: Edge) {
        let key = edge.key();
        self.ports.insert(edge.port_x(), key.clone());
        self.ports.insert(edge.port_y(), key.clone());
        for (a, b) in [(edge.x, edge.y), (edge.y, edge.x)] {
            self.adjacency
                .entry(a)
                .or_default()
                .entry(b)
                .or_default()
                .insert(key.clone());
        }
        self.edges.insert(key, edge);
    }

    /// Remove a link and drop every index entry pointing at it.
    fn detach(&mut self, key: &LinkKey) -> Option<Edge> {
        let edge = self.edges.remove(key)?;
        self.ports.remove(&edge.port_x());
        self.ports.remove(&edge.port_y());
        for (a, b) in [(edge.x, edge.y), (edge.y, edge.x)] {
            if let Some(peers) = self.adjacency.get_mut(&a) {
                if let Some(keys) = peers.get_mut(&b) {
                    keys.remove(key);
                    if keys.is_empty() {
                        peers.remove(&b);
                    }
                }
                if peers.is_empty() {
                    self.adjacency.remove(&a);
                }
            }
        }
        Some(edge)
    }
}

// ── Neighbors ────────────────────────────────────────────────────────

/// Lazy iterator over the distinct neighbors of one node.
///
/// Walks a single published [`GraphState`], so the sequence is unaffected
/// by later mutations. Yields nodes in ascending id order, each once even
/// when joined by parallel links. Cloning gives an independent cursor;
/// [`restart`](Self::restart) rewinds this one.
#[derive(Debug, Clone)]
pub struct Neighbors {
    state: Arc<GraphState>,
    node: NodeId,
    cursor: Option<NodeId>,
}

impl Neighbors {
    pub fn of(state: Arc<GraphState>, node: NodeId) -> Result<Self, CoreError> {
        state.require(node)?;
        Ok(Self {
            state,
            node,
            cursor: None,
        })
    }

    /// The graph version this iterator is reading.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn restart(&mut self) {
        self.cursor = None;
    }

    fn next_id(&self) -> Option<NodeId> {
        let peers = self.state.adjacency.get(&self.node)?;
        match self.cursor {
            None => peers.keys().next().copied(),
            Some(last) => peers
                .range((Bound::Excluded(last), Bound::Unbounded))
                .next()
                .map(|(id, _)| *id),
        }
    }
}

impl Iterator for Neighbors {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let id = self.next_id()?;
        self.cursor = Some(id);
        self.state.nodes.get(&id).cloned()
    }
}
