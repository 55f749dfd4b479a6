// ── Link domain types ──
//
// A link joins one port on each of two nodes. Links are keyed by their
// normalized port pair, so two nodes may share several parallel links
// but a single port carries at most one.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::NodeId;

/// Link attributes as stored on an edge.
///
/// `port_x` belongs to the edge's `x` node and `port_y` to its `y` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub port_x: String,
    pub port_y: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    /// Opaque payload for callers; never interpreted by the graph.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub properties: serde_json::Value,
}

impl Link {
    pub fn new(port_x: impl Into<String>, port_y: impl Into<String>) -> Self {
        Self {
            port_x: port_x.into(),
            port_y: port_y.into(),
            speed: None,
            properties: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_speed(mut self, speed: impl Into<String>) -> Self {
        self.speed = Some(speed.into());
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    /// The same link seen from the other end.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            port_x: self.port_y.clone(),
            port_y: self.port_x.clone(),
            speed: self.speed.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// A port on a specific node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: String,
}

impl PortRef {
    pub fn new(node: NodeId, port: impl Into<String>) -> Self {
        Self {
            node,
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.port)
    }
}

/// Orientation-free identity of a link: its two ports, lower one first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    low: PortRef,
    high: PortRef,
}

impl LinkKey {
    pub fn new(a: PortRef, b: PortRef) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
}

/// A stored link together with the nodes it joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub x: NodeId,
    pub y: NodeId,
    #[serde(flatten)]
    pub link: Link,
}

impl Edge {
    pub fn new(x: NodeId, y: NodeId, link: Link) -> Self {
        Self { x, y, link }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey::new(self.port_x(), self.port_y())
    }

    pub fn port_x(&self) -> PortRef {
        PortRef::new(self.x, self.link.port_x.clone())
    }

    pub fn port_y(&self) -> PortRef {
        PortRef::new(self.y, self.link.port_y.clone())
    }

    /// The node on the other end, if `node` is one of this edge's ends.
    pub fn peer_of(&self, node: NodeId) -> Option<NodeId> {
        if self.x == node {
            Some(self.y)
        } else if self.y == node {
            Some(self.x)
        } else {
            None
        }
    }

    /// This edge re-oriented so that `x == node`.
    pub fn oriented_from(&self, node: NodeId) -> Option<Self> {
        if self.x == node {
            Some(self.clone())
        } else if self.y == node {
            Some(Self::new(self.y, self.x, self.link.reversed()))
        } else {
            None
        }
    }
}
