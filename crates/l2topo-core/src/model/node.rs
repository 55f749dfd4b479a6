// ── Node domain types ──

use serde::{Deserialize, Serialize};

use super::ids::{ChassisId, NodeId};

/// A network device in the topology graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub chassis_id: ChassisId,
    pub name: String,
    pub description: String,
}

/// Attributes for a node that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub chassis_id: ChassisId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl NewNode {
    pub fn new(chassis_id: impl Into<ChassisId>) -> Self {
        Self {
            chassis_id: chassis_id.into(),
            name: String::new(),
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn into_node(self, id: NodeId) -> Node {
        Node {
            id,
            chassis_id: self.chassis_id,
            name: self.name,
            description: self.description,
        }
    }
}

impl Node {
    /// Display label: the system name, falling back to the chassis id.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.chassis_id.as_str()
        } else {
            &self.name
        }
    }
}
