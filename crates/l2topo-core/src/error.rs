// ── Core error types ──
//
// Graph mutations fail with one of the graph variants and leave the graph
// untouched. Endpoint failures surface only when an endpoint cannot be
// started; errors a running endpoint reports are consumed by the
// reconciler and never returned to callers.

use thiserror::Error;

use crate::model::{ChassisId, NodeId};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Graph errors ─────────────────────────────────────────────────
    #[error("Node with chassis ID {chassis_id} already exists as {existing}")]
    DuplicateNode {
        chassis_id: ChassisId,
        existing: NodeId,
    },

    #[error("Node not found: {id}")]
    NodeNotFound { id: NodeId },

    #[error("Port {port} on node {node} is already linked")]
    PortAlreadyLinked { node: NodeId, port: String },

    #[error("No link between {x} and {y}")]
    LinkNotFound { x: NodeId, y: NodeId },

    #[error("Port {port} on node {node} has no link")]
    PortNotLinked { node: NodeId, port: String },

    #[error("Cannot link node {id} to itself")]
    SelfLink { id: NodeId },

    #[error("Chassis ID must not be empty")]
    InvalidChassisId,

    #[error("Graph invariant violated: {message}")]
    InvariantViolated { message: String },

    // ── Endpoint errors ──────────────────────────────────────────────
    #[error("An endpoint named {name:?} is already registered")]
    DuplicateEndpoint { name: String },

    #[error(transparent)]
    Endpoint(#[from] l2topo_api::Error),
}

impl CoreError {
    /// `true` for the "does not exist" family of graph errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::LinkNotFound { .. } | Self::PortNotLinked { .. }
        )
    }
}
