//! Topology engine for l2topo.
//!
//! This crate owns the layer-2 topology model and keeps it in step with
//! what devices report:
//!
//! - **[`TopologyGraph`]**: Thread-safe node/link graph. Readers get
//!   consistent copy-on-write snapshots; writers are serialized and every
//!   mutation either fully applies or changes nothing.
//!
//! - **[`Reconciler`]**: Consumes LLDP snapshots from any set of
//!   [`l2topo_api::Endpoint`]s and turns mutual or uncontradicted neighbor
//!   claims into links, evicting links and nodes that stop being reported.
//!
//! - **[`TopologyStream`]**: Subscription to published graph states.

pub mod error;
pub mod graph;
pub mod model;
pub mod reconcile;
pub mod stream;

pub use error::CoreError;
pub use graph::{GraphCounts, GraphState, Neighbors, RemovedNode, TopologyGraph};
pub use model::{ChassisId, Edge, Link, LinkKey, NewNode, Node, NodeId, PortRef};
pub use reconcile::{
    DevicePort, DeviceStatus, LinkState, LinkStatus, Reconciler, ReconcilerConfig,
    ReconcilerStats,
};
pub use stream::{TopologyStream, TopologyWatchStream};
