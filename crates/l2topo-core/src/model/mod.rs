// ── Domain model ──

mod ids;
mod link;
mod node;

pub use ids::{ChassisId, NodeId};
pub use link::{Edge, Link, LinkKey, PortRef};
pub use node::{NewNode, Node};
