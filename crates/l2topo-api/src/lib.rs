//! Device-facing boundary of l2topo.
//!
//! This crate defines what a device endpoint produces and how it is driven:
//!
//! - **[`lldp`]**: Snapshot records: a device's identity plus its ordered
//!   local port table, each port optionally carrying the neighbor the
//!   discovery protocol reports on it.
//!
//! - **[`Endpoint`]**: The `{start, stop}` capability every device source
//!   implements. `start()` hands out two single-slot streams (latest
//!   snapshot, latest error) as [`EndpointStreams`]; `stop()` makes the
//!   worker close both.
//!
//! - **[`HttpEndpoint`]**: Polls a device agent serving its LLDP data as
//!   JSON, with per-request timeout and retry budget ([`TransportConfig`]).
//!
//! - **[`FeedEndpoint`]**: Caller-driven endpoint for embedding other
//!   discovery sources.

pub mod endpoint;
pub mod error;
pub mod feed;
pub mod http;
pub mod lldp;
pub mod transport;

pub use endpoint::{Endpoint, EndpointEvent, EndpointEvents, EndpointStreams};
pub use error::Error;
pub use feed::{FeedEndpoint, FeedHandle};
pub use http::{HttpEndpoint, HttpEndpointConfig};
pub use lldp::{LocalSystemData, PortTableEntry, RemoteNeighbor, Snapshot};
pub use transport::{RetryConfig, TlsMode, TransportConfig};
