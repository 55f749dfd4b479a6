// ── LLDP snapshot records ──
//
// The data shape every endpoint produces: one device's self-reported
// identity plus its local port table. The JSON form of `LocalSystemData`
// is also what `HttpEndpoint` expects from a device agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time capture of a single device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub local: LocalSystemData,
    pub collected_at: DateTime<Utc>,
}

impl Snapshot {
    /// Stamp local system data with the current time.
    pub fn new(local: LocalSystemData) -> Self {
        Self {
            local,
            collected_at: Utc::now(),
        }
    }

    /// A snapshot is partial when the port walk did not complete.
    pub fn is_partial(&self) -> bool {
        self.local.port_table.is_none()
    }
}

/// Identity and port inventory reported by the device itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSystemData {
    /// Protocol chassis identifier. Empty when the identity fetch failed.
    #[serde(default)]
    pub chassis_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Local ports in device order. `None` if the port table could not be
    /// read this time; an empty list means the device has no ports.
    #[serde(default, rename = "ports", skip_serializing_if = "Option::is_none")]
    pub port_table: Option<Vec<PortTableEntry>>,
}

impl LocalSystemData {
    pub fn new(chassis_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            chassis_id: chassis_id.into(),
            name: name.into(),
            description: String::new(),
            port_table: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_ports(mut self, ports: Vec<PortTableEntry>) -> Self {
        self.port_table = Some(ports);
        self
    }

    /// Ports that currently carry a neighbor announcement.
    pub fn neighbors(&self) -> impl Iterator<Item = (&PortTableEntry, &RemoteNeighbor)> {
        self.port_table
            .iter()
            .flatten()
            .filter_map(|p| p.neighbor.as_ref().map(|n| (p, n)))
    }
}

/// A device's local port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTableEntry {
    pub number: u32,

    /// Protocol port identifier (e.g. `"Gi0/1"`).
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Neighbor seen on this port, when the discovery protocol reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbor: Option<RemoteNeighbor>,
}

impl PortTableEntry {
    pub fn new(number: u32, id: impl Into<String>) -> Self {
        Self {
            number,
            id: id.into(),
            description: String::new(),
            neighbor: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_neighbor(mut self, chassis_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        self.neighbor = Some(RemoteNeighbor {
            chassis_id: chassis_id.into(),
            port_id: port_id.into(),
        });
        self
    }
}

/// The neighbor a port claims to be cabled to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteNeighbor {
    pub chassis_id: String,
    pub port_id: String,
}
