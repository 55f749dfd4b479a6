// ── Reconciliation bookkeeping ──
//
// Everything the reconciler remembers between snapshots. Links and claims
// are keyed by chassis ID and port ID rather than by graph node id, so they
// survive a node being evicted and rediscovered.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use strum::{Display, EnumString};

use crate::model::{ChassisId, NodeId};

/// A port on a device, identified by the device's chassis ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DevicePort {
    pub chassis_id: ChassisId,
    pub port: String,
}

impl DevicePort {
    pub fn new(chassis_id: impl Into<ChassisId>, port: impl Into<String>) -> Self {
        Self {
            chassis_id: chassis_id.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for DevicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chassis_id, self.port)
    }
}

/// Lifecycle of a candidate link.
///
/// `Unconfirmed` links live only in the reconciler. `Confirmed` links are in
/// the graph. A confirmed link turns `Stale` when a side that used to report
/// it goes quiet for too long, and is removed from the graph at that moment.
/// A stale link is confirmed again only when both ends report it; it is
/// forgotten once neither does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Unconfirmed,
    Confirmed,
    Stale,
}

/// How a link got into the graph; stored in the link's properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Confirmation {
    /// Both ends reported each other.
    Bidirectional,
    /// One end reported it and nothing contradicted it for the grace period.
    OneSided,
    /// A confirmed link was missing from the graph and was put back.
    Restored,
}

// ── Pairings ─────────────────────────────────────────────────────────

/// Orientation-free pair of device ports, lower one first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Pairing {
    pub(crate) a: DevicePort,
    pub(crate) b: DevicePort,
}

impl Pairing {
    pub(crate) fn new(p: DevicePort, q: DevicePort) -> Self {
        if p <= q {
            Self { a: p, b: q }
        } else {
            Self { a: q, b: p }
        }
    }

    pub(crate) fn contains(&self, port: &DevicePort) -> bool {
        self.a == *port || self.b == *port
    }

    /// The end opposite `port`.
    pub(crate) fn other(&self, port: &DevicePort) -> Option<&DevicePort> {
        if self.a == *port {
            Some(&self.b)
        } else if self.b == *port {
            Some(&self.a)
        } else {
            None
        }
    }

    pub(crate) fn touches(&self, chassis_id: &ChassisId) -> bool {
        self.a.chassis_id == *chassis_id || self.b.chassis_id == *chassis_id
    }

    pub(crate) fn sides(&self) -> [(&DevicePort, &DevicePort); 2] {
        [(&self.a, &self.b), (&self.b, &self.a)]
    }
}

impl fmt::Display for Pairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}

// ── Records ──────────────────────────────────────────────────────────

/// A device's latest complete port view: local port ID → claimed peer.
#[derive(Debug, Clone, Default)]
pub(crate) struct View {
    pub(crate) peers: BTreeMap<String, DevicePort>,
    /// Cycle in which the view was collected.
    pub(crate) cycle: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct LinkRecord {
    pub(crate) state: LinkState,
    pub(crate) first_seen: u64,
    /// Last cycle in which side `a` (resp. `b`) claimed this pairing.
    /// `None` for a side that never has.
    pub(crate) seen_a: Option<u64>,
    pub(crate) seen_b: Option<u64>,
}

impl LinkRecord {
    pub(crate) fn new(cycle: u64) -> Self {
        Self {
            state: LinkState::Unconfirmed,
            first_seen: cycle,
            seen_a: None,
            seen_b: None,
        }
    }

    pub(crate) fn witness(&mut self, pairing: &Pairing, side: &DevicePort, cycle: u64) {
        if pairing.a == *side {
            self.seen_a = Some(cycle);
        } else if pairing.b == *side {
            self.seen_b = Some(cycle);
        }
    }

    /// Most recent claim from either side.
    pub(crate) fn last_seen(&self) -> u64 {
        self.seen_a
            .into_iter()
            .chain(self.seen_b)
            .max()
            .unwrap_or(self.first_seen)
    }

    /// Least recent claim among the sides that have ever claimed it.
    pub(crate) fn oldest_witness(&self) -> Option<u64> {
        self.seen_a.into_iter().chain(self.seen_b).min()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceRecord {
    pub(crate) chassis_id: Option<ChassisId>,
    pub(crate) last_snapshot: Option<u64>,
    pub(crate) consecutive_errors: u32,
    pub(crate) closed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub(crate) id: NodeId,
    pub(crate) last_seen: u64,
    /// Created from a neighbor report, never polled directly.
    pub(crate) placeholder: bool,
}

// ── Public views ─────────────────────────────────────────────────────

/// A link the reconciler is tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub a: DevicePort,
    pub b: DevicePort,
    pub state: LinkState,
    pub first_seen: u64,
    pub last_seen: u64,
}

/// What the reconciler knows about one registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub chassis_id: Option<ChassisId>,
    pub node: Option<NodeId>,
    pub last_snapshot: Option<u64>,
    pub consecutive_errors: u32,
    pub closed: bool,
}

/// Running counters, published after every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    /// Number of cycles closed so far.
    pub cycle: u64,
    pub snapshots: u64,
    pub partial_snapshots: u64,
    pub errors: u64,
    pub nodes_added: u64,
    pub nodes_evicted: u64,
    pub links_confirmed: u64,
    pub links_evicted: u64,
    /// Confirmed links displaced by a newer, incompatible report.
    pub conflicts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(c: &str, p: &str) -> DevicePort {
        DevicePort::new(c, p)
    }

    #[test]
    fn pairing_is_orientation_free() {
        let ab = Pairing::new(port("a", "1"), port("b", "2"));
        let ba = Pairing::new(port("b", "2"), port("a", "1"));
        assert_eq!(ab, ba);
        assert_eq!(ab.other(&port("b", "2")), Some(&port("a", "1")));
        assert_eq!(ab.other(&port("c", "1")), None);
    }

    #[test]
    fn witnesses_track_each_side() {
        let pairing = Pairing::new(port("a", "1"), port("b", "2"));
        let mut record = LinkRecord::new(4);
        assert_eq!(record.oldest_witness(), None);
        assert_eq!(record.last_seen(), 4);

        record.witness(&pairing, &port("a", "1"), 5);
        record.witness(&pairing, &port("b", "2"), 7);
        assert_eq!(record.oldest_witness(), Some(5));
        assert_eq!(record.last_seen(), 7);
    }

    #[test]
    fn link_state_strings() {
        assert_eq!(LinkState::Confirmed.to_string(), "confirmed");
        assert_eq!(Confirmation::OneSided.to_string(), "one-sided");
        assert_eq!("stale".parse::<LinkState>().ok(), Some(LinkState::Stale));
    }
}
