// ── Core identity types ──
//
// NodeId is assigned by the graph; ChassisId comes from the discovery
// protocol and is the primary key for node identity across snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── NodeId ──────────────────────────────────────────────────────────

/// Graph-assigned node identifier.
///
/// Allocated from a monotonic counter, so an id is never handed out twice
/// for the lifetime of a graph, even after its node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ── ChassisId ───────────────────────────────────────────────────────

/// LLDP chassis identifier, normalized to trimmed lowercase with `:`
/// separators (`AA-BB-CC` and `aa:bb:cc` compare equal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChassisId(String);

impl ChassisId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase().replace('-', ":"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChassisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChassisId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ChassisId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChassisId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
