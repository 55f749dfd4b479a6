// ── LLDP reconciliation ──
//
// Turns per-device LLDP snapshots into nodes and links in a shared
// `TopologyGraph`. Time is counted in cycles: snapshots and errors are
// ingested into the current cycle, `tick()` closes it and applies the
// time-based rules (one-sided confirmation, stale links, silent nodes).
//
// Rules, in the order they fire:
//   - A snapshot's chassis ID resolves to a node, creating it if needed.
//   - A complete port table replaces the device's view. A partial one
//     keeps the old view without refreshing it.
//   - A fresh claim on a port whose confirmed link points elsewhere
//     removes that link immediately.
//   - A claim matched by the opposite port's current claim confirms the
//     link at once.
//   - A one-sided claim is confirmed after `grace_cycles` if it is still
//     current and nothing contradicts it.
//   - A confirmed link goes stale, and leaves the graph, once any side
//     that reported it has been silent about it for `stale_after_cycles`.
//     Only a matching report from both ends confirms it again.
//   - A node is evicted after `stale_after_cycles` without a snapshot, or
//     once its device reaches `error_threshold` consecutive errors.

mod config;
mod ledger;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use l2topo_api::{Endpoint, EndpointEvent, EndpointEvents, Error as EndpointError, Snapshot};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::{StreamExt, StreamMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::CoreError;
use crate::graph::TopologyGraph;
use crate::model::{ChassisId, Edge, Link, NewNode, NodeId};

pub use config::ReconcilerConfig;
pub use ledger::{DevicePort, DeviceStatus, LinkState, LinkStatus, ReconcilerStats};

use ledger::{Confirmation, DeviceRecord, LinkRecord, NodeRecord, Pairing, View};

/// Drives a [`TopologyGraph`] from device snapshots.
///
/// Can be used synchronously (`ingest_*` plus `tick`) or as a task owning
/// a set of [`Endpoint`]s via [`run`](Self::run).
pub struct Reconciler {
    graph: Arc<TopologyGraph>,
    config: ReconcilerConfig,
    cycle: u64,

    devices: IndexMap<String, DeviceRecord>,
    nodes: HashMap<ChassisId, NodeRecord>,
    views: HashMap<ChassisId, View>,
    links: BTreeMap<Pairing, LinkRecord>,

    endpoints: IndexMap<String, Box<dyn Endpoint>>,
    streams: StreamMap<String, EndpointEvents>,

    stats: ReconcilerStats,
    stats_tx: watch::Sender<ReconcilerStats>,
}

impl Reconciler {
    pub fn new(graph: Arc<TopologyGraph>, config: ReconcilerConfig) -> Self {
        let (stats_tx, _) = watch::channel(ReconcilerStats::default());
        Self {
            graph,
            config: config.normalized(),
            cycle: 0,
            devices: IndexMap::new(),
            nodes: HashMap::new(),
            views: HashMap::new(),
            links: BTreeMap::new(),
            endpoints: IndexMap::new(),
            streams: StreamMap::new(),
            stats: ReconcilerStats::default(),
            stats_tx,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn graph(&self) -> &Arc<TopologyGraph> {
        &self.graph
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// The cycle currently accepting snapshots.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Receive stats after every closed cycle.
    pub fn subscribe_stats(&self) -> watch::Receiver<ReconcilerStats> {
        self.stats_tx.subscribe()
    }

    /// Every link the reconciler is tracking, confirmed or not.
    pub fn link_states(&self) -> Vec<LinkStatus> {
        self.links
            .iter()
            .map(|(pairing, record)| LinkStatus {
                a: pairing.a.clone(),
                b: pairing.b.clone(),
                state: record.state,
                first_seen: record.first_seen,
                last_seen: record.last_seen(),
            })
            .collect()
    }

    pub fn link_state(&self, a: &DevicePort, b: &DevicePort) -> Option<LinkState> {
        self.links
            .get(&Pairing::new(a.clone(), b.clone()))
            .map(|record| record.state)
    }

    /// Status of every known device, in registration order.
    pub fn devices(&self) -> Vec<DeviceStatus> {
        self.devices
            .iter()
            .map(|(name, record)| DeviceStatus {
                name: name.clone(),
                chassis_id: record.chassis_id.clone(),
                node: record
                    .chassis_id
                    .as_ref()
                    .and_then(|c| self.nodes.get(c))
                    .map(|n| n.id),
                last_snapshot: record.last_snapshot,
                consecutive_errors: record.consecutive_errors,
                closed: record.closed,
            })
            .collect()
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Start an endpoint and feed its output into this reconciler.
    pub fn add_endpoint(&mut self, mut endpoint: Box<dyn Endpoint>) -> Result<(), CoreError> {
        let name = endpoint.name().to_owned();
        if self.endpoints.contains_key(&name) {
            return Err(CoreError::DuplicateEndpoint { name });
        }

        let streams = endpoint.start()?;
        self.streams.insert(name.clone(), streams.into_events());
        self.endpoints.insert(name.clone(), endpoint);
        self.devices.entry(name.clone()).or_default().closed = false;
        debug!(device = %name, "endpoint registered");
        Ok(())
    }

    /// Stop and forget an endpoint. Its node ages out like any silent one.
    pub fn remove_endpoint(&mut self, name: &str) -> bool {
        let Some(mut endpoint) = self.endpoints.shift_remove(name) else {
            return false;
        };
        endpoint.stop();
        self.streams.remove(name);
        if let Some(record) = self.devices.get_mut(name) {
            record.closed = true;
        }
        debug!(device = %name, "endpoint removed");
        true
    }

    /// Stop every endpoint and drop their streams.
    pub fn shutdown(&mut self) {
        for (name, endpoint) in &mut self.endpoints {
            trace!(device = %name, "stopping endpoint");
            endpoint.stop();
        }
        self.streams.clear();
        for record in self.devices.values_mut() {
            record.closed = true;
        }
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Consume endpoint events and close a cycle every `config.cycle` until
    /// cancelled. Stops every endpoint before returning.
    pub async fn run(&mut self, cancel: CancellationToken) {
        self.drive(cancel, None).await;
    }

    /// Like [`run`](Self::run), but returns after `cycles` closed cycles.
    pub async fn run_for(&mut self, cycles: u64, cancel: CancellationToken) {
        self.drive(cancel, Some(cycles)).await;
    }

    /// Move the reconciler onto its own task. The handle yields it back
    /// once `cancel` fires.
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<Self> {
        tokio::spawn(async move {
            self.run(cancel).await;
            self
        })
    }

    async fn drive(&mut self, cancel: CancellationToken, limit: Option<u64>) {
        let mut interval = tokio::time::interval(self.config.cycle);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; cycles close one period from now.
        interval.tick().await;

        info!(
            endpoints = self.endpoints.len(),
            cycle = ?self.config.cycle,
            "reconciler started"
        );

        let mut closed: u64 = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                    closed += 1;
                    if limit.is_some_and(|limit| closed >= limit) {
                        break;
                    }
                }
                Some((device, event)) = self.streams.next(), if !self.streams.is_empty() => {
                    self.handle_event(&device, event);
                }
            }
        }

        self.shutdown();
        info!(cycles = closed, "reconciler stopped");
    }

    fn handle_event(&mut self, device: &str, event: EndpointEvent) {
        match event {
            EndpointEvent::Snapshot(snapshot) => self.ingest_snapshot(device, &snapshot),
            EndpointEvent::Error(error) => self.ingest_error(device, &error),
            EndpointEvent::Closed => self.device_closed(device),
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Apply one snapshot to the current cycle.
    pub fn ingest_snapshot(&mut self, device: &str, snapshot: &Snapshot) {
        let cycle = self.cycle;
        self.stats.snapshots += 1;

        let chassis_id = ChassisId::new(&snapshot.local.chassis_id);
        let record = self.devices.entry(device.to_owned()).or_default();
        record.last_snapshot = Some(cycle);
        record.consecutive_errors = 0;

        if chassis_id.is_empty() {
            warn!(device, "snapshot carries no chassis ID, ignoring its contents");
            return;
        }
        if let Some(previous) = record.chassis_id.replace(chassis_id.clone()) {
            if previous != chassis_id {
                info!(device, old = %previous, new = %chassis_id, "device reports a new chassis ID");
                self.views.remove(&previous);
            }
        }

        let local = &snapshot.local;
        if self.resolve_node(&chassis_id, &local.name, &local.description).is_none() {
            return;
        }

        match &local.port_table {
            Some(ports) => self.ingest_ports(&chassis_id, ports),
            None => {
                self.stats.partial_snapshots += 1;
                debug!(device, chassis = %chassis_id, "partial snapshot, keeping previous port view");
            }
        }
    }

    /// Count an endpoint error against `device`.
    pub fn ingest_error(&mut self, device: &str, error: &EndpointError) {
        if error.is_stopped() {
            debug!(device, "endpoint stopped");
            return;
        }
        self.stats.errors += 1;
        let record = self.devices.entry(device.to_owned()).or_default();
        record.consecutive_errors = record.consecutive_errors.saturating_add(1);
        debug!(
            device,
            error = %error,
            consecutive = record.consecutive_errors,
            "collection failed"
        );
    }

    /// Note that a device's streams have closed. Its node is left to the
    /// staleness rules.
    pub fn device_closed(&mut self, device: &str) {
        if let Some(record) = self.devices.get_mut(device) {
            record.closed = true;
        }
        info!(device, "device stream closed");
    }

    fn ingest_ports(&mut self, owner: &ChassisId, ports: &[l2topo_api::PortTableEntry]) {
        let cycle = self.cycle;
        let mut peers = BTreeMap::new();
        for entry in ports {
            let Some(neighbor) = &entry.neighbor else {
                continue;
            };
            let local_port = if entry.id.trim().is_empty() {
                entry.number.to_string()
            } else {
                entry.id.trim().to_owned()
            };
            let peer = DevicePort::new(neighbor.chassis_id.as_str(), neighbor.port_id.trim());
            if peer.chassis_id.is_empty() || peer.port.is_empty() {
                trace!(chassis = %owner, port = %local_port, "neighbor without identity, skipping");
                continue;
            }
            if peer.chassis_id == *owner {
                debug!(chassis = %owner, port = %local_port, "device reports itself as neighbor, skipping");
                continue;
            }
            peers.insert(local_port, peer);
        }

        let claims: Vec<(DevicePort, DevicePort)> = peers
            .iter()
            .map(|(port, peer)| (DevicePort::new(owner.clone(), port.as_str()), peer.clone()))
            .collect();
        self.views.insert(owner.clone(), View { peers, cycle });

        for (local, peer) in claims {
            self.drop_contradicted_links(&local, &peer);
            self.observe_claim(local, peer);
        }
    }

    /// Resolve (or create) the node for a chassis and refresh its attributes.
    fn resolve_node(&mut self, chassis_id: &ChassisId, name: &str, description: &str) -> Option<NodeId> {
        let id = if let Some(node) = self.graph.node_by_chassis(chassis_id) {
            match self.graph.update_node(node.id, name, description) {
                Ok(true) => debug!(node = %node.id, name, "node attributes updated"),
                Ok(false) => {}
                Err(e) => warn!(node = %node.id, error = %e, "failed to update node"),
            }
            node.id
        } else {
            let new = NewNode::new(chassis_id.clone())
                .with_name(name)
                .with_description(description);
            match self.graph.add_node(new) {
                Ok(id) => {
                    self.stats.nodes_added += 1;
                    info!(node = %id, chassis = %chassis_id, name, "node added");
                    id
                }
                Err(e) => {
                    warn!(chassis = %chassis_id, error = %e, "failed to add node");
                    return None;
                }
            }
        };

        self.nodes.insert(
            chassis_id.clone(),
            NodeRecord {
                id,
                last_seen: self.cycle,
                placeholder: false,
            },
        );
        Some(id)
    }

    /// Make sure a reported neighbor has a node, as a placeholder if it
    /// is not polled itself.
    fn touch_neighbor(&mut self, chassis_id: &ChassisId) {
        if let Some(record) = self.nodes.get_mut(chassis_id) {
            if record.placeholder {
                record.last_seen = self.cycle;
            }
            return;
        }
        if !self.config.discover_neighbors || self.graph.node_by_chassis(chassis_id).is_some() {
            return;
        }
        if self.is_failing(chassis_id) {
            trace!(chassis = %chassis_id, "neighbor's own device is failing, no placeholder");
            return;
        }

        match self.graph.add_node(NewNode::new(chassis_id.clone())) {
            Ok(id) => {
                self.stats.nodes_added += 1;
                info!(node = %id, chassis = %chassis_id, "placeholder node added for reported neighbor");
                self.nodes.insert(
                    chassis_id.clone(),
                    NodeRecord {
                        id,
                        last_seen: self.cycle,
                        placeholder: true,
                    },
                );
            }
            Err(e) => warn!(chassis = %chassis_id, error = %e, "failed to add placeholder node"),
        }
    }

    /// `true` while a polled device owning `chassis_id` sits at or above
    /// the error threshold. Cleared by its next snapshot.
    fn is_failing(&self, chassis_id: &ChassisId) -> bool {
        let threshold = self.config.error_threshold;
        self.devices.values().any(|device| {
            device.consecutive_errors >= threshold && device.chassis_id.as_ref() == Some(chassis_id)
        })
    }

    /// A fresh claim `local -> peer` invalidates every confirmed or stale
    /// link on `local` that leads somewhere else.
    fn drop_contradicted_links(&mut self, local: &DevicePort, peer: &DevicePort) {
        let contradicted: Vec<(Pairing, LinkState)> = self
            .links
            .iter()
            .filter(|(pairing, record)| {
                record.state != LinkState::Unconfirmed
                    && pairing.contains(local)
                    && pairing.other(local) != Some(peer)
            })
            .map(|(pairing, record)| (pairing.clone(), record.state))
            .collect();

        for (pairing, state) in contradicted {
            self.links.remove(&pairing);
            if state == LinkState::Confirmed {
                self.stats.conflicts += 1;
                warn!(link = %pairing, now = %peer, "port reports a different neighbor, dropping link");
                self.remove_from_graph(&pairing);
            }
        }
    }

    fn observe_claim(&mut self, local: DevicePort, peer: DevicePort) {
        let cycle = self.cycle;
        self.touch_neighbor(&peer.chassis_id);

        let matched = self
            .claim_of(&peer)
            .is_some_and(|(claimed, seen)| *claimed == local && self.is_current(seen));

        let pairing = Pairing::new(local.clone(), peer);
        let state = {
            let record = self.links.entry(pairing.clone()).or_insert_with(|| {
                trace!(link = %pairing, "new candidate link");
                LinkRecord::new(cycle)
            });
            record.witness(&pairing, &local, cycle);
            record.state
        };

        match state {
            LinkState::Confirmed => {
                if !self.in_graph(&pairing) {
                    self.confirm(&pairing, Confirmation::Restored);
                }
            }
            LinkState::Unconfirmed | LinkState::Stale => {
                if matched {
                    self.confirm(&pairing, Confirmation::Bidirectional);
                }
            }
        }
    }

    // ── Cycle close ──────────────────────────────────────────────────

    /// Close the current cycle: confirm surviving one-sided claims, evict
    /// stale links and silent nodes, publish stats.
    pub fn tick(&mut self) {
        let cycle = self.cycle;
        self.settle_pending();
        self.evict_stale_links();
        self.evict_silent_nodes();

        self.cycle += 1;
        self.stats.cycle = self.cycle;
        self.stats_tx.send_replace(self.stats);

        let counts = self.graph.counts();
        debug!(
            cycle,
            nodes = counts.nodes,
            links = counts.links,
            candidates = self.links.len(),
            "cycle closed"
        );
    }

    /// Confirm one-sided candidates that survived the grace period and
    /// forget pending links nobody has claimed for `stale_after_cycles`.
    /// Stale links are never confirmed one-sided; only a matching report
    /// from both ends brings them back.
    fn settle_pending(&mut self) {
        let cycle = self.cycle;
        let grace = u64::from(self.config.grace_cycles);
        let stale_after = u64::from(self.config.stale_after_cycles);

        let pending: Vec<(Pairing, LinkState, u64, u64)> = self
            .links
            .iter()
            .filter(|(_, record)| record.state != LinkState::Confirmed)
            .map(|(pairing, record)| {
                (
                    pairing.clone(),
                    record.state,
                    record.first_seen,
                    record.last_seen(),
                )
            })
            .collect();

        for (pairing, state, first_seen, last_seen) in pending {
            if !self.is_claimed(&pairing) {
                if cycle.saturating_sub(last_seen) >= stale_after {
                    trace!(link = %pairing, %state, "forgetting unclaimed link");
                    self.links.remove(&pairing);
                }
                continue;
            }
            if state == LinkState::Unconfirmed
                && cycle.saturating_sub(first_seen) >= grace
                && !self.is_contradicted(&pairing)
            {
                self.confirm(&pairing, Confirmation::OneSided);
            }
        }
    }

    fn evict_stale_links(&mut self) {
        let cycle = self.cycle;
        let stale_after = u64::from(self.config.stale_after_cycles);

        let stale: Vec<Pairing> = self
            .links
            .iter()
            .filter(|(_, record)| {
                record.state == LinkState::Confirmed
                    && record
                        .oldest_witness()
                        .is_some_and(|seen| cycle.saturating_sub(seen) >= stale_after)
            })
            .map(|(pairing, _)| pairing.clone())
            .collect();

        for pairing in stale {
            if let Some(record) = self.links.get_mut(&pairing) {
                record.state = LinkState::Stale;
            }
            info!(link = %pairing, cycles = stale_after, "link went stale, removing");
            self.remove_from_graph(&pairing);
            self.stats.links_evicted += 1;
        }
    }

    fn evict_silent_nodes(&mut self) {
        let cycle = self.cycle;
        let stale_after = u64::from(self.config.stale_after_cycles);
        let threshold = self.config.error_threshold;

        let mut doomed: Vec<(ChassisId, &'static str)> = self
            .devices
            .values()
            .filter(|device| device.consecutive_errors >= threshold)
            .filter_map(|device| device.chassis_id.clone())
            .filter(|chassis_id| self.nodes.contains_key(chassis_id))
            .map(|chassis_id| (chassis_id, "error threshold reached"))
            .collect();

        for (chassis_id, record) in &self.nodes {
            if cycle.saturating_sub(record.last_seen) >= stale_after
                && !doomed.iter().any(|(c, _)| c == chassis_id)
            {
                doomed.push((chassis_id.clone(), "no recent snapshot"));
            }
        }

        for (chassis_id, reason) in doomed {
            self.evict_node(&chassis_id, reason);
        }
    }

    fn evict_node(&mut self, chassis_id: &ChassisId, reason: &str) {
        let Some(record) = self.nodes.remove(chassis_id) else {
            return;
        };
        self.views.remove(chassis_id);
        self.links.retain(|pairing, _| !pairing.touches(chassis_id));

        match self.graph.remove_node(record.id) {
            Ok(removed) => {
                self.stats.nodes_evicted += 1;
                self.stats.links_evicted +=
                    u64::try_from(removed.links.len()).unwrap_or(u64::MAX);
                info!(
                    node = %record.id,
                    chassis = %chassis_id,
                    links = removed.links.len(),
                    reason,
                    "node evicted"
                );
            }
            Err(e) if e.is_not_found() => {
                debug!(node = %record.id, "node already gone from graph");
            }
            Err(e) => warn!(node = %record.id, error = %e, "failed to evict node"),
        }
    }

    // ── Graph updates ────────────────────────────────────────────────

    fn confirm(&mut self, pairing: &Pairing, how: Confirmation) {
        let (Some(x), Some(y)) = (
            self.node_id(&pairing.a.chassis_id),
            self.node_id(&pairing.b.chassis_id),
        ) else {
            trace!(link = %pairing, "cannot confirm yet, an end has no node");
            return;
        };

        let link = Link::new(pairing.a.port.as_str(), pairing.b.port.as_str())
            .with_properties(json!({ "confirmation": how.to_string() }));
        let displaced = match self.graph.replace_link(x, y, link) {
            Ok(displaced) => displaced,
            Err(e) => {
                warn!(link = %pairing, error = %e, "failed to add link");
                return;
            }
        };

        for edge in displaced {
            self.stats.conflicts += 1;
            if let Some(old) = self.pairing_of(&edge) {
                warn!(link = %old, by = %pairing, "link superseded");
                self.links.remove(&old);
            }
        }

        if let Some(record) = self.links.get_mut(pairing) {
            if record.state != LinkState::Confirmed {
                record.state = LinkState::Confirmed;
                self.stats.links_confirmed += 1;
                info!(link = %pairing, how = %how, "link confirmed");
            }
        }
    }

    fn remove_from_graph(&self, pairing: &Pairing) {
        if !self.in_graph(pairing) {
            return;
        }
        let Some(x) = self.node_id(&pairing.a.chassis_id) else {
            return;
        };
        if let Err(e) = self.graph.remove_link_at(x, &pairing.a.port) {
            debug!(link = %pairing, error = %e, "link already gone from graph");
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    fn node_id(&self, chassis_id: &ChassisId) -> Option<NodeId> {
        self.graph.node_by_chassis(chassis_id).map(|node| node.id)
    }

    fn pairing_of(&self, edge: &Edge) -> Option<Pairing> {
        let x = self.graph.node(edge.x)?;
        let y = self.graph.node(edge.y)?;
        Some(Pairing::new(
            DevicePort::new(x.chassis_id, edge.link.port_x.as_str()),
            DevicePort::new(y.chassis_id, edge.link.port_y.as_str()),
        ))
    }

    /// `true` if the graph holds exactly this pairing.
    fn in_graph(&self, pairing: &Pairing) -> bool {
        let (Some(x), Some(y)) = (
            self.node_id(&pairing.a.chassis_id),
            self.node_id(&pairing.b.chassis_id),
        ) else {
            return false;
        };
        self.graph
            .link_at(x, &pairing.a.port)
            .is_some_and(|edge| edge.y == y && edge.link.port_y == pairing.b.port)
    }

    /// The claim a device currently makes about `port`, with the cycle its
    /// view was collected in.
    fn claim_of(&self, port: &DevicePort) -> Option<(&DevicePort, u64)> {
        let view = self.views.get(&port.chassis_id)?;
        view.peers.get(&port.port).map(|peer| (peer, view.cycle))
    }

    /// Views from this cycle or the previous one count as current.
    fn is_current(&self, seen: u64) -> bool {
        seen + 1 >= self.cycle
    }

    /// Either side currently claims this pairing.
    fn is_claimed(&self, pairing: &Pairing) -> bool {
        pairing.sides().iter().any(|(side, other)| {
            self.claim_of(side)
                .is_some_and(|(peer, seen)| peer == *other && self.is_current(seen))
        })
    }

    /// Some current claim disagrees with this pairing: a port of the
    /// pairing names a different peer, or a third port claims one of them.
    fn is_contradicted(&self, pairing: &Pairing) -> bool {
        self.views.iter().any(|(owner, view)| {
            self.is_current(view.cycle)
                && view.peers.iter().any(|(port, peer)| {
                    let from = DevicePort::new(owner.clone(), port.as_str());
                    let involved = pairing.contains(&from) || pairing.contains(peer);
                    let agrees = pairing.other(&from) == Some(peer);
                    involved && !agrees
                })
        })
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        for endpoint in self.endpoints.values_mut() {
            endpoint.stop();
        }
    }
}
