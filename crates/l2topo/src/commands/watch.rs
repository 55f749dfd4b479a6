//! `watch`: run the reconciler against every configured device.

use std::fmt::Write;
use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::info;

use l2topo_api::HttpEndpoint;
use l2topo_core::{
    DeviceStatus, GraphState, NodeId, Reconciler, ReconcilerStats, TopologyGraph,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::commands::load_config;
use crate::error::CliError;
use crate::output;

// ── Views ────────────────────────────────────────────────────────────

/// One graph link, with node ids resolved to labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub a: String,
    pub a_port: String,
    pub b: String,
    pub b_port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<String>,
}

impl LinkView {
    pub fn collect(state: &GraphState) -> Vec<Self> {
        let label = |id: NodeId| {
            state
                .node(id)
                .map_or_else(|| id.to_string(), |n| n.label().to_owned())
        };
        state
            .edges()
            .map(|edge| Self {
                a: label(edge.x),
                a_port: edge.link.port_x.clone(),
                b: label(edge.y),
                b_port: edge.link.port_y.clone(),
                speed: edge.link.speed.clone(),
                confirmation: edge
                    .link
                    .properties
                    .get("confirmation")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned),
            })
            .collect()
    }

    fn line(&self) -> String {
        format!("{} {} {} {}", self.a, self.a_port, self.b, self.b_port)
    }
}

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Node A")]
    a: String,
    #[tabled(rename = "Port A")]
    a_port: String,
    #[tabled(rename = "Node B")]
    b: String,
    #[tabled(rename = "Port B")]
    b_port: String,
    #[tabled(rename = "Speed")]
    speed: String,
    #[tabled(rename = "Confirmed")]
    confirmation: String,
}

fn link_row(view: &LinkView, color: bool) -> LinkRow {
    LinkRow {
        a: view.a.clone(),
        a_port: view.a_port.clone(),
        b: view.b.clone(),
        b_port: view.b_port.clone(),
        speed: view.speed.clone().unwrap_or_else(|| "-".into()),
        confirmation: view
            .confirmation
            .as_deref()
            .map_or_else(|| "-".into(), |c| output::confirmation(c, color)),
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Device")]
    name: String,
    #[tabled(rename = "Chassis")]
    chassis: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Last Snapshot")]
    last_snapshot: String,
    #[tabled(rename = "Errors")]
    errors: u32,
    #[tabled(rename = "Stream")]
    stream: &'static str,
}

impl From<&DeviceStatus> for DeviceRow {
    fn from(d: &DeviceStatus) -> Self {
        let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".into());
        Self {
            name: d.name.clone(),
            chassis: or_dash(d.chassis_id.as_ref().map(ToString::to_string)),
            node: or_dash(d.node.map(|n| n.to_string())),
            last_snapshot: or_dash(d.last_snapshot.map(|c| format!("cycle {c}"))),
            errors: d.consecutive_errors,
            stream: if d.closed { "closed" } else { "open" },
        }
    }
}

/// Final state printed when `watch` exits.
#[derive(Debug, Serialize)]
struct TopologyReport {
    version: u64,
    nodes: usize,
    links: Vec<LinkView>,
    devices: Vec<DeviceStatus>,
    stats: ReconcilerStats,
}

impl TopologyReport {
    fn new(state: &GraphState, reconciler: &Reconciler) -> Self {
        Self {
            version: state.version(),
            nodes: state.node_count(),
            links: LinkView::collect(state),
            devices: reconciler.devices(),
            stats: reconciler.stats(),
        }
    }

    fn detail(&self, color: bool) -> String {
        let mut out = output::heading(
            &format!(
                "Topology v{}: {} nodes, {} links",
                self.version,
                self.nodes,
                self.links.len()
            ),
            color,
        );
        if !self.links.is_empty() {
            let rows: Vec<LinkRow> = self.links.iter().map(|l| link_row(l, color)).collect();
            let _ = write!(out, "\n{}", output::render_table(&rows));
        }
        let devices: Vec<DeviceRow> = self.devices.iter().map(DeviceRow::from).collect();
        let _ = write!(out, "\n{}", output::render_table(&devices));

        let s = &self.stats;
        let _ = write!(
            out,
            "\n{} cycles, {} snapshots ({} partial), {} errors, \
             {} links confirmed, {} evicted, {} conflicts",
            s.cycle,
            s.snapshots,
            s.partial_snapshots,
            s.errors,
            s.links_confirmed,
            s.links_evicted,
            s.conflicts,
        );
        out
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let endpoints = cfg.endpoint_configs()?;

    let graph = Arc::new(TopologyGraph::new());
    let mut reconciler = Reconciler::new(Arc::clone(&graph), cfg.reconciler_config());
    let device_count = endpoints.len();
    for config in endpoints {
        reconciler.add_endpoint(Box::new(HttpEndpoint::new(config)?))?;
    }
    info!(
        devices = device_count,
        cycle = ?reconciler.config().cycle,
        cycles = ?args.cycles,
        "watching topology"
    );

    let color = output::should_color(&global.color);
    let mut topology = graph.subscribe();
    let cancel = CancellationToken::new();

    let mut task = match args.cycles {
        Some(cycles) => {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                reconciler.run_for(cycles, cancel).await;
                reconciler
            })
        }
        None => reconciler.spawn(cancel.clone()),
    };

    let reconciler = loop {
        tokio::select! {
            joined = &mut task => {
                break joined.map_err(|e| CliError::Task(e.to_string()))?;
            }
            signal = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                signal?;
                info!("interrupted, shutting down");
                cancel.cancel();
            }
            Some(state) = topology.changed() => {
                if !args.final_only {
                    print_change(&state, &global.output, color, global.quiet)?;
                }
            }
        }
    };

    let report = TopologyReport::new(&graph.snapshot(), &reconciler);
    let rendered = output::render_single(
        &global.output,
        &report,
        |r| r.detail(color),
        |r| r.links.iter().map(LinkView::line).collect::<Vec<_>>().join("\n"),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn print_change(
    state: &GraphState,
    format: &OutputFormat,
    color: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let links = LinkView::collect(state);
    let body = output::render_list(format, &links, |l| link_row(l, color), LinkView::line)?;
    let rendered = match format {
        OutputFormat::Table => {
            let head = output::heading(
                &format!(
                    "Topology v{}: {} nodes, {} links",
                    state.version(),
                    state.node_count(),
                    links.len()
                ),
                color,
            );
            format!("{head}\n{body}")
        }
        _ => body,
    };
    output::print_output(&rendered, quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use l2topo_core::{Link, NewNode};
    use serde_json::json;

    use super::*;

    #[test]
    fn link_views_use_node_labels() {
        let graph = TopologyGraph::new();
        let a = graph.add_node(NewNode::new("aa").with_name("core")).unwrap();
        let b = graph.add_node(NewNode::new("bb")).unwrap();
        graph
            .add_link(
                a,
                b,
                Link::new("1", "2").with_properties(json!({ "confirmation": "one-sided" })),
            )
            .unwrap();

        let views = LinkView::collect(&graph.snapshot());
        assert_eq!(
            views,
            vec![LinkView {
                a: "core".into(),
                a_port: "1".into(),
                b: "bb".into(),
                b_port: "2".into(),
                speed: None,
                confirmation: Some("one-sided".into()),
            }]
        );
        assert_eq!(views[0].line(), "core 1 bb 2");
    }

    #[test]
    fn device_row_dashes_unknown_fields() {
        let row = DeviceRow::from(&DeviceStatus {
            name: "sw1".into(),
            chassis_id: None,
            node: None,
            last_snapshot: None,
            consecutive_errors: 2,
            closed: true,
        });
        assert_eq!(row.chassis, "-");
        assert_eq!(row.node, "-");
        assert_eq!(row.stream, "closed");
    }
}
