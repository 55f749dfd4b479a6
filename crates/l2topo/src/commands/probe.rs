//! `probe`: one-shot fetch of a device's LLDP snapshot.

use std::fmt::Write;

use tabled::Tabled;

use l2topo_api::{HttpEndpoint, PortTableEntry, Snapshot};

use crate::cli::{GlobalOpts, ProbeArgs};
use crate::commands::{load_config, require_device};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct PortRow {
    #[tabled(rename = "#")]
    number: u32,
    #[tabled(rename = "Port")]
    id: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Neighbor")]
    neighbor: String,
    #[tabled(rename = "Neighbor Port")]
    neighbor_port: String,
}

impl From<&PortTableEntry> for PortRow {
    fn from(entry: &PortTableEntry) -> Self {
        let (neighbor, neighbor_port) = entry.neighbor.as_ref().map_or_else(
            || ("-".to_owned(), "-".to_owned()),
            |n| (n.chassis_id.clone(), n.port_id.clone()),
        );
        Self {
            number: entry.number,
            id: entry.id.clone(),
            description: entry.description.clone(),
            neighbor,
            neighbor_port,
        }
    }
}

pub async fn handle(args: &ProbeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    require_device(&cfg, &args.device)?;

    let endpoint = HttpEndpoint::new(cfg.endpoint_config(&args.device)?)?;
    tracing::debug!(device = %args.device, url = %endpoint.config().url, "probing");
    let snapshot = endpoint.fetch().await?;

    let color = output::should_color(&global.color);
    let rendered = output::render_single(
        &global.output,
        &snapshot,
        |s| detail(s, color),
        plain_lines,
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn detail(snapshot: &Snapshot, color: bool) -> String {
    let local = &snapshot.local;
    let mut out = output::heading(&format!("{} ({})", local.name, local.chassis_id), color);
    if !local.description.is_empty() {
        let _ = write!(out, "\n{}", local.description);
    }
    match &local.port_table {
        Some(ports) => {
            let rows: Vec<PortRow> = ports.iter().map(PortRow::from).collect();
            let _ = write!(out, "\n{}", output::render_table(&rows));
        }
        None => out.push_str("\n(port table unavailable)"),
    }
    out
}

/// `<port> <neighbor chassis> <neighbor port>` for every port with a neighbor.
fn plain_lines(snapshot: &Snapshot) -> String {
    snapshot
        .local
        .neighbors()
        .map(|(port, n)| format!("{} {} {}", port.id, n.chassis_id, n.port_id))
        .collect::<Vec<_>>()
        .join("\n")
}
