//! Clap derive structures for the `l2topo` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// l2topo -- layer-2 topology from LLDP neighbor tables
#[derive(Debug, Parser)]
#[command(
    name = "l2topo",
    version,
    about = "Discover and track layer-2 network topology",
    long_about = "Polls the LLDP neighbor tables of configured devices and keeps a\n\
        live graph of which port is cabled to which.\n\n\
        A link appears once both ends report each other, or once one end has\n\
        reported it uncontradicted for a grace period. Links and devices that\n\
        stop being reported are evicted.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "L2TOPO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "L2TOPO_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll all configured devices and print the topology as it changes
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Fetch one snapshot from a device and print its port table
    #[command(alias = "p")]
    Probe(ProbeArgs),

    /// Inspect configuration and store device tokens
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many reconciliation cycles (default: until Ctrl-C)
    #[arg(long, short = 'n')]
    pub cycles: Option<u64>,

    /// Print only the final topology, not every change
    #[arg(long)]
    pub final_only: bool,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Device name from the config file
    pub device: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the resolved configuration with secrets masked
    Show,

    /// Store a device's bearer token in the system keyring (read from stdin)
    SetToken {
        /// Device name from the config file
        device: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
