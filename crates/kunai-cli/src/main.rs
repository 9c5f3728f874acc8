mod commands;
mod shutdown;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use kunai::{TrackerConfig, ValueKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "kunai.toml";

#[derive(Parser)]
#[command(name = "kunai")]
#[command(version)]
#[command(about = "Live velocity tracker for KUNAI")]
struct Args {
    /// Configuration file (default: ./kunai.toml, then the user config dir)
    #[arg(short, long, global = true, env = "KUNAI_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Track the player's velocity until Ctrl+C (default)
    Track,

    /// Attach once and resolve a signature
    Scan {
        /// Configured signature name
        #[arg(short, long, conflicts_with = "pattern")]
        signature: Option<String>,

        /// Ad hoc pattern, e.g. "BA ?? ?? ?? ?? 8B C0"
        #[arg(short, long)]
        pattern: Option<String>,

        /// Match to select when the pattern occurs more than once
        #[arg(long, default_value = "0")]
        occurrence: usize,

        /// Byte offset added to the match
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Attach once and read a configured value
    Read {
        /// Value name, e.g. velocity_x
        value: String,

        /// Interpret the bytes as this type
        #[arg(short, long, default_value = "f32")]
        kind: ValueKind,
    },

    /// Attach once and dump raw bytes
    Hexdump {
        /// Start address (hex, 0x prefix optional)
        #[arg(required_unless_present = "value", conflicts_with = "value")]
        address: Option<String>,

        /// Dump at the address of a configured value instead
        #[arg(long)]
        value: Option<String>,

        /// Number of bytes
        #[arg(short, long, default_value = "256")]
        size: usize,

        /// Show ASCII column
        #[arg(long)]
        ascii: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "kunai=debug" } else { "kunai=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let (config, source) = load_config(args.config.as_deref());

    match args.command.unwrap_or(Command::Track) {
        Command::Track => commands::track::run(&config),
        Command::Scan {
            signature,
            pattern,
            occurrence,
            offset,
            json,
        } => {
            let target = match (signature, pattern) {
                (_, Some(pattern)) => commands::scan::Target::Pattern {
                    pattern,
                    occurrence,
                    offset,
                },
                (Some(name), None) => commands::scan::Target::Signature(name),
                (None, None) => commands::scan::Target::AllSignatures,
            };
            commands::scan::run(&config, target, json)
        }
        Command::Read { value, kind } => commands::read::run(&config, &value, kind),
        Command::Hexdump {
            address,
            value,
            size,
            ascii,
        } => {
            let target = match (address, value) {
                (_, Some(name)) => commands::hexdump::Target::Value(name),
                (Some(address), None) => commands::hexdump::Target::Address(
                    commands::hex_utils::parse_hex_address(&address)?,
                ),
                (None, None) => anyhow::bail!("Specify an address or --value"),
            };
            commands::hexdump::run(&config, target, size, ascii)
        }
        Command::Config => commands::config::run(&config, source.as_deref()),
    }
}

/// Config file to use: the explicit path, else `./kunai.toml`, else the
/// per-user config directory. `None` when no candidate exists.
fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("kunai").join(CONFIG_FILE))
        .filter(|path| path.exists())
}

/// Load the config, falling back to the built-in defaults on any failure
fn load_config(explicit: Option<&Path>) -> (TrackerConfig, Option<PathBuf>) {
    let Some(path) = resolve_config_path(explicit) else {
        info!("No config file found, using built-in defaults");
        return (TrackerConfig::default(), None);
    };

    match TrackerConfig::load(&path) {
        Ok(config) => {
            info!("Loaded config from {:?}", path);
            (config, Some(path))
        }
        Err(e) => {
            warn!("Failed to load config from {:?}: {}, using defaults", path, e);
            (TrackerConfig::default(), None)
        }
    }
}
