//! `boks`: offline command-line tools for the Boks protocol.
//!
//! # Subcommands
//!
//! ```text
//! boks pin    --key <hex> --type <single-use|multi-use|master> --index <n> [--count <n>]
//! boks decode <hex-frame>
//! boks encode <opcode-hex> [payload-hex]
//! boks config
//! ```
//!
//! None of them touch Bluetooth: they derive codes, inspect captured frames
//! and build frames for a transport or simulator to send.  Every subcommand
//! accepts a global `--config <path>`; without it the platform default is
//! used, and a missing file means "all defaults".

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use boks_client::infrastructure::storage::config::{config_file_path, load_from, ClientConfig};
use boks_core::protocol::frame::{encode_frame, try_decode_frame, FrameError};
use boks_core::protocol::validation::{parse_hex, to_hex, Seed};
use boks_core::{crypto::pin::derive_pins, Opcode, Packet, PinType};

#[derive(Parser)]
#[command(name = "boks", version)]
#[command(about = "Offline tools for the Boks BLE parcel box protocol")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive PIN codes from a master key
    Pin {
        /// Master key as 64 hex characters (falls back to device.master_key)
        #[arg(short, long)]
        key: Option<String>,
        /// Code table: single-use, multi-use or master
        #[arg(short = 't', long = "type", default_value = "single-use")]
        pin_type: PinType,
        /// First index to derive
        #[arg(short, long, default_value_t = 0)]
        index: u32,
        /// Number of consecutive codes
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },
    /// Decode a frame and print the packet as JSON
    Decode {
        /// Complete frame in hex (opcode, length, payload, checksum)
        frame: String,
    },
    /// Build a frame from an opcode and an optional payload
    Encode {
        /// Opcode in hex, e.g. 02 or 0x02
        opcode: String,
        /// Payload in hex
        payload: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config)?;
    init_tracing(&config.client.log_level);

    match cli.command {
        Commands::Pin {
            key,
            pin_type,
            index,
            count,
        } => {
            for line in derive_pin_lines(&config, key.as_deref(), pin_type, index, count)? {
                println!("{line}");
            }
        }
        Commands::Decode { frame } => println!("{}", decode_to_json(&frame)?),
        Commands::Encode { opcode, payload } => {
            println!("{}", encode_to_hex(&opcode, payload.as_deref())?)
        }
        Commands::Config => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

/// `RUST_LOG` wins, then the configured level, then `info`.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<ClientConfig> {
    let Some(path) = explicit.or_else(|| config_file_path().ok()) else {
        return Ok(ClientConfig::default());
    };
    let config =
        load_from(&path).with_context(|| format!("loading config from {}", path.display()))?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn derive_pin_lines(
    config: &ClientConfig,
    key: Option<&str>,
    pin_type: PinType,
    index: u32,
    count: u32,
) -> anyhow::Result<Vec<String>> {
    let key = match key {
        Some(hex) => Seed::from_hex(hex).context("invalid --key")?,
        None => config
            .master_key()?
            .context("no master key: pass --key or set device.master_key")?,
    };

    let pins = derive_pins(key.as_bytes(), pin_type, index..index.saturating_add(count))?;
    Ok(pins
        .into_iter()
        .map(|(index, pin)| format!("{pin_type} {index}: {pin}"))
        .collect())
}

fn decode_to_json(hex: &str) -> anyhow::Result<String> {
    let bytes = parse_hex(hex)?;
    let frame = match try_decode_frame(&bytes) {
        Ok(frame) => frame,
        Err(FrameError::Checksum(m)) => bail!(
            "checksum mismatch for opcode 0x{:02X}: computed 0x{:02X}, frame carries 0x{:02X}",
            m.opcode,
            m.expected,
            m.received
        ),
        Err(FrameError::TooShort { available }) => {
            bail!("frame too short: {available} bytes")
        }
        Err(FrameError::Truncated {
            declared,
            available,
        }) => bail!("frame truncated: declares {declared} payload bytes, {available} present"),
    };

    let opcode =
        Opcode::try_from(frame.opcode).map_err(|op| anyhow!("unknown opcode 0x{op:02X}"))?;
    let packet = Packet::decode(opcode, frame.payload)?;
    let output = serde_json::json!({
        "opcode": format!("0x{:02X}", opcode.as_u8()),
        "name": opcode.name(),
        "kind": opcode.kind(),
        "packet": packet,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

fn encode_to_hex(opcode: &str, payload: Option<&str>) -> anyhow::Result<String> {
    let digits = opcode.trim_start_matches("0x").trim_start_matches("0X");
    let opcode = u8::from_str_radix(digits, 16)
        .with_context(|| format!("opcode {opcode:?} is not a hex byte"))?;
    if Opcode::try_from(opcode).is_err() {
        warn!(opcode, "encoding an opcode outside the catalog");
    }

    let payload = payload.map(parse_hex).transpose()?.unwrap_or_default();
    Ok(to_hex(&encode_frame(opcode, &payload)?))
}
