use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use groundlink::codec::Endianness;
use groundlink::{Station, StationConfig};

use crate::exit::{ground_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod frame;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Identify and decode one telemetry packet given as hex.
    Decode(DecodeArgs),
    /// Connect an interface and print received telemetry.
    Listen(ListenArgs),
    /// Build a command and write it to an interface.
    Send(SendArgs),
    /// Split a hex byte stream into frames.
    Frame(FrameArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Frame(args) => frame::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct StationArgs {
    /// Station definition file (JSON).
    #[arg(long, short = 's', env = "GROUNDLINK_STATION", value_name = "FILE")]
    pub station: PathBuf,
}

impl StationArgs {
    pub fn load(&self) -> CliResult<Station> {
        StationConfig::load(&self.station)
            .and_then(StationConfig::build)
            .map_err(|err| ground_error("station load failed", err))
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub station: StationArgs,
    /// Packet bytes as hex.
    pub hex: String,
    /// Only identify against these targets (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub targets: Vec<String>,
    /// Decode as this packet instead of identifying ("TARGET PACKET").
    #[arg(long, value_names = ["TARGET", "PACKET"], num_args = 2)]
    pub packet: Option<Vec<String>>,
    /// Limits set to evaluate against.
    #[arg(long, value_name = "NAME")]
    pub limits_set: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub station: StationArgs,
    /// Interface name from the station file.
    pub interface: String,
    /// Exit after this many packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Delay between connection attempts (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub reconnect_delay: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub station: StationArgs,
    /// Command target.
    pub target: String,
    /// Command packet.
    pub packet: String,
    /// Command parameter, repeatable (ITEM=VALUE).
    #[arg(long, value_name = "ITEM=VALUE")]
    pub set: Vec<String>,
    /// Interface to write to. Default: the first one serving the target.
    #[arg(long, short = 'i')]
    pub interface: Option<String>,
    /// Build and print the command without connecting.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EndiannessArg {
    Big,
    Little,
}

impl From<EndiannessArg> for Endianness {
    fn from(value: EndiannessArg) -> Self {
        match value {
            EndiannessArg::Big => Endianness::Big,
            EndiannessArg::Little => Endianness::Little,
        }
    }
}

#[derive(Args, Debug)]
pub struct FrameArgs {
    /// Byte stream as hex.
    pub hex: String,
    #[arg(long, default_value = "0")]
    pub length_bit_offset: u32,
    #[arg(long, default_value = "16")]
    pub length_bit_size: u32,
    /// Added to `length * bytes_per_count` to give the frame size.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub length_value_offset: i64,
    #[arg(long, default_value = "1")]
    pub bytes_per_count: u32,
    #[arg(long, value_enum, default_value = "big")]
    pub endianness: EndiannessArg,
    /// Sync pattern as hex.
    #[arg(long, value_name = "HEX")]
    pub sync: Option<String>,
    /// Bytes stripped from the front of each frame.
    #[arg(long, default_value = "0")]
    pub discard: usize,
    /// Largest accepted length field value.
    #[arg(long)]
    pub max_length: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s`, `2m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let text = input.trim();
    let invalid = || CliError::new(USAGE, format!("invalid duration: {input}"));
    let (digits, scale_ms) = if let Some(ms) = text.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(s) = text.strip_suffix('s') {
        (s, 1_000)
    } else if let Some(m) = text.strip_suffix('m') {
        (m, 60_000)
    } else {
        (text, 1_000)
    };
    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(scale_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}
