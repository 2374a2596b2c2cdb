use clap::{Args, Subcommand, ValueEnum};

use bnepkit_frame::ServiceClass;
use bnepkit_transport::BdAddr;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod event;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a BNEP packet given as hex.
    Decode(DecodeArgs),
    /// Render a stack event record from a template.
    Event(EventArgs),
    /// Run a PANU/NAP handshake and exchange between two in-memory engines.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Event(args) => event::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Packet bytes as hex (separators allowed).
    pub packet: String,
    /// Receiver address, used to rebuild compressed destinations.
    #[arg(long, value_name = "ADDR")]
    pub local: Option<BdAddr>,
    /// Sender address, used to rebuild compressed sources.
    #[arg(long, value_name = "ADDR")]
    pub remote: Option<BdAddr>,
}

#[derive(Args, Debug)]
pub struct EventArgs {
    /// Catalog template name (see --list).
    #[arg(conflicts_with_all = ["template", "list"])]
    pub name: Option<String>,
    /// Ad-hoc field template, e.g. "1HB".
    #[arg(long, requires = "code")]
    pub template: Option<String>,
    /// Event code for --template.
    #[arg(long, value_parser = parse_u8)]
    pub code: Option<u8>,
    /// Subevent code for --template (0 for none).
    #[arg(long, value_parser = parse_u8, default_value = "0")]
    pub subevent: u8,
    /// List catalog templates.
    #[arg(long)]
    pub list: bool,
    /// Field values, one per template tag.
    #[arg(long = "arg", short = 'a', value_name = "VALUE", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Role {
    Panu,
    Nap,
    Gn,
}

impl Role {
    pub fn uuid16(self) -> u16 {
        let class = match self {
            Role::Panu => ServiceClass::Panu,
            Role::Nap => ServiceClass::Nap,
            Role::Gn => ServiceClass::Gn,
        };
        class.uuid16()
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Role side A connects as.
    #[arg(long, default_value = "panu")]
    pub a_role: Role,
    /// Role side B serves.
    #[arg(long, default_value = "nap")]
    pub b_role: Role,
    /// Protocol ranges side A accepts (comma-separated, e.g. 0x0800,0x86dd).
    #[arg(long, value_delimiter = ',', value_name = "RANGE")]
    pub net_filter: Vec<String>,
    /// Ethertype of the frames exchanged after setup.
    #[arg(long, value_parser = parse_u16, default_value = "0x0800")]
    pub ethertype: u16,
    /// Payload of the frames exchanged after setup.
    #[arg(long, default_value = "hello")]
    pub payload: String,
    /// Leave the channel open instead of disconnecting at the end.
    #[arg(long)]
    pub keep_open: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Decimal or `0x`-prefixed hex.
pub fn parse_u16(input: &str) -> Result<u16, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid 16-bit value: {input}"))
}

pub fn parse_u8(input: &str) -> Result<u8, String> {
    let value = parse_u16(input)?;
    u8::try_from(value).map_err(|_| format!("value out of range for one byte: {input}"))
}
