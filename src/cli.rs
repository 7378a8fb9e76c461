use crate::subnet::SubnetSource;
use clap::{Args, Parser, Subcommand};
use std::net::Ipv4Addr;

#[derive(Debug, Parser)]
#[command(
    name = "roku-remote",
    version,
    about = "Keyboard remote control for streaming devices on the local network"
)]
pub struct Cli {
    /// Control this device address for one run instead of the saved selection.
    #[arg(long, global = true)]
    pub device: Option<Ipv4Addr>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive remote (default).
    Remote(ScanArgs),
    /// Scan the local network for devices.
    Discover(DiscoverArgs),
    /// Work with the saved device registry.
    Devices(DevicesArgs),
    /// Pick the default device interactively.
    Select(ScanArgs),
    /// Browse installed apps and launch one.
    Apps,
    /// Send one named key, e.g. `Home` or `VolumeUp`.
    Key(KeyArgs),
    /// Launch an installed app by id.
    Launch(LaunchArgs),
    /// Type a string on the device.
    Text(TextArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ScanArgs {
    /// CIDR block to scan. If omitted, derived from the first non-loopback interface.
    #[arg(long, conflicts_with_all = ["address", "netmask"])]
    pub cidr: Option<String>,

    /// Local address to derive the subnet from (requires --netmask).
    #[arg(long, requires = "netmask")]
    pub address: Option<String>,

    /// Netmask for --address, dotted-decimal or packed hex (0xffffff00).
    #[arg(long, requires = "address")]
    pub netmask: Option<String>,
}

impl ScanArgs {
    #[must_use]
    pub fn subnet_source(&self) -> SubnetSource {
        match (&self.cidr, &self.address, &self.netmask) {
            (Some(cidr), _, _) => SubnetSource::Cidr(cidr.clone()),
            (None, Some(address), Some(netmask)) => SubnetSource::AddressMask {
                address: address.clone(),
                netmask: netmask.clone(),
            },
            _ => SubnetSource::Interface,
        }
    }
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub scan: ScanArgs,

    /// Do not save discovered devices to the registry.
    #[arg(long, default_value_t = false)]
    pub no_save: bool,
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices stored in the registry.
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print machine-readable JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Key name (Up, Down, Left, Right, Select, Play, Home, Back, VolumeUp, ...).
    pub name: String,
}

#[derive(Debug, Args)]
pub struct LaunchArgs {
    /// Numeric app id as listed by `apps`.
    pub app_id: String,
}

#[derive(Debug, Args)]
pub struct TextArgs {
    pub text: String,
}
