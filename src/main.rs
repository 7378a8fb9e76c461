mod apps;
mod cli;
mod client;
mod config;
mod console;
mod decoder;
mod discovery;
mod markup;
mod registry;
mod remote;
mod selector;
mod session;
mod subnet;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use cli::{Cli, Command, DevicesCommand, ScanArgs};
use client::{ControlClient, HttpTransport, RemoteKey};
use config::RemoteConfig;
use console::StdConsole;
use discovery::TcpProbe;
use registry::RegistryStore;
use session::{Session, SessionSettings};
use std::net::Ipv4Addr;
use tracing_subscriber::EnvFilter;

type AppSession = Session<HttpTransport, TcpProbe, StdConsole>;

#[tokio::main]
async fn main() -> Result<()> {
    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match config::load_or_create_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("failed to load config ({err:#}). Using defaults.");
            RemoteConfig::default()
        }
    };

    let command = cli
        .command
        .unwrap_or_else(|| Command::Remote(ScanArgs::default()));
    let scan_args = match &command {
        Command::Remote(scan) | Command::Select(scan) => scan.clone(),
        Command::Discover(args) => args.scan.clone(),
        _ => ScanArgs::default(),
    };

    let store = RegistryStore::default_location()?;
    let mut session = build_session(&config, store, &scan_args)?;
    if let Some(device) = cli.device {
        session = session.with_device(device);
    }

    let result = run_command(&mut session, command).await;
    // The raw-mode guard restores on every path it sees; this covers the rest.
    console::reset_terminal();
    result
}

fn build_session(config: &RemoteConfig, store: RegistryStore, scan: &ScanArgs) -> Result<AppSession> {
    let transport = HttpTransport::new(config.control_port)?;
    let client = ControlClient::new(transport, config.client_timeouts());
    let probe = TcpProbe::new(
        config.control_port,
        config.probe_timeout(),
        config.probe_concurrency,
    );
    let console = StdConsole::spawn()?;
    let settings = SessionSettings {
        subnet_source: scan.subnet_source(),
        max_hosts: config.max_hosts,
        escape_timeout: config.escape_timeout(),
        presets: config.preset_map(),
    };
    Ok(Session::new(client, probe, console, store, settings))
}

async fn run_command(session: &mut AppSession, command: Command) -> Result<()> {
    match command {
        Command::Remote(_) => session.run_remote().await?,
        Command::Select(_) => {
            if session.select_device().await?.is_none() {
                println!("No device selected.");
            }
        }
        Command::Discover(args) => {
            session.discover(!args.no_save).await?;
        }
        Command::Devices(args) => match args.command {
            DevicesCommand::List(list_args) => list_devices(session, list_args.json)?,
        },
        Command::Apps => {
            let device = require_device(session)?;
            session.open_app_catalog(device).await?;
        }
        Command::Key(args) => {
            let key = args.name.parse::<RemoteKey>()?;
            let device = require_device(session)?;
            session
                .client()
                .try_send(device, key)
                .await
                .with_context(|| format!("failed sending {key} to {device}"))?;
            println!("Sent {key}.");
        }
        Command::Launch(args) => {
            let device = require_device(session)?;
            session
                .client()
                .try_launch(device, &args.app_id)
                .await
                .with_context(|| format!("failed launching app {} on {device}", args.app_id))?;
            println!("Launched app {}.", args.app_id);
        }
        Command::Text(args) => {
            let device = require_device(session)?;
            if !session.client().is_reachable(device).await {
                return Err(anyhow!("{device} is not reachable"));
            }
            session.client().send_text(device, &args.text).await;
            println!("Sent {} character(s).", args.text.chars().count());
        }
    }
    Ok(())
}

fn require_device(session: &AppSession) -> Result<Ipv4Addr> {
    session
        .selected()
        .map(|device| device.address)
        .ok_or_else(|| anyhow!("no device selected. Run `roku-remote select` first or pass --device"))
}

fn list_devices(session: &AppSession, json: bool) -> Result<()> {
    let registry = session.registry();
    if json {
        println!("{}", serde_json::to_string_pretty(registry)?);
        return Ok(());
    }

    if registry.is_empty() {
        println!("No saved devices. Run `roku-remote discover` first.");
        return Ok(());
    }

    println!("{:<6}  {:<8}  {:<15}  NAME", "INDEX", "SELECTED", "ADDRESS");
    for (idx, device) in registry.devices().iter().enumerate() {
        let selected = if registry.selected() == Some(device.address) {
            "*"
        } else {
            ""
        };
        println!(
            "{:<6}  {:<8}  {:<15}  {}",
            idx + 1,
            selected,
            device.address.to_string(),
            device.display_name
        );
    }
    Ok(())
}
