use crate::client::{ControlClient, Transport};
use crate::console::Console;
use crate::discovery::{self, HostProbe};
use crate::registry::{Device, Registry, RegistryStore, UNKNOWN_DEVICE};
use crate::subnet::{self, SubnetSource};
use anyhow::Result;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub subnet_source: SubnetSource,
    pub max_hosts: usize,
    pub escape_timeout: Duration,
    pub presets: BTreeMap<char, String>,
}

pub struct Session<T, P, C> {
    pub(crate) client: ControlClient<T>,
    pub(crate) probe: P,
    pub(crate) console: C,
    pub(crate) store: RegistryStore,
    pub(crate) registry: Registry,
    pub(crate) selected: Option<Device>,
    pub(crate) settings: SessionSettings,
}

impl<T, P, C> Session<T, P, C>
where
    T: Transport,
    P: HostProbe,
    C: Console,
{
    pub fn new(
        client: ControlClient<T>,
        probe: P,
        console: C,
        store: RegistryStore,
        settings: SessionSettings,
    ) -> Self {
        let registry = load_or_warn(&store);
        let selected = registry.selected_device().cloned();
        Self {
            client,
            probe,
            console,
            store,
            registry,
            selected,
            settings,
        }
    }

    #[must_use]
    pub fn with_device(mut self, address: Ipv4Addr) -> Self {
        let device = self
            .registry
            .find(address)
            .cloned()
            .unwrap_or_else(|| Device::new(address, UNKNOWN_DEVICE));
        self.selected = Some(device);
        self
    }

    pub const fn selected(&self) -> Option<&Device> {
        self.selected.as_ref()
    }

    pub const fn client(&self) -> &ControlClient<T> {
        &self.client
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[cfg(test)]
    pub fn console(&mut self) -> &mut C {
        &mut self.console
    }

    pub async fn discover(&mut self, save: bool) -> Result<Vec<Device>> {
        let devices = self.scan().await?;

        if devices.is_empty() {
            writeln!(self.console, "No devices found.")?;
            return Ok(devices);
        }

        writeln!(self.console, "Discovered {} device(s):", devices.len())?;
        for device in &devices {
            writeln!(
                self.console,
                "- {:<15}  {}",
                device.address, device.display_name
            )?;
        }

        if save {
            self.registry.replace_devices(devices.clone());
            self.persist()?;
            writeln!(
                self.console,
                "Saved device registry: {}",
                self.store.path().display()
            )?;
        }
        Ok(devices)
    }

    pub(crate) async fn scan(&mut self) -> Result<Vec<Device>> {
        let subnet = match subnet::resolve(&self.settings.subnet_source) {
            Ok(subnet) => subnet,
            Err(err) => {
                writeln!(self.console, "Cannot determine local network: {err:#}")?;
                return Ok(Vec::new());
            }
        };

        let limit = self.settings.max_hosts;
        let total = subnet.host_count();
        if total > u64::try_from(limit).unwrap_or(u64::MAX) {
            let covered = subnet.hosts(limit)?;
            if let (Some(first), Some(last)) = (covered.first(), covered.last()) {
                tracing::warn!(%subnet, total, limit, "subnet larger than host limit");
                writeln!(
                    self.console,
                    "Warning: {subnet} has {total} hosts; scanning only {first} - {last}. Raise max_hosts in the config to cover the rest."
                )?;
            }
        }

        writeln!(self.console, "Scanning {subnet} for devices...")?;
        self.console.flush()?;
        match discovery::scan(&self.probe, &self.client, &subnet, self.settings.max_hosts).await {
            Ok(devices) => Ok(devices),
            Err(err) => {
                writeln!(self.console, "Discovery failed: {err:#}")?;
                Ok(Vec::new())
            }
        }
    }

    pub(crate) fn reload_registry(&mut self) {
        self.registry = load_or_warn(&self.store);
    }

    pub(crate) fn persist(&mut self) -> Result<()> {
        if let Err(err) = self.store.save_registry(&self.registry) {
            tracing::warn!("failed saving device registry: {err:#}");
            writeln!(self.console, "Warning: could not save device registry: {err:#}")?;
        }
        Ok(())
    }
}

fn load_or_warn(store: &RegistryStore) -> Registry {
    match store.load() {
        Ok(registry) => registry,
        Err(err) => {
            tracing::warn!("failed to load device registry: {err:#}");
            Registry::default()
        }
    }
}
