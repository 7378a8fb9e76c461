use crate::config;
use crate::subnet::parse_dotted_quad;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

const REGISTRY_FILE: &str = "devices.tsv";
pub const SELECTED_MARKER: &str = "*";
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub address: Ipv4Addr,
    pub display_name: String,
}

impl Device {
    pub fn new(address: Ipv4Addr, display_name: impl Into<String>) -> Self {
        Self {
            address,
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Registry {
    devices: Vec<Device>,
    selected: Option<Ipv4Addr>,
}

impl Registry {
    pub fn new(devices: Vec<Device>, selected: Option<Ipv4Addr>) -> Self {
        let mut registry = Self {
            devices: dedup_by_address(devices),
            selected: None,
        };
        if let Some(address) = selected {
            registry.select(address);
        }
        registry
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub const fn selected(&self) -> Option<Ipv4Addr> {
        self.selected
    }

    pub fn selected_device(&self) -> Option<&Device> {
        let address = self.selected?;
        self.find(address)
    }

    pub fn find(&self, address: Ipv4Addr) -> Option<&Device> {
        self.devices.iter().find(|device| device.address == address)
    }

    pub fn select(&mut self, address: Ipv4Addr) -> bool {
        if self.find(address).is_none() {
            return false;
        }
        self.selected = Some(address);
        true
    }

    pub fn replace_devices(&mut self, devices: Vec<Device>) {
        self.devices = dedup_by_address(devices);
        if let Some(address) = self.selected
            && self.find(address).is_none()
        {
            self.selected = None;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(config::scoped_path(REGISTRY_FILE)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            return Ok(Registry::default());
        }

        let raw = fs::read_to_string(&self.path).with_context(|| {
            format!("failed reading device registry at {}", self.path.display())
        })?;
        Ok(parse_registry(&raw))
    }

    pub fn save(&self, devices: &[Device], selected: Option<Ipv4Addr>) -> Result<()> {
        config::ensure_parent_dir(&self.path)?;
        fs::write(&self.path, render_registry(devices, selected)).with_context(|| {
            format!("failed writing device registry at {}", self.path.display())
        })?;
        Ok(())
    }

    pub fn save_registry(&self, registry: &Registry) -> Result<()> {
        self.save(registry.devices(), registry.selected())
    }
}

/// One `address<TAB>name<TAB>marker` record per line. If several lines carry the
/// marker, the last one read wins.
pub fn parse_registry(raw: &str) -> Registry {
    let mut devices = Vec::new();
    let mut selected = None;

    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split('\t').map(str::trim);
        let address_field = fields.next().unwrap_or_default();
        let Ok(address) = parse_dotted_quad(address_field) else {
            tracing::warn!(
                line = line_no + 1,
                "skipping registry record with invalid address '{address_field}'"
            );
            continue;
        };
        let display_name = match fields.next() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => UNKNOWN_DEVICE.to_owned(),
        };
        if fields.next() == Some(SELECTED_MARKER) {
            selected = Some(address);
        }

        devices.push(Device {
            address,
            display_name,
        });
    }

    Registry::new(devices, selected)
}

#[must_use]
pub fn render_registry(devices: &[Device], selected: Option<Ipv4Addr>) -> String {
    let mut out = String::new();
    let mut marked = false;

    for device in devices {
        let is_selected = !marked && selected == Some(device.address);
        marked |= is_selected;
        let marker = if is_selected { SELECTED_MARKER } else { "" };
        out.push_str(&format!(
            "{}\t{}\t{marker}\n",
            device.address,
            sanitize_field(&device.display_name)
        ));
    }

    out
}

fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_owned()
}

fn dedup_by_address(devices: Vec<Device>) -> Vec<Device> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|device| seen.insert(device.address))
        .collect()
}
