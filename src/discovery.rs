use crate::client::{ControlClient, Transport};
use crate::markup::first_element_text;
use crate::registry::{Device, UNKNOWN_DEVICE};
use crate::subnet::Subnet;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const NAME_FIELDS: [&str; 3] = ["user-device-name", "friendly-device-name", "model-name"];
const LOCATION_FIELD: &str = "user-device-location";

#[allow(async_fn_in_trait)]
pub trait HostProbe {
    async fn responders(&self, hosts: Vec<Ipv4Addr>) -> Result<Vec<Ipv4Addr>>;
}

#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
    concurrency: usize,
}

impl TcpProbe {
    pub fn new(port: u16, timeout: Duration, concurrency: usize) -> Self {
        Self {
            port,
            timeout: timeout.max(Duration::from_millis(50)),
            concurrency: concurrency.max(1),
        }
    }
}

impl HostProbe for TcpProbe {
    async fn responders(&self, hosts: Vec<Ipv4Addr>) -> Result<Vec<Ipv4Addr>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let port = self.port;
        let timeout = self.timeout;

        let mut join_set = JoinSet::new();
        for host in hosts {
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let addr = SocketAddr::from((host, port));
                match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_)) => Some(host),
                    _ => None,
                }
            });
        }

        let mut found = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            if let Some(host) = joined.context("probe worker task failed")? {
                found.push(host);
            }
        }

        found.sort_unstable();
        Ok(found)
    }
}

pub async fn scan<P, T>(
    probe: &P,
    client: &ControlClient<T>,
    subnet: &Subnet,
    max_hosts: usize,
) -> Result<Vec<Device>>
where
    P: HostProbe,
    T: Transport,
{
    let hosts = subnet.hosts(max_hosts)?;
    tracing::info!(%subnet, hosts = hosts.len(), "probing for devices");

    let mut responders = probe.responders(hosts).await?;
    responders.sort_unstable();
    responders.dedup();

    let mut devices = Vec::with_capacity(responders.len());
    for address in responders {
        let display_name = match client.device_info(address).await {
            Ok(body) => display_name_from_info(&body),
            Err(err) => {
                tracing::warn!(%address, "device-info query failed: {err:#}");
                UNKNOWN_DEVICE.to_owned()
            }
        };
        devices.push(Device {
            address,
            display_name,
        });
    }

    Ok(devices)
}

pub fn display_name_from_info(xml: &str) -> String {
    let name = NAME_FIELDS
        .iter()
        .find_map(|field| first_element_text(xml, field));
    let Some(name) = name else {
        tracing::warn!("device-info carried no usable name");
        return UNKNOWN_DEVICE.to_owned();
    };

    match first_element_text(xml, LOCATION_FIELD) {
        Some(location) => format!("{name} ({location})"),
        None => name,
    }
}
