use crate::client::{ClientTimeouts, ControlClient, Transport};
use crate::console::{Console, Input};
use crate::discovery::HostProbe;
use crate::registry::RegistryStore;
use crate::session::{Session, SessionSettings};
use crate::subnet::SubnetSource;
use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ScriptedConsole {
    inputs: VecDeque<Input>,
    raw: bool,
    mode_changes: Vec<bool>,
    output: Vec<u8>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        self.inputs.extend(bytes.iter().copied().map(Input::Byte));
        self
    }

    pub fn line(self, text: &str) -> Self {
        self.bytes(text.as_bytes()).bytes(b"\n")
    }

    pub fn timeout(mut self) -> Self {
        self.inputs.push_back(Input::Timeout);
        self
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn mode_changes(&self) -> &[bool] {
        &self.mode_changes
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for ScriptedConsole {
    async fn read_byte(&mut self, timeout: Option<Duration>) -> Result<Input> {
        match self.inputs.pop_front() {
            Some(Input::Timeout) if timeout.is_none() => {
                Err(anyhow!("script times out a read that has no timeout"))
            }
            Some(input) => Ok(input),
            None => Ok(Input::Closed),
        }
    }

    fn set_raw(&mut self, raw: bool) -> Result<()> {
        self.raw = raw;
        self.mode_changes.push(raw);
        Ok(())
    }
}

impl Write for ScriptedConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    posts: Mutex<Vec<(Ipv4Addr, String)>>,
    gets: Mutex<Vec<(Ipv4Addr, String)>>,
    bodies: Mutex<HashMap<(Ipv4Addr, String), String>>,
    fail_posts: Mutex<bool>,
}

impl RecordingTransport {
    pub fn set_apps(&self, device: Ipv4Addr, xml: &str) {
        self.set_body(device, "/query/apps", xml);
    }

    pub fn set_device_info(&self, device: Ipv4Addr, xml: &str) {
        self.set_body(device, "/query/device-info", xml);
    }

    pub fn set_body(&self, device: Ipv4Addr, path: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert((device, path.to_owned()), body.to_owned());
    }

    pub fn fail_posts(&self) {
        *self.fail_posts.lock().unwrap() = true;
    }

    pub fn posted_paths(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, path)| path.clone())
            .collect()
    }

    pub fn get_count(&self, path: &str) -> usize {
        self.gets
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, requested)| requested == path)
            .count()
    }
}

impl Transport for RecordingTransport {
    async fn get(&self, device: Ipv4Addr, path: &str, _timeout: Duration) -> Result<String> {
        self.gets.lock().unwrap().push((device, path.to_owned()));
        self.bodies
            .lock()
            .unwrap()
            .get(&(device, path.to_owned()))
            .cloned()
            .ok_or_else(|| anyhow!("{device}{path} unreachable"))
    }

    async fn post(&self, device: Ipv4Addr, path: &str, _timeout: Duration) -> Result<()> {
        self.posts.lock().unwrap().push((device, path.to_owned()));
        if *self.fail_posts.lock().unwrap() {
            return Err(anyhow!("{device}{path} unreachable"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StaticProbe {
    responders: Mutex<Vec<Ipv4Addr>>,
}

impl StaticProbe {
    pub fn new(responders: &[Ipv4Addr]) -> Self {
        Self {
            responders: Mutex::new(responders.to_vec()),
        }
    }
}

impl HostProbe for StaticProbe {
    async fn responders(&self, hosts: Vec<Ipv4Addr>) -> Result<Vec<Ipv4Addr>> {
        let responders = self.responders.lock().unwrap();
        Ok(hosts
            .into_iter()
            .filter(|host| responders.contains(host))
            .collect())
    }
}

pub type TestSession = Session<RecordingTransport, StaticProbe, ScriptedConsole>;

pub fn session(
    transport: RecordingTransport,
    probe: StaticProbe,
    console: ScriptedConsole,
    data_dir: &Path,
) -> TestSession {
    let settings = SessionSettings {
        subnet_source: SubnetSource::Cidr("192.168.1.0/24".to_owned()),
        max_hosts: 254,
        escape_timeout: Duration::from_millis(100),
        presets: BTreeMap::from([('1', "12".to_owned())]),
    };
    Session::new(
        ControlClient::new(transport, ClientTimeouts::default()),
        probe,
        console,
        RegistryStore::new(data_dir.join("devices.tsv")),
        settings,
    )
}

pub fn device_info(name: &str, location: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<device-info>\
         <model-name>Roku Ultra</model-name>\
         <user-device-name>{name}</user-device-name>\
         <user-device-location>{location}</user-device-location>\
         </device-info>"
    )
}
