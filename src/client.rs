use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CONTROL_PORT: u16 = 8060;
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, device: Ipv4Addr, path: &str, timeout: Duration) -> Result<String>;
    async fn post(&self, device: Ipv4Addr, path: &str, timeout: Duration) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    port: u16,
}

impl HttpTransport {
    pub fn new(port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self { client, port })
    }

    fn endpoint(&self, device: Ipv4Addr, path: &str) -> Result<Url> {
        let base = Url::parse(&format!("http://{device}:{}/", self.port))
            .with_context(|| format!("invalid device address {device}"))?;
        base.join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid control path '{path}'"))
    }
}

impl Transport for HttpTransport {
    async fn get(&self, device: Ipv4Addr, path: &str, timeout: Duration) -> Result<String> {
        let url = self.endpoint(device, path)?;
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} rejected"))?;
        response
            .text()
            .await
            .with_context(|| format!("failed reading body of {url}"))
    }

    async fn post(&self, device: Ipv4Addr, path: &str, timeout: Duration) -> Result<()> {
        let url = self.endpoint(device, path)?;
        self.client
            .post(url.clone())
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} rejected"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKey {
    Up,
    Down,
    Left,
    Right,
    Select,
    Play,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    Power,
    PowerOn,
    PowerOff,
    Rev,
    Fwd,
    FindRemote,
    InstantReplay,
    Home,
    Back,
    Info,
    Backspace,
    Enter,
    Lit(char),
}

const NAMED_KEYS: [(RemoteKey, &str); 21] = [
    (RemoteKey::Up, "Up"),
    (RemoteKey::Down, "Down"),
    (RemoteKey::Left, "Left"),
    (RemoteKey::Right, "Right"),
    (RemoteKey::Select, "Select"),
    (RemoteKey::Play, "Play"),
    (RemoteKey::VolumeUp, "VolumeUp"),
    (RemoteKey::VolumeDown, "VolumeDown"),
    (RemoteKey::VolumeMute, "VolumeMute"),
    (RemoteKey::Power, "Power"),
    (RemoteKey::PowerOn, "PowerOn"),
    (RemoteKey::PowerOff, "PowerOff"),
    (RemoteKey::Rev, "Rev"),
    (RemoteKey::Fwd, "Fwd"),
    (RemoteKey::FindRemote, "FindRemote"),
    (RemoteKey::InstantReplay, "InstantReplay"),
    (RemoteKey::Home, "Home"),
    (RemoteKey::Back, "Back"),
    (RemoteKey::Info, "Info"),
    (RemoteKey::Backspace, "Backspace"),
    (RemoteKey::Enter, "Enter"),
];

impl RemoteKey {
    pub fn path_segment(&self) -> String {
        if let Self::Lit(ch) = self {
            return format!("Lit_{}", percent_encode_char(*ch));
        }
        NAMED_KEYS
            .iter()
            .find(|(key, _)| key == self)
            .map(|(_, name)| (*name).to_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_segment())
    }
}

impl FromStr for RemoteKey {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if let Some(lit) = trimmed.strip_prefix("Lit_") {
            let mut chars = lit.chars();
            if let (Some(ch), None) = (chars.next(), chars.next()) {
                return Ok(Self::Lit(ch));
            }
            return Err(anyhow!("literal key '{trimmed}' must carry exactly one character"));
        }
        NAMED_KEYS
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(trimmed))
            .map(|(key, _)| *key)
            .ok_or_else(|| anyhow!("unknown key name '{trimmed}'"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    pub request: Duration,
    pub reachability: Duration,
    pub device_info: Duration,
    pub apps: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_millis(1500),
            reachability: Duration::from_millis(2000),
            device_info: Duration::from_millis(2000),
            apps: Duration::from_millis(3000),
        }
    }
}

/// Command surface for one device. Sends are best-effort; queries report failure.
#[derive(Debug, Clone)]
pub struct ControlClient<T> {
    transport: T,
    timeouts: ClientTimeouts,
}

impl<T: Transport> ControlClient<T> {
    pub const fn new(transport: T, timeouts: ClientTimeouts) -> Self {
        Self {
            transport,
            timeouts,
        }
    }

    #[cfg(test)]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn send(&self, device: Ipv4Addr, key: RemoteKey) {
        let path = format!("/keypress/{}", key.path_segment());
        self.fire(device, &path).await;
    }

    pub async fn hold_select(&self, device: Ipv4Addr) {
        self.fire(device, "/keydown/Select").await;
    }

    pub async fn launch(&self, device: Ipv4Addr, app_id: &str) {
        let path = format!("/launch/{app_id}");
        self.fire(device, &path).await;
    }

    pub async fn send_text(&self, device: Ipv4Addr, text: &str) {
        for ch in text.chars() {
            self.send(device, RemoteKey::Lit(ch)).await;
        }
    }

    pub async fn try_send(&self, device: Ipv4Addr, key: RemoteKey) -> Result<()> {
        let path = format!("/keypress/{}", key.path_segment());
        self.transport
            .post(device, &path, self.timeouts.request)
            .await
    }

    pub async fn try_launch(&self, device: Ipv4Addr, app_id: &str) -> Result<()> {
        let path = format!("/launch/{app_id}");
        self.transport
            .post(device, &path, self.timeouts.request)
            .await
    }

    pub async fn is_reachable(&self, device: Ipv4Addr) -> bool {
        match self
            .transport
            .get(device, "/query/apps", self.timeouts.reachability)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(%device, "reachability check failed: {err:#}");
                false
            }
        }
    }

    pub async fn fetch_apps(&self, device: Ipv4Addr) -> Result<String> {
        self.transport
            .get(device, "/query/apps", self.timeouts.apps)
            .await
    }

    pub async fn device_info(&self, device: Ipv4Addr) -> Result<String> {
        self.transport
            .get(device, "/query/device-info", self.timeouts.device_info)
            .await
    }

    async fn fire(&self, device: Ipv4Addr, path: &str) {
        if let Err(err) = self
            .transport
            .post(device, path, self.timeouts.request)
            .await
        {
            tracing::debug!(%device, path, "send dropped: {err:#}");
        }
    }
}

pub fn percent_encode_char(ch: char) -> String {
    let mut buf = [0_u8; 4];
    let mut encoded = String::with_capacity(12);
    for b in ch.encode_utf8(&mut buf).bytes() {
        let is_unreserved = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~');
        if is_unreserved {
            encoded.push(char::from(b));
        } else {
            let _ = write!(encoded, "%{b:02X}");
        }
    }
    encoded
}
