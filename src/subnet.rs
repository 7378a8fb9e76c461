use anyhow::{Context, Result, anyhow};
use if_addrs::{IfAddr, get_if_addrs};
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

#[derive(Debug, Clone, Default)]
pub enum SubnetSource {
    #[default]
    Interface,
    Cidr(String),
    AddressMask { address: String, netmask: String },
}

impl Subnet {
    /// `network = address AND mask`, `prefix_len = popcount(mask)`.
    #[must_use]
    pub fn from_parts(address: Ipv4Addr, mask: Ipv4Addr) -> Self {
        let mask_bits = u32::from(mask);
        let network = Ipv4Addr::from(u32::from(address) & mask_bits);
        // popcount of a u32 is at most 32, so it always fits a prefix length
        let prefix_len = mask_bits.count_ones() as u8;
        Self {
            network,
            prefix_len,
        }
    }

    pub fn from_strings(address: &str, mask: &str) -> Result<Self> {
        let address = parse_dotted_quad(address)
            .with_context(|| format!("invalid interface address '{address}'"))?;
        let mask = normalize_mask(mask).with_context(|| format!("invalid netmask '{mask}'"))?;
        Ok(Self::from_parts(address, mask))
    }

    pub fn from_cidr(raw: &str) -> Result<Self> {
        let net = raw
            .trim()
            .parse::<Ipv4Net>()
            .with_context(|| format!("invalid CIDR '{raw}'"))?
            .trunc();
        Ok(Self {
            network: net.network(),
            prefix_len: net.prefix_len(),
        })
    }

    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn host_count(&self) -> u64 {
        let size = 1_u64 << (32 - u32::from(self.prefix_len));
        if self.prefix_len >= 31 { size } else { size - 2 }
    }

    pub fn hosts(&self, limit: usize) -> Result<Vec<Ipv4Addr>> {
        let net = Ipv4Net::new(self.network, self.prefix_len)
            .with_context(|| format!("invalid subnet {self}"))?
            .trunc();
        Ok(net.hosts().take(limit).collect())
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len())
    }
}

pub fn resolve(source: &SubnetSource) -> Result<Subnet> {
    match source {
        SubnetSource::Interface => resolve_from_interfaces(),
        SubnetSource::Cidr(raw) => Subnet::from_cidr(raw),
        SubnetSource::AddressMask { address, netmask } => Subnet::from_strings(address, netmask),
    }
}

fn resolve_from_interfaces() -> Result<Subnet> {
    let interfaces = get_if_addrs().context("failed to enumerate network interfaces")?;

    for interface in interfaces {
        if interface.is_loopback() {
            continue;
        }
        let IfAddr::V4(v4) = interface.addr else {
            continue;
        };
        tracing::debug!(
            interface = %interface.name,
            address = %v4.ip,
            netmask = %v4.netmask,
            "using local interface for discovery"
        );
        return Subnet::from_strings(&v4.ip.to_string(), &v4.netmask.to_string());
    }

    Err(anyhow!(
        "no non-loopback IPv4 interface found. Pass --cidr explicitly (example: --cidr 192.168.1.0/24)"
    ))
}

/// Accepts a dotted-decimal mask or a packed hex mask such as `0xffffff00`.
pub fn normalize_mask(raw: &str) -> Result<Ipv4Addr> {
    let mask = parse_mask(raw)?;
    let bits = u32::from(mask);
    // set bits must form one leading run
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(anyhow!("netmask {mask} is not contiguous"));
    }
    Ok(mask)
}

fn parse_mask(raw: &str) -> Result<Ipv4Addr> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"));

    let Some(hex) = hex else {
        return parse_dotted_quad(trimmed);
    };

    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("hex netmask '{trimmed}' contains non-hex digits"));
    }
    if hex.len() > 8 {
        return Err(anyhow!("hex netmask '{trimmed}' does not fit in 32 bits"));
    }

    let packed = u32::from_str_radix(hex, 16)
        .with_context(|| format!("hex netmask '{trimmed}' is not representable"))?;
    Ok(Ipv4Addr::from(packed))
}

pub fn parse_dotted_quad(raw: &str) -> Result<Ipv4Addr> {
    let trimmed = raw.trim();
    let parts = trimmed.split('.').collect::<Vec<_>>();
    if parts.len() != 4 {
        return Err(anyhow!("'{trimmed}' is not a dotted quad"));
    }

    let mut octets = [0_u8; 4];
    for (slot, part) in octets.iter_mut().zip(parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("octet '{part}' in '{trimmed}' is not numeric"));
        }
        let value = part
            .parse::<u32>()
            .with_context(|| format!("octet '{part}' in '{trimmed}' is out of range"))?;
        *slot = u8::try_from(value)
            .map_err(|_| anyhow!("octet '{part}' in '{trimmed}' is out of range"))?;
    }

    Ok(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::{Subnet, normalize_mask, parse_dotted_quad};
    use std::net::Ipv4Addr;

    #[test]
    fn network_is_address_and_mask() {
        let subnet = Subnet::from_strings("192.168.1.42", "255.255.255.0").unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(subnet.prefix_len(), 24);
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn wider_masks_clear_more_bits() {
        let subnet = Subnet::from_strings("10.20.30.40", "255.255.240.0").unwrap();
        assert_eq!(subnet.to_string(), "10.20.16.0/20");

        let subnet = Subnet::from_strings("172.16.5.9", "0.0.0.0").unwrap();
        assert_eq!(subnet.to_string(), "0.0.0.0/0");
    }

    #[test]
    fn packed_hex_mask_is_normalized() {
        assert_eq!(
            normalize_mask("0xffffff00").unwrap(),
            Ipv4Addr::new(255, 255, 255, 0)
        );
        assert_eq!(
            normalize_mask("0XFFFF0000").unwrap(),
            Ipv4Addr::new(255, 255, 0, 0)
        );
        let subnet = Subnet::from_strings("192.168.1.42", "0xffffff00").unwrap();
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn malformed_masks_are_rejected() {
        assert!(normalize_mask("0x").is_err());
        assert!(normalize_mask("0xfffffffff").is_err());
        assert!(normalize_mask("0xffzz0000").is_err());
        assert!(normalize_mask("255.255.256.0").is_err());
        assert!(normalize_mask("255.255.255").is_err());
    }

    #[test]
    fn non_contiguous_masks_are_rejected() {
        assert!(normalize_mask("255.0.255.0").is_err());
        assert!(normalize_mask("0xff00ff00").is_err());
        assert!(Subnet::from_strings("10.0.2.9", "255.0.255.0").is_err());
        assert_eq!(normalize_mask("0.0.0.0").unwrap(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(
            normalize_mask("255.255.255.255").unwrap(),
            Ipv4Addr::BROADCAST
        );
    }

    #[test]
    fn host_count_matches_prefix() {
        assert_eq!(Subnet::from_cidr("10.0.0.0/16").unwrap().host_count(), 65534);
        assert_eq!(Subnet::from_cidr("192.168.1.0/24").unwrap().host_count(), 254);
        assert_eq!(Subnet::from_cidr("192.168.1.0/31").unwrap().host_count(), 2);
        assert_eq!(Subnet::from_cidr("192.168.1.7/32").unwrap().host_count(), 1);
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(parse_dotted_quad("192.168.1.300").is_err());
        assert!(parse_dotted_quad("192.168.one.1").is_err());
        assert!(parse_dotted_quad("192.168..1").is_err());
        assert!(parse_dotted_quad("192.168.1.1.1").is_err());
        assert!(Subnet::from_strings("bogus", "255.255.255.0").is_err());
    }

    #[test]
    fn cidr_input_is_truncated_to_network() {
        let subnet = Subnet::from_cidr("192.168.7.99/24").unwrap();
        assert_eq!(subnet.to_string(), "192.168.7.0/24");
        assert!(Subnet::from_cidr("192.168.7.0/33").is_err());
    }

    #[test]
    fn hosts_respect_limit() {
        let subnet = Subnet::from_cidr("10.0.0.0/24").unwrap();
        let hosts = subnet.hosts(3).unwrap();
        assert_eq!(
            hosts,
            vec![
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 3)
            ]
        );
        assert_eq!(subnet.hosts(1024).unwrap().len(), 254);
    }
}
