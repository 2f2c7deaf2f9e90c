//! Address types shared by both registries.

use crate::error::{ClusterError, ClusterResult, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

pub const IPV4_MAX_PREFIX: u8 = 32;
pub const IPV6_MAX_PREFIX: u8 = 128;

/// Which shared file an address lives in; each class has its own lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Private,
    Public,
}

impl AddressClass {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressClass::Private => "private",
            AddressClass::Public => "public",
        }
    }

    /// Name of the mutation lock guarding this class.
    pub fn lock_name(self) -> &'static str {
        match self {
            AddressClass::Private => "ctdb_private_config_lock",
            AddressClass::Public => "ctdb_public_config_lock",
        }
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a user supplied address, reporting failures against `field`.
pub fn parse_ip(field: &str, raw: &str) -> ClusterResult<IpAddr> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|_| ClusterError::validation(field, format!("\"{raw}\" is not a valid IP address")))
}

pub fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => IPV4_MAX_PREFIX,
        IpAddr::V6(_) => IPV6_MAX_PREFIX,
    }
}

/// Private node address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrivateAddress {
    pub ip: IpAddr,
}

impl PrivateAddress {
    pub fn new(ip: IpAddr) -> Self {
        Self { ip }
    }

    pub fn parse(raw: &str) -> ClusterResult<Self> {
        Ok(Self::new(parse_ip("node_create.ip", raw)?))
    }
}

/// Public address candidate for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAddress {
    pub ip: IpAddr,
    pub netmask: u8,
    pub interface: String,
}

impl PublicAddress {
    pub fn parse(ip: &str, netmask: u8, interface: &str) -> ClusterResult<Self> {
        let candidate = Self {
            ip: parse_ip("node_create.ip", ip)?,
            netmask,
            interface: interface.trim().to_string(),
        };
        candidate.validate_format()?;
        Ok(candidate)
    }

    /// [`PublicAddress::parse`] for a netmask taken from user input before
    /// narrowing, so `300` is a netmask validation failure like `33`.
    pub fn parse_wide(ip: &str, netmask: u32, interface: &str) -> ClusterResult<Self> {
        match u8::try_from(netmask) {
            Ok(netmask) => Self::parse(ip, netmask, interface),
            Err(_) => Err(ClusterError::validation(
                "node_create.netmask",
                format!("The netmask: \"{netmask}\" for \"{}\" is invalid.", ip.trim()),
            )),
        }
    }

    /// Shape checks that need no host state: prefix range and a
    /// non-empty interface name.
    pub fn validate_format(&self) -> ClusterResult<()> {
        let mut errors = ValidationErrors::new();
        if self.netmask > max_prefix(&self.ip) {
            errors.add(
                "node_create.netmask",
                format!(
                    "The netmask: \"{}\" for \"{}\" is invalid.",
                    self.netmask, self.ip
                ),
            );
        }
        if self.interface.is_empty() || self.interface.contains(char::is_whitespace) {
            errors.add(
                "node_create.interface",
                format!("\"{}\" is not a valid interface name", self.interface),
            );
        }
        errors.check()
    }
}

/// Public address as reported by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIpRecord {
    pub ip: IpAddr,
    pub netmask: Option<u8>,
    pub interfaces: Vec<String>,
    /// Node currently hosting the address, when the daemon reports it.
    pub node: Option<i64>,
}

impl From<&PublicAddress> for PublicIpRecord {
    fn from(addr: &PublicAddress) -> Self {
        Self {
            ip: addr.ip,
            netmask: Some(addr.netmask),
            interfaces: vec![addr.interface.clone()],
            node: None,
        }
    }
}

/// Optional equality filters for public queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    pub ip: Option<IpAddr>,
    pub interface: Option<String>,
}

impl AddressFilter {
    pub fn matches(&self, record: &PublicIpRecord) -> bool {
        if let Some(ip) = self.ip {
            if record.ip != ip {
                return false;
            }
        }
        if let Some(interface) = &self.interface {
            if !record.interfaces.iter().any(|i| i == interface) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv6_prefix_bounds() {
        let ok = PublicAddress::parse("fd00::10", 128, "eno1");
        assert!(ok.is_ok());
        let err = PublicAddress::parse("fd00::10", 129, "eno1").expect_err("129 is too wide");
        assert!(matches!(err, ClusterError::Validation(_)));
    }

    #[test]
    fn ipv4_prefix_bounds() {
        assert!(PublicAddress::parse("10.0.0.5", 32, "eno1").is_ok());
        assert!(PublicAddress::parse("10.0.0.5", 0, "eno1").is_ok());
        assert!(PublicAddress::parse("10.0.0.5", 33, "eno1").is_err());
    }

    #[test]
    fn malformed_ip_is_a_validation_error() {
        let err = PrivateAddress::parse("10.0.0.300").expect_err("octet out of range");
        assert!(matches!(err, ClusterError::Validation(_)));
        assert!(PublicAddress::parse("not-an-ip", 24, "eno1").is_err());
    }

    #[test]
    fn oversized_netmask_is_a_validation_error() {
        let err = PublicAddress::parse_wide("10.0.0.5", 300, "eno1").unwrap_err();
        match &err {
            ClusterError::Validation(inner) => {
                assert_eq!(inner.errors()[0].field, "node_create.netmask")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let ok = PublicAddress::parse_wide("10.0.0.5", 24, "eno1").unwrap();
        assert_eq!(ok.netmask, 24);
    }

    #[test]
    fn ipv6_is_compared_by_value() {
        let a = PrivateAddress::parse("fe80::0001").unwrap();
        let b = PrivateAddress::parse("fe80::1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ip.to_string(), "fe80::1");
    }

    #[test]
    fn filter_matches_ip_and_interface() {
        let record = PublicIpRecord {
            ip: "10.0.0.5".parse().unwrap(),
            netmask: Some(24),
            interfaces: vec!["eno1".into()],
            node: None,
        };
        assert!(AddressFilter::default().matches(&record));
        let by_iface = AddressFilter {
            ip: None,
            interface: Some("eno2".into()),
        };
        assert!(!by_iface.matches(&record));
        let by_ip = AddressFilter {
            ip: Some("10.0.0.5".parse().unwrap()),
            interface: Some("eno1".into()),
        };
        assert!(by_ip.matches(&record));
    }
}
