//! Input validation for operator-supplied values.
//!
//! Every value that ends up in a command argument or in a system configuration
//! file passes through one of these checks first. Commands are always built as
//! argument vectors, so these checks are what keeps a crafted value from
//! smuggling extra directives into zone files, haproxy backends or nmcli
//! connection settings.

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use thiserror::Error;

static HOSTNAME_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid regex"));
static RELEASE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("valid regex"));
static MINOR_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+$").expect("valid regex"));
static CATALOG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").expect("valid regex"));
static KEY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,63}$").expect("valid regex"));
static INTERFACE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:-]{1,15}$").expect("valid regex"));
static USER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").expect("valid regex"));
static MAC_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("valid regex"));

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind}: '{value}'")]
pub struct ValidationError {
    pub kind: &'static str,
    pub value: String,
}

impl ValidationError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

fn check(re: &Regex, kind: &'static str, value: &str) -> Result<(), ValidationError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(kind, value))
    }
}

pub fn hostname_label(value: &str) -> Result<(), ValidationError> {
    check(&HOSTNAME_LABEL, "hostname", value)
}

/// Dot-separated DNS name such as `example.com`.
pub fn dns_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.len() > 253 {
        return Err(ValidationError::new("domain name", value));
    }
    value
        .split('.')
        .try_for_each(|label| check(&HOSTNAME_LABEL, "domain name", label))
        .map_err(|_| ValidationError::new("domain name", value))
}

pub fn ipv4(value: &str) -> Result<Ipv4Addr, ValidationError> {
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| ValidationError::new("IPv4 address", value))
}

pub fn prefix_length(value: &str) -> Result<u8, ValidationError> {
    match value.parse::<u8>() {
        Ok(prefix) if prefix <= 32 => Ok(prefix),
        _ => Err(ValidationError::new("prefix length", value)),
    }
}

/// `a.b.c.d/nn`
pub fn cidr(value: &str) -> Result<(Ipv4Addr, u8), ValidationError> {
    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| ValidationError::new("CIDR", value))?;
    let addr = ipv4(addr).map_err(|_| ValidationError::new("CIDR", value))?;
    let prefix = prefix_length(prefix).map_err(|_| ValidationError::new("CIDR", value))?;
    Ok((addr, prefix))
}

pub fn release_version(value: &str) -> Result<(), ValidationError> {
    check(&RELEASE_VERSION, "release version", value)
}

pub fn minor_version(value: &str) -> Result<(), ValidationError> {
    check(&MINOR_VERSION, "minor version", value)
}

pub fn catalog_name(value: &str) -> Result<(), ValidationError> {
    check(&CATALOG_NAME, "catalog name", value)
}

/// SSH key file names: no separators, no leading dot.
pub fn key_name(value: &str) -> Result<(), ValidationError> {
    check(&KEY_NAME, "key name", value)
}

pub fn interface_name(value: &str) -> Result<(), ValidationError> {
    check(&INTERFACE_NAME, "interface name", value)
}

pub fn user_name(value: &str) -> Result<(), ValidationError> {
    check(&USER_NAME, "user name", value)
}

pub fn mac_address(value: &str) -> Result<(), ValidationError> {
    check(&MAC_ADDRESS, "MAC address", value)
}

/// `host[:port]` with a DNS name or IPv4 host.
pub fn registry_address(value: &str) -> Result<(), ValidationError> {
    let (host, port) = match value.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (value, None),
    };
    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            return Err(ValidationError::new("registry address", value));
        }
    }
    if ipv4(host).is_ok() || dns_name(host).is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("registry address", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames() {
        assert!(hostname_label("bastion1").is_ok());
        assert!(hostname_label("master-0").is_ok());
        assert!(hostname_label("-bad").is_err());
        assert!(hostname_label("bad;rm").is_err());
        assert!(hostname_label("").is_err());
    }

    #[test]
    fn domains() {
        assert!(dns_name("example.com").is_ok());
        assert!(dns_name("ocp4.example.com").is_ok());
        assert!(dns_name("example..com").is_err());
        assert!(dns_name("example.com\n@ IN NS evil.").is_err());
    }

    #[test]
    fn networks() {
        assert_eq!(ipv4("10.0.0.1").unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert!(ipv4("10.0.0.256").is_err());
        assert_eq!(cidr("192.168.1.0/24").unwrap().1, 24);
        assert!(cidr("192.168.1.0").is_err());
        assert!(cidr("192.168.1.0/33").is_err());
    }

    #[test]
    fn versions_and_names() {
        assert!(release_version("4.16.3").is_ok());
        assert!(release_version("4.16").is_err());
        assert!(release_version("4.16.3; id").is_err());
        assert!(minor_version("4.16").is_ok());
        assert!(catalog_name("redhat-operator-index").is_ok());
        assert!(catalog_name("../etc").is_err());
        assert!(key_name("id_rsa").is_ok());
        assert!(key_name("../id_rsa").is_err());
        assert!(key_name(".hidden").is_err());
        assert!(mac_address("52:54:00:aa:bb:0c").is_ok());
        assert!(mac_address("52:54:00:aa:bb").is_err());
    }

    #[test]
    fn registry_addresses() {
        assert!(registry_address("registry.example.com:8443").is_ok());
        assert!(registry_address("10.0.0.5:5000").is_ok());
        assert!(registry_address("registry.example.com").is_ok());
        assert!(registry_address("registry:port").is_err());
    }
}
