use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::validation::{self, ValidationError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("CSV must contain at least two rows (keys and values)")]
    TooFewRows,

    #[error("column count mismatch: {keys} keys but {values} values")]
    ColumnMismatch { keys: usize, values: usize },

    #[error("duplicate key '{0}' in header row")]
    DuplicateKey(String),

    #[error("empty key in header row (column {0})")]
    EmptyKey(usize),

    #[error("invalid CSV: {0}")]
    Csv(String),

    #[error("cluster data is missing field '{0}'")]
    MissingField(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Flat key/value description of the target cluster, in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterRecord(IndexMap<String, String>);

/// A host derived from a `nodeip_<name>` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostEntry {
    pub name: String,
    pub ip: String,
    pub last_octet: u8,
}

impl ClusterRecord {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Parses the two-row layout: first row holds field names, second row values.
    /// Rows after the second are ignored.
    pub fn from_csv(input: &str) -> Result<Self, RecordError> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input.as_bytes());

        let mut rows = reader.records();
        let keys = match rows.next() {
            Some(row) => row.map_err(|e| RecordError::Csv(e.to_string()))?,
            None => return Err(RecordError::TooFewRows),
        };
        let values = match rows.next() {
            Some(row) => row.map_err(|e| RecordError::Csv(e.to_string()))?,
            None => return Err(RecordError::TooFewRows),
        };

        if keys.len() != values.len() {
            return Err(RecordError::ColumnMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }

        let mut map = IndexMap::with_capacity(keys.len());
        for (index, (key, value)) in keys.iter().zip(values.iter()).enumerate() {
            if key.is_empty() {
                return Err(RecordError::EmptyKey(index + 1));
            }
            if map.insert(key.to_string(), value.to_string()).is_some() {
                return Err(RecordError::DuplicateKey(key.to_string()));
            }
        }

        Ok(Self(map))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, RecordError> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value.trim()),
            _ => Err(RecordError::MissingField(key.to_string())),
        }
    }

    /// First present, non-empty field among `keys`.
    pub fn require_any(&self, keys: &[&str]) -> Result<&str, RecordError> {
        keys.iter()
            .find_map(|key| self.require(key).ok())
            .ok_or_else(|| RecordError::MissingField(keys.join(" | ")))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn base_domain(&self) -> Result<&str, RecordError> {
        let value = self.require("base_domain")?;
        validation::dns_name(value)?;
        Ok(value)
    }

    pub fn cluster_name(&self) -> Result<&str, RecordError> {
        let value = self.require("metadata_name")?;
        validation::hostname_label(value)?;
        Ok(value)
    }

    /// `metadata_name.base_domain`
    pub fn cluster_domain(&self) -> Result<String, RecordError> {
        Ok(format!("{}.{}", self.cluster_name()?, self.base_domain()?))
    }

    pub fn bastion_hostname(&self) -> Result<&str, RecordError> {
        let value = self.require("hostname_bastion")?;
        validation::hostname_label(value)?;
        Ok(value)
    }

    /// `hostname_bastion.metadata_name.base_domain`
    pub fn bastion_fqdn(&self) -> Result<String, RecordError> {
        Ok(format!("{}.{}", self.bastion_hostname()?, self.cluster_domain()?))
    }

    pub fn bastion_ip(&self) -> Result<Ipv4Addr, RecordError> {
        Ok(validation::ipv4(self.require("nodeip_bastion")?)?)
    }

    /// Every `nodeip_<host>` entry, validated, in upload order.
    pub fn hosts(&self) -> Result<Vec<HostEntry>, RecordError> {
        let mut hosts = Vec::new();
        for (key, value) in self.0.iter() {
            let Some(name) = key.strip_prefix("nodeip_") else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            validation::hostname_label(name)?;
            let ip = validation::ipv4(value.trim())?;
            hosts.push(HostEntry {
                name: name.to_string(),
                ip: ip.to_string(),
                last_octet: ip.octets()[3],
            });
        }
        Ok(hosts)
    }

    /// Reversed first three octets of `machine_network_cidr`, e.g. `1.168.192`.
    pub fn reverse_zone_prefix(&self) -> Result<String, RecordError> {
        let (network, _) = validation::cidr(self.require("machine_network_cidr")?)?;
        let [a, b, c, _] = network.octets();
        Ok(format!("{c}.{b}.{a}"))
    }
}

impl FromIterator<(String, String)> for ClusterRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl HostEntry {
    pub fn is_master(&self) -> bool {
        self.name.starts_with("master")
    }

    pub fn is_compute(&self) -> bool {
        self.name.starts_with("worker") || self.name.starts_with("infra")
    }
}
