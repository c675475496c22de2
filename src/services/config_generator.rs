use calamine::{open_workbook_from_rs, Data, Reader, Xlsx, XlsxError};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::models::{AgentConfigForm, AgentNode, ImageContentSource, InstallConfigForm, MirrorRegistryConfig};
use crate::services::template_renderer::{RenderError, TemplateRenderer};
use crate::validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("invalid node list: {0}")]
    Nodes(String),

    #[error("invalid {field}: '{value}'")]
    Number { field: &'static str, value: String },

    #[error("cannot read workbook: {0}")]
    Workbook(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One spreadsheet row, keyed by column header.
pub type NodeRow = IndexMap<String, Value>;

#[derive(Debug, Serialize)]
struct InstallConfigContext {
    #[serde(rename = "baseDomain")]
    base_domain: String,
    #[serde(rename = "metadataName")]
    metadata_name: String,
    #[serde(rename = "machineNetworkCIDR")]
    machine_network_cidr: String,
    #[serde(rename = "clusterNetworkCIDR")]
    cluster_network_cidr: String,
    #[serde(rename = "serviceNetwork")]
    service_network: String,
    #[serde(rename = "hostPrefix")]
    host_prefix: u8,
    #[serde(rename = "masterReplicas")]
    master_replicas: u32,
    #[serde(rename = "workerReplicas")]
    worker_replicas: u32,
    #[serde(rename = "pullSecret")]
    pull_secret: String,
    #[serde(rename = "sshKey")]
    ssh_key: String,
    #[serde(rename = "additionalTrustBundle")]
    additional_trust_bundle: Option<String>,
    proxy_enabled: bool,
    #[serde(rename = "httpProxy")]
    http_proxy: Option<String>,
    #[serde(rename = "httpsProxy")]
    https_proxy: Option<String>,
    #[serde(rename = "noProxy")]
    no_proxy: Option<String>,
    #[serde(rename = "imageContentSources")]
    image_content_sources: Vec<ImageContentSource>,
}

#[derive(Debug, Serialize)]
struct AgentConfigContext {
    metadata_name: String,
    #[serde(rename = "rendezvousIP")]
    rendezvous_ip: String,
    #[serde(rename = "additionalNTPSources")]
    additional_ntp_sources: Vec<String>,
    nodes: Vec<AgentNode>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn or_default(value: &Option<String>, default: &str) -> String {
    non_empty(value).unwrap_or_else(|| default.to_string())
}

fn number<T: std::str::FromStr>(field: &'static str, value: &Option<String>, default: &str) -> Result<T, ConfigError> {
    let raw = or_default(value, default);
    raw.parse().map_err(|_| ConfigError::Number { field, value: raw })
}

/// Normalises and validates the node list posted by the agent-config form.
pub fn parse_nodes(nodes_data: Option<&str>) -> Result<Vec<AgentNode>, ConfigError> {
    let raw = nodes_data.map(str::trim).filter(|n| !n.is_empty()).unwrap_or("[]");
    let mut nodes: Vec<AgentNode> = serde_json::from_str(raw).map_err(|e| ConfigError::Nodes(e.to_string()))?;
    for node in nodes.iter_mut() {
        node.role = match node.role.trim() {
            "master" => "master".to_string(),
            // infra nodes join as workers and are labelled after install
            "worker" | "infra" => "worker".to_string(),
            other => return Err(ConfigError::Nodes(format!("unknown role '{other}' for {}", node.hostname))),
        };
        validation::dns_name(node.hostname.trim())?;
        for iface in &node.interfaces {
            validation::interface_name(&iface.name)?;
            validation::mac_address(&iface.mac_address)?;
        }
    }
    Ok(nodes)
}

/// Reads the first worksheet: the header row names the columns, every further
/// non-blank row becomes one object.
pub fn read_workbook(bytes: &[u8]) -> Result<Vec<NodeRow>, ConfigError> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).map_err(|e: XlsxError| ConfigError::Workbook(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ConfigError::Workbook("workbook has no sheets".to_string()))?
        .map_err(|e| ConfigError::Workbook(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(index, cell)| match cell {
                Data::Empty => format!("Unnamed: {index}"),
                other => other.to_string(),
            })
            .collect(),
        None => return Ok(Vec::new()),
    };

    let records = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(index, header)| (header.clone(), row.get(index).map(cell_value).unwrap_or(Value::Null)))
                .collect()
        })
        .collect();
    Ok(records)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

/// Renders install-config.yaml and agent-config.yaml into the create_config directory.
#[derive(Clone)]
pub struct ConfigGenerator {
    renderer: Arc<TemplateRenderer>,
    output_dir: PathBuf,
}

impl ConfigGenerator {
    pub fn new(renderer: Arc<TemplateRenderer>, output_dir: PathBuf) -> Self {
        Self { renderer, output_dir }
    }

    pub fn install_config_path(&self) -> PathBuf {
        self.output_dir.join("install-config.yaml")
    }

    pub fn agent_config_path(&self) -> PathBuf {
        self.output_dir.join("agent-config.yaml")
    }

    /// With `secret_type=mirror_secret` the mirror registry's content sources are
    /// added, and its credentials stand in for an empty pull secret.
    pub async fn install_config(
        &self,
        form: &InstallConfigForm,
        mirror: Option<&MirrorRegistryConfig>,
    ) -> Result<PathBuf, ConfigError> {
        let base_domain = form.base_domain.trim();
        let metadata_name = form.metadata_name.trim();
        if base_domain.is_empty() {
            return Err(ConfigError::Missing("baseDomain"));
        }
        if metadata_name.is_empty() {
            return Err(ConfigError::Missing("metadataName"));
        }
        validation::dns_name(base_domain)?;
        validation::hostname_label(metadata_name)?;
        validation::cidr(form.machine_network_cidr.trim())?;
        let cluster_network_cidr = or_default(&form.cluster_network_cidr, "10.128.0.0/14");
        validation::cidr(&cluster_network_cidr)?;
        let service_network = or_default(&form.service_network, "172.30.0.0/16");
        validation::cidr(&service_network)?;
        let host_prefix = validation::prefix_length(&or_default(&form.host_prefix, "23"))?;

        let use_mirror = form.secret_type.as_deref() == Some("mirror_secret");
        let image_content_sources = match (use_mirror, mirror) {
            (true, Some(mirror)) => mirror.image_content_sources.clone(),
            _ => Vec::new(),
        };
        let pull_secret = match (non_empty(&form.pull_secret), use_mirror, mirror) {
            (Some(secret), _, _) => secret,
            (None, true, Some(mirror)) => mirror.pull_secret().to_string(),
            _ => return Err(ConfigError::Missing("pullSecret")),
        };
        let ssh_key = non_empty(&form.ssh_key).ok_or(ConfigError::Missing("sshKey"))?;

        let context = InstallConfigContext {
            base_domain: base_domain.to_string(),
            metadata_name: metadata_name.to_string(),
            machine_network_cidr: form.machine_network_cidr.trim().to_string(),
            cluster_network_cidr,
            service_network,
            host_prefix,
            master_replicas: number("masterReplicas", &form.master_replicas, "3")?,
            worker_replicas: number("workerReplicas", &form.worker_replicas, "2")?,
            pull_secret,
            ssh_key,
            additional_trust_bundle: non_empty(&form.additional_trust_bundle),
            // an HTML checkbox is only submitted when ticked
            proxy_enabled: form.proxy_enabled.is_some(),
            http_proxy: non_empty(&form.http_proxy),
            https_proxy: non_empty(&form.https_proxy),
            no_proxy: non_empty(&form.no_proxy),
            image_content_sources,
        };

        let rendered = self.renderer.render("install-config.yaml.j2", &context)?;
        let target = self.install_config_path();
        self.write(&target, rendered).await?;
        Ok(target)
    }

    pub async fn agent_config(&self, form: &AgentConfigForm) -> Result<PathBuf, ConfigError> {
        let metadata_name = form.metadata_name.trim();
        if metadata_name.is_empty() {
            return Err(ConfigError::Missing("metadata_name"));
        }
        validation::hostname_label(metadata_name)?;
        let rendezvous_ip = validation::ipv4(form.rendezvous_ip.trim())?;
        let nodes = parse_nodes(form.nodes_data.as_deref())?;

        let additional_ntp_sources = form
            .additional_ntp_sources
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|source| !source.is_empty())
            .map(|source| {
                if validation::ipv4(source).is_ok() || validation::dns_name(source).is_ok() {
                    Ok(source.to_string())
                } else {
                    Err(ConfigError::Invalid(ValidationError {
                        kind: "NTP source",
                        value: source.to_string(),
                    }))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let context = AgentConfigContext {
            metadata_name: metadata_name.to_string(),
            rendezvous_ip: rendezvous_ip.to_string(),
            additional_ntp_sources,
            nodes,
        };
        let rendered = self.renderer.render("agent-config.yaml.j2", &context)?;
        let target = self.agent_config_path();
        self.write(&target, rendered).await?;
        Ok(target)
    }

    async fn write(&self, target: &Path, content: String) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: target.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(io_error)?;
        tokio::fs::write(target, content).await.map_err(io_error)?;
        info!("Generated {}", target.display());
        Ok(())
    }
}
