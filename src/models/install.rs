use serde::{Deserialize, Serialize};

/// Form posted to `/generate-install-config`. Checkbox fields are present only when ticked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallConfigForm {
    #[serde(rename = "baseDomain")]
    pub base_domain: String,
    #[serde(rename = "metadataName")]
    pub metadata_name: String,
    #[serde(rename = "machineNetworkCIDR")]
    pub machine_network_cidr: String,
    #[serde(rename = "clusterNetworkCIDR")]
    pub cluster_network_cidr: Option<String>,
    #[serde(rename = "serviceNetwork")]
    pub service_network: Option<String>,
    #[serde(rename = "hostPrefix")]
    pub host_prefix: Option<String>,
    #[serde(rename = "masterReplicas")]
    pub master_replicas: Option<String>,
    #[serde(rename = "workerReplicas")]
    pub worker_replicas: Option<String>,
    #[serde(rename = "pullSecret")]
    pub pull_secret: Option<String>,
    #[serde(rename = "sshKey")]
    pub ssh_key: Option<String>,
    #[serde(rename = "additionalTrustBundle")]
    pub additional_trust_bundle: Option<String>,
    pub secret_type: Option<String>,
    pub proxy_enabled: Option<String>,
    #[serde(rename = "httpProxy")]
    pub http_proxy: Option<String>,
    #[serde(rename = "httpsProxy")]
    pub https_proxy: Option<String>,
    #[serde(rename = "noProxy")]
    pub no_proxy: Option<String>,
}

/// Form posted to `/generate-agent-config`; `nodes_data` is the JSON node list built by the UI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfigForm {
    pub metadata_name: String,
    #[serde(rename = "rendezvousIP")]
    pub rendezvous_ip: String,
    #[serde(rename = "additionalNTPSources")]
    pub additional_ntp_sources: Option<String>,
    pub nodes_data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootDeviceHints {
    #[serde(rename = "deviceName", default)]
    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInterface {
    pub name: String,
    #[serde(rename = "macAddress")]
    pub mac_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNode {
    pub role: String,
    pub hostname: String,
    #[serde(rename = "rootDeviceHints", default)]
    pub root_device_hints: RootDeviceHints,
    #[serde(default)]
    pub interfaces: Vec<NodeInterface>,
    /// nmstate document, passed through untouched
    #[serde(rename = "networkConfig", default)]
    pub network_config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSelection {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSelection {
    pub catalog: String,
    #[serde(default)]
    pub packages: Vec<PackageSelection>,
}

/// Body of `/api/generate-imageset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSetRequest {
    #[serde(rename = "majorVersion")]
    pub major_version: String,
    #[serde(rename = "minVersion")]
    pub min_version: String,
    #[serde(rename = "maxVersion")]
    pub max_version: String,
    #[serde(default)]
    pub operators: Vec<CatalogSelection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListOperatorsRequest {
    pub catalog: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullSecretRequest {
    pub pull_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshKeyRequest {
    pub key_name: Option<String>,
}

/// One row of `oc-mirror list operators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorEntry {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "defaultChannel")]
    pub default_channel: String,
}
