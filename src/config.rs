use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_RELEASE_MIRROR_URL: &str =
    "https://mirror.openshift.com/pub/openshift-v4/x86_64/clients/ocp/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_address: String,
    pub log_level: String,
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub key_dir: PathBuf,
    pub create_config_dir: PathBuf,
    pub install_dir: PathBuf,
    pub oc_mirror_dir: PathBuf,
    pub tool_dir: PathBuf,
    pub templates_dir: Option<PathBuf>,
    /// Program used to elevate privileged commands. `None` runs them as-is.
    pub privilege_command: Option<String>,
    pub network_interface: String,
    pub dns_forwarder: String,
    pub file_owner: Option<String>,
    pub selinux_relabel: bool,
    pub release_mirror_url: String,
    pub registry_auth_file: PathBuf,
    pub ca_anchor_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        // .env is only read when explicitly requested
        if env::var("USE_DOTENV").ok().as_deref() == Some("true") {
            dotenv::dotenv().ok();
        }

        let base_dir = PathBuf::from(env::var("BASE_DIR").unwrap_or_else(|_| "/ocp_install".to_string()));
        let home = env::var("HOME").unwrap_or_else(|_| "/root".to_string());

        let config = Config {
            server_address: env::var("SERVER_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
            data_dir: path_var("DATA_DIR", base_dir.join("data")),
            key_dir: path_var("KEY_DIR", base_dir.join("generated_keys")),
            create_config_dir: path_var("CREATE_CONFIG_DIR", base_dir.join("create_config")),
            install_dir: path_var("INSTALL_DIR", base_dir.join("install-agent")),
            oc_mirror_dir: path_var("OC_MIRROR_DIR", base_dir.join("oc-mirror")),
            tool_dir: path_var("TOOL_DIR", PathBuf::from("/usr/local/bin")),
            templates_dir: env::var("TEMPLATES_DIR").ok().map(PathBuf::from),
            privilege_command: match env::var("PRIVILEGE_COMMAND") {
                Ok(value) if value.trim().is_empty() => None,
                Ok(value) => Some(value),
                Err(_) => Some("sudo".to_string()),
            },
            network_interface: env::var("NETWORK_INTERFACE")
                .unwrap_or_else(|_| "enf1s0".to_string()),
            dns_forwarder: env::var("DNS_FORWARDER")
                .unwrap_or_else(|_| "8.8.8.8".to_string()),
            file_owner: match env::var("FILE_OWNER") {
                Ok(value) if value.trim().is_empty() => None,
                Ok(value) => Some(value),
                Err(_) => Some("root:root".to_string()),
            },
            selinux_relabel: env::var("SELINUX_RELABEL")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            release_mirror_url: env::var("RELEASE_MIRROR_URL")
                .unwrap_or_else(|_| DEFAULT_RELEASE_MIRROR_URL.to_string()),
            registry_auth_file: path_var(
                "REGISTRY_AUTH_FILE",
                Path::new(&home).join(".docker").join("config.json"),
            ),
            ca_anchor_path: path_var(
                "CA_ANCHOR_PATH",
                PathBuf::from("/etc/pki/ca-trust/source/anchors/rootCA.pem"),
            ),
            base_dir,
        };

        Ok(config)
    }

    /// Creates every directory the service writes into.
    pub fn ensure_directories(&self) -> Result<()> {
        let dirs = [
            self.data_dir.clone(),
            self.key_dir.clone(),
            self.create_config_dir.clone(),
            self.install_dir.clone(),
            self.oc_mirror_dir.join("helm"),
            self.oc_mirror_dir.join("tekton"),
            self.oc_mirror_dir.join("butane"),
            self.mirror_registry_dir(),
            self.operator_list_dir(),
            self.mirror_config_dir(),
            self.mirror_images_dir(),
            self.log_dir(),
            self.staging_dir(),
        ];
        for dir in dirs.iter() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn cluster_info_path(&self) -> PathBuf {
        self.data_dir.join("cluster_info.json")
    }

    pub fn mirror_registry_path(&self) -> PathBuf {
        self.data_dir.join("mirror_reg.json")
    }

    pub fn versions_path(&self) -> PathBuf {
        self.base_dir.join("versions.txt")
    }

    pub fn mirror_registry_dir(&self) -> PathBuf {
        self.oc_mirror_dir.join("mirror-registry")
    }

    /// `--quayRoot` of the local mirror registry; its root CA lives under `quay-rootCA/`.
    pub fn quay_root(&self) -> PathBuf {
        self.mirror_registry_dir().join("quay-root")
    }

    pub fn operator_list_dir(&self) -> PathBuf {
        self.base_dir.join("operator_lists")
    }

    pub fn mirror_config_dir(&self) -> PathBuf {
        self.oc_mirror_dir.join("mirror-config")
    }

    pub fn mirror_images_dir(&self) -> PathBuf {
        self.oc_mirror_dir.join("mirror-images")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Service-owned scratch space for files moved into place with elevation.
    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("staging")
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        self.install_dir.join("auth").join("kubeconfig")
    }
}

fn path_var(name: &str, default: PathBuf) -> PathBuf {
    env::var(name).map(PathBuf::from).unwrap_or(default)
}
