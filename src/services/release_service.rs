use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::CommandResult;
use crate::services::command_runner::{run_sequence, CommandRunner, CommandSpec};
use crate::validation;

const CLIENTS_URL: &str = "https://mirror.openshift.com/pub/openshift-v4/clients";
const MIRROR_REGISTRY_URL: &str = "https://developers.redhat.com/content-gateway/rest/mirror/pub/openshift-v4/clients/mirror-registry/latest/mirror-registry.tar.gz";

static VERSION_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(4\.\d+\.\d+)/""#).expect("version pattern")
});

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("failed to fetch release listing: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a command key could not be turned into steps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandKeyError {
    #[error("Unknown command key.")]
    Unknown,

    #[error("a release version (x.y.z) is required for {0}")]
    MissingVersion(String),

    #[error(transparent)]
    InvalidVersion(#[from] validation::ValidationError),
}

/// Release versions on the public mirror plus the download/unpack steps for the client tools.
#[derive(Clone)]
pub struct ReleaseService {
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
    release_mirror_url: String,
    versions_path: PathBuf,
    install_dir: PathBuf,
    oc_mirror_dir: PathBuf,
    tool_dir: PathBuf,
}

/// `4.x.y` directory names from the mirror's HTML listing, newest first.
pub fn parse_versions(listing: &str) -> Vec<String> {
    let mut versions: Vec<(Vec<u64>, String)> = VERSION_HREF
        .captures_iter(listing)
        .filter_map(|caps| {
            let version = caps.get(1)?.as_str();
            let key = version
                .split('.')
                .map(|part| part.parse::<u64>().ok())
                .collect::<Option<Vec<_>>>()?;
            Some((key, version.to_string()))
        })
        .collect();
    versions.sort_by(|a, b| b.0.cmp(&a.0));
    versions.dedup_by(|a, b| a.0 == b.0);
    versions.into_iter().map(|(_, version)| version).collect()
}

impl ReleaseService {
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>, http: reqwest::Client) -> Self {
        Self {
            runner,
            http,
            release_mirror_url: config.release_mirror_url.trim_end_matches('/').to_string(),
            versions_path: config.versions_path(),
            install_dir: config.install_dir.clone(),
            oc_mirror_dir: config.oc_mirror_dir.clone(),
            tool_dir: config.tool_dir.clone(),
        }
    }

    /// Scrapes the release listing and records the result in `versions.txt`.
    pub async fn versions(&self) -> Result<Vec<String>, ReleaseError> {
        let url = format!("{}/", self.release_mirror_url);
        info!("Fetching release listing from {}", url);
        let listing = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let versions = parse_versions(&listing);
        let mut body = versions.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        tokio::fs::write(&self.versions_path, body)
            .await
            .map_err(|source| ReleaseError::Io {
                path: self.versions_path.display().to_string(),
                source,
            })?;
        info!("Found {} release versions", versions.len());
        Ok(versions)
    }

    fn path(&self, base: &Path, file: &str) -> String {
        base.join(file).to_string_lossy().into_owned()
    }

    fn tool_dir(&self) -> String {
        self.tool_dir.to_string_lossy().into_owned()
    }

    fn wget(&self, dir: PathBuf, url: String) -> CommandSpec {
        CommandSpec::new("wget")
            .arg("-q")
            .arg("-P")
            .arg(dir.to_string_lossy())
            .arg(url)
    }

    fn unpack(&self, archive: String, into: String) -> CommandSpec {
        CommandSpec::privileged("tar").args(["-xzf".to_string(), archive, "-C".to_string(), into])
    }

    fn release_url(&self, version: &str, file: &str) -> String {
        format!("{}/{}/{}", self.release_mirror_url, version, file)
    }

    /// The fixed step list behind a command key.
    pub fn steps(&self, key: &str, version: Option<&str>) -> Result<Vec<CommandSpec>, CommandKeyError> {
        let versioned = || -> Result<String, CommandKeyError> {
            let version = version
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CommandKeyError::MissingVersion(key.to_string()))?;
            validation::release_version(version)?;
            Ok(version.to_string())
        };

        let mirror = &self.oc_mirror_dir;
        let steps = match key {
            "download_installer_client" => {
                let version = versioned()?;
                vec![
                    self.wget(self.install_dir.clone(), self.release_url(&version, "openshift-install-linux.tar.gz")),
                    self.wget(self.install_dir.clone(), self.release_url(&version, "openshift-client-linux.tar.gz")),
                ]
            }
            "unpack_installer_client" => vec![
                self.unpack(self.path(&self.install_dir, "openshift-install-linux.tar.gz"), self.tool_dir()),
                self.unpack(self.path(&self.install_dir, "openshift-client-linux.tar.gz"), self.tool_dir()),
            ],
            "oc_version" => vec![CommandSpec::new("oc").arg("version")],
            "openshift_install_version" => vec![CommandSpec::new("openshift-install").arg("version")],
            "download_oc_mirror" => {
                let version = versioned()?;
                vec![self.wget(mirror.clone(), self.release_url(&version, "oc-mirror.tar.gz"))]
            }
            "unpack_oc_mirror" => vec![
                self.unpack(self.path(mirror, "oc-mirror.tar.gz"), self.tool_dir()),
                CommandSpec::privileged("chmod")
                    .arg("755")
                    .arg(self.path(&self.tool_dir, "oc-mirror")),
            ],
            "download_helm" => vec![self.wget(
                mirror.join("helm"),
                format!("{CLIENTS_URL}/helm/latest/helm-linux-amd64.tar.gz"),
            )],
            "unpack_helm" => vec![self
                .unpack(self.path(&mirror.join("helm"), "helm-linux-amd64.tar.gz"), self.tool_dir())
                .args(["linux-amd64/helm", "--strip-components=1"])],
            "download_tekton" => vec![self.wget(
                mirror.join("tekton"),
                format!("{CLIENTS_URL}/pipeline/latest/tkn-linux-amd64.tar.gz"),
            )],
            "unpack_tekton" => vec![self.unpack(
                self.path(&mirror.join("tekton"), "tkn-linux-amd64.tar.gz"),
                self.tool_dir(),
            )],
            "download_butane" => vec![self.wget(
                mirror.join("butane"),
                format!("{CLIENTS_URL}/butane/latest/butane"),
            )],
            "install_butane" => vec![
                CommandSpec::new("chmod")
                    .arg("755")
                    .arg(self.path(&mirror.join("butane"), "butane")),
                CommandSpec::privileged("mv")
                    .arg("-f")
                    .arg(self.path(&mirror.join("butane"), "butane"))
                    .arg(self.tool_dir()),
            ],
            "download_mirror_registry" => vec![self.wget(mirror.join("mirror-registry"), MIRROR_REGISTRY_URL.to_string())],
            "unpack_mirror_registry" => {
                let dir = mirror.join("mirror-registry");
                vec![CommandSpec::new("tar").args([
                    "-xzf".to_string(),
                    self.path(&dir, "mirror-registry.tar.gz"),
                    "-C".to_string(),
                    dir.to_string_lossy().into_owned(),
                ])]
            }
            _ => return Err(CommandKeyError::Unknown),
        };
        Ok(steps)
    }

    /// Runs the steps behind `key`, stopping at the first failure.
    pub async fn execute(&self, key: &str, version: Option<&str>) -> CommandResult {
        match self.steps(key, version) {
            Ok(steps) => {
                info!("Executing command key {}", key);
                run_sequence(self.runner.as_ref(), &steps).await
            }
            Err(e) => {
                warn!("Rejected command key '{}': {}", key, e);
                CommandResult::failed(e.to_string())
            }
        }
    }
}
