use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{CatalogSelection, CommandResult, ImageSetRequest, OperatorEntry};
use crate::services::command_runner::{CommandRunner, CommandSpec};
use crate::services::template_renderer::{RenderError, TemplateRenderer};
use crate::validation::{self, ValidationError};

const CATALOG_REGISTRY: &str = "registry.redhat.io/redhat";

static COLUMN_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{0}")]
    Missing(&'static str),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("pull secret is not valid JSON: {0}")]
    PullSecret(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Command(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        MirrorError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Serialize)]
struct ImageSetContext<'a> {
    #[serde(rename = "storagePath")]
    storage_path: String,
    #[serde(rename = "majorVersion")]
    major_version: &'a str,
    #[serde(rename = "minVersion")]
    min_version: &'a str,
    #[serde(rename = "maxVersion")]
    max_version: &'a str,
    operators: &'a [CatalogSelection],
}

/// Rows of `oc-mirror list operators` output: header skipped, columns split on runs of 2+ spaces.
pub fn parse_operator_list(output: &str) -> Vec<OperatorEntry> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = COLUMN_GAP.split(line.trim()).collect();
            if parts.len() < 3 {
                return None;
            }
            Some(OperatorEntry {
                name: parts[0].to_string(),
                display_name: parts[1].to_string(),
                default_channel: parts[2].to_string(),
            })
        })
        .collect()
}

/// Disconnected-mirror preparation: registry credentials, operator catalogs, the
/// imageset configuration and the `oc mirror` run itself.
#[derive(Clone)]
pub struct MirrorService {
    runner: Arc<dyn CommandRunner>,
    renderer: Arc<TemplateRenderer>,
    registry_auth_file: PathBuf,
    operator_list_dir: PathBuf,
    mirror_config_dir: PathBuf,
    mirror_images_dir: PathBuf,
    storage_dir: PathBuf,
    ca_anchor_path: PathBuf,
}

impl MirrorService {
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>, renderer: Arc<TemplateRenderer>) -> Self {
        Self {
            runner,
            renderer,
            registry_auth_file: config.registry_auth_file.clone(),
            operator_list_dir: config.operator_list_dir(),
            mirror_config_dir: config.mirror_config_dir(),
            mirror_images_dir: config.mirror_images_dir(),
            storage_dir: config.oc_mirror_dir.join("metadata"),
            ca_anchor_path: config.ca_anchor_path.clone(),
        }
    }

    pub fn imageset_path(&self) -> PathBuf {
        self.mirror_config_dir.join("imagesetconfig.yaml")
    }

    /// Stores the Red Hat pull secret where `oc-mirror` looks for registry credentials.
    pub async fn apply_pull_secret(&self, pull_secret: &str) -> Result<String, MirrorError> {
        if pull_secret.trim().is_empty() {
            return Err(MirrorError::Missing("pull secret is required"));
        }
        let parsed: serde_json::Value =
            serde_json::from_str(pull_secret).map_err(|e| MirrorError::PullSecret(e.to_string()))?;
        if parsed.get("auths").and_then(|auths| auths.as_object()).is_none() {
            return Err(MirrorError::PullSecret("missing \"auths\" object".to_string()));
        }

        if let Some(parent) = self.registry_auth_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::io(parent, e))?;
        }
        let body = serde_json::to_string_pretty(&parsed)
            .map_err(|e| MirrorError::PullSecret(e.to_string()))?;
        tokio::fs::write(&self.registry_auth_file, body)
            .await
            .map_err(|e| MirrorError::io(&self.registry_auth_file, e))?;

        info!("Pull secret written to {}", self.registry_auth_file.display());
        Ok(format!(
            "✅ Pull secret saved to {}",
            self.registry_auth_file.display()
        ))
    }

    /// Lists the operators of one catalog and keeps the raw listing under `operator_lists/`.
    pub async fn list_operators(
        &self,
        catalog: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<OperatorEntry>, MirrorError> {
        let (catalog, version) = match (
            catalog.map(str::trim).filter(|c| !c.is_empty()),
            version.map(str::trim).filter(|v| !v.is_empty()),
        ) {
            (Some(catalog), Some(version)) => (catalog, version),
            _ => return Err(MirrorError::Missing("Catalog and version are required.")),
        };
        validation::catalog_name(catalog)?;
        validation::minor_version(version)?;

        let listing = CommandSpec::new("oc-mirror")
            .args(["list", "operators"])
            .arg(format!("--catalog={CATALOG_REGISTRY}/{catalog}:v{version}"));
        let result = self.runner.run(&listing).await;
        if !result.success {
            return Err(MirrorError::Command(if result.error.trim().is_empty() {
                format!("oc-mirror list operators failed for {catalog}")
            } else {
                result.error.trim().to_string()
            }));
        }

        let output_file = self
            .operator_list_dir
            .join(format!("{}.out", catalog.replace("-index", "")));
        if let Err(e) = tokio::fs::write(&output_file, &result.output).await {
            warn!("Failed to keep operator listing {}: {}", output_file.display(), e);
        }

        let operators = parse_operator_list(&result.output);
        info!("Catalog {} v{} lists {} operators", catalog, version, operators.len());
        Ok(operators)
    }

    /// Renders `imagesetconfig.yaml` for the selected release range and operators.
    pub async fn generate_imageset(&self, request: &ImageSetRequest) -> Result<String, MirrorError> {
        validation::minor_version(request.major_version.trim())?;
        validation::release_version(request.min_version.trim())?;
        validation::release_version(request.max_version.trim())?;
        for selection in &request.operators {
            validation::catalog_name(&selection.catalog)?;
        }
        // Catalog references must be complete image references for oc-mirror.
        let operators: Vec<CatalogSelection> = request
            .operators
            .iter()
            .map(|selection| CatalogSelection {
                catalog: format!(
                    "{CATALOG_REGISTRY}/{}:v{}",
                    selection.catalog,
                    request.major_version.trim()
                ),
                packages: selection.packages.clone(),
            })
            .collect();

        let context = ImageSetContext {
            storage_path: self.storage_dir.to_string_lossy().into_owned(),
            major_version: request.major_version.trim(),
            min_version: request.min_version.trim(),
            max_version: request.max_version.trim(),
            operators: &operators,
        };
        let rendered = self.renderer.render("imageset-config.yaml.j2", &context)?;

        let target = self.imageset_path();
        tokio::fs::write(&target, rendered)
            .await
            .map_err(|e| MirrorError::io(&target, e))?;
        info!("Wrote {}", target.display());
        Ok(format!(
            "✅ imagesetconfig.yaml generated in {}",
            self.mirror_config_dir.display()
        ))
    }

    /// Starts `oc mirror` to disk in the background.
    pub async fn run_mirror(&self) -> CommandResult {
        let config_file = self.imageset_path();
        if !tokio::fs::try_exists(&config_file).await.unwrap_or(false) {
            return CommandResult::failed(format!(
                "{} not found; generate the imageset configuration first",
                config_file.display()
            ));
        }
        let mirror = CommandSpec::new("oc")
            .arg("mirror")
            .arg(format!("--config={}", config_file.display()))
            .arg(format!("file://{}", self.mirror_images_dir.display()));
        let mut ack = self.runner.spawn_detached(&mirror, "oc-mirror-to-disk").await;
        if ack.success {
            ack.output = format!(
                "Mirroring process started in the background. Images will be saved to {}. {}",
                self.mirror_images_dir.display(),
                ack.output
            );
        }
        ack
    }

    /// Makes the anchored registry CA world-readable and returns it.
    pub async fn mirror_ca(&self) -> Result<String, MirrorError> {
        let path = &self.ca_anchor_path;
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(MirrorError::NotFound(format!(
                "{} not found; run the ca_trust action first",
                path.display()
            )));
        }
        let chmod = CommandSpec::privileged("chmod")
            .arg("a+r")
            .arg(path.to_string_lossy());
        let result = self.runner.run(&chmod).await;
        if !result.success {
            return Err(MirrorError::Command(format!(
                "failed to make {} readable: {}",
                path.display(),
                result.error.trim()
            )));
        }
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MirrorError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_table() {
        let output = "\
NAME                                DISPLAY NAME                          DEFAULT CHANNEL
advanced-cluster-management         Advanced Cluster Management for K8s   release-2.10
odf-operator                        OpenShift Data Foundation             stable-4.16
broken-row
";
        let operators = parse_operator_list(output);
        assert_eq!(operators.len(), 2);
        assert_eq!(operators[0].name, "advanced-cluster-management");
        assert_eq!(operators[0].display_name, "Advanced Cluster Management for K8s");
        assert_eq!(operators[1].default_channel, "stable-4.16");
    }

    #[test]
    fn header_only_output_is_empty() {
        assert!(parse_operator_list("NAME  DISPLAY NAME  DEFAULT CHANNEL\n").is_empty());
    }
}
