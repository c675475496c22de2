use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::validation::{self, ValidationError};

const RELEASE_SOURCE: &str = "quay.io/openshift-release-dev/ocp-v4.0-art-dev";
const RELEASE_IMAGES_SOURCE: &str = "quay.io/openshift-release-dev/ocp-release";

/// Form posted to `/configure-mirror`.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorRegistryForm {
    pub reg_domain: String,
    pub reg_port: String,
    pub reg_user: String,
    pub reg_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContentSource {
    pub source: String,
    pub mirrors: Vec<String>,
}

/// Persisted as `mirror_reg.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRegistryConfig {
    pub registry_url: String,
    pub registry_user: String,
    pub registry_password: String,
    #[serde(rename = "imageContentSources", default)]
    pub image_content_sources: Vec<ImageContentSource>,
}

impl MirrorRegistryConfig {
    pub fn from_form(form: &MirrorRegistryForm) -> Result<Self, ValidationError> {
        let registry_url = format!("{}:{}", form.reg_domain.trim(), form.reg_port.trim());
        validation::registry_address(&registry_url)?;
        validation::user_name(form.reg_user.trim())?;

        Ok(Self {
            image_content_sources: vec![
                ImageContentSource {
                    source: RELEASE_SOURCE.to_string(),
                    mirrors: vec![format!("{registry_url}/openshift/release")],
                },
                ImageContentSource {
                    source: RELEASE_IMAGES_SOURCE.to_string(),
                    mirrors: vec![format!("{registry_url}/openshift/release-images")],
                },
            ],
            registry_url,
            registry_user: form.reg_user.trim().to_string(),
            registry_password: form.reg_password.clone(),
        })
    }

    /// Pull secret authenticating against the mirror registry only.
    pub fn pull_secret(&self) -> serde_json::Value {
        let auth = general_purpose::STANDARD
            .encode(format!("{}:{}", self.registry_user, self.registry_password));
        let mut auths = serde_json::Map::new();
        auths.insert(self.registry_url.clone(), json!({ "auth": auth }));
        json!({ "auths": auths })
    }
}
