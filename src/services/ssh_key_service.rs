use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::services::command_runner::{CommandRunner, CommandSpec};
use crate::validation::{self, ValidationError};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key name is required")]
    MissingName,

    #[error(transparent)]
    InvalidName(#[from] ValidationError),

    #[error("a key named '{0}' already exists")]
    AlreadyExists(String),

    #[error("no public key named '{0}'")]
    NotFound(String),

    #[error("ssh-keygen failed: {0}")]
    Generation(String),

    #[error("failed to read public key: {0}")]
    Io(#[from] std::io::Error),
}

/// RSA key pairs kept under the key directory, one `<name>` / `<name>.pub` pair each.
#[derive(Clone)]
pub struct SshKeyService {
    runner: Arc<dyn CommandRunner>,
    key_dir: PathBuf,
}

impl SshKeyService {
    pub fn new(runner: Arc<dyn CommandRunner>, key_dir: PathBuf) -> Self {
        Self { runner, key_dir }
    }

    /// Creates `<name>` and `<name>.pub`. Neither file is overwritten if it already exists.
    pub async fn generate(&self, name: Option<&str>) -> Result<PathBuf, KeyError> {
        let name = name.map(str::trim).filter(|n| !n.is_empty()).ok_or(KeyError::MissingName)?;
        validation::key_name(name)?;

        let private_key = self.key_dir.join(name);
        let public_key = self.key_dir.join(format!("{name}.pub"));
        // `<name>.pub` may itself be the private half of another pair.
        for path in [&private_key, &public_key] {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(KeyError::AlreadyExists(name.to_string()));
            }
        }

        let keygen = CommandSpec::new("ssh-keygen")
            .args(["-t", "rsa", "-b", "4096", "-q", "-N", ""])
            .arg("-f")
            .arg(private_key.to_string_lossy());
        let result = self.runner.run(&keygen).await;
        if !result.success {
            return Err(KeyError::Generation(result.error.trim().to_string()));
        }

        info!("Generated SSH key pair {}", private_key.display());
        Ok(public_key)
    }

    /// Trimmed contents of `<name>.pub`.
    pub async fn public_key(&self, name: &str) -> Result<String, KeyError> {
        // A name that could never have been generated is simply not found.
        if validation::key_name(name).is_err() {
            return Err(KeyError::NotFound(name.to_string()));
        }
        match tokio::fs::read_to_string(self.key_dir.join(format!("{name}.pub"))).await {
            Ok(content) => Ok(content.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(KeyError::NotFound(name.to_string())),
            Err(e) => Err(KeyError::Io(e)),
        }
    }
}
