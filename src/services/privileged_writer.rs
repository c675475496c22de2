use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::CommandResult;
use crate::services::command_runner::{CommandRunner, CommandSpec, Transcript};

/// Writes files the service does not own: backup, stage, elevated move, ownership fix.
#[derive(Clone)]
pub struct PrivilegedWriter {
    runner: Arc<dyn CommandRunner>,
    staging_dir: PathBuf,
    owner: Option<String>,
    selinux_relabel: bool,
}

impl PrivilegedWriter {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        staging_dir: PathBuf,
        owner: Option<String>,
        selinux_relabel: bool,
    ) -> Self {
        Self {
            runner,
            staging_dir,
            owner,
            selinux_relabel,
        }
    }

    /// `<target>.bak_<pid>_<timestamp>`
    pub fn backup_path(target: &Path) -> PathBuf {
        let suffix = format!(
            ".bak_{}_{}",
            std::process::id(),
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        let mut name = target.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Copies an existing target aside. A missing target is not an error.
    pub async fn backup(&self, target: &Path) -> CommandResult {
        match tokio::fs::try_exists(target).await {
            Ok(true) => {}
            Ok(false) => {
                info!("No existing {} to back up", target.display());
                return CommandResult::ok(format!("no existing file to back up at {}", target.display()));
            }
            Err(e) => {
                // Unreadable parent directory; let the elevated copy decide.
                warn!("Cannot stat {}: {}", target.display(), e);
            }
        }

        let backup = Self::backup_path(target);
        let result = self
            .runner
            .run(
                &CommandSpec::privileged("cp")
                    .arg("-p")
                    .arg(target.to_string_lossy())
                    .arg(backup.to_string_lossy()),
            )
            .await;
        if result.success {
            info!("Backed up {} to {}", target.display(), backup.display());
            CommandResult::ok(format!("backed up existing file to {}", backup.display()))
        } else {
            result
        }
    }

    /// Backs up the target, then replaces it with `content`.
    pub async fn write(&self, target: &Path, content: &str) -> CommandResult {
        let mut transcript = Transcript::new();
        if !transcript.record(&format!("backup {}", target.display()), self.backup(target).await) {
            return transcript.finish();
        }
        self.replace(target, content, &mut transcript).await;
        transcript.finish()
    }

    async fn replace(&self, target: &Path, content: &str, transcript: &mut Transcript) {
        let staged = self.staging_dir.join(format!("bastion-helper-{}.tmp", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&staged, content).await {
            transcript.record(
                &format!("stage {}", staged.display()),
                CommandResult::failed(format!("failed to stage {}: {}", staged.display(), e)),
            );
            return;
        }

        let target_str = target.to_string_lossy().into_owned();
        let move_into_place = CommandSpec::privileged("mv")
            .arg("-f")
            .arg(staged.to_string_lossy())
            .arg(target_str.clone());
        if !transcript.record(&move_into_place.display(), self.runner.run(&move_into_place).await) {
            if let Err(e) = tokio::fs::remove_file(&staged).await {
                warn!("Failed to remove staged file {}: {}", staged.display(), e);
            }
            return;
        }

        if let Some(owner) = &self.owner {
            let chown = CommandSpec::privileged("chown")
                .arg(owner.clone())
                .arg(target_str.clone());
            if !transcript.record(&chown.display(), self.runner.run(&chown).await) {
                return;
            }
        }

        if self.selinux_relabel {
            let relabel = CommandSpec::privileged("restorecon").arg(target_str.clone());
            if !transcript.record(&relabel.display(), self.runner.run(&relabel).await) {
                return;
            }
        }

        info!("Wrote {} ({} bytes)", target.display(), content.len());
    }

    /// Appends `content` to the target via `tee -a`, after a backup.
    pub async fn append(&self, target: &Path, content: &str) -> CommandResult {
        let mut transcript = Transcript::new();
        if !transcript.record(&format!("backup {}", target.display()), self.backup(target).await) {
            return transcript.finish();
        }
        let tee = CommandSpec::privileged("tee")
            .arg("-a")
            .arg(target.to_string_lossy())
            .stdin(content);
        // tee echoes the content back; keep the transcript short
        let mut result = self.runner.run(&tee).await;
        result.output.clear();
        transcript.record(&tee.display(), result);
        transcript.finish()
    }
}
