use async_trait::async_trait;
use shell_escape::escape;
use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::models::CommandResult;

const REDACTED: &str = "********";

/// A command expressed as an argument vector. Nothing here is ever handed to a shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub current_dir: Option<PathBuf>,
    /// Run through the configured elevation program.
    pub privileged: bool,
    redacted: Vec<usize>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Shorthand for a command that needs elevated privileges.
    pub fn privileged(program: impl Into<String>) -> Self {
        Self {
            privileged: true,
            ..Self::new(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// An argument that must not show up in logs or transcripts.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Shell-quoted rendering for logs, with secret arguments masked.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, escape(Cow::Borrowed(v.as_str()))))
            .collect();
        parts.push(escape(Cow::Borrowed(self.program.as_str())).into_owned());
        for (index, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&index) {
                parts.push(REDACTED.to_string());
            } else {
                parts.push(escape(Cow::Borrowed(arg.as_str())).into_owned());
            }
        }
        let line = parts.join(" ");
        if self.privileged {
            format!("[privileged] {line}")
        } else {
            line
        }
    }
}

/// Executes external commands. Implementations never return an error:
/// launch failures and non-zero exits are reported as `success = false`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture stdout/stderr. No timeout is applied.
    async fn run(&self, spec: &CommandSpec) -> CommandResult;

    /// Launch without waiting. The acknowledgment says nothing about the
    /// eventual outcome, which only reaches the log file and the service log.
    async fn spawn_detached(&self, spec: &CommandSpec, log_name: &str) -> CommandResult;
}

/// Runs commands on the local host with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    elevate: Option<String>,
    log_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new(elevate: Option<String>, log_dir: PathBuf) -> Self {
        Self { elevate, log_dir }
    }

    /// Program, arguments and environment after applying elevation.
    /// sudo resets the environment, so extra variables travel through `env K=V`.
    pub fn resolve(&self, spec: &CommandSpec) -> (String, Vec<String>, Vec<(String, String)>) {
        match (&self.elevate, spec.privileged) {
            (Some(elevate), true) => {
                let mut args = Vec::with_capacity(spec.args.len() + spec.env.len() + 2);
                if !spec.env.is_empty() {
                    args.push("env".to_string());
                    args.extend(spec.env.iter().map(|(k, v)| format!("{k}={v}")));
                }
                args.push(spec.program.clone());
                args.extend(spec.args.iter().cloned());
                (elevate.clone(), args, Vec::new())
            }
            _ => (spec.program.clone(), spec.args.clone(), spec.env.clone()),
        }
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let (program, args, env) = self.resolve(spec);
        let mut cmd = Command::new(program);
        cmd.args(args).envs(env);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandResult {
        info!("Running command: {}", spec.display());

        let mut cmd = self.command(spec);
        cmd.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch '{}': {}", spec.program, e);
                return CommandResult::failed(format!("failed to launch {}: {}", spec.program, e));
            }
        };

        // Feed stdin from its own task so a chatty child cannot block on a full stdout pipe.
        if let (Some(input), Some(mut handle)) = (spec.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = handle.write_all(input.as_bytes()).await {
                    warn!("Failed to write command stdin: {}", e);
                }
            });
        }

        match child.wait_with_output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.status.code().is_none() {
                    stderr.push_str("process terminated by signal\n");
                }
                if !output.status.success() {
                    warn!("Command '{}' exited with {}", spec.program, output.status);
                }
                CommandResult {
                    success: output.status.success(),
                    output: stdout,
                    error: stderr,
                }
            }
            Err(e) => {
                error!("Failed to wait for '{}': {}", spec.program, e);
                CommandResult::failed(format!("failed to wait for {}: {}", spec.program, e))
            }
        }
    }

    async fn spawn_detached(&self, spec: &CommandSpec, log_name: &str) -> CommandResult {
        info!("Launching detached command: {}", spec.display());

        let log_path = self.log_dir.join(format!("{log_name}.log"));
        let log_file = OpenOptions::new().create(true).append(true).open(&log_path);
        let (stdout, stderr) = match log_file.and_then(|f| Ok((f.try_clone()?, f))) {
            Ok((out, err)) => (Stdio::from(out), Stdio::from(err)),
            Err(e) => {
                warn!("Cannot open {}: {}; output goes to the service log", log_path.display(), e);
                (Stdio::inherit(), Stdio::inherit())
            }
        };

        let mut cmd = self.command(spec);
        cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch detached '{}': {}", spec.program, e);
                return CommandResult::failed(format!("failed to launch {}: {}", spec.program, e));
            }
        };

        let pid = child.id().unwrap_or_default();
        let label = log_name.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!("Detached task '{}' (pid {}) finished", label, pid),
                Ok(status) => warn!("Detached task '{}' (pid {}) exited with {}", label, pid, status),
                Err(e) => error!("Detached task '{}' (pid {}) could not be awaited: {}", label, pid, e),
            }
        });

        CommandResult::ok(format!(
            "Started in the background (pid {}). Progress is written to {}",
            pid,
            log_path.display()
        ))
    }
}

/// Accumulates the results of a multi-step action. Steps that already ran are
/// never undone; the caller stops at the first failure.
#[derive(Debug)]
pub struct Transcript {
    success: bool,
    output: String,
    error: String,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            success: true,
            output: String::new(),
            error: String::new(),
        }
    }

    /// Appends one step. Returns whether the step succeeded.
    pub fn record(&mut self, step: &str, result: CommandResult) -> bool {
        self.output.push_str(&format!("$ {step}\n"));
        self.output.push_str(&result.output);
        if !result.output.is_empty() && !result.output.ends_with('\n') {
            self.output.push('\n');
        }
        if !result.error.is_empty() {
            self.error.push_str(&result.error);
            if !result.error.ends_with('\n') {
                self.error.push('\n');
            }
        }
        if !result.success {
            self.success = false;
            self.error.push_str(&format!("step failed: {step}\n"));
        }
        result.success
    }

    pub fn note(&mut self, line: impl AsRef<str>) {
        self.output.push_str(line.as_ref());
        self.output.push('\n');
    }

    pub fn finish(self) -> CommandResult {
        CommandResult {
            success: self.success,
            output: self.output,
            error: self.error,
        }
    }
}

/// Runs `steps` in order, stopping at the first failure.
pub async fn run_sequence(runner: &dyn CommandRunner, steps: &[CommandSpec]) -> CommandResult {
    let mut transcript = Transcript::new();
    for step in steps {
        let result = runner.run(step).await;
        if !transcript.record(&step.display(), result) {
            break;
        }
    }
    transcript.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner(dir: &TempDir) -> ProcessRunner {
        ProcessRunner::new(None, dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let dir = TempDir::new().unwrap();
        let result = runner(&dir).run(&CommandSpec::new("echo").arg("hello")).await;
        assert!(result.success);
        assert_eq!(result.output, "hello\n");
        assert!(result.error.is_empty());
    }

    #[tokio::test]
    async fn reports_non_zero_exit_with_partial_output() {
        let dir = TempDir::new().unwrap();
        let spec = CommandSpec::new("sh").args(["-c", "echo partial; echo broken >&2; exit 3"]);
        let result = runner(&dir).run(&spec).await;
        assert!(!result.success);
        assert_eq!(result.output, "partial\n");
        assert_eq!(result.error, "broken\n");
    }

    #[tokio::test]
    async fn launch_failure_is_captured() {
        let dir = TempDir::new().unwrap();
        let result = runner(&dir)
            .run(&CommandSpec::new("definitely-not-a-real-binary-4242"))
            .await;
        assert!(!result.success);
        assert!(result.error.contains("failed to launch"));
    }

    #[tokio::test]
    async fn injects_environment_and_stdin() {
        let dir = TempDir::new().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "printf '%s:' \"$GREETING\"; cat"])
            .env("GREETING", "hi")
            .stdin("from stdin");
        let result = runner(&dir).run(&spec).await;
        assert!(result.success);
        assert_eq!(result.output, "hi:from stdin");
    }

    #[tokio::test]
    async fn arguments_are_not_interpreted_by_a_shell() {
        let dir = TempDir::new().unwrap();
        let result = runner(&dir)
            .run(&CommandSpec::new("echo").arg("bastion1; touch /tmp/pwned"))
            .await;
        assert_eq!(result.output, "bastion1; touch /tmp/pwned\n");
    }

    #[tokio::test]
    async fn detached_launch_returns_before_completion() {
        let dir = TempDir::new().unwrap();
        let spec = CommandSpec::new("sh").args(["-c", "sleep 1; echo done"]);
        let ack = runner(&dir).spawn_detached(&spec, "sleepy").await;
        assert!(ack.success);
        assert!(ack.output.contains("sleepy.log"));
    }

    #[test]
    fn elevation_wraps_program_and_environment() {
        let runner = ProcessRunner::new(Some("sudo".to_string()), PathBuf::from("/tmp"));
        let spec = CommandSpec::privileged("oc")
            .args(["apply", "-f", "x"])
            .env("KUBECONFIG", "/k");
        let (program, args, env) = runner.resolve(&spec);
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["env", "KUBECONFIG=/k", "oc", "apply", "-f", "x"]);
        assert!(env.is_empty());

        let unprivileged = CommandSpec::new("oc").env("KUBECONFIG", "/k");
        let (program, _, env) = runner.resolve(&unprivileged);
        assert_eq!(program, "oc");
        assert_eq!(env, vec![("KUBECONFIG".to_string(), "/k".to_string())]);
    }

    #[test]
    fn display_quotes_and_masks() {
        let spec = CommandSpec::new("mirror-registry")
            .args(["install", "--initUser", "init"])
            .arg("--initPassword")
            .secret_arg("p@ss word")
            .arg("two words");
        assert_eq!(
            spec.display(),
            "mirror-registry install --initUser init --initPassword ******** 'two words'"
        );
    }

    #[test]
    fn transcript_stops_reporting_success_after_failure() {
        let mut transcript = Transcript::new();
        assert!(transcript.record("first", CommandResult::ok("one")));
        assert!(!transcript.record("second", CommandResult::failed("boom")));
        let result = transcript.finish();
        assert!(!result.success);
        assert_eq!(result.output, "$ first\none\n$ second\n");
        assert!(result.error.contains("boom"));
        assert!(result.error.contains("step failed: second"));
    }
}
