// Общие помощники для интеграционных тестов
#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ocp_bastion_helper::{
    build_router,
    models::CommandResult,
    services::{CommandRunner, CommandSpec},
    AppState, Config,
};

pub const CLUSTER_CSV: &str = "hostname_bastion,metadata_name,base_domain,machine_network_cidr,nodeip_bastion,prefix_bastion,gw_bastion,nodeip_master0,nodeip_master1,nodeip_master2,nodeip_worker0\n\
bastion1,ocp4,example.com,192.168.10.0/24,192.168.10.5,24,192.168.10.1,192.168.10.11,192.168.10.12,192.168.10.13,192.168.10.21\n";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub spec: CommandSpec,
    pub detached: Option<String>,
}

/// Записывает команды вместо запуска.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Recorded>>,
    failing: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command whose program ends with `program` fails.
    pub fn fail_program(&self, program: &str) {
        self.failing.lock().unwrap().push(program.to_string());
    }

    /// Canned stdout for `program`.
    pub fn respond(&self, program: &str, stdout: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(program.to_string(), stdout.to_string());
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.spec.program).collect()
    }

    /// `display()` of every recorded command, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.spec.display()).collect()
    }

    fn record(&self, spec: &CommandSpec, detached: Option<&str>) {
        self.calls.lock().unwrap().push(Recorded {
            spec: spec.clone(),
            detached: detached.map(str::to_string),
        });
    }

    fn fails(&self, spec: &CommandSpec) -> bool {
        self.failing
            .lock()
            .unwrap()
            .iter()
            .any(|program| spec.program.ends_with(program.as_str()))
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandResult {
        self.record(spec, None);
        if self.fails(spec) {
            return CommandResult::failed(format!("{} failed", spec.program));
        }
        let stdout = self
            .responses
            .lock()
            .unwrap()
            .get(&spec.program)
            .cloned()
            .unwrap_or_default();
        CommandResult::ok(stdout)
    }

    async fn spawn_detached(&self, spec: &CommandSpec, log_name: &str) -> CommandResult {
        self.record(spec, Some(log_name));
        if self.fails(spec) {
            return CommandResult::failed(format!("failed to launch {}", spec.program));
        }
        CommandResult::ok(format!("Started in the background (pid 4242). Progress is written to {log_name}.log"))
    }
}

/// Создает тестовую конфигурацию внутри временного каталога
pub fn test_config(dir: &Path) -> Config {
    Config {
        server_address: "127.0.0.1:0".to_string(),
        log_level: "info".to_string(),
        base_dir: dir.to_path_buf(),
        data_dir: dir.join("data"),
        key_dir: dir.join("generated_keys"),
        create_config_dir: dir.join("create_config"),
        install_dir: dir.join("install-agent"),
        oc_mirror_dir: dir.join("oc-mirror"),
        tool_dir: dir.join("bin"),
        templates_dir: None,
        privilege_command: Some("sudo".to_string()),
        network_interface: "enp1s0".to_string(),
        dns_forwarder: "8.8.8.8".to_string(),
        file_owner: Some("root:root".to_string()),
        selinux_relabel: true,
        release_mirror_url: "http://127.0.0.1:9/".to_string(),
        registry_auth_file: dir.join("docker").join("config.json"),
        ca_anchor_path: dir.join("anchors").join("rootCA.pem"),
    }
}

/// Создает AppState с записывающим исполнителем команд
pub fn test_state(dir: &Path) -> (AppState, Arc<RecordingRunner>) {
    let config = test_config(dir);
    config.ensure_directories().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let state = AppState::new(config, runner.clone()).unwrap();
    (state, runner)
}

pub fn server(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).unwrap()
}
