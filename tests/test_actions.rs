mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use common::{server, test_state, RecordingRunner, CLUSTER_CSV};
use ocp_bastion_helper::{
    models::{ClusterRecord, MirrorRegistryConfig, MirrorRegistryForm},
    services::CommandSpec,
    AppState,
};

/// Сервер с уже загруженной записью кластера
async fn seeded(dir: &Path) -> (AppState, Arc<RecordingRunner>) {
    let (state, runner) = test_state(dir);
    let record = ClusterRecord::from_csv(CLUSTER_CSV).unwrap();
    state.cluster_store.save(&record).await.unwrap();
    (state, runner)
}

async fn with_mirror(state: &AppState) {
    let form = MirrorRegistryForm {
        reg_domain: "registry.ocp4.example.com".to_string(),
        reg_port: "8443".to_string(),
        reg_user: "init".to_string(),
        reg_password: "s3cret pass".to_string(),
    };
    let config = MirrorRegistryConfig::from_form(&form).unwrap();
    state.mirror_store.save(&config).await.unwrap();
}

async fn execute(server: &TestServer, action: &str) -> (StatusCode, Value) {
    let response = server
        .post("/api/execute-action")
        .json(&json!({ "type": action }))
        .await;
    (response.status_code(), response.json())
}

/// The staged file an elevated `mv -f <staged> <target>` was going to install.
fn staged_content(runner: &RecordingRunner, target: &str) -> String {
    let mv: CommandSpec = runner
        .calls()
        .into_iter()
        .map(|call| call.spec)
        .find(|spec| spec.program == "mv" && spec.args.last().map(String::as_str) == Some(target))
        .unwrap_or_else(|| panic!("no mv into {target}"));
    assert!(mv.privileged);
    std::fs::read_to_string(&mv.args[1]).unwrap()
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    // Тест: неизвестное действие не запускает команд
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (status, body) = execute(&server, "reboot").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("reboot"));

    let response = server
        .post("/api/configure")
        .json(&json!({ "type": "rm -rf /" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_actions_require_cluster_record() {
    // Тест: без записи кластера действие возвращает 412
    let dir = TempDir::new().unwrap();
    let (state, runner) = test_state(dir.path());
    let server = server(state);

    for action in ["hostname", "ip", "dns", "chrony", "haproxy", "mirror_to_registry"] {
        let (status, body) = execute(&server, action).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED, "{action}");
        assert_eq!(body["success"], false);
    }
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_hostname_action() {
    // Тест установки имени хоста
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (status, body) = execute(&server, "hostname").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        runner.command_lines(),
        vec!["[privileged] hostnamectl set-hostname bastion1.ocp4.example.com"]
    );
}

#[tokio::test]
async fn test_hostile_record_values_never_reach_commands() {
    // Тест: опасные значения в записи отклоняются до запуска команд
    let dir = TempDir::new().unwrap();
    let (state, runner) = test_state(dir.path());
    let record = ClusterRecord::from_csv(
        "hostname_bastion,metadata_name,base_domain\nbastion1;reboot,ocp4,example.com\n",
    )
    .unwrap();
    state.cluster_store.save(&record).await.unwrap();
    let server = server(state);

    let (status, body) = execute(&server, "hostname").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_ip_action() {
    // Тест настройки статического адреса через nmcli
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (status, body) = execute(&server, "ip").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.spec.program == "nmcli" && c.spec.privileged));
    assert_eq!(
        calls[0].spec.args,
        vec![
            "connection",
            "modify",
            "enp1s0",
            "ipv4.method",
            "manual",
            "ipv4.addresses",
            "192.168.10.5/24",
            "ipv4.gateway",
            "192.168.10.1",
            "ipv4.dns",
            "192.168.10.5",
            "ipv4.dns-search",
            "ocp4.example.com",
        ]
    );
    assert_eq!(calls[1].spec.args, vec!["connection", "up", "enp1s0"]);
}

#[tokio::test]
async fn test_failed_step_stops_sequence() {
    // Тест: последовательность останавливается на первой ошибке
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    runner.fail_program("nmcli");
    let server = server(state);

    let (status, body) = execute(&server, "ip").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("step failed"));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_chrony_action() {
    // Тест записи chrony.conf и перезапуска службы
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (_, body) = execute(&server, "chrony").await;
    assert_eq!(body["success"], true);

    let content = staged_content(&runner, "/etc/chrony.conf");
    assert!(content.contains("allow 192.168.10.0/24"));

    let lines = runner.command_lines();
    assert!(lines.contains(&"[privileged] chown root:root /etc/chrony.conf".to_string()));
    assert!(lines.contains(&"[privileged] restorecon /etc/chrony.conf".to_string()));
    assert_eq!(
        lines[lines.len() - 2..],
        [
            "[privileged] systemctl enable --now chronyd".to_string(),
            "[privileged] systemctl restart chronyd".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_haproxy_action() {
    // Тест конфигурации балансировщика
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (_, body) = execute(&server, "haproxy").await;
    assert_eq!(body["success"], true);

    let content = staged_content(&runner, "/etc/haproxy/haproxy.cfg");
    assert!(content.contains("server master0 192.168.10.11:6443 check"));
    assert!(content.contains("server master2 192.168.10.13:22623 check"));
    assert!(content.contains("server worker0 192.168.10.21:443 check"));
    assert!(!content.contains("server bastion"));

    let lines = runner.command_lines();
    assert!(lines.contains(&"[privileged] setsebool -P haproxy_connect_any=1".to_string()));
    assert_eq!(lines.last().map(String::as_str), Some("[privileged] systemctl restart haproxy"));
}

#[tokio::test]
async fn test_dns_action_appends_zones_once() {
    // Тест DNS: зоны добавляются, если их еще нет
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    runner.fail_program("grep");
    let server = server(state);

    let (_, body) = execute(&server, "dns").await;
    assert_eq!(body["success"], true, "{body}");

    let calls = runner.calls();
    let tee = calls
        .iter()
        .find(|c| c.spec.program == "tee")
        .expect("zones appended with tee");
    assert_eq!(tee.spec.args, vec!["-a", "/etc/named.rfc1912.zones"]);
    let zones = tee.spec.stdin.clone().unwrap();
    assert!(zones.contains("zone \"example.com\" IN {"));
    assert!(zones.contains("zone \"10.168.192.in-addr.arpa\" IN {"));

    let forward = staged_content(&runner, "/var/named/example.com.zone");
    assert!(forward.contains("IN NS   bastion1.ocp4.example.com."));
    assert!(forward.contains("master0.ocp4        IN A    192.168.10.11"));
    assert!(forward.contains("api.ocp4            IN A    192.168.10.5"));
    // NS-запись bastion1 должна иметь адрес в зоне
    assert!(forward.contains("bastion1.ocp4        IN A    192.168.10.5"));
    assert_eq!(forward.lines().filter(|l| l.starts_with("bastion1.ocp4 ")).count(), 1);

    let reverse = staged_content(&runner, "/var/named/example.com.rev");
    assert!(reverse.contains("11      IN PTR  master0.ocp4.example.com."));
    assert!(reverse.contains("5      IN PTR  api.ocp4.example.com."));
    assert!(reverse.contains("5      IN PTR  bastion1.ocp4.example.com."));

    let sed = calls
        .iter()
        .filter(|c| c.spec.program == "sed")
        .nth(1)
        .expect("forwarder edit");
    assert!(sed
        .spec
        .args
        .iter()
        .any(|arg| arg.contains("forwarders { 8.8.8.8; };")));

    let lines = runner.command_lines();
    assert_eq!(lines.last().map(String::as_str), Some("[privileged] systemctl restart named"));
}

#[tokio::test]
async fn test_dns_action_skips_declared_zones() {
    // Тест DNS: повторный запуск не дублирует зоны
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (_, body) = execute(&server, "dns").await;
    assert_eq!(body["success"], true);
    assert!(body["output"].as_str().unwrap().contains("already declared"));
    assert!(runner.programs().iter().all(|p| p != "tee"));
}

#[tokio::test]
async fn test_ca_trust_without_cluster_record() {
    // Тест: ca_trust доступен до загрузки данных кластера
    let dir = TempDir::new().unwrap();
    let (state, runner) = test_state(dir.path());
    let server = server(state);

    let (status, body) = execute(&server, "ca_trust").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    let source = dir
        .path()
        .join("oc-mirror/mirror-registry/quay-root/quay-rootCA/rootCA.pem");
    let anchor = dir.path().join("anchors/rootCA.pem");
    assert_eq!(
        calls[0].spec.args,
        vec![
            "-f".to_string(),
            source.to_string_lossy().into_owned(),
            anchor.to_string_lossy().into_owned(),
        ]
    );
    assert_eq!(calls[1].spec.display(), "[privileged] update-ca-trust extract");
}

#[tokio::test]
async fn test_install_mirror_registry_masks_password() {
    // Тест: пароль registry не попадает в вывод
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state.clone());

    let (status, _) = execute(&server, "install_mirror_registry").await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(runner.calls().is_empty());

    with_mirror(&state).await;
    let (status, body) = execute(&server, "install_mirror_registry").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    let install = &calls[0].spec;
    assert!(install.privileged);
    assert!(install.program.ends_with("mirror-registry/mirror-registry"));
    assert_eq!(
        install.current_dir.as_deref(),
        Some(dir.path().join("oc-mirror/mirror-registry").as_path())
    );
    assert!(install.args.contains(&"bastion1.ocp4.example.com".to_string()));

    let line = install.display();
    assert!(line.contains("--initPassword ********"));
    assert!(!line.contains("s3cret"));
    assert!(!body.to_string().contains("s3cret"));
}

#[tokio::test]
async fn test_mirror_to_registry_is_detached() {
    // Тест фонового зеркалирования в registry
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    with_mirror(&state).await;
    let server = server(state);

    let (_, body) = execute(&server, "mirror_to_registry").await;
    assert_eq!(body["success"], true);

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].detached.as_deref(), Some("mirror-to-registry"));
    let mirror_images = dir.path().join("oc-mirror/mirror-images");
    assert_eq!(
        calls[0].spec.args,
        vec![
            "mirror".to_string(),
            format!("--from={}", mirror_images.display()),
            "docker://registry.ocp4.example.com:8443".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_create_agent_iso_needs_generated_configs() {
    // Тест: ISO не создается без сгенерированных файлов
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (status, body) = execute(&server, "create_agent_iso").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("has not been generated"));
    assert!(runner.calls().is_empty());

    let generated = dir.path().join("create_config");
    std::fs::write(generated.join("install-config.yaml"), "apiVersion: v1\n").unwrap();
    std::fs::write(generated.join("agent-config.yaml"), "apiVersion: v1beta1\n").unwrap();

    let (_, body) = execute(&server, "create_agent_iso").await;
    assert_eq!(body["success"], true);
    let programs = runner.programs();
    assert_eq!(programs, vec!["cp", "cp", "openshift-install"]);
}

#[tokio::test]
async fn test_apply_policy_uses_latest_results() {
    // Тест применения политик из последнего results-каталога
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (_, body) = execute(&server, "apply_policy").await;
    assert_eq!(body["success"], false);
    assert!(runner.calls().is_empty());

    let workspace = dir.path().join("oc-mirror/oc-mirror-workspace");
    std::fs::create_dir_all(workspace.join("results-1700000000")).unwrap();
    std::fs::create_dir_all(workspace.join("results-1700000900")).unwrap();

    let (_, body) = execute(&server, "apply_policy").await;
    assert_eq!(body["success"], true);

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    let kubeconfig = dir.path().join("install-agent/auth/kubeconfig");
    for call in &calls {
        assert_eq!(
            call.spec.env,
            vec![("KUBECONFIG".to_string(), kubeconfig.to_string_lossy().into_owned())]
        );
    }
    assert_eq!(
        calls[1].spec.args.last().map(String::as_str),
        Some(workspace.join("results-1700000900").to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn test_wait_install_complete_is_detached() {
    // Тест ожидания завершения установки
    let dir = TempDir::new().unwrap();
    let (state, runner) = seeded(dir.path()).await;
    let server = server(state);

    let (_, body) = execute(&server, "wait_install_complete").await;
    assert_eq!(body["success"], true);
    let calls = runner.calls();
    assert_eq!(calls[0].detached.as_deref(), Some("wait-install-complete"));
    assert_eq!(calls[0].spec.args[..3], ["agent", "wait-for", "install-complete"]);
}
