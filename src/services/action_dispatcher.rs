use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{ActionKind, ClusterRecord, CommandResult, HostEntry, MirrorRegistryConfig, RecordError};
use crate::services::command_runner::{run_sequence, CommandRunner, CommandSpec, Transcript};
use crate::services::privileged_writer::PrivilegedWriter;
use crate::services::release_service::ReleaseService;
use crate::services::store::JsonStore;
use crate::services::template_renderer::{RenderError, TemplateRenderer};
use crate::validation::{self, ValidationError};

const NAMED_CONF: &str = "/etc/named.conf";
const NAMED_ZONES: &str = "/etc/named.rfc1912.zones";
const ZONE_DIR: &str = "/var/named";
const CHRONY_CONF: &str = "/etc/chrony.conf";
const HAPROXY_CFG: &str = "/etc/haproxy/haproxy.cfg";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown action: '{0}'")]
    UnknownAction(String),

    #[error("no cluster data: upload the cluster CSV first")]
    NoClusterData,

    #[error("no mirror registry data: configure the mirror registry first")]
    NoMirrorRegistry,

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<ValidationError> for DispatchError {
    fn from(err: ValidationError) -> Self {
        DispatchError::Record(RecordError::Invalid(err))
    }
}

#[derive(Serialize)]
struct DnsContext {
    base_domain: String,
    cluster_name: String,
    bastion_fqdn: String,
    bastion_hostname: String,
    bastion_listed: bool,
    serial: String,
    rev_ip: String,
    hosts: Vec<HostEntry>,
    reverse_hosts: Vec<HostEntry>,
    lb_ip: String,
    lb_in_zone: bool,
    lb_last_octet: u8,
}

#[derive(Serialize)]
struct HaproxyContext {
    masters: Vec<HostEntry>,
    ingress: Vec<HostEntry>,
}

#[derive(Serialize)]
struct ChronyContext {
    machine_network_cidr: String,
}

/// Maps an action name onto its fixed command or render sequence.
///
/// Every action reloads the cluster record, validates all the values it will
/// use, and only then touches the host. Multi-step actions stop at the first
/// failed step and leave earlier steps in place.
#[derive(Clone)]
pub struct ActionDispatcher {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    writer: PrivilegedWriter,
    renderer: Arc<TemplateRenderer>,
    cluster_store: JsonStore<ClusterRecord>,
    mirror_store: JsonStore<MirrorRegistryConfig>,
    releases: ReleaseService,
}

impl ActionDispatcher {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
        writer: PrivilegedWriter,
        renderer: Arc<TemplateRenderer>,
        cluster_store: JsonStore<ClusterRecord>,
        mirror_store: JsonStore<MirrorRegistryConfig>,
        releases: ReleaseService,
    ) -> Self {
        Self {
            config,
            runner,
            writer,
            renderer,
            cluster_store,
            mirror_store,
            releases,
        }
    }

    pub async fn dispatch(&self, action: &str) -> Result<CommandResult, DispatchError> {
        let kind: ActionKind = action
            .trim()
            .parse()
            .map_err(|_| DispatchError::UnknownAction(action.to_string()))?;

        let record = if kind.requires_cluster_record() {
            Some(self.cluster_store.load().await.ok_or(DispatchError::NoClusterData)?)
        } else {
            None
        };
        info!("Dispatching action {}", kind);

        let result = match (kind, record) {
            (ActionKind::Hostname, Some(record)) => self.hostname(&record).await?,
            (ActionKind::Ip, Some(record)) => self.ip(&record).await?,
            (ActionKind::Dns, Some(record)) => self.dns(&record).await?,
            (ActionKind::Chrony, Some(record)) => self.chrony(&record).await?,
            (ActionKind::Haproxy, Some(record)) => self.haproxy(&record).await?,
            (ActionKind::CaTrust, _) => self.ca_trust().await,
            (ActionKind::GetCaCert, _) => self.get_ca_cert().await,
            (ActionKind::UnpackTools, _) => self.unpack_tools().await,
            (ActionKind::InstallMirrorRegistry, Some(record)) => self.install_mirror_registry(&record).await?,
            (ActionKind::MirrorToRegistry, Some(_)) => self.mirror_to_registry().await?,
            (ActionKind::CreateAgentIso, Some(record)) => self.create_agent_iso(&record).await,
            (ActionKind::WaitInstallComplete, Some(_)) => self.wait_install_complete().await,
            (ActionKind::ApplyPolicy, Some(_)) => self.apply_policy().await,
            (_, None) => return Err(DispatchError::NoClusterData),
        };

        if result.success {
            info!("Action {} succeeded", kind);
        } else {
            warn!("Action {} failed: {}", kind, result.error.trim());
        }
        Ok(result)
    }

    async fn run_steps(&self, transcript: &mut Transcript, steps: &[CommandSpec]) -> bool {
        for step in steps {
            if !transcript.record(&step.display(), self.runner.run(step).await) {
                return false;
            }
        }
        true
    }

    fn restart_unit(unit: &str) -> [CommandSpec; 2] {
        [
            CommandSpec::privileged("systemctl").args(["enable", "--now", unit]),
            CommandSpec::privileged("systemctl").args(["restart", unit]),
        ]
    }

    async fn hostname(&self, record: &ClusterRecord) -> Result<CommandResult, DispatchError> {
        let fqdn = record.bastion_fqdn()?;
        let set_hostname = CommandSpec::privileged("hostnamectl").args(["set-hostname", fqdn.as_str()]);
        Ok(self.runner.run(&set_hostname).await)
    }

    async fn ip(&self, record: &ClusterRecord) -> Result<CommandResult, DispatchError> {
        let address = record.bastion_ip()?;
        let prefix = validation::prefix_length(record.require_any(&["prefix_bastion", "prefix_master0"])?)?;
        let gateway = validation::ipv4(record.require_any(&["gw_bastion", "gw_master0"])?)?;
        let search_domain = record.cluster_domain()?;
        let interface = self.config.network_interface.as_str();
        validation::interface_name(interface)?;

        let steps = [
            CommandSpec::privileged("nmcli").args([
                "connection".to_string(),
                "modify".to_string(),
                interface.to_string(),
                "ipv4.method".to_string(),
                "manual".to_string(),
                "ipv4.addresses".to_string(),
                format!("{address}/{prefix}"),
                "ipv4.gateway".to_string(),
                gateway.to_string(),
                // the bastion answers DNS for the cluster
                "ipv4.dns".to_string(),
                address.to_string(),
                "ipv4.dns-search".to_string(),
                search_domain,
            ]),
            CommandSpec::privileged("nmcli").args(["connection", "up", interface]),
        ];
        Ok(run_sequence(self.runner.as_ref(), &steps).await)
    }

    fn dns_context(&self, record: &ClusterRecord) -> Result<DnsContext, DispatchError> {
        let base_domain = record.base_domain()?.to_string();
        let cluster_name = record.cluster_name()?.to_string();
        let bastion_fqdn = record.bastion_fqdn()?;
        let bastion_hostname = record.bastion_hostname()?.to_string();
        let lb = record.bastion_ip()?;
        let hosts = record.hosts()?;
        let rev_ip = record.reverse_zone_prefix()?;
        let (network, _) = validation::cidr(record.require("machine_network_cidr")?)?;
        let net = network.octets();
        let in_zone = |ip: &Ipv4Addr| ip.octets()[..3] == net[..3];

        let reverse_hosts = hosts
            .iter()
            .filter(|host| host.ip.parse::<Ipv4Addr>().map(|ip| in_zone(&ip)).unwrap_or(false))
            .cloned()
            .collect();

        // The NS target needs an address record of its own.
        let bastion_listed = hosts.iter().any(|host| host.name == bastion_hostname);

        Ok(DnsContext {
            base_domain,
            cluster_name,
            bastion_fqdn,
            bastion_hostname,
            bastion_listed,
            serial: zone_serial(Utc::now()),
            rev_ip,
            hosts,
            reverse_hosts,
            lb_ip: lb.to_string(),
            lb_in_zone: in_zone(&lb),
            lb_last_octet: lb.octets()[3],
        })
    }

    async fn dns(&self, record: &ClusterRecord) -> Result<CommandResult, DispatchError> {
        let context = self.dns_context(record)?;
        let forwarder = validation::ipv4(&self.config.dns_forwarder)?;
        let zones = self.renderer.render("named.rfc1912.zones.j2", &context)?;
        let forward = self.renderer.render("domain.zone.j2", &context)?;
        let reverse = self.renderer.render("domain.rev.j2", &context)?;

        let mut transcript = Transcript::new();
        if !transcript.record(&format!("backup {NAMED_CONF}"), self.writer.backup(Path::new(NAMED_CONF)).await) {
            return Ok(transcript.finish());
        }
        let named_conf_edits = [
            CommandSpec::privileged("sed").args([
                "-i",
                "-e",
                "s/dnssec-validation yes;/dnssec-validation no;/",
                NAMED_CONF,
            ]),
            // drop earlier forwarders so repeated runs stay idempotent
            CommandSpec::privileged("sed").args([
                "-i".to_string(),
                "-e".to_string(),
                "/^[[:space:]]*forwarders[[:space:]]*{/d".to_string(),
                "-e".to_string(),
                "/^[[:space:]]*forward first;/d".to_string(),
                "-e".to_string(),
                format!("/listen-on-v6/a\\        forwarders {{ {forwarder}; }};"),
                "-e".to_string(),
                "/listen-on-v6/a\\        forward first;".to_string(),
                NAMED_CONF.to_string(),
            ]),
        ];
        if !self.run_steps(&mut transcript, &named_conf_edits).await {
            return Ok(transcript.finish());
        }

        let already_declared = CommandSpec::privileged("grep").args([
            "-q".to_string(),
            "-F".to_string(),
            format!("zone \"{}\"", context.base_domain),
            NAMED_ZONES.to_string(),
        ]);
        if self.runner.run(&already_declared).await.success {
            transcript.note(format!(
                "zones for {} already declared in {NAMED_ZONES}, not appended",
                context.base_domain
            ));
        } else if !transcript.record(
            &format!("append zones to {NAMED_ZONES}"),
            self.writer.append(Path::new(NAMED_ZONES), &zones).await,
        ) {
            return Ok(transcript.finish());
        }

        let zone_dir = Path::new(ZONE_DIR);
        for (file, content) in [
            (format!("{}.zone", context.base_domain), forward),
            (format!("{}.rev", context.base_domain), reverse),
        ] {
            let target = zone_dir.join(file);
            if !transcript.record(
                &format!("write {}", target.display()),
                self.writer.write(&target, &content).await,
            ) {
                return Ok(transcript.finish());
            }
        }

        self.run_steps(&mut transcript, &Self::restart_unit("named")).await;
        Ok(transcript.finish())
    }

    async fn write_and_restart(&self, target: &str, content: &str, extra: &[CommandSpec], unit: &str) -> CommandResult {
        let mut transcript = Transcript::new();
        if !transcript.record(&format!("write {target}"), self.writer.write(Path::new(target), content).await) {
            return transcript.finish();
        }
        if !self.run_steps(&mut transcript, extra).await {
            return transcript.finish();
        }
        self.run_steps(&mut transcript, &Self::restart_unit(unit)).await;
        transcript.finish()
    }

    async fn chrony(&self, record: &ClusterRecord) -> Result<CommandResult, DispatchError> {
        let cidr = record.require("machine_network_cidr")?;
        validation::cidr(cidr)?;
        let content = self.renderer.render(
            "chrony.conf.j2",
            &ChronyContext {
                machine_network_cidr: cidr.to_string(),
            },
        )?;
        Ok(self.write_and_restart(CHRONY_CONF, &content, &[], "chronyd").await)
    }

    async fn haproxy(&self, record: &ClusterRecord) -> Result<CommandResult, DispatchError> {
        let hosts = record.hosts()?;
        let masters: Vec<HostEntry> = hosts.iter().filter(|h| h.is_master()).cloned().collect();
        if masters.is_empty() {
            return Err(RecordError::MissingField("nodeip_master*".to_string()).into());
        }
        let compute: Vec<HostEntry> = hosts.iter().filter(|h| h.is_compute()).cloned().collect();
        // compact clusters schedule ingress on the control plane
        let ingress = if compute.is_empty() { masters.clone() } else { compute };
        let content = self
            .renderer
            .render("haproxy.cfg.j2", &HaproxyContext { masters, ingress })?;
        let allow_any_port = CommandSpec::privileged("setsebool").args(["-P", "haproxy_connect_any=1"]);
        Ok(self
            .write_and_restart(HAPROXY_CFG, &content, &[allow_any_port], "haproxy")
            .await)
    }

    fn registry_ca(&self) -> PathBuf {
        self.config.quay_root().join("quay-rootCA").join("rootCA.pem")
    }

    async fn ca_trust(&self) -> CommandResult {
        let source = self.registry_ca();
        let steps = [
            CommandSpec::privileged("cp")
                .arg("-f")
                .arg(source.to_string_lossy())
                .arg(self.config.ca_anchor_path.to_string_lossy()),
            CommandSpec::privileged("update-ca-trust").arg("extract"),
        ];
        run_sequence(self.runner.as_ref(), &steps).await
    }

    async fn get_ca_cert(&self) -> CommandResult {
        let read = CommandSpec::privileged("cat").arg(self.config.ca_anchor_path.to_string_lossy());
        self.runner.run(&read).await
    }

    async fn unpack_tools(&self) -> CommandResult {
        let mut steps = Vec::new();
        for key in ["unpack_installer_client", "unpack_oc_mirror"] {
            match self.releases.steps(key, None) {
                Ok(more) => steps.extend(more),
                Err(e) => return CommandResult::failed(e.to_string()),
            }
        }
        run_sequence(self.runner.as_ref(), &steps).await
    }

    async fn mirror_registry(&self) -> Result<MirrorRegistryConfig, DispatchError> {
        let mirror = self.mirror_store.load().await.ok_or(DispatchError::NoMirrorRegistry)?;
        validation::registry_address(&mirror.registry_url)?;
        validation::user_name(&mirror.registry_user)?;
        Ok(mirror)
    }

    async fn install_mirror_registry(&self, record: &ClusterRecord) -> Result<CommandResult, DispatchError> {
        let fqdn = record.bastion_fqdn()?;
        let mirror = self.mirror_registry().await?;
        let dir = self.config.mirror_registry_dir();

        let install = CommandSpec::privileged(dir.join("mirror-registry").to_string_lossy())
            .arg("install")
            .arg("--quayHostname")
            .arg(fqdn)
            .arg("--quayRoot")
            .arg(self.config.quay_root().to_string_lossy())
            .arg("--initUser")
            .arg(mirror.registry_user.clone())
            .arg("--initPassword")
            .secret_arg(mirror.registry_password.clone())
            .current_dir(dir);
        Ok(self.runner.run(&install).await)
    }

    async fn mirror_to_registry(&self) -> Result<CommandResult, DispatchError> {
        let mirror = self.mirror_registry().await?;
        let push = CommandSpec::new("oc")
            .arg("mirror")
            .arg(format!("--from={}", self.config.mirror_images_dir().display()))
            .arg(format!("docker://{}", mirror.registry_url))
            .current_dir(self.config.oc_mirror_dir.clone());
        Ok(self.runner.spawn_detached(&push, "mirror-to-registry").await)
    }

    async fn create_agent_iso(&self, record: &ClusterRecord) -> CommandResult {
        if let Ok(domain) = record.cluster_domain() {
            info!("Creating agent ISO for {}", domain);
        }
        let install_dir = &self.config.install_dir;
        let mut transcript = Transcript::new();
        for file in ["install-config.yaml", "agent-config.yaml"] {
            let source = self.config.create_config_dir.join(file);
            if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
                transcript.record(
                    &format!("check {}", source.display()),
                    CommandResult::failed(format!("{} has not been generated yet", source.display())),
                );
                return transcript.finish();
            }
            let copy = CommandSpec::new("cp")
                .arg("-f")
                .arg(source.to_string_lossy())
                .arg(install_dir.to_string_lossy());
            if !transcript.record(&copy.display(), self.runner.run(&copy).await) {
                return transcript.finish();
            }
        }
        let create_image = CommandSpec::new("openshift-install")
            .args(["agent", "create", "image", "--dir"])
            .arg(install_dir.to_string_lossy());
        transcript.record(&create_image.display(), self.runner.run(&create_image).await);
        transcript.finish()
    }

    async fn wait_install_complete(&self) -> CommandResult {
        let wait = CommandSpec::new("openshift-install")
            .args(["agent", "wait-for", "install-complete", "--dir"])
            .arg(self.config.install_dir.to_string_lossy());
        self.runner.spawn_detached(&wait, "wait-install-complete").await
    }

    /// Newest `results-*` directory written by `oc mirror` to a registry.
    async fn latest_mirror_results(&self) -> Option<PathBuf> {
        let workspace = self.config.oc_mirror_dir.join("oc-mirror-workspace");
        let mut entries = tokio::fs::read_dir(&workspace).await.ok()?;
        let mut latest: Option<PathBuf> = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("results-") {
                continue;
            }
            // results-<unix seconds> sorts lexically within the same width
            if latest
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|current| current.to_string_lossy().into_owned() < name)
                .unwrap_or(true)
            {
                latest = Some(entry.path());
            }
        }
        latest
    }

    async fn apply_policy(&self) -> CommandResult {
        let Some(results) = self.latest_mirror_results().await else {
            return CommandResult::failed(format!(
                "no oc-mirror results directory under {}",
                self.config.oc_mirror_dir.join("oc-mirror-workspace").display()
            ));
        };
        let kubeconfig = self.config.kubeconfig_path().to_string_lossy().into_owned();
        let steps = [
            CommandSpec::new("oc")
                .args(["patch", "OperatorHub", "cluster", "--type", "merge", "-p"])
                .arg(r#"{"spec":{"disableAllDefaultSources":true}}"#)
                .env("KUBECONFIG", kubeconfig.clone()),
            CommandSpec::new("oc")
                .args(["apply", "-f"])
                .arg(results.to_string_lossy())
                .env("KUBECONFIG", kubeconfig),
        ];
        run_sequence(self.runner.as_ref(), &steps).await
    }
}

/// Zone serial with minute resolution, `YYMMDDHHMM`, which stays within u32.
fn zone_serial(now: DateTime<Utc>) -> String {
    now.format("%y%m%d%H%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zone_serial_changes_within_the_hour() {
        let first = Utc.with_ymd_and_hms(2026, 10, 16, 12, 5, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 10, 16, 12, 40, 0).unwrap();
        assert_eq!(zone_serial(first), "2610161205");
        assert!(zone_serial(second) > zone_serial(first));
        assert!(zone_serial(second).parse::<u32>().is_ok());
    }
}
