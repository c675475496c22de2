use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Body of `/api/configure` and `/api/execute-action`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub action_type: String,
}

/// Body of `/api/execute-command`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandRequest {
    pub command_key: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Hostname,
    Ip,
    Dns,
    Chrony,
    Haproxy,
    CaTrust,
    GetCaCert,
    UnpackTools,
    InstallMirrorRegistry,
    MirrorToRegistry,
    CreateAgentIso,
    WaitInstallComplete,
    ApplyPolicy,
}

impl ActionKind {
    pub const ALL: [ActionKind; 13] = [
        ActionKind::Hostname,
        ActionKind::Ip,
        ActionKind::Dns,
        ActionKind::Chrony,
        ActionKind::Haproxy,
        ActionKind::CaTrust,
        ActionKind::GetCaCert,
        ActionKind::UnpackTools,
        ActionKind::InstallMirrorRegistry,
        ActionKind::MirrorToRegistry,
        ActionKind::CreateAgentIso,
        ActionKind::WaitInstallComplete,
        ActionKind::ApplyPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Hostname => "hostname",
            ActionKind::Ip => "ip",
            ActionKind::Dns => "dns",
            ActionKind::Chrony => "chrony",
            ActionKind::Haproxy => "haproxy",
            ActionKind::CaTrust => "ca_trust",
            ActionKind::GetCaCert => "get_ca_cert",
            ActionKind::UnpackTools => "unpack_tools",
            ActionKind::InstallMirrorRegistry => "install_mirror_registry",
            ActionKind::MirrorToRegistry => "mirror_to_registry",
            ActionKind::CreateAgentIso => "create_agent_iso",
            ActionKind::WaitInstallComplete => "wait_install_complete",
            ActionKind::ApplyPolicy => "apply_policy",
        }
    }

    /// Actions that can run before any cluster data has been uploaded.
    pub fn requires_cluster_record(&self) -> bool {
        !matches!(
            self,
            ActionKind::CaTrust | ActionKind::GetCaCert | ActionKind::UnpackTools
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>(), Ok(kind));
        }
        assert!("reboot".parse::<ActionKind>().is_err());
    }

    #[test]
    fn allow_list_without_cluster_data() {
        let free: Vec<_> = ActionKind::ALL
            .iter()
            .filter(|kind| !kind.requires_cluster_record())
            .map(ActionKind::as_str)
            .collect();
        assert_eq!(free, vec!["ca_trust", "get_ca_cert", "unpack_tools"]);
    }
}
