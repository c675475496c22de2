//! Configuration templates compiled into the binary, so a bare bastion only needs the executable.
//! A `TEMPLATES_DIR` may still override any of them by name.

pub const INSTALL_CONFIG: &str = include_str!("../../templates/install-config.yaml.j2");
pub const AGENT_CONFIG: &str = include_str!("../../templates/agent-config.yaml.j2");
pub const IMAGESET_CONFIG: &str = include_str!("../../templates/imageset-config.yaml.j2");

/// bind
pub const NAMED_ZONES: &str = include_str!("../../templates/named.rfc1912.zones.j2");
pub const FORWARD_ZONE: &str = include_str!("../../templates/domain.zone.j2");
pub const REVERSE_ZONE: &str = include_str!("../../templates/domain.rev.j2");

pub const CHRONY_CONF: &str = include_str!("../../templates/chrony.conf.j2");
pub const HAPROXY_CFG: &str = include_str!("../../templates/haproxy.cfg.j2");

/// All embedded templates as (name, content) pairs for registration with Tera.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[
    ("install-config.yaml.j2", INSTALL_CONFIG),
    ("agent-config.yaml.j2", AGENT_CONFIG),
    ("imageset-config.yaml.j2", IMAGESET_CONFIG),
    ("named.rfc1912.zones.j2", NAMED_ZONES),
    ("domain.zone.j2", FORWARD_ZONE),
    ("domain.rev.j2", REVERSE_ZONE),
    ("chrony.conf.j2", CHRONY_CONF),
    ("haproxy.cfg.j2", HAPROXY_CFG),
];
