// Services: everything between the HTTP handlers and the host

pub mod action_dispatcher;
pub mod command_runner;
pub mod config_generator;
pub mod embedded_templates;
pub mod mirror_service;
pub mod privileged_writer;
pub mod release_service;
pub mod ssh_key_service;
pub mod store;
pub mod template_renderer;

pub use action_dispatcher::{ActionDispatcher, DispatchError};
pub use command_runner::{CommandRunner, CommandSpec, ProcessRunner};
pub use config_generator::ConfigGenerator;
pub use mirror_service::MirrorService;
pub use privileged_writer::PrivilegedWriter;
pub use release_service::ReleaseService;
pub use ssh_key_service::SshKeyService;
pub use store::JsonStore;
pub use template_renderer::TemplateRenderer;
