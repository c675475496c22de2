// HTTP handlers, one module per area of the bootstrap flow

pub mod action_handler;
pub mod cluster_handler;
pub mod config_handler;
pub mod health_handler;
pub mod mirror_handler;
pub mod release_handler;
pub mod ssh_key_handler;
pub mod upload_handler;
