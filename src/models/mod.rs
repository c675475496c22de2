// Models module for the bastion helper
// Data structures shared by handlers and services

pub mod action;
pub mod cluster;
pub mod install;
pub mod mirror;
pub mod response;

pub use action::*;
pub use cluster::*;
pub use install::*;
pub use mirror::*;
pub use response::*;
