#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Process wiring for the application gateway: argument parsing, logging,
//! the admin endpoints, graceful shutdown, and the single-process cluster
//! directory backing the gateway's boundary traits.

mod admin;
mod args;
mod local;

pub use self::{
    args::Args,
    local::{AppConfig, LocalCluster, LocalConfig, RoleConfig, SessionConfig},
};
