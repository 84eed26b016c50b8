#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod access;
mod app;
mod ca;
mod client;
mod error;
mod identity;
pub mod session;
pub mod tunnel;

pub use self::{
    access::{AccessChecker, AccessDenied, AccessRequest, Role, RoleSet},
    app::{Application, DEFAULT_NAMESPACE},
    ca::{CaKind, CertAuthority, CertAuthorityId, JwtAlgorithm, JwtKeyPair, NoJwtKeyPair},
    client::ClusterClient,
    error::GatewayError,
    identity::Identity,
};
