use crate::Application;
use http::Method;
use thiserror::Error;

/// Request attributes a policy backend may condition on.
#[derive(Clone, Debug)]
pub struct AccessRequest {
    pub method: Method,
    pub path: String,
}

/// Returned when a checker denies access to an application.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("access to application {app} denied")]
pub struct AccessDenied {
    pub app: String,
}

/// The caller's authorization capability: may this identity access this
/// application for this request.
///
/// One implementation per policy backend; [`RoleSet`] is the role-based
/// default. The capability is resolved from a session by the policy
/// subsystem and queried once per request.
pub trait AccessChecker: Send + Sync {
    fn check_app_access(&self, app: &Application, req: &AccessRequest) -> Result<(), AccessDenied>;
}

/// A named role carrying an allow-list of application names. `*` matches
/// any application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub apps: Vec<String>,
}

/// Role-based checker: access is granted if any role in the set allows the
/// application.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<Role>,
}

// === impl Role ===

impl Role {
    fn allows(&self, app: &str) -> bool {
        self.apps.iter().any(|a| a == "*" || a == app)
    }
}

// === impl RoleSet ===

impl RoleSet {
    pub fn new(roles: Vec<Role>) -> Self {
        Self { roles }
    }
}

impl AccessChecker for RoleSet {
    fn check_app_access(&self, app: &Application, _req: &AccessRequest) -> Result<(), AccessDenied> {
        if self.roles.iter().any(|role| role.allows(&app.name)) {
            return Ok(());
        }
        Err(AccessDenied {
            app: app.name.clone(),
        })
    }
}
