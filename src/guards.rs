//! Navigation guards.
//!
//! SYSTEM CONTEXT
//! ==============
//! Screens declare which guards protect them; the shell evaluates the chain
//! before navigating. Unauthenticated users go to `/login` with the attempted
//! URL preserved as `returnUrl`; authenticated users without access go to
//! `/unauthorized`.

#[cfg(test)]
#[path = "guards_test.rs"]
mod tests;

use reqwest::Url;

use crate::state::auth::AuthState;

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const HOME_PATH: &str = "/dashboard";

/// Target of a blocked navigation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub return_url: Option<String>,
}

impl Redirect {
    #[must_use]
    pub fn to(path: &str) -> Self {
        Self { path: path.to_owned(), return_url: None }
    }

    #[must_use]
    pub fn to_login(attempted: &str) -> Self {
        let return_url = (!attempted.is_empty() && attempted != LOGIN_PATH).then(|| attempted.to_owned());
        Self { path: LOGIN_PATH.to_owned(), return_url }
    }

    /// Path plus encoded `returnUrl` query, e.g. `/login?returnUrl=%2Fpagos`.
    #[must_use]
    pub fn href(&self) -> String {
        let Some(return_url) = &self.return_url else {
            return self.path.clone();
        };
        let Ok(mut url) = Url::parse("http://app.invalid/") else {
            return self.path.clone();
        };
        url.set_path(&self.path);
        url.query_pairs_mut().append_pair("returnUrl", return_url);
        match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    Redirect(Redirect),
}

impl GuardOutcome {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// A check run before navigating to `url`.
pub trait RouteGuard: Send + Sync {
    fn check(&self, auth: &AuthState, url: &str) -> GuardOutcome;
}

/// Requires an authenticated session.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthGuard;

impl RouteGuard for AuthGuard {
    fn check(&self, auth: &AuthState, url: &str) -> GuardOutcome {
        if auth.is_authenticated() {
            GuardOutcome::Allow
        } else {
            tracing::debug!(%url, "navigation blocked: not authenticated");
            GuardOutcome::Redirect(Redirect::to_login(url))
        }
    }
}

/// Requires the user's role to reach `module`.
#[derive(Clone, Debug)]
pub struct ModuleGuard {
    module: String,
}

impl ModuleGuard {
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self { module: module.into() }
    }
}

impl RouteGuard for ModuleGuard {
    fn check(&self, auth: &AuthState, url: &str) -> GuardOutcome {
        if !auth.is_authenticated() {
            return GuardOutcome::Redirect(Redirect::to_login(url));
        }
        if auth.has_module_access(&self.module) {
            GuardOutcome::Allow
        } else {
            tracing::debug!(%url, module = %self.module, "navigation blocked: module not allowed");
            GuardOutcome::Redirect(Redirect::to(UNAUTHORIZED_PATH))
        }
    }
}

/// Requires any one of `roles`.
#[derive(Clone, Debug)]
pub struct RoleGuard {
    roles: Vec<String>,
}

impl RoleGuard {
    #[must_use]
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { roles: roles.into_iter().map(Into::into).collect() }
    }
}

impl RouteGuard for RoleGuard {
    fn check(&self, auth: &AuthState, url: &str) -> GuardOutcome {
        if !auth.is_authenticated() {
            return GuardOutcome::Redirect(Redirect::to_login(url));
        }
        let roles: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        if auth.has_any_role(&roles) {
            GuardOutcome::Allow
        } else {
            tracing::debug!(%url, roles = ?self.roles, "navigation blocked: role not allowed");
            GuardOutcome::Redirect(Redirect::to(UNAUTHORIZED_PATH))
        }
    }
}

/// Keeps authenticated users off the login screen.
#[derive(Clone, Copy, Debug, Default)]
pub struct GuestGuard;

impl RouteGuard for GuestGuard {
    fn check(&self, auth: &AuthState, _url: &str) -> GuardOutcome {
        if auth.is_authenticated() {
            GuardOutcome::Redirect(Redirect::to(HOME_PATH))
        } else {
            GuardOutcome::Allow
        }
    }
}

/// Run guards in order; the first redirect wins.
pub fn evaluate(guards: &[&dyn RouteGuard], auth: &AuthState, url: &str) -> GuardOutcome {
    guards
        .iter()
        .map(|guard| guard.check(auth, url))
        .find(|outcome| !outcome.is_allowed())
        .unwrap_or(GuardOutcome::Allow)
}

// =============================================================================
// ROUTE TABLE
// =============================================================================

/// Path-prefix routes with their guard chains.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<(String, Vec<Box<dyn RouteGuard>>)>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The application's screens: login, then one module route per screen.
    #[must_use]
    pub fn terra_default() -> Self {
        let mut table = Self::new().route(LOGIN_PATH, vec![Box::new(GuestGuard)]);
        table = table.route(HOME_PATH, vec![Box::new(AuthGuard)]);
        for module in crate::permissions::Role::Administrador
            .modules()
            .iter()
            .chain(&["equipo-tarjetas"])
            .filter(|m| **m != "dashboard")
        {
            table = table.route(&format!("/{module}"), vec![Box::new(AuthGuard), Box::new(ModuleGuard::new(*module))]);
        }
        table
    }

    #[must_use]
    pub fn route(mut self, prefix: &str, guards: Vec<Box<dyn RouteGuard>>) -> Self {
        self.routes.push((prefix.to_owned(), guards));
        self
    }

    /// Evaluate the guards of the longest matching prefix. Unknown paths are allowed.
    pub fn navigate(&self, auth: &AuthState, url: &str) -> GuardOutcome {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let matched = self
            .routes
            .iter()
            .filter(|(prefix, _)| path == prefix.as_str() || path.starts_with(&format!("{prefix}/")))
            .max_by_key(|(prefix, _)| prefix.len());
        let Some((_, guards)) = matched else {
            return GuardOutcome::Allow;
        };
        let chain: Vec<&dyn RouteGuard> = guards.iter().map(|guard| &**guard).collect();
        evaluate(&chain, auth, url)
    }
}
