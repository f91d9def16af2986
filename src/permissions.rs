//! Role, module and action authorization rules.
//!
//! DESIGN
//! ======
//! Module access is a hard-coded allow-list per role. Permission strings are
//! opaque dotted tokens (`pagos.crear`) checked by membership; they can add
//! actions inside a reachable module but never open a module the role's list
//! excludes. Role names compare case-insensitively.

#[cfg(test)]
#[path = "permissions_test.rs"]
mod tests;

use crate::net::types::UserProfile;

pub const ROLE_ADMIN: &str = "administrador";
pub const ROLE_SUPERVISOR: &str = "supervisor";
pub const ROLE_TEAM: &str = "equipo";

const ADMIN_MODULES: &[&str] = &[
    "dashboard",
    "usuarios",
    "clientes",
    "proveedores",
    "servicios",
    "cuentas-bancarias",
    "tarjetas",
    "pagos",
    "documentos",
    "correos",
    "eventos",
    "reportes",
    "configuracion",
];

const SUPERVISOR_MODULES: &[&str] = &[
    "dashboard",
    "clientes",
    "proveedores",
    "servicios",
    "cuentas-bancarias",
    "tarjetas",
    "pagos",
    "documentos",
    "correos",
    "eventos",
    "reportes",
];

const TEAM_MODULES: &[&str] = &["dashboard", "equipo-tarjetas", "pagos", "documentos", "correos"];

const ADMIN_ACTIONS: &[&str] = &["ver", "crear", "editar", "eliminar", "exportar", "aprobar"];
const SUPERVISOR_ACTIONS: &[&str] = &["ver", "crear", "editar", "exportar", "aprobar"];
const TEAM_ACTIONS: &[&str] = &["ver", "crear"];

/// Known application roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Administrador,
    Supervisor,
    Equipo,
}

impl Role {
    /// Parse a role name as sent by the server. Unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            ROLE_ADMIN => Some(Self::Administrador),
            ROLE_SUPERVISOR => Some(Self::Supervisor),
            ROLE_TEAM => Some(Self::Equipo),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrador => ROLE_ADMIN,
            Self::Supervisor => ROLE_SUPERVISOR,
            Self::Equipo => ROLE_TEAM,
        }
    }

    /// Screens this role may navigate to.
    #[must_use]
    pub fn modules(self) -> &'static [&'static str] {
        match self {
            Self::Administrador => ADMIN_MODULES,
            Self::Supervisor => SUPERVISOR_MODULES,
            Self::Equipo => TEAM_MODULES,
        }
    }

    /// Actions granted inside any reachable module without an explicit permission.
    #[must_use]
    pub fn default_actions(self) -> &'static [&'static str] {
        match self {
            Self::Administrador => ADMIN_ACTIONS,
            Self::Supervisor => SUPERVISOR_ACTIONS,
            Self::Equipo => TEAM_ACTIONS,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact membership of `permission` in the user's list.
#[must_use]
pub fn has_permission(user: &UserProfile, permission: &str) -> bool {
    user.permissions.iter().any(|p| p == permission)
}

#[must_use]
pub fn has_role(user: &UserProfile, role: &str) -> bool {
    user.role_name.trim().eq_ignore_ascii_case(role.trim())
}

#[must_use]
pub fn has_any_role(user: &UserProfile, roles: &[&str]) -> bool {
    roles.iter().any(|role| has_role(user, role))
}

/// Whether the user's role allow-list includes `module`.
#[must_use]
pub fn has_module_access(user: &UserProfile, module: &str) -> bool {
    Role::parse(&user.role_name).is_some_and(|role| role.modules().contains(&module))
}

/// Whether the user may perform `action` within `module`.
#[must_use]
pub fn has_action_permission(user: &UserProfile, module: &str, action: &str) -> bool {
    let Some(role) = Role::parse(&user.role_name) else {
        return false;
    };
    if !role.modules().contains(&module) {
        return false;
    }
    role.default_actions().contains(&action) || has_permission(user, &format!("{module}.{action}"))
}

/// Modules reachable by the user, in menu order.
#[must_use]
pub fn accessible_modules(user: &UserProfile) -> &'static [&'static str] {
    Role::parse(&user.role_name).map_or(&[][..], Role::modules)
}
