/// Role-based authorization and tenant isolation
///
/// Permissions come from an immutable [`PermissionTable`] built once at
/// startup and shared behind an `Arc`. Each role maps to a list of
/// `resource:action` grants; `*` in either position matches anything.
///
/// # Built-in Table
///
/// | Role | Grants |
/// |---|---|
/// | super_admin | `*:*` |
/// | tenant_admin | `*` on users, sessions, ledger, inventory, tax, payroll, reports, settings |
/// | staff | read users/settings/reports; read+write ledger/inventory/tax/payroll; read+delete sessions |
/// | viewer | read users/ledger/inventory/tax/payroll/reports |
///
/// # Tenant Isolation
///
/// Any tenant named explicitly by the request (path, query, or
/// `X-Tenant-ID`) must equal the token's tenant. Only `super_admin` may
/// select another tenant; the choice is carried downstream as a
/// [`TenantScope`].
///
/// # Example
///
/// ```
/// use corebooks_identity::auth::authorization::{require_permission, PermissionTable};
/// use corebooks_identity::auth::middleware::AuthContext;
/// use corebooks_identity::models::user::Role;
/// use chrono::Utc;
/// use uuid::Uuid;
///
/// let table = PermissionTable::default();
/// let viewer = AuthContext {
///     user_id: Uuid::new_v4(),
///     tenant_id: Uuid::new_v4(),
///     email: "v@acme.test".to_string(),
///     role: Role::Viewer,
///     session_id: "s".to_string(),
///     expires_at: Utc::now(),
/// };
///
/// assert!(require_permission(&table, &viewer, "ledger", "read").is_ok());
/// assert!(require_permission(&table, &viewer, "ledger", "write").is_err());
/// ```

use std::collections::HashMap;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::middleware::{AuthContext, TENANT_HEADER};
use crate::models::user::Role;

/// Wildcard resource or action
pub const WILDCARD: &str = "*";

/// Authorization error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// Role lacks the (resource, action) grant
    #[error("Insufficient permissions: {role} cannot {action} {resource}")]
    PermissionDenied {
        role: Role,
        resource: String,
        action: String,
    },

    /// Role is not in the allowed set
    #[error("Role {0} is not allowed to perform this operation")]
    RoleNotAllowed(Role),

    /// Request named a tenant other than the caller's
    #[error("Access to tenant {0} is not allowed")]
    TenantMismatch(Uuid),

    /// Request named more than one tenant
    #[error("Conflicting tenant selection")]
    ConflictingTenants,

    /// Tenant selector could not be parsed
    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),

    /// Permission table definition rejected
    #[error("Invalid permission table: {0}")]
    InvalidTable(String),
}

/// One `resource:action` grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Parses `resource:action`
    pub fn parse(spec: &str) -> Result<Self, AuthzError> {
        match spec.split_once(':') {
            Some((resource, action)) if !resource.is_empty() && !action.is_empty() => {
                Ok(Self::new(resource.trim(), action.trim()))
            }
            _ => Err(AuthzError::InvalidTable(format!(
                "'{}' is not in resource:action form",
                spec
            ))),
        }
    }

    /// Exact or wildcard match
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        (self.resource == WILDCARD || self.resource == resource)
            && (self.action == WILDCARD || self.action == action)
    }
}

/// Immutable role to permission mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTable {
    grants: HashMap<Role, Vec<Permission>>,
}

impl Default for PermissionTable {
    fn default() -> Self {
        const ADMIN_RESOURCES: [&str; 8] = [
            "users",
            "sessions",
            "ledger",
            "inventory",
            "tax",
            "payroll",
            "reports",
            "settings",
        ];
        const BOOKKEEPING: [&str; 4] = ["ledger", "inventory", "tax", "payroll"];
        const VIEWER_RESOURCES: [&str; 6] =
            ["users", "ledger", "inventory", "tax", "payroll", "reports"];

        let mut staff = vec![
            Permission::new("users", "read"),
            Permission::new("settings", "read"),
            Permission::new("reports", "read"),
            Permission::new("sessions", "read"),
            Permission::new("sessions", "delete"),
        ];
        for resource in BOOKKEEPING {
            staff.push(Permission::new(resource, "read"));
            staff.push(Permission::new(resource, "write"));
        }

        let grants = HashMap::from([
            (Role::SuperAdmin, vec![Permission::new(WILDCARD, WILDCARD)]),
            (
                Role::TenantAdmin,
                ADMIN_RESOURCES
                    .iter()
                    .map(|r| Permission::new(*r, WILDCARD))
                    .collect(),
            ),
            (Role::Staff, staff),
            (
                Role::Viewer,
                VIEWER_RESOURCES
                    .iter()
                    .map(|r| Permission::new(*r, "read"))
                    .collect(),
            ),
        ]);

        Self { grants }
    }
}

impl PermissionTable {
    /// Builds a table from explicit grants
    pub fn new(grants: HashMap<Role, Vec<Permission>>) -> Self {
        Self { grants }
    }

    /// Parses a JSON object of role name to `resource:action` strings
    ///
    /// ```
    /// use corebooks_identity::auth::authorization::PermissionTable;
    /// use corebooks_identity::models::user::Role;
    ///
    /// let table = PermissionTable::from_json(r#"{"viewer": ["reports:read"]}"#).unwrap();
    /// assert!(table.allows(Role::Viewer, "reports", "read"));
    /// assert!(!table.allows(Role::Staff, "reports", "read"));
    /// ```
    pub fn from_json(json: &str) -> Result<Self, AuthzError> {
        let raw: HashMap<Role, Vec<String>> =
            serde_json::from_str(json).map_err(|e| AuthzError::InvalidTable(e.to_string()))?;

        let grants = raw
            .into_iter()
            .map(|(role, specs)| {
                let perms = specs
                    .iter()
                    .map(|s| Permission::parse(s))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((role, perms))
            })
            .collect::<Result<HashMap<_, _>, AuthzError>>()?;

        Ok(Self { grants })
    }

    /// Whether `role` holds a grant matching (resource, action)
    pub fn allows(&self, role: Role, resource: &str, action: &str) -> bool {
        self.grants
            .get(&role)
            .map(|perms| perms.iter().any(|p| p.matches(resource, action)))
            .unwrap_or(false)
    }

    /// Grants held by a role
    pub fn grants_for(&self, role: Role) -> &[Permission] {
        self.grants.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Tenant a request operates on after isolation checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantScope {
    /// Effective tenant
    pub tenant_id: Uuid,

    /// Whether a super admin selected a tenant other than their own
    pub overridden: bool,
}

/// Requires a (resource, action) grant for the caller's role
pub fn require_permission(
    table: &PermissionTable,
    auth: &AuthContext,
    resource: &str,
    action: &str,
) -> Result<(), AuthzError> {
    if table.allows(auth.role, resource, action) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %auth.user_id,
            role = %auth.role,
            resource,
            action,
            "Permission denied"
        );
        Err(AuthzError::PermissionDenied {
            role: auth.role,
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }
}

/// Requires the caller's role to be one of `allowed`
pub fn require_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&auth.role) {
        Ok(())
    } else {
        Err(AuthzError::RoleNotAllowed(auth.role))
    }
}

/// Resolves the effective tenant from every tenant the request names
///
/// With nothing requested the token's tenant applies. All requested values
/// must agree. A value other than the token's tenant is honored only for
/// `super_admin`.
pub fn resolve_tenant<I>(auth: &AuthContext, requested: I) -> Result<TenantScope, AuthzError>
where
    I: IntoIterator<Item = Uuid>,
{
    let mut selected: Option<Uuid> = None;
    for tenant_id in requested {
        match selected {
            Some(prev) if prev != tenant_id => return Err(AuthzError::ConflictingTenants),
            _ => selected = Some(tenant_id),
        }
    }

    match selected {
        None => Ok(TenantScope {
            tenant_id: auth.tenant_id,
            overridden: false,
        }),
        Some(tenant_id) if tenant_id == auth.tenant_id => Ok(TenantScope {
            tenant_id,
            overridden: false,
        }),
        Some(tenant_id) if auth.is_super_admin() => {
            tracing::info!(
                user_id = %auth.user_id,
                home_tenant = %auth.tenant_id,
                tenant_id = %tenant_id,
                "Super admin tenant override"
            );
            Ok(TenantScope {
                tenant_id,
                overridden: true,
            })
        }
        Some(tenant_id) => {
            tracing::warn!(
                user_id = %auth.user_id,
                home_tenant = %auth.tenant_id,
                tenant_id = %tenant_id,
                "Cross-tenant access denied"
            );
            Err(AuthzError::TenantMismatch(tenant_id))
        }
    }
}

/// Reads the `X-Tenant-ID` header
pub fn tenant_from_headers(headers: &HeaderMap) -> Result<Option<Uuid>, AuthzError> {
    match headers.get(TENANT_HEADER) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| AuthzError::InvalidTenantId("not valid ASCII".to_string()))?;
            Uuid::parse_str(raw.trim())
                .map(Some)
                .map_err(|_| AuthzError::InvalidTenantId(raw.to_string()))
        }
    }
}
