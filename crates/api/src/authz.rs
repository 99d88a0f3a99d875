//! API-side authorization guard.
//!
//! Permissions are checked at the HTTP boundary before any service call;
//! the services themselves stay auth-agnostic apart from the lifecycle actor.

use busline_auth::{AuthzError, CommandAuthorization, Permission, Principal, Role, authorize};

use crate::context::PrincipalContext;

/// Check authorization for an operation in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = Principal {
        user_id: principal.user_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Static role→permission mapping.
pub fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    // Convention: "admin" grants all permissions.
    if roles.iter().any(Role::is_admin) {
        return vec![Permission::WILDCARD];
    }

    let mut permissions = Vec::new();
    for role in roles {
        let granted: &[Permission] = match role.as_str() {
            "passenger" => &[
                Permission::BOOKINGS_CREATE,
                Permission::BOOKINGS_READ,
                Permission::BOOKINGS_CANCEL,
                Permission::SEATS_READ,
            ],
            "operator" => &[
                Permission::BUSES_REGISTER,
                Permission::SEATS_READ,
                Permission::TRIPS_READ,
            ],
            _ => &[],
        };
        for p in granted {
            if !permissions.contains(p) {
                permissions.push(p.clone());
            }
        }
    }
    permissions
}
