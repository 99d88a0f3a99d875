use busline_auth::Role;
use busline_booking::Actor;
use busline_core::UserId;

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Who the lifecycle rules see acting.
    pub fn actor(&self) -> Actor {
        if self.is_admin() {
            Actor::Administrator(self.user_id)
        } else {
            Actor::Passenger(self.user_id)
        }
    }
}
