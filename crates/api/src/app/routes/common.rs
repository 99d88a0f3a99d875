use busline_auth::{CommandAuthorization, Permission};

use crate::app::errors;
use crate::context::PrincipalContext;

/// Small helper wrapper to associate required permissions with an operation.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self {
            inner,
            required: vec![required],
        }
    }

    /// Unwrap the operation if the principal holds every required permission.
    pub fn check(self, principal: &PrincipalContext) -> Result<C, axum::response::Response> {
        crate::authz::authorize_command(principal, &self).map_err(errors::forbidden)?;
        Ok(self.inner)
    }
}
