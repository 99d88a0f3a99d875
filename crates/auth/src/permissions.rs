use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "bookings.create"). The wildcard `"*"`
/// grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const BOOKINGS_CREATE: Permission = Permission(Cow::Borrowed("bookings.create"));
    pub const BOOKINGS_READ: Permission = Permission(Cow::Borrowed("bookings.read"));
    pub const BOOKINGS_CANCEL: Permission = Permission(Cow::Borrowed("bookings.cancel"));
    pub const SEATS_READ: Permission = Permission(Cow::Borrowed("seats.read"));
    pub const TRIPS_READ: Permission = Permission(Cow::Borrowed("trips.read"));
    pub const BUSES_REGISTER: Permission = Permission(Cow::Borrowed("buses.register"));
    pub const REFUNDS_READ: Permission = Permission(Cow::Borrowed("refunds.read"));
    pub const REFUNDS_PROCESS: Permission = Permission(Cow::Borrowed("refunds.process"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
