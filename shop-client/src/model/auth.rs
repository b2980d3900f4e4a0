//! Authorization data

use std::fmt;

/// Opaque bearer token authorizing API calls on behalf of the user
///
/// The token value is never printed by `Debug`, so credentials can be freely traced.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, as sent in the `Authorization: Bearer` header and kept in storage
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"***").finish()
    }
}
