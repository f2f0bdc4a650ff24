//! The principal attached to a request and the factory that builds it.

use crate::error::IdentityError;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Strategy-specific credential material: decoded Basic credentials or token claims.
pub type AuthInfo = serde_json::Map<String, JsonValue>;

/// Key under which Basic authentication stores the decoded secret.
pub const SECRET_FIELD: &str = "secret";

/// Principal produced by an authenticator. Request-scoped, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    id: String,
    is_authenticated: bool,
    claims: AuthInfo,
}

impl Identity {
    /// An authenticated identity with no extra claims.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), is_authenticated: true, claims: AuthInfo::new() }
    }

    /// Replace the claims.
    pub fn with_claims(mut self, claims: AuthInfo) -> Self {
        self.claims = claims;
        self
    }

    /// Override the authenticated flag, e.g. for guest principals.
    pub fn with_authenticated(mut self, is_authenticated: bool) -> Self {
        self.is_authenticated = is_authenticated;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn claims(&self) -> &AuthInfo {
        &self.claims
    }

    /// Look up a single claim.
    pub fn claim(&self, name: &str) -> Option<&JsonValue> {
        self.claims.get(name)
    }
}

/// Builds an [`Identity`] from credential material. Configured once, shared by all
/// authenticators.
pub trait IdentityFactory: Send + Sync {
    fn make_identity(&self, info: &AuthInfo) -> Result<Identity, IdentityError>;
}

impl<F> IdentityFactory for F
where
    F: Fn(&AuthInfo) -> Result<Identity, IdentityError> + Send + Sync,
{
    fn make_identity(&self, info: &AuthInfo) -> Result<Identity, IdentityError> {
        self(info)
    }
}

/// Default factory: takes `id` (string or number) and keeps every other claim except the
/// Basic secret. Always authenticated.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseIdentityFactory;

impl IdentityFactory for BaseIdentityFactory {
    fn make_identity(&self, info: &AuthInfo) -> Result<Identity, IdentityError> {
        let id = match info.get("id") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => return Err(IdentityError::MissingId),
        };
        let mut claims = info.clone();
        claims.remove(SECRET_FIELD);
        Ok(Identity::new(id).with_claims(claims))
    }
}
