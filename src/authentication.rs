//! Credential validators.
//!
//! An [`Authenticator`] inspects the `Authorization` header and answers one of three ways:
//! - `Ok(None)`: the header does not use this scheme; the pipeline tries the next one.
//! - `Ok(Some(result))`: credentials accepted; later authenticators are skipped.
//! - `Err(denial)`: the scheme matched but the credentials (or the server's configuration
//!   for checking them) are bad; the pipeline stops immediately.
//!
//! Built-ins: [`BasicAuthentication`] and [`BearerAuthentication`] (JWT).

use crate::error::Denial;
use crate::identity::{AuthInfo, Identity};
use crate::request::RequestInfo;

pub mod basic;
pub mod bearer;
pub use basic::BasicAuthentication;
pub use bearer::BearerAuthentication;

/// Accepted credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResult {
    /// Principal built by the identity factory.
    pub identity: Identity,
    /// Decoded credential material.
    pub auth_info: AuthInfo,
}

/// Pluggable credential validator.
pub trait Authenticator: Send + Sync {
    /// Unique name of this validator.
    fn name(&self) -> &'static str;

    /// Validate the request's credentials. See the module docs for the three outcomes.
    fn authenticate(&self, req: &dyn RequestInfo) -> Result<Option<AuthResult>, Denial>;

    /// Value for `WWW-Authenticate` on 401 responses, or `None` for no challenge.
    fn authenticate_header(&self) -> Option<String> {
        None
    }
}

/// Acceptance hook run on decoded credentials before an identity is built.
///
/// Returning `Err(message)` rejects the request with `AuthenticationFailed(message)`.
pub trait CredentialCheck: Send + Sync {
    fn check(&self, info: &AuthInfo) -> Result<(), String>;
}

impl<F> CredentialCheck for F
where
    F: Fn(&AuthInfo) -> Result<(), String> + Send + Sync,
{
    fn check(&self, info: &AuthInfo) -> Result<(), String> {
        self(info)
    }
}

/// Accepts everything. Default for Basic authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl CredentialCheck for AcceptAll {
    fn check(&self, _info: &AuthInfo) -> Result<(), String> {
        Ok(())
    }
}

/// Requires an `id` claim. Default for Bearer authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireIdClaim;

impl CredentialCheck for RequireIdClaim {
    fn check(&self, info: &AuthInfo) -> Result<(), String> {
        if info.contains_key("id") {
            Ok(())
        } else {
            Err("'id' field not found in jwt payload".into())
        }
    }
}

/// Split the `Authorization` header on whitespace and return the tokens after `scheme`,
/// or `None` when the header is absent or uses another scheme.
pub(crate) fn scheme_tokens<'a>(req: &'a dyn RequestInfo, scheme: &str) -> Option<Vec<&'a [u8]>> {
    let header = req.authorization()?;
    let mut tokens = header.split(|b| b.is_ascii_whitespace()).filter(|t| !t.is_empty());
    let first = tokens.next()?;
    if !first.eq_ignore_ascii_case(scheme.as_bytes()) {
        return None;
    }
    Some(tokens.collect())
}

/// Exactly one credential token must follow the scheme.
pub(crate) fn single_token<'a>(tokens: &[&'a [u8]], label: &str) -> Result<&'a [u8], Denial> {
    match tokens {
        [] => Err(Denial::authentication_failed(format!(
            "Invalid {label} header. No credentials provided."
        ))),
        [token] => Ok(*token),
        _ => Err(Denial::authentication_failed(format!(
            "Invalid {label} header. Credentials string should not contain spaces."
        ))),
    }
}
