//! HTTP Bearer authentication with HMAC-signed JSON Web Tokens.

use super::{scheme_tokens, single_token, AuthResult, Authenticator, CredentialCheck, RequireIdClaim};
use crate::error::{ConfigError, Denial};
use crate::identity::{AuthInfo, BaseIdentityFactory, IdentityFactory};
use crate::request::RequestInfo;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

/// Validates `Authorization: Bearer <jwt>` against a shared secret.
///
/// The signature must use one of the allowed algorithms. `exp` is checked when present.
/// The decoded claims become the [`AuthInfo`]; by default they must contain `id`.
#[derive(Clone)]
pub struct BearerAuthentication {
    secret: Option<String>,
    algorithms: Vec<Algorithm>,
    check: Arc<dyn CredentialCheck>,
    factory: Arc<dyn IdentityFactory>,
}

impl BearerAuthentication {
    /// Registry name.
    pub const NAME: &'static str = "bearer";

    /// Build with the given identity factory, no secret, and `HS256` only.
    pub fn new(factory: Arc<dyn IdentityFactory>) -> Self {
        Self {
            secret: None,
            algorithms: vec![Algorithm::HS256],
            check: Arc::new(RequireIdClaim),
            factory,
        }
    }

    /// Signing secret. Without one every bearer request is a configuration error.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Replace the allowed algorithm set. Only the HMAC family works with a shared secret.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Result<Self, ConfigError> {
        if algorithms.is_empty() {
            return Err(ConfigError::InvalidAlgorithm("empty algorithm set".into()));
        }
        if let Some(bad) = algorithms.iter().find(|alg| !is_hmac(**alg)) {
            return Err(ConfigError::InvalidAlgorithm(format!("{bad:?}")));
        }
        self.algorithms = algorithms;
        Ok(self)
    }

    /// Replace the acceptance hook.
    pub fn with_check(mut self, check: Arc<dyn CredentialCheck>) -> Self {
        self.check = check;
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithms[0]);
        validation.algorithms = self.algorithms.clone();
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;
        validation.leeway = 0;
        validation
    }
}

impl std::fmt::Debug for BearerAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthentication")
            .field("has_secret", &self.secret.is_some())
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

impl Default for BearerAuthentication {
    fn default() -> Self {
        Self::new(Arc::new(BaseIdentityFactory))
    }
}

fn is_hmac(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Parse algorithm names such as `"HS256"`.
pub fn parse_algorithms(names: &[String]) -> Result<Vec<Algorithm>, ConfigError> {
    names
        .iter()
        .map(|name| {
            Algorithm::from_str(name).map_err(|_| ConfigError::InvalidAlgorithm(name.clone()))
        })
        .collect()
}

impl Authenticator for BearerAuthentication {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn authenticate(&self, req: &dyn RequestInfo) -> Result<Option<AuthResult>, Denial> {
        let Some(tokens) = scheme_tokens(req, "bearer") else {
            return Ok(None);
        };
        let token = single_token(&tokens, "bearer")?;

        let Some(secret) = self.secret.as_deref().filter(|s| !s.is_empty()) else {
            tracing::error!("bearer authentication configured without a secret");
            return Err(Denial::configure("lost JWT secret configuration"));
        };
        let token = std::str::from_utf8(token)
            .map_err(|e| Denial::authentication_failed(e.to_string()))?;

        let key = DecodingKey::from_secret(secret.as_bytes());
        let claims = decode::<AuthInfo>(token, &key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                Denial::authentication_failed(e.to_string())
            })?;

        self.check.check(&claims).map_err(Denial::authentication_failed)?;
        let identity = self.factory.make_identity(&claims)?;
        Ok(Some(AuthResult { identity, auth_info: claims }))
    }

    fn authenticate_header(&self) -> Option<String> {
        Some("Bearer".into())
    }
}
