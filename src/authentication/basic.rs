//! HTTP Basic authentication.

use super::{scheme_tokens, single_token, AcceptAll, AuthResult, Authenticator, CredentialCheck};
use crate::error::Denial;
use crate::identity::{AuthInfo, BaseIdentityFactory, IdentityFactory, SECRET_FIELD};
use crate::request::RequestInfo;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;

/// Realm used in the challenge when none is configured.
pub const DEFAULT_REALM: &str = "api";

/// Validates `Authorization: Basic <base64(id:secret)>`.
///
/// Decoded text is UTF-8, falling back to Latin-1 when the bytes are not valid UTF-8.
/// Acceptance is delegated to a [`CredentialCheck`]; the default accepts any pair.
#[derive(Clone)]
pub struct BasicAuthentication {
    realm: String,
    check: Arc<dyn CredentialCheck>,
    factory: Arc<dyn IdentityFactory>,
}

impl BasicAuthentication {
    /// Registry name.
    pub const NAME: &'static str = "basic";

    /// Build with the given identity factory, realm `api`, accepting any credentials.
    pub fn new(factory: Arc<dyn IdentityFactory>) -> Self {
        Self { realm: DEFAULT_REALM.into(), check: Arc::new(AcceptAll), factory }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Replace the acceptance hook.
    pub fn with_check(mut self, check: Arc<dyn CredentialCheck>) -> Self {
        self.check = check;
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }
}

impl std::fmt::Debug for BasicAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthentication").field("realm", &self.realm).finish_non_exhaustive()
    }
}

impl Default for BasicAuthentication {
    fn default() -> Self {
        Self::new(Arc::new(BaseIdentityFactory))
    }
}

fn decode_credentials(token: &[u8]) -> Result<(String, String), Denial> {
    let bytes = STANDARD.decode(token).map_err(|_| {
        Denial::authentication_failed(
            "Invalid basic header. Credentials not correctly base64 encoded.",
        )
    })?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    };
    Ok(match text.split_once(':') {
        Some((id, secret)) => (id.to_string(), secret.to_string()),
        None => (text, String::new()),
    })
}

impl Authenticator for BasicAuthentication {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn authenticate(&self, req: &dyn RequestInfo) -> Result<Option<AuthResult>, Denial> {
        let Some(tokens) = scheme_tokens(req, "basic") else {
            return Ok(None);
        };
        let token = single_token(&tokens, "basic")?;
        let (id, secret) = decode_credentials(token)?;

        let mut auth_info = AuthInfo::new();
        auth_info.insert("id".into(), id.into());
        auth_info.insert(SECRET_FIELD.into(), secret.into());

        self.check.check(&auth_info).map_err(Denial::authentication_failed)?;
        let identity = self.factory.make_identity(&auth_info)?;
        tracing::debug!(id = identity.id(), "basic credentials accepted");
        Ok(Some(AuthResult { identity, auth_info }))
    }

    fn authenticate_header(&self) -> Option<String> {
        Some(format!("Basic realm=\"{}\"", self.realm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestHead;
    use http::{Method, StatusCode};

    fn req(header: &str) -> RequestHead {
        RequestHead::new(Method::GET).with_authorization(header)
    }

    fn basic(raw: &[u8]) -> RequestHead {
        req(&format!("Basic {}", STANDARD.encode(raw)))
    }

    #[test]
    fn no_header_or_other_scheme_is_not_a_match() {
        let auth = BasicAuthentication::default();
        assert!(auth.authenticate(&RequestHead::new(Method::GET)).unwrap().is_none());
        assert!(auth.authenticate(&req("")).unwrap().is_none());
        assert!(auth.authenticate(&req("Bearer abc")).unwrap().is_none());
    }

    #[test]
    fn scheme_without_credentials_fails() {
        let err = BasicAuthentication::default().authenticate(&req("basic")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message(), "Invalid basic header. No credentials provided.");
    }

    #[test]
    fn embedded_space_fails() {
        let err = BasicAuthentication::default().authenticate(&req("Basic abc def")).unwrap_err();
        assert!(err.message().contains("should not contain spaces"));
    }

    #[test]
    fn bad_base64_fails() {
        let err = BasicAuthentication::default()
            .authenticate(&req("basic wrong_base64_auth_token"))
            .unwrap_err();
        assert!(err.message().contains("not correctly base64 encoded"));
    }

    #[test]
    fn valid_credentials_yield_identity_and_info() {
        let result =
            BasicAuthentication::default().authenticate(&basic(b"waro163:passwd123")).unwrap();
        let result = result.expect("authenticated");
        assert_eq!(result.identity.id(), "waro163");
        assert!(result.identity.is_authenticated());
        assert_eq!(result.auth_info["id"], "waro163");
        assert_eq!(result.auth_info["secret"], "passwd123");
    }

    #[test]
    fn secret_may_contain_colons_and_may_be_missing() {
        let auth = BasicAuthentication::default();
        let result = auth.authenticate(&basic(b"u:p:q")).unwrap().unwrap();
        assert_eq!(result.auth_info["secret"], "p:q");

        let result = auth.authenticate(&basic(b"lonely")).unwrap().unwrap();
        assert_eq!(result.identity.id(), "lonely");
        assert_eq!(result.auth_info["secret"], "");
    }

    #[test]
    fn non_utf8_falls_back_to_latin1() {
        let result =
            BasicAuthentication::default().authenticate(&basic(b"caf\xe9:pw")).unwrap().unwrap();
        assert_eq!(result.identity.id(), "café");
    }

    #[test]
    fn check_hook_rejection_becomes_authentication_failure() {
        let check = |info: &AuthInfo| {
            if info["secret"] == "letmein" {
                Ok(())
            } else {
                Err("bad password".to_string())
            }
        };
        let auth = BasicAuthentication::default().with_check(Arc::new(check));

        let err = auth.authenticate(&basic(b"alice:nope")).unwrap_err();
        assert_eq!(err.message(), "bad password");
        assert!(auth.authenticate(&basic(b"alice:letmein")).unwrap().is_some());
    }

    #[test]
    fn challenge_names_realm() {
        let auth = BasicAuthentication::default();
        assert_eq!(auth.authenticate_header().as_deref(), Some("Basic realm=\"api\""));
        let auth = auth.with_realm("internal");
        assert_eq!(auth.authenticate_header().as_deref(), Some("Basic realm=\"internal\""));
    }
}
