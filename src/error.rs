//! Error types for admission decisions and configuration.
//!
//! [`Denial`] is the request-time taxonomy: every way the pipeline can refuse a request.
//! Strategies return it; only the middleware turns it into an HTTP response.
//! [`ConfigError`] is raised while building a pipeline and never reaches a client.

use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER, WWW_AUTHENTICATE};
use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message sent in place of the detail of an unhandled failure.
pub const GENERIC_SERVER_ERROR: &str = "A server error occurred.";

/// Reason a request was refused before reaching its handler.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Denial {
    /// Credentials were supplied for a scheme but are malformed or invalid.
    #[error("{detail}")]
    AuthenticationFailed {
        /// Client-facing message.
        detail: String,
        /// Machine-readable code.
        code: String,
        /// Challenge for the `WWW-Authenticate` header.
        auth_header: Option<String>,
    },
    /// Credentials are required and none were accepted.
    #[error("{detail}")]
    NotAuthenticated {
        /// Client-facing message.
        detail: String,
        /// Machine-readable code.
        code: String,
        /// Challenge for the `WWW-Authenticate` header.
        auth_header: Option<String>,
    },
    /// The caller is known but a permission check refused the operation.
    #[error("{detail}")]
    PermissionDenied {
        /// Client-facing message.
        detail: String,
        /// Machine-readable code.
        code: String,
    },
    /// Server-side configuration needed to decide is missing or invalid.
    #[error("{detail}")]
    ConfigureError {
        /// Message describing the missing configuration.
        detail: String,
        /// Machine-readable code.
        code: String,
    },
    /// The caller exhausted a throttle scope.
    #[error("{detail}")]
    Throttled {
        /// Client-facing message.
        detail: String,
        /// Machine-readable code.
        code: String,
        /// Estimated time until the scope admits again.
        wait: Option<Duration>,
    },
    /// Anything else. The detail is logged, never sent.
    #[error("unhandled: {detail}")]
    Unhandled {
        /// Internal description of the failure.
        detail: String,
    },
}

/// JSON body of a denial response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialBody {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code.
    pub code: String,
}

impl Denial {
    /// Malformed or rejected credentials.
    pub fn authentication_failed(detail: impl Into<String>) -> Self {
        Denial::AuthenticationFailed {
            detail: detail.into(),
            code: "authentication_failed".into(),
            auth_header: None,
        }
    }

    /// No credentials where credentials are required.
    pub fn not_authenticated() -> Self {
        Denial::NotAuthenticated {
            detail: "Authentication credentials were not provided.".into(),
            code: "not_authenticated".into(),
            auth_header: None,
        }
    }

    /// Refused by a permission check; falls back to default text when the check has none.
    pub fn permission_denied(message: Option<&str>, code: Option<&str>) -> Self {
        Denial::PermissionDenied {
            detail: message.unwrap_or("You do not have permission to perform this action.").into(),
            code: code.unwrap_or("permission_denied").into(),
        }
    }

    /// Missing server configuration. Maps to a 500, never a 401.
    pub fn configure(detail: impl Into<String>) -> Self {
        Denial::ConfigureError { detail: detail.into(), code: "internal configure error".into() }
    }

    /// Rate budget exhausted.
    pub fn throttled(wait: Option<Duration>) -> Self {
        Denial::Throttled {
            detail: "Request was throttled.".into(),
            code: "throttled".into(),
            wait,
        }
    }

    /// Unexpected failure; `detail` stays server-side.
    pub fn unhandled(detail: impl Into<String>) -> Self {
        Denial::Unhandled { detail: detail.into() }
    }

    /// Attach a `WWW-Authenticate` challenge. No-op for non-401 variants.
    pub fn with_auth_header(mut self, header: Option<String>) -> Self {
        match &mut self {
            Denial::AuthenticationFailed { auth_header, .. }
            | Denial::NotAuthenticated { auth_header, .. } => *auth_header = header,
            _ => {}
        }
        self
    }

    /// HTTP status for this denial.
    pub fn status(&self) -> StatusCode {
        match self {
            Denial::AuthenticationFailed { .. } | Denial::NotAuthenticated { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Denial::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Denial::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            Denial::ConfigureError { .. } | Denial::Unhandled { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message. Unhandled failures always yield [`GENERIC_SERVER_ERROR`].
    pub fn message(&self) -> &str {
        match self {
            Denial::AuthenticationFailed { detail, .. }
            | Denial::NotAuthenticated { detail, .. }
            | Denial::PermissionDenied { detail, .. }
            | Denial::ConfigureError { detail, .. }
            | Denial::Throttled { detail, .. } => detail,
            Denial::Unhandled { .. } => GENERIC_SERVER_ERROR,
        }
    }

    /// Machine-readable code.
    pub fn code(&self) -> &str {
        match self {
            Denial::AuthenticationFailed { code, .. }
            | Denial::NotAuthenticated { code, .. }
            | Denial::PermissionDenied { code, .. }
            | Denial::ConfigureError { code, .. }
            | Denial::Throttled { code, .. } => code,
            Denial::Unhandled { .. } => "error",
        }
    }

    /// The `WWW-Authenticate` challenge, if any.
    pub fn auth_header(&self) -> Option<&str> {
        match self {
            Denial::AuthenticationFailed { auth_header, .. }
            | Denial::NotAuthenticated { auth_header, .. } => auth_header.as_deref(),
            _ => None,
        }
    }

    /// Whole seconds for the `Retry-After` header, rounded up.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Denial::Throttled { wait: Some(wait), .. } => Some(wait.as_secs_f64().ceil() as u64),
            _ => None,
        }
    }

    /// Body record for the response.
    pub fn body(&self) -> DenialBody {
        DenialBody { message: self.message().to_string(), code: self.code().to_string() }
    }

    /// Response headers: zero or one of `WWW-Authenticate` and `Retry-After`.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = self.auth_header().and_then(|h| HeaderValue::from_str(h).ok()) {
            headers.insert(WWW_AUTHENTICATE, value);
        }
        if let Some(secs) = self.retry_after() {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        headers
    }

    /// JSON response: status, headers, and a `{"message", "code"}` body.
    pub fn into_response<B: From<String>>(&self) -> Response<B> {
        let body = serde_json::to_string(&self.body()).unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to encode denial body");
            format!(r#"{{"message":"{GENERIC_SERVER_ERROR}","code":"error"}}"#)
        });
        let mut response = Response::new(B::from(body));
        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(self.headers());
        response
    }

    /// True for the two 401 variants.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Denial::AuthenticationFailed { .. } | Denial::NotAuthenticated { .. })
    }

    /// True when the caller was throttled.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Denial::Throttled { .. })
    }
}

/// Errors raised while building a pipeline from settings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Rate string is not `<count>/<unit>` with unit in s, m, h, d.
    #[error("invalid rate {rate:?}: {reason}")]
    InvalidRate {
        /// The rejected rate string.
        rate: String,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// A strategy name did not resolve.
    #[error("unknown {kind} strategy: {name}")]
    UnknownStrategy {
        /// Strategy family (authentication, permission, throttle).
        kind: &'static str,
        /// The unresolved name.
        name: String,
    },
    /// JWT algorithm name is unknown or not usable with a shared secret.
    #[error("unsupported jwt algorithm: {0}")]
    InvalidAlgorithm(String),
    /// Settings document could not be parsed.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Failure talking to the throttle cache. Never reaches a client; throttling fails open.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheError {
    /// The backend reported an error.
    #[error("cache backend: {0}")]
    Backend(String),
    /// The call did not finish within the configured timeout.
    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure building an identity from credential material.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    /// The credentials carry no usable `id`.
    #[error("'id' field not found in credentials")]
    MissingId,
    /// The factory itself failed.
    #[error("identity factory: {0}")]
    Internal(String),
}

impl From<IdentityError> for Denial {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::MissingId => Denial::authentication_failed(err.to_string()),
            IdentityError::Internal(detail) => Denial::unhandled(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_fixed() {
        assert_eq!(Denial::authentication_failed("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Denial::not_authenticated().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Denial::permission_denied(None, None).status(), StatusCode::FORBIDDEN);
        assert_eq!(Denial::configure("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Denial::throttled(None).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(Denial::unhandled("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unhandled_hides_detail() {
        let denial = Denial::unhandled("db password is hunter2");
        assert_eq!(denial.message(), GENERIC_SERVER_ERROR);
        assert_eq!(denial.code(), "error");
        assert!(!denial.body().message.contains("hunter2"));
    }

    #[test]
    fn permission_denied_uses_check_text_when_present() {
        let denial = Denial::permission_denied(Some("admins only"), Some("not_admin"));
        assert_eq!(denial.message(), "admins only");
        assert_eq!(denial.code(), "not_admin");

        let denial = Denial::permission_denied(None, None);
        assert_eq!(denial.code(), "permission_denied");
    }

    #[test]
    fn auth_header_only_sticks_to_401_variants() {
        let denial = Denial::not_authenticated().with_auth_header(Some("Bearer".into()));
        assert_eq!(denial.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let denial = Denial::permission_denied(None, None).with_auth_header(Some("Bearer".into()));
        assert!(denial.auth_header().is_none());
        assert!(denial.headers().is_empty());
    }

    #[test]
    fn retry_after_rounds_up() {
        let denial = Denial::throttled(Some(Duration::from_millis(1500)));
        assert_eq!(denial.retry_after(), Some(2));
        assert_eq!(denial.headers().get(RETRY_AFTER).unwrap(), "2");

        assert!(Denial::throttled(None).headers().is_empty());
    }

    #[test]
    fn identity_errors_split_between_client_and_server() {
        let denial: Denial = IdentityError::MissingId.into();
        assert_eq!(denial.status(), StatusCode::UNAUTHORIZED);

        let denial: Denial = IdentityError::Internal("boom".into()).into();
        assert_eq!(denial.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(denial.message(), GENERIC_SERVER_ERROR);
    }
}
