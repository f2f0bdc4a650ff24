//! Read-only view of the incoming request and the per-request admission context.

use crate::authentication::AuthResult;
use crate::identity::{AuthInfo, Identity};
use http::header::AUTHORIZATION;
use http::{Extensions, HeaderMap, Method};
use std::net::IpAddr;

/// Peer address of a request, inserted into request extensions by the host server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// What the admission pipeline needs to know about a request.
pub trait RequestInfo: Send + Sync {
    /// Raw `Authorization` header bytes.
    fn authorization(&self) -> Option<&[u8]>;
    /// Address of the caller, if known.
    fn client_ip(&self) -> Option<IpAddr>;
    /// HTTP method.
    fn method(&self) -> &Method;
}

impl RequestInfo for http::request::Parts {
    fn authorization(&self) -> Option<&[u8]> {
        self.headers.get(AUTHORIZATION).map(|v| v.as_bytes())
    }

    /// [`ClientIp`] extension first, then the first `X-Forwarded-For` hop, then `X-Real-IP`.
    fn client_ip(&self) -> Option<IpAddr> {
        peer_ip(&self.extensions, &self.headers)
    }

    fn method(&self) -> &Method {
        &self.method
    }
}

impl<B: Send + Sync> RequestInfo for http::Request<B> {
    fn authorization(&self) -> Option<&[u8]> {
        self.headers().get(AUTHORIZATION).map(|v| v.as_bytes())
    }

    fn client_ip(&self) -> Option<IpAddr> {
        peer_ip(self.extensions(), self.headers())
    }

    fn method(&self) -> &Method {
        self.method()
    }
}

fn peer_ip(extensions: &Extensions, headers: &HeaderMap) -> Option<IpAddr> {
    extensions.get::<ClientIp>().map(|ip| ip.0).or_else(|| forwarded_ip(headers))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first_hop = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    first_hop.or_else(|| {
        headers.get("x-real-ip").and_then(|v| v.to_str().ok()).and_then(|v| v.trim().parse().ok())
    })
}

/// Owned request snapshot for hosts that do not speak `http` types.
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    method: Method,
    authorization: Option<Vec<u8>>,
    client_ip: Option<IpAddr>,
}

impl RequestHead {
    pub fn new(method: Method) -> Self {
        Self { method, ..Default::default() }
    }

    pub fn with_authorization(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }
}

impl RequestInfo for RequestHead {
    fn authorization(&self) -> Option<&[u8]> {
        self.authorization.as_deref()
    }

    fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    fn method(&self) -> &Method {
        &self.method
    }
}

/// Request-scoped result of admission.
///
/// Created fresh for every request and dropped with it. On admission the middleware
/// stores it in the request extensions so handlers can read the identity.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    client_ip: Option<IpAddr>,
    identity: Option<Identity>,
    auth_info: Option<AuthInfo>,
    authenticator: Option<&'static str>,
}

impl RequestContext {
    /// Anonymous context for a request.
    pub fn new(req: &dyn RequestInfo) -> Self {
        Self {
            method: req.method().clone(),
            client_ip: req.client_ip(),
            identity: None,
            auth_info: None,
            authenticator: None,
        }
    }

    /// Anonymous context from parts, for tests and custom hosts.
    pub fn anonymous(method: Method, client_ip: Option<IpAddr>) -> Self {
        Self { method, client_ip, identity: None, auth_info: None, authenticator: None }
    }

    /// Attach an identity without going through an authenticator.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub(crate) fn authenticated_by(&mut self, authenticator: &'static str, result: AuthResult) {
        self.identity = Some(result.identity);
        self.auth_info = Some(result.auth_info);
        self.authenticator = Some(authenticator);
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Credential material from the winning authenticator.
    pub fn auth_info(&self) -> Option<&AuthInfo> {
        self.auth_info.as_ref()
    }

    /// Name of the authenticator that accepted the request.
    pub fn authenticator(&self) -> Option<&'static str> {
        self.authenticator
    }

    /// Identity present and authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_authenticated)
    }
}
