//! Authorization checks.
//!
//! Every configured [`Permission`] must pass; the first refusal decides the denial.

use crate::request::RequestContext;
use http::Method;

/// Methods that never modify state.
pub fn is_safe_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD || method == Method::OPTIONS
}

/// Pure, side-effect-free permission check.
pub trait Permission: Send + Sync {
    /// Unique name of this check.
    fn name(&self) -> &'static str;

    fn has_permission(&self, ctx: &RequestContext) -> bool;

    /// Message for the 403 body; the pipeline uses a stock message when `None`.
    fn message(&self) -> Option<&str> {
        None
    }

    /// Code for the 403 body; the pipeline uses `permission_denied` when `None`.
    fn code(&self) -> Option<&str> {
        None
    }
}

/// Allows every request. Equivalent to configuring no checks, but says so explicitly.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAny;

impl AllowAny {
    pub const NAME: &'static str = "allow_any";
}

impl Permission for AllowAny {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn has_permission(&self, _ctx: &RequestContext) -> bool {
        true
    }
}

/// Allows only authenticated identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsAuthenticated;

impl IsAuthenticated {
    pub const NAME: &'static str = "is_authenticated";
}

impl Permission for IsAuthenticated {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn has_permission(&self, ctx: &RequestContext) -> bool {
        ctx.is_authenticated()
    }
}

/// Allows safe methods for anyone and everything else for authenticated identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsAuthenticatedOrReadOnly;

impl IsAuthenticatedOrReadOnly {
    pub const NAME: &'static str = "is_authenticated_or_read_only";
}

impl Permission for IsAuthenticatedOrReadOnly {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn has_permission(&self, ctx: &RequestContext) -> bool {
        is_safe_method(ctx.method()) || ctx.is_authenticated()
    }
}
