use super::ThrottleKey;
use crate::request::RequestContext;

fn ip_ident(ctx: &RequestContext) -> String {
    ctx.client_ip().map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".into())
}

/// Throttles anonymous traffic by client IP. Authenticated callers are never keyed.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonRateThrottle;

impl AnonRateThrottle {
    pub const NAME: &'static str = "anon";
    pub const SCOPE: &'static str = "anon";
}

impl ThrottleKey for AnonRateThrottle {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn cache_key(&self, scope: &str, ctx: &RequestContext) -> Option<String> {
        if ctx.is_authenticated() {
            return None;
        }
        Some(format!("throttle_{scope}_{}", ip_ident(ctx)))
    }
}

/// Throttles every caller: by identity id when authenticated, by client IP otherwise.
///
/// Ids and IPs share one keyspace per scope, so an identity whose id is an IP string
/// (say Basic user `10.0.0.1`) shares a window with anonymous traffic from that address.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserRateThrottle;

impl UserRateThrottle {
    pub const NAME: &'static str = "user";
    pub const SCOPE: &'static str = "user";
}

impl ThrottleKey for UserRateThrottle {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn cache_key(&self, scope: &str, ctx: &RequestContext) -> Option<String> {
        let ident = match ctx.identity() {
            Some(identity) if identity.is_authenticated() => identity.id().to_string(),
            _ => ip_ident(ctx),
        };
        Some(format!("throttle_{scope}_{ident}"))
    }
}
