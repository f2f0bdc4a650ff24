//! The admission pipeline: authenticate, authorize, throttle.
//!
//! # Data Flow
//! ```text
//! request
//!     → authenticate (validators in order; first match wins, first error aborts)
//!     → authorize    (every permission must pass)
//!     → throttle     (every scope must admit)
//!     → RequestContext for the handler
//! ```
//!
//! Each stage returns `Result<_, Denial>`; the first denial ends the pass.

use crate::config::PipelineConfig;
use crate::error::Denial;
use crate::request::{RequestContext, RequestInfo};
use crate::throttle::ThrottleDecision;
use std::sync::Arc;
use tracing::debug;

/// Runs the three admission stages against one request.
#[derive(Clone, Debug)]
pub struct AdmissionPipeline {
    config: Arc<PipelineConfig>,
}

impl AdmissionPipeline {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Admit or deny a request. On admission the returned context carries the identity.
    pub async fn admit(&self, req: &dyn RequestInfo) -> Result<RequestContext, Denial> {
        let ctx = self.authenticate(req)?;
        self.authorize(&ctx)?;
        self.throttle(&ctx).await?;
        debug!(
            authenticator = ctx.authenticator().unwrap_or("none"),
            method = %ctx.method(),
            "request admitted"
        );
        Ok(ctx)
    }

    /// Try each validator in order. No match leaves the context anonymous.
    pub fn authenticate(&self, req: &dyn RequestInfo) -> Result<RequestContext, Denial> {
        let mut ctx = RequestContext::new(req);
        for authenticator in self.config.authenticators() {
            match authenticator.authenticate(req) {
                Ok(Some(result)) => {
                    debug!(authenticator = authenticator.name(), id = result.identity.id(), "authenticated");
                    ctx.authenticated_by(authenticator.name(), result);
                    return Ok(ctx);
                }
                Ok(None) => continue,
                Err(denial) => {
                    debug!(authenticator = authenticator.name(), error = %denial, "authentication failed");
                    return Err(denial.with_auth_header(authenticator.authenticate_header()));
                }
            }
        }
        Ok(ctx)
    }

    /// Every permission must pass.
    ///
    /// A refusal becomes `NotAuthenticated` when validators are configured and none
    /// accepted the request, otherwise `PermissionDenied`.
    pub fn authorize(&self, ctx: &RequestContext) -> Result<(), Denial> {
        let Some(denied_by) =
            self.config.permissions().iter().find(|perm| !perm.has_permission(ctx))
        else {
            return Ok(());
        };
        debug!(permission = denied_by.name(), "permission check failed");

        let authenticators = self.config.authenticators();
        if !authenticators.is_empty() && ctx.authenticator().is_none() {
            let challenge = authenticators[0].authenticate_header();
            return Err(Denial::not_authenticated().with_auth_header(challenge));
        }
        Err(Denial::permission_denied(denied_by.message(), denied_by.code()))
    }

    /// Every scope must admit; the first refusal stops the rest.
    pub async fn throttle(&self, ctx: &RequestContext) -> Result<(), Denial> {
        let backend = self.config.backend();
        for throttle in self.config.throttles() {
            if let ThrottleDecision::Denied { wait } = throttle.allow_request(ctx, backend).await {
                return Err(Denial::throttled(wait));
            }
        }
        Ok(())
    }
}
