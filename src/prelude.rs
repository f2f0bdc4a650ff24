//! Convenient re-exports for common restgate types.
pub use crate::{
    authentication::{AuthResult, Authenticator, BasicAuthentication, BearerAuthentication},
    config::{EndpointPolicy, PipelineConfig, Settings, StrategyRegistry},
    error::{Denial, DenialBody},
    identity::{BaseIdentityFactory, Identity, IdentityFactory},
    middleware::{AdmissionLayer, DenialResponder, JsonResponder},
    permissions::{AllowAny, IsAuthenticated, IsAuthenticatedOrReadOnly, Permission},
    pipeline::AdmissionPipeline,
    request::{ClientIp, RequestContext, RequestHead, RequestInfo},
    throttle::{InMemoryCache, Rate, Throttle, ThrottleCache},
};
