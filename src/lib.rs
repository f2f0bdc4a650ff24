#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # restgate
//!
//! Request admission for HTTP services: authenticate, authorize, throttle.
//!
//! ## Features
//!
//! - **Authenticators** for `Basic` and `Bearer` (JWT, HMAC) credentials
//! - **Permissions** that gate on authentication state and request method
//! - **Sliding-window throttles** keyed by client IP or identity, over a pluggable cache
//! - **Uniform denials** mapped to 401/403/429/500 with `WWW-Authenticate` and `Retry-After`
//! - **Tower layer** for any service over `http::Request`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restgate::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let config = PipelineConfig::builder()
//!     .authenticator(BasicAuthentication::default())
//!     .permission(IsAuthenticatedOrReadOnly)
//!     .throttle(Throttle::anon(Rate::parse("100/hour").unwrap()))
//!     .throttle(Throttle::user(Rate::parse("1000/day").unwrap()))
//!     .cache(Arc::new(InMemoryCache::new()))
//!     .build();
//!
//! let pipeline = AdmissionPipeline::new(Arc::new(config));
//! let request = RequestHead::new(http::Method::GET);
//! match pipeline.admit(&request).await {
//!     Ok(ctx) => println!("admitted: {:?}", ctx.identity()),
//!     Err(denial) => println!("{} {}", denial.status(), denial.message()),
//! }
//! # }
//! ```
//!
//! Wrap a service instead with [`AdmissionLayer`].

pub mod authentication;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod permissions;
pub mod pipeline;
pub mod prelude;
pub mod request;
pub mod throttle;

// Re-exports
pub use authentication::{
    AuthResult, Authenticator, BasicAuthentication, BearerAuthentication, CredentialCheck,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    EndpointPolicy, EndpointSettings, PipelineConfig, PipelineConfigBuilder, Settings,
    StrategyRegistry, ThrottleSettings,
};
pub use error::{CacheError, ConfigError, Denial, DenialBody, IdentityError};
pub use identity::{AuthInfo, BaseIdentityFactory, Identity, IdentityFactory};
pub use middleware::{AdmissionLayer, AdmissionService, DenialResponder, JsonResponder};
pub use permissions::{AllowAny, IsAuthenticated, IsAuthenticatedOrReadOnly, Permission};
pub use pipeline::AdmissionPipeline;
pub use request::{ClientIp, RequestContext, RequestHead, RequestInfo};
pub use throttle::{
    AnonRateThrottle, InMemoryCache, Rate, Throttle, ThrottleBackend, ThrottleCache,
    ThrottleDecision, ThrottleKey, UserRateThrottle,
};
