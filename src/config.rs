//! Pipeline configuration.
//!
//! Configuration is resolved once at startup into an immutable [`PipelineConfig`] and
//! shared by reference afterwards. Two ways in:
//! - programmatic, via [`PipelineConfig::builder`];
//! - declarative, via [`Settings`] (strategy names and rate strings) resolved through a
//!   [`StrategyRegistry`].
//!
//! Endpoints can override any of the three strategy lists with an [`EndpointPolicy`];
//! whatever they leave unset is inherited.

use crate::authentication::bearer::parse_algorithms;
use crate::authentication::{Authenticator, BasicAuthentication, BearerAuthentication};
use crate::clock::Clock;
use crate::error::ConfigError;
use crate::identity::{BaseIdentityFactory, IdentityFactory};
use crate::permissions::{AllowAny, IsAuthenticated, IsAuthenticatedOrReadOnly, Permission};
use crate::throttle::{
    AnonRateThrottle, Rate, Throttle, ThrottleBackend, ThrottleCache, ThrottleKey,
    UserRateThrottle, DEFAULT_CACHE_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Immutable admission configuration.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    authenticators: Vec<Arc<dyn Authenticator>>,
    permissions: Vec<Arc<dyn Permission>>,
    throttles: Vec<Throttle>,
    backend: Option<ThrottleBackend>,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Resolve declarative settings. `cache` enables throttling; `None` leaves it inert.
    pub fn from_settings(
        settings: &Settings,
        registry: &StrategyRegistry,
        cache: Option<Arc<dyn ThrottleCache>>,
    ) -> Result<Self, ConfigError> {
        let timeout = Duration::from_millis(settings.cache_timeout_ms);
        Ok(Self {
            authenticators: registry.authenticators(&settings.authentication, settings)?,
            permissions: registry.permissions(&settings.permissions)?,
            throttles: registry.throttles(&settings.throttles)?,
            backend: cache.map(|cache| ThrottleBackend::new(cache).with_timeout(timeout)),
        })
    }

    /// Validators, in the order they are tried.
    pub fn authenticators(&self) -> &[Arc<dyn Authenticator>] {
        &self.authenticators
    }

    pub fn permissions(&self) -> &[Arc<dyn Permission>] {
        &self.permissions
    }

    pub fn throttles(&self) -> &[Throttle] {
        &self.throttles
    }

    /// Cache backing the throttles, if any.
    pub fn backend(&self) -> Option<&ThrottleBackend> {
        self.backend.as_ref()
    }

    /// Copy of this configuration with an endpoint's overrides applied.
    pub fn with_policy(&self, policy: EndpointPolicy) -> Self {
        Self {
            authenticators: policy.authenticators.unwrap_or_else(|| self.authenticators.clone()),
            permissions: policy.permissions.unwrap_or_else(|| self.permissions.clone()),
            throttles: policy.throttles.unwrap_or_else(|| self.throttles.clone()),
            backend: self.backend.clone(),
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let authenticators: Vec<_> = self.authenticators.iter().map(|a| a.name()).collect();
        let permissions: Vec<_> = self.permissions.iter().map(|p| p.name()).collect();
        f.debug_struct("PipelineConfig")
            .field("authenticators", &authenticators)
            .field("permissions", &permissions)
            .field("throttles", &self.throttles)
            .field("backend", &self.backend)
            .finish()
    }
}

/// Builder for [`PipelineConfig`]. Starts with empty lists and no cache.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    authenticators: Vec<Arc<dyn Authenticator>>,
    permissions: Vec<Arc<dyn Permission>>,
    throttles: Vec<Throttle>,
    cache: Option<Arc<dyn ThrottleCache>>,
    clock: Option<Arc<dyn Clock>>,
    cache_timeout: Option<Duration>,
}

impl PipelineConfigBuilder {
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticators.push(Arc::new(authenticator));
        self
    }

    pub fn permission(mut self, permission: impl Permission + 'static) -> Self {
        self.permissions.push(Arc::new(permission));
        self
    }

    pub fn throttle(mut self, throttle: Throttle) -> Self {
        self.throttles.push(throttle);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ThrottleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Clock used to stamp throttle history. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let Self { authenticators, permissions, throttles, cache, clock, cache_timeout } = self;
        let backend = cache.map(|cache| {
            let mut backend = ThrottleBackend::new(cache)
                .with_timeout(cache_timeout.unwrap_or(DEFAULT_CACHE_TIMEOUT));
            if let Some(clock) = clock {
                backend = backend.with_clock(clock);
            }
            backend
        });
        PipelineConfig { authenticators, permissions, throttles, backend }
    }
}

/// Per-endpoint overrides. `None` inherits the global list; `Some(vec![])` clears it.
#[derive(Clone, Default)]
pub struct EndpointPolicy {
    pub authenticators: Option<Vec<Arc<dyn Authenticator>>>,
    pub permissions: Option<Vec<Arc<dyn Permission>>>,
    pub throttles: Option<Vec<Throttle>>,
}

impl EndpointPolicy {
    /// Resolve declarative overrides through `registry`.
    pub fn from_settings(
        endpoint: &EndpointSettings,
        settings: &Settings,
        registry: &StrategyRegistry,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            authenticators: endpoint
                .authentication
                .as_ref()
                .map(|names| registry.authenticators(names, settings))
                .transpose()?,
            permissions: endpoint
                .permissions
                .as_ref()
                .map(|names| registry.permissions(names))
                .transpose()?,
            throttles: endpoint
                .throttles
                .as_ref()
                .map(|entries| registry.throttles(entries))
                .transpose()?,
        })
    }
}

/// Declarative configuration surface.
///
/// Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Authenticator names, tried in order.
    pub authentication: Vec<String>,
    /// Permission names, all of which must pass.
    pub permissions: Vec<String>,
    /// Throttle scopes, checked in order.
    pub throttles: Vec<ThrottleSettings>,
    /// Shared secret for bearer tokens.
    pub jwt_secret: Option<String>,
    /// Allowed bearer token algorithms.
    pub jwt_algorithms: Vec<String>,
    /// Realm in the Basic challenge.
    pub basic_realm: String,
    /// Bound on each throttle cache call, in milliseconds.
    pub cache_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            authentication: vec![BasicAuthentication::NAME.into()],
            permissions: vec![AllowAny::NAME.into()],
            throttles: Vec::new(),
            jwt_secret: None,
            jwt_algorithms: vec!["HS256".into()],
            basic_realm: crate::authentication::basic::DEFAULT_REALM.into(),
            cache_timeout_ms: DEFAULT_CACHE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Parse a JSON settings document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidSettings(e.to_string()))
    }
}

/// One throttle scope in [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleSettings {
    /// Keying strategy name (`anon`, `user`, or a registered one).
    pub strategy: String,
    /// Scope name; defaults to the strategy name.
    #[serde(default)]
    pub scope: Option<String>,
    /// Rate string. Absent means the scope is inert.
    #[serde(default)]
    pub rate: Option<String>,
}

/// Declarative endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointSettings {
    pub authentication: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
    pub throttles: Option<Vec<ThrottleSettings>>,
}

/// Context handed to custom authenticator factories.
pub struct StrategyContext<'a> {
    pub settings: &'a Settings,
    pub identity_factory: Arc<dyn IdentityFactory>,
}

type AuthenticatorFactory =
    Arc<dyn Fn(&StrategyContext<'_>) -> Result<Arc<dyn Authenticator>, ConfigError> + Send + Sync>;
type PermissionFactory = Arc<dyn Fn() -> Arc<dyn Permission> + Send + Sync>;
type ThrottleKeyFactory = Arc<dyn Fn() -> Arc<dyn ThrottleKey> + Send + Sync>;

/// Maps strategy names to constructors.
///
/// Built-ins are always available; custom strategies are registered by name and take
/// precedence over a built-in of the same name.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    identity_factory: Option<Arc<dyn IdentityFactory>>,
    authenticators: HashMap<String, AuthenticatorFactory>,
    permissions: HashMap<String, PermissionFactory>,
    throttle_keys: HashMap<String, ThrottleKeyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity factory shared by all authenticators built from this registry.
    pub fn with_identity_factory(mut self, factory: Arc<dyn IdentityFactory>) -> Self {
        self.identity_factory = Some(factory);
        self
    }

    pub fn register_authenticator<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&StrategyContext<'_>) -> Result<Arc<dyn Authenticator>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.authenticators.insert(name.into(), Arc::new(factory));
    }

    pub fn register_permission<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Permission> + Send + Sync + 'static,
    {
        self.permissions.insert(name.into(), Arc::new(factory));
    }

    pub fn register_throttle<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn ThrottleKey> + Send + Sync + 'static,
    {
        self.throttle_keys.insert(name.into(), Arc::new(factory));
    }

    fn identity_factory(&self) -> Arc<dyn IdentityFactory> {
        match &self.identity_factory {
            Some(factory) => factory.clone(),
            None => {
                tracing::warn!("no identity factory configured, defaulting to BaseIdentityFactory");
                Arc::new(BaseIdentityFactory)
            }
        }
    }

    /// Resolve authenticator names in order.
    pub fn authenticators(
        &self,
        names: &[String],
        settings: &Settings,
    ) -> Result<Vec<Arc<dyn Authenticator>>, ConfigError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let ctx = StrategyContext { settings, identity_factory: self.identity_factory() };
        names.iter().map(|name| self.authenticator(name, &ctx)).collect()
    }

    fn authenticator(
        &self,
        name: &str,
        ctx: &StrategyContext<'_>,
    ) -> Result<Arc<dyn Authenticator>, ConfigError> {
        if let Some(factory) = self.authenticators.get(name) {
            return factory(ctx);
        }
        let factory = ctx.identity_factory.clone();
        match name {
            BasicAuthentication::NAME => Ok(Arc::new(
                BasicAuthentication::new(factory).with_realm(ctx.settings.basic_realm.clone()),
            )),
            BearerAuthentication::NAME | "jwt" => {
                let mut auth = BearerAuthentication::new(factory)
                    .with_algorithms(parse_algorithms(&ctx.settings.jwt_algorithms)?)?;
                if let Some(secret) = &ctx.settings.jwt_secret {
                    auth = auth.with_secret(secret.clone());
                }
                Ok(Arc::new(auth))
            }
            _ => Err(unknown("authentication", name)),
        }
    }

    /// Resolve permission names in order.
    pub fn permissions(&self, names: &[String]) -> Result<Vec<Arc<dyn Permission>>, ConfigError> {
        names.iter().map(|name| self.permission(name)).collect()
    }

    fn permission(&self, name: &str) -> Result<Arc<dyn Permission>, ConfigError> {
        if let Some(factory) = self.permissions.get(name) {
            return Ok(factory());
        }
        match name {
            AllowAny::NAME => Ok(Arc::new(AllowAny)),
            IsAuthenticated::NAME => Ok(Arc::new(IsAuthenticated)),
            IsAuthenticatedOrReadOnly::NAME => Ok(Arc::new(IsAuthenticatedOrReadOnly)),
            _ => Err(unknown("permission", name)),
        }
    }

    /// Resolve throttle scopes in order, parsing every rate eagerly.
    pub fn throttles(&self, entries: &[ThrottleSettings]) -> Result<Vec<Throttle>, ConfigError> {
        entries.iter().map(|entry| self.throttle(entry)).collect()
    }

    fn throttle(&self, entry: &ThrottleSettings) -> Result<Throttle, ConfigError> {
        let key: Arc<dyn ThrottleKey> = match self.throttle_keys.get(&entry.strategy) {
            Some(factory) => factory(),
            None => match entry.strategy.as_str() {
                AnonRateThrottle::NAME => Arc::new(AnonRateThrottle),
                UserRateThrottle::NAME => Arc::new(UserRateThrottle),
                other => return Err(unknown("throttle", other)),
            },
        };
        let rate = entry.rate.as_deref().map(Rate::parse).transpose()?;
        let scope = entry.scope.clone().unwrap_or_else(|| entry.strategy.clone());
        Ok(Throttle::new(scope, key, rate))
    }
}

fn unknown(kind: &'static str, name: &str) -> ConfigError {
    tracing::error!(kind, name, "unknown strategy in configuration");
    ConfigError::UnknownStrategy { kind, name: name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::InMemoryCache;

    fn names(config: &PipelineConfig) -> (Vec<&'static str>, Vec<&'static str>) {
        (
            config.authenticators().iter().map(|a| a.name()).collect(),
            config.permissions().iter().map(|p| p.name()).collect(),
        )
    }

    #[test]
    fn defaults_match_basic_and_allow_any() {
        let config =
            PipelineConfig::from_settings(&Settings::default(), &StrategyRegistry::new(), None)
                .unwrap();
        assert_eq!(names(&config), (vec!["basic"], vec!["allow_any"]));
        assert!(config.throttles().is_empty());
        assert!(config.backend().is_none());
    }

    #[test]
    fn json_settings_resolve_in_order() {
        let settings = Settings::from_json(
            r#"{
                "authentication": ["bearer", "basic"],
                "permissions": ["is_authenticated_or_read_only", "is_authenticated"],
                "throttles": [
                    {"strategy": "anon", "rate": "10/minute"},
                    {"strategy": "user", "scope": "burst", "rate": "5/s"},
                    {"strategy": "user"}
                ],
                "jwt_secret": "s3cret",
                "cache_timeout_ms": 25
            }"#,
        )
        .unwrap();
        let cache: Arc<dyn ThrottleCache> = Arc::new(InMemoryCache::new());
        let config =
            PipelineConfig::from_settings(&settings, &StrategyRegistry::new(), Some(cache))
                .unwrap();

        assert_eq!(
            names(&config),
            (vec!["bearer", "basic"], vec!["is_authenticated_or_read_only", "is_authenticated"])
        );
        let scopes: Vec<_> = config.throttles().iter().map(|t| (t.scope(), t.rate())).collect();
        assert_eq!(
            scopes,
            vec![("anon", Some(Rate::new(10, 60))), ("burst", Some(Rate::new(5, 1))), ("user", None)]
        );
        assert_eq!(config.backend().unwrap().timeout(), Duration::from_millis(25));
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        let err = Settings::from_json(
            r#"{"permissions": ["is_authenticated"], "throttle": [{"strategy": "anon", "rate": "1/s"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings(ref msg) if msg.contains("throttle")));

        let err = Settings::from_json(r#"{"jwt_secrt": "x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings(ref msg) if msg.contains("jwt_secrt")));

        let err = Settings::from_json(r#"{"throttles": [{"strategy": "anon", "rte": "1/s"}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings(_)));

        let endpoint: Result<EndpointSettings, _> =
            serde_json::from_str(r#"{"permission": ["allow_any"]}"#);
        assert!(endpoint.is_err());
    }

    #[test]
    fn bad_rate_fails_at_load_time() {
        let settings = Settings {
            throttles: vec![ThrottleSettings {
                strategy: "anon".into(),
                scope: None,
                rate: Some("3/fortnight".into()),
            }],
            ..Settings::default()
        };
        let err = PipelineConfig::from_settings(&settings, &StrategyRegistry::new(), None)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidRate { .. }));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let registry = StrategyRegistry::new();
        let settings = Settings { permissions: vec!["is_admin".into()], ..Settings::default() };
        let err = PipelineConfig::from_settings(&settings, &registry, None).err().unwrap();
        assert_eq!(
            err,
            ConfigError::UnknownStrategy { kind: "permission", name: "is_admin".into() }
        );

        let settings = Settings { authentication: vec!["digest".into()], ..Settings::default() };
        assert!(PipelineConfig::from_settings(&settings, &registry, None).is_err());
    }

    #[test]
    fn bad_jwt_algorithm_is_rejected() {
        let settings = Settings {
            authentication: vec!["bearer".into()],
            jwt_algorithms: vec!["RS256".into()],
            ..Settings::default()
        };
        let err = PipelineConfig::from_settings(&settings, &StrategyRegistry::new(), None)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidAlgorithm(_)));
    }

    #[test]
    fn registered_strategies_resolve_by_name() {
        struct Never;
        impl Permission for Never {
            fn name(&self) -> &'static str {
                "never"
            }
            fn has_permission(&self, _ctx: &crate::request::RequestContext) -> bool {
                false
            }
        }

        let mut registry = StrategyRegistry::new();
        registry.register_permission("never", || Arc::new(Never) as Arc<dyn Permission>);
        registry.register_throttle("by_ip", || Arc::new(AnonRateThrottle) as Arc<dyn ThrottleKey>);
        let settings = Settings {
            permissions: vec!["never".into()],
            throttles: vec![ThrottleSettings {
                strategy: "by_ip".into(),
                scope: None,
                rate: Some("1/h".into()),
            }],
            ..Settings::default()
        };
        let config = PipelineConfig::from_settings(&settings, &registry, None).unwrap();
        assert_eq!(config.permissions()[0].name(), "never");
        assert_eq!(config.throttles()[0].scope(), "by_ip");
        assert_eq!(config.throttles()[0].strategy(), "anon");
    }

    #[test]
    fn endpoint_policy_overrides_only_what_it_sets() {
        let settings = Settings::default();
        let registry = StrategyRegistry::new();
        let global = PipelineConfig::from_settings(&settings, &registry, None).unwrap();

        let endpoint = EndpointSettings {
            permissions: Some(vec!["is_authenticated".into()]),
            ..EndpointSettings::default()
        };
        let policy = EndpointPolicy::from_settings(&endpoint, &settings, &registry).unwrap();
        let config = global.with_policy(policy);
        assert_eq!(names(&config), (vec!["basic"], vec!["is_authenticated"]));

        let cleared = global.with_policy(EndpointPolicy {
            authenticators: Some(vec![]),
            ..EndpointPolicy::default()
        });
        assert!(cleared.authenticators().is_empty());
        assert_eq!(cleared.permissions().len(), 1);
    }
}
