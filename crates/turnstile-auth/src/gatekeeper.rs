//! Pipeline orchestration.
//!
//! A [`Gatekeeper`] owns the token codec, revocation store, permission
//! resolver and rate limiter, and layers ordered middleware stacks onto
//! routers by [`RouteClass`]:
//!
//! | Class      | Stages                                               |
//! |------------|------------------------------------------------------|
//! | Public     | optional auth, `ip` limit                            |
//! | Protected  | require auth, `user` limit                           |
//! | Admin      | require auth, require `admin`, `admin` limit         |
//! | Login      | `login` limit, no-cache                              |
//! | Register   | `register` limit, no-cache                           |
//! | Upload     | require auth, `upload` limit, no-cache               |
//!
//! Every class is preceded by the IP filter stage when lists are configured
//! and by the timeout stage when a timeout is configured.
//!
//! # Example
//!
//! ```ignore
//! let gatekeeper = Gatekeeper::builder(config, cache)
//!     .ownership("article", Arc::new(article_owners))
//!     .build()?;
//!
//! let articles = Router::new()
//!     .route("/articles/{id}", delete(delete_article));
//! let articles = gatekeeper.require_permission(articles, "article:delete:own".parse()?, Some("id"));
//!
//! let app = Router::new()
//!     .merge(gatekeeper.apply(public_routes, RouteClass::Public))
//!     .merge(gatekeeper.apply(articles, RouteClass::Protected));
//! ```

use std::fmt;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, Uri};
use axum::middleware::{from_fn, from_fn_with_state};

use crate::AuthResult;
use crate::cache::Cache;
use crate::config::{ConfigError, GatekeeperConfig};
use crate::error::AuthError;
use crate::middleware::{
    IpFilterGuard, PermissionGuard, RateLimitGuard, ip_filter, no_cache, optional_auth,
    request_timeout, require_auth, require_permission, require_role,
};
use crate::permission::{OwnershipLookup, Permission, PermissionResolver, PermissionSource, RoleTable};
use crate::rate_limit::{
    Clock, EndpointKey, IpFilter, IpKey, PolicyKind, PrincipalKey, RateLimitPolicy,
    RateLimiter, RateStatus, skip_roles,
};
use crate::revocation::RevocationStore;
use crate::token::{IssuedToken, TokenCodec, extract_token};
use crate::types::{ADMIN_ROLE, Identity, Principal};

// =============================================================================
// Stages and route classes
// =============================================================================

/// A single middleware stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Reject clients outside the configured IP lists.
    IpFilter,
    /// Answer 408 after the configured deadline.
    Timeout,
    /// Attach an identity if a good token is present.
    OptionalAuth,
    /// Require a good token.
    RequireAuth,
    /// Require a role.
    RequireRole(String),
    /// Spend budget under a named policy.
    RateLimit(PolicyKind),
    /// Mark responses uncacheable.
    NoCache,
}

/// Named route groups with predefined stage lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Anonymous access allowed.
    Public,
    /// Any authenticated principal.
    Protected,
    /// Admins only.
    Admin,
    /// Login endpoint.
    Login,
    /// Registration endpoint.
    Register,
    /// File uploads.
    Upload,
}

impl RouteClass {
    /// Class-specific stages, outermost first.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            Self::Public => vec![Stage::OptionalAuth, Stage::RateLimit(PolicyKind::Ip)],
            Self::Protected => vec![Stage::RequireAuth, Stage::RateLimit(PolicyKind::User)],
            Self::Admin => vec![
                Stage::RequireAuth,
                Stage::RequireRole(ADMIN_ROLE.to_string()),
                Stage::RateLimit(PolicyKind::Admin),
            ],
            Self::Login => vec![Stage::RateLimit(PolicyKind::Login), Stage::NoCache],
            Self::Register => vec![Stage::RateLimit(PolicyKind::Register), Stage::NoCache],
            Self::Upload => vec![
                Stage::RequireAuth,
                Stage::RateLimit(PolicyKind::Upload),
                Stage::NoCache,
            ],
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Gatekeeper`].
pub struct GatekeeperBuilder {
    config: GatekeeperConfig,
    cache: Arc<dyn Cache>,
    ownership: Vec<(String, Arc<dyn OwnershipLookup>)>,
    source: Option<Arc<dyn PermissionSource>>,
    clock: Option<Clock>,
}

impl GatekeeperBuilder {
    /// Registers the ownership lookup for a resource type.
    #[must_use]
    pub fn ownership(mut self, resource: impl Into<String>, lookup: Arc<dyn OwnershipLookup>) -> Self {
        self.ownership.push((resource.into(), lookup));
        self
    }

    /// Replaces the role table as the source of effective permissions.
    #[must_use]
    pub fn permission_source(mut self, source: Arc<dyn PermissionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replaces the rate limiter's clock.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the configuration and assembles the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is invalid.
    pub fn build(self) -> Result<Arc<Gatekeeper>, ConfigError> {
        self.config.validate()?;

        let codec = Arc::new(TokenCodec::new(&self.config.token));
        let revocation = RevocationStore::new(
            codec.clone(),
            self.cache.clone(),
            self.config.token.refresh_window,
        );

        let roles = RoleTable::from_config(&self.config.permissions)?;
        let mut resolver = PermissionResolver::new(self.cache.clone(), &self.config.permissions, roles);
        if let Some(source) = self.source {
            resolver = resolver.with_source(source);
        }
        for (resource, lookup) in self.ownership {
            resolver = resolver.with_ownership(resource, lookup);
        }

        let mut limiter = RateLimiter::new(self.cache.clone());
        if let Some(clock) = self.clock {
            limiter = limiter.with_clock(clock);
        }

        let ip_filter = Arc::new(IpFilter::from_config(&self.config.ip_filter)?);

        tracing::info!(
            issuer = %self.config.token.issuer,
            rate_limit_enabled = self.config.rate_limit.enabled,
            ip_filter = !ip_filter.is_empty(),
            timeout = ?self.config.timeout,
            "Gatekeeper initialized"
        );

        Ok(Arc::new(Gatekeeper {
            config: self.config,
            codec,
            revocation,
            resolver,
            limiter,
            ip_filter,
        }))
    }
}

// =============================================================================
// Gatekeeper
// =============================================================================

/// The assembled pipeline. Built once and shared as `Arc<Gatekeeper>`.
pub struct Gatekeeper {
    config: GatekeeperConfig,
    codec: Arc<TokenCodec>,
    revocation: RevocationStore,
    resolver: PermissionResolver,
    limiter: RateLimiter,
    ip_filter: Arc<IpFilter>,
}

impl fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("codec", &self.codec)
            .field("resolver", &self.resolver)
            .field("ip_filter", &self.ip_filter)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    /// Starts building a gatekeeper over `cache`.
    #[must_use]
    pub fn builder(config: GatekeeperConfig, cache: Arc<dyn Cache>) -> GatekeeperBuilder {
        GatekeeperBuilder {
            config,
            cache,
            ownership: Vec::new(),
            source: None,
            clock: None,
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Token codec.
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Revocation store.
    #[must_use]
    pub fn revocation(&self) -> &RevocationStore {
        &self.revocation
    }

    /// Permission resolver.
    #[must_use]
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    // -------------------------------------------------------------------------
    // Stack assembly
    // -------------------------------------------------------------------------

    /// Full stage list for `class`, outermost first, including the IP filter
    /// and timeout stages when configured.
    #[must_use]
    pub fn stages(&self, class: RouteClass) -> Vec<Stage> {
        let mut stages = Vec::new();
        if !self.ip_filter.is_empty() {
            stages.push(Stage::IpFilter);
        }
        if self.config.timeout.is_some() {
            stages.push(Stage::Timeout);
        }
        stages.extend(
            class
                .stages()
                .into_iter()
                .filter(|stage| self.config.rate_limit.enabled || !matches!(stage, Stage::RateLimit(_))),
        );
        stages
    }

    /// Layers the stages of `class` onto `router`.
    pub fn apply<S>(self: &Arc<Self>, router: Router<S>, class: RouteClass) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // The last layer added runs first, so add innermost stages first.
        self.stages(class)
            .into_iter()
            .rev()
            .fold(router, |router, stage| self.layer_stage(router, &stage))
    }

    /// Adds a permission stage to every route of `router`.
    ///
    /// `id_param` names the path parameter holding the resource id for
    /// `own`-scoped permissions. The stage runs after routing, so it runs
    /// after any stages added with [`apply`](Self::apply).
    pub fn require_permission<S>(
        self: &Arc<Self>,
        router: Router<S>,
        permission: Permission,
        id_param: Option<&str>,
    ) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let guard = PermissionGuard {
            gatekeeper: self.clone(),
            permission: Arc::new(permission),
            id_param: id_param.map(Arc::from),
        };
        router.route_layer(from_fn_with_state(guard, require_permission))
    }

    fn layer_stage<S>(self: &Arc<Self>, router: Router<S>, stage: &Stage) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        match stage {
            Stage::IpFilter => {
                let guard = IpFilterGuard {
                    filter: self.ip_filter.clone(),
                    trust_forwarded: self.config.rate_limit.trust_forwarded_headers,
                };
                router.layer(from_fn_with_state(guard, ip_filter))
            }
            Stage::Timeout => match self.config.timeout {
                Some(deadline) => router.layer(from_fn_with_state(deadline, request_timeout)),
                None => router,
            },
            Stage::OptionalAuth => router.layer(from_fn_with_state(self.clone(), optional_auth)),
            Stage::RequireAuth => router.layer(from_fn_with_state(self.clone(), require_auth)),
            Stage::RequireRole(role) => {
                router.layer(from_fn_with_state(Arc::<str>::from(role.as_str()), require_role))
            }
            Stage::RateLimit(kind) => self.rate_limit_guard(*kind).apply(router),
            Stage::NoCache => router.layer(from_fn(no_cache)),
        }
    }

    /// Guard for a named policy with its default key function.
    #[must_use]
    pub fn rate_limit_guard(&self, kind: PolicyKind) -> RateLimitGuard {
        let policy = RateLimitPolicy::builtin(kind, &self.config.rate_limit);
        let ip = IpKey {
            trust_forwarded: self.config.rate_limit.trust_forwarded_headers,
        };
        let limiter = self.limiter.clone();
        match kind {
            PolicyKind::Ip | PolicyKind::Login | PolicyKind::Register => {
                RateLimitGuard::new(limiter, policy, ip)
            }
            PolicyKind::User | PolicyKind::Upload => {
                RateLimitGuard::new(limiter, policy, PrincipalKey { ip })
            }
            PolicyKind::Admin => RateLimitGuard::new(limiter, policy, PrincipalKey { ip })
                .skip_if(skip_roles(self.config.rate_limit.admin_exempt_roles.clone())),
        }
    }

    /// Guard for a custom per-endpoint policy keyed by method, path and caller.
    #[must_use]
    pub fn endpoint_guard(&self, policy: RateLimitPolicy) -> RateLimitGuard {
        let ip = IpKey {
            trust_forwarded: self.config.rate_limit.trust_forwarded_headers,
        };
        RateLimitGuard::new(
            self.limiter.clone(),
            policy,
            EndpointKey {
                caller: PrincipalKey { ip },
            },
        )
    }

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    /// Verifies a raw token and checks it against the blacklist.
    ///
    /// # Errors
    ///
    /// Returns the verification error, or `AuthError::TokenRevoked`.
    pub async fn authenticate_token(&self, token: &str) -> AuthResult<Identity> {
        let claims = self.codec.verify(token)?;
        if self.revocation.is_jti_revoked(&claims.jti).await {
            return Err(AuthError::TokenRevoked);
        }
        Ok(Identity::from_claims(claims, token))
    }

    /// Locates and authenticates the token on a request.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingToken` when no token is present, otherwise
    /// as [`authenticate_token`](Self::authenticate_token).
    pub async fn authenticate(&self, headers: &HeaderMap, uri: &Uri) -> AuthResult<Identity> {
        let token = extract_token(headers, uri).ok_or(AuthError::MissingToken)?;
        self.authenticate_token(&token).await
    }

    // -------------------------------------------------------------------------
    // Facade
    // -------------------------------------------------------------------------

    /// Issues a token with the default lifetime.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn issue_token(&self, principal: &Principal) -> AuthResult<IssuedToken> {
        Ok(self.codec.issue_default(principal)?)
    }

    /// Revokes a token. Already-expired tokens are accepted silently.
    ///
    /// # Errors
    ///
    /// See [`RevocationStore::revoke`].
    pub async fn revoke_token(&self, token: &str) -> AuthResult<()> {
        self.revocation.revoke(token).await
    }

    /// Exchanges a token near expiry for a fresh one.
    ///
    /// # Errors
    ///
    /// See [`RevocationStore::refresh`].
    pub async fn refresh_token(&self, token: &str) -> AuthResult<IssuedToken> {
        self.revocation.refresh(token).await
    }

    /// Drops a principal's cached permission set.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the entry cannot be deleted.
    pub async fn clear_user_permission_cache(&self, principal_id: u64) -> AuthResult<()> {
        self.resolver.clear_cache(principal_id).await
    }

    /// Checks a permission for an identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` when denied.
    pub async fn check_permission(
        &self,
        identity: &Identity,
        required: &Permission,
        resource_id: Option<&str>,
    ) -> AuthResult<()> {
        self.resolver.check(identity, required, resource_id).await
    }

    /// Current window of `key` under a named policy.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the counter cannot be read.
    pub async fn rate_limit_status(&self, kind: PolicyKind, key: &str) -> AuthResult<RateStatus> {
        let policy = RateLimitPolicy::builtin(kind, &self.config.rate_limit);
        Ok(self.limiter.status(&policy, key).await?)
    }

    /// Resets `key`'s current window under a named policy.
    ///
    /// # Errors
    ///
    /// Returns a cache error if the counter cannot be deleted.
    pub async fn clear_rate_limit(&self, kind: PolicyKind, key: &str) -> AuthResult<bool> {
        let policy = RateLimitPolicy::builtin(kind, &self.config.rate_limit);
        Ok(self.limiter.clear(&policy, key).await?)
    }
}
