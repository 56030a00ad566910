//! Tracking facade: merges request-derived identity into analytics calls.
//!
//! The facade keeps no per-request state. Identity and client IP are read
//! from the ambient [`ContextStore`] when a method is *called*, before the
//! returned future is first polled, so the future can be awaited or spawned
//! anywhere without losing the request's identity.

use std::future::Future;
use std::sync::Arc;

use ctxtrack_core::{
    client_ip, AnalyticsClient, ContextScope, ContextStore, IdentityResolver, Properties,
    TrackingOptions,
};
use serde_json::Value;
use tracing::debug;

/// Property key carrying the resolved distinct identifier.
pub const DISTINCT_ID_KEY: &str = "distinct_id";
/// Property key carrying the resolved client IP.
pub const IP_KEY: &str = "ip";

/// Subject of a profile update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSubject {
    /// Caller-supplied distinct id.
    Explicit(String),
    /// Resolve the distinct id from the ambient request, as `track` does.
    Resolved,
}

impl From<&str> for ProfileSubject {
    fn from(id: &str) -> Self {
        Self::Explicit(id.to_string())
    }
}

impl From<String> for ProfileSubject {
    fn from(id: String) -> Self {
        Self::Explicit(id)
    }
}

#[derive(Debug, Clone, Copy)]
enum ProfileOp {
    Set,
    SetOnce,
}

/// Request-aware wrapper around an [`AnalyticsClient`].
///
/// One instance is shared by the whole application; it is safe to use from
/// any number of concurrent requests.
pub struct Tracker {
    options: Arc<TrackingOptions>,
    resolver: IdentityResolver,
    store: ContextStore,
    client: Arc<dyn AnalyticsClient>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("strategy", self.resolver.strategy())
            .field("ip_header", &self.options.ip_header)
            .finish_non_exhaustive()
    }
}

impl Tracker {
    #[must_use]
    pub fn new(options: TrackingOptions, client: Arc<dyn AnalyticsClient>) -> Self {
        Self {
            resolver: IdentityResolver::new(options.strategy.clone()),
            options: Arc::new(options),
            store: ContextStore::new(),
            client,
        }
    }

    #[must_use]
    pub fn options(&self) -> &TrackingOptions {
        &self.options
    }

    /// The wrapped client.
    #[must_use]
    pub fn client(&self) -> Arc<dyn AnalyticsClient> {
        Arc::clone(&self.client)
    }

    /// Distinct id for the ambient request, falling back to its context id.
    /// `None` outside any request scope.
    #[must_use]
    pub fn distinct_id(&self) -> Option<String> {
        self.resolver.resolve()
    }

    /// Distinct id for an explicitly supplied scope.
    #[must_use]
    pub fn distinct_id_in(&self, scope: &ContextScope) -> Option<String> {
        self.resolver.resolve_in(Some(scope))
    }

    /// Client IP for the ambient request from the configured IP header.
    #[must_use]
    pub fn client_ip(&self) -> Option<String> {
        let scope = self.store.current()?;
        self.client_ip_in(&scope)
    }

    fn client_ip_in(&self, scope: &ContextScope) -> Option<String> {
        scope.read_snapshot(|snapshot| client_ip(self.options.ip_header, snapshot))
    }

    /// Records `event` with `distinct_id` and `ip` defaults merged under the
    /// caller's `properties`; caller keys win on collision.
    ///
    /// Never fails because of identity resolution. Errors from the wrapped
    /// client are returned unchanged.
    pub fn track(
        &self,
        event: &str,
        properties: Option<Properties>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        let scope = self.store.current();
        self.dispatch_track(scope.as_deref(), event, properties)
    }

    /// [`track`](Self::track) against an explicit scope instead of the ambient one.
    pub fn track_in(
        &self,
        scope: &ContextScope,
        event: &str,
        properties: Option<Properties>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.dispatch_track(Some(scope), event, properties)
    }

    /// Overwrites profile properties of `subject`, with the `ip` default merged in.
    pub fn set_profile(
        &self,
        subject: impl Into<ProfileSubject>,
        properties: Properties,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        let scope = self.store.current();
        self.dispatch_profile(ProfileOp::Set, scope.as_deref(), subject.into(), properties)
    }

    /// Sets profile properties of `subject` only where not already present.
    pub fn set_profile_once(
        &self,
        subject: impl Into<ProfileSubject>,
        properties: Properties,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        let scope = self.store.current();
        self.dispatch_profile(
            ProfileOp::SetOnce,
            scope.as_deref(),
            subject.into(),
            properties,
        )
    }

    fn dispatch_track(
        &self,
        scope: Option<&ContextScope>,
        event: &str,
        properties: Option<Properties>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        let mut merged = Properties::new();
        if let Some(id) = self.resolver.resolve_in(scope) {
            merged.insert(DISTINCT_ID_KEY.to_string(), Value::String(id));
        }
        self.merge_ip_and_caller(&mut merged, scope, properties);

        let client = Arc::clone(&self.client);
        let event = event.to_string();
        async move { client.track(&event, merged).await }
    }

    fn dispatch_profile(
        &self,
        op: ProfileOp,
        scope: Option<&ContextScope>,
        subject: ProfileSubject,
        properties: Properties,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        let distinct_id = match subject {
            ProfileSubject::Explicit(id) => Some(id),
            ProfileSubject::Resolved => self.resolver.resolve_in(scope),
        };
        let mut merged = Properties::new();
        self.merge_ip_and_caller(&mut merged, scope, Some(properties));

        let client = Arc::clone(&self.client);
        async move {
            let Some(distinct_id) = distinct_id else {
                debug!(?op, "no distinct id for profile update outside request scope; skipped");
                return Ok(());
            };
            match op {
                ProfileOp::Set => client.people_set(&distinct_id, merged).await,
                ProfileOp::SetOnce => client.people_set_once(&distinct_id, merged).await,
            }
        }
    }

    fn merge_ip_and_caller(
        &self,
        merged: &mut Properties,
        scope: Option<&ContextScope>,
        properties: Option<Properties>,
    ) {
        if let Some(ip) = scope.and_then(|s| self.client_ip_in(s)) {
            merged.insert(IP_KEY.to_string(), Value::String(ip));
        }
        if let Some(properties) = properties {
            merged.extend(properties);
        }
    }
}
