//! Tracking module: composition root for the context store, capture layer,
//! identity resolver and tracking facade.
//!
//! Two construction modes:
//! 1. [`TrackingModule::for_root`] -- options are already resolved
//! 2. [`TrackingModule::for_root_async`] -- options come from a future resolved
//!    at startup (e.g. fetched from a secrets service); anything the future
//!    depends on is captured by it
//!
//! Either way the module publishes one shared [`Tracker`] for the rest of
//! the application and a [`ContextCaptureLayer`] to mount on the router.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use ctxtrack_core::{AnalyticsClient, ContextStore, TrackingOptions};
use tracing::info;

use crate::middleware::ContextCaptureLayer;
use crate::tracking::{TracingClient, Tracker};

/// Client factory for the bundled [`TracingClient`].
///
/// # Errors
///
/// Never fails; the signature matches what the module constructors expect.
pub fn tracing_client(options: &TrackingOptions) -> anyhow::Result<Arc<dyn AnalyticsClient>> {
    Ok(Arc::new(TracingClient::new(
        &options.token,
        options.init_config.clone(),
    )))
}

/// Wires the tracking components together.
///
/// The tracker is shared via `Arc`; the store and layer are zero-cost
/// handles onto the same task-local slot.
#[derive(Debug)]
pub struct TrackingModule {
    store: ContextStore,
    tracker: Arc<Tracker>,
}

impl TrackingModule {
    /// Builds the module from fully resolved options. `client_factory`
    /// builds the wrapped analytics client from the token and opaque
    /// `init_config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `client_factory` fails.
    pub fn for_root(
        options: TrackingOptions,
        client_factory: impl FnOnce(&TrackingOptions) -> anyhow::Result<Arc<dyn AnalyticsClient>>,
    ) -> anyhow::Result<Self> {
        let client = client_factory(&options)?;

        info!(
            strategy = options.strategy.kind(),
            ip_header = %options.ip_header,
            "tracking module initialised"
        );

        Ok(Self {
            store: ContextStore::new(),
            tracker: Arc::new(Tracker::new(options, client)),
        })
    }

    /// Builds the module once `options` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving the options or building the client fails.
    pub async fn for_root_async<Fut>(
        options: Fut,
        client_factory: impl FnOnce(&TrackingOptions) -> anyhow::Result<Arc<dyn AnalyticsClient>>,
    ) -> anyhow::Result<Self>
    where
        Fut: Future<Output = anyhow::Result<TrackingOptions>>,
    {
        let options = options.await?;
        Self::for_root(options, client_factory)
    }

    /// Returns the shared tracking facade.
    #[must_use]
    pub fn tracker(&self) -> Arc<Tracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn store(&self) -> ContextStore {
        self.store
    }

    #[must_use]
    pub fn capture_layer(&self) -> ContextCaptureLayer {
        ContextCaptureLayer::new(self.store)
    }

    /// Installs the capture layer around every route of `router`.
    ///
    /// Call after all routes and identity-dependent layers are added so the
    /// capture layer is outermost among them. Layers that publish
    /// `SessionData` or `AuthenticatedUser` extensions go on after `mount`.
    #[must_use]
    pub fn mount<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(self.capture_layer())
    }
}
