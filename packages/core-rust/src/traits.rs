use async_trait::async_trait;
use serde_json::{Map, Value};

/// Property bag attached to tracked events and profile updates.
pub type Properties = Map<String, Value>;

/// Opaque event-recording sink wrapped by the tracking facade.
///
/// Implementations own delivery concerns (transport, batching, retry). Errors
/// are handed back to the caller of the facade unchanged.
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    /// Record `event` with the merged property bag.
    async fn track(&self, event: &str, properties: Properties) -> anyhow::Result<()>;

    /// Overwrite profile properties of `distinct_id`.
    async fn people_set(&self, distinct_id: &str, properties: Properties) -> anyhow::Result<()>;

    /// Set profile properties of `distinct_id` only where not already present.
    async fn people_set_once(&self, distinct_id: &str, properties: Properties)
        -> anyhow::Result<()>;
}
