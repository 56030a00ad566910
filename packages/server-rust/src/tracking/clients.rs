//! Bundled [`AnalyticsClient`] sinks.
//!
//! Neither sink delivers events anywhere: delivery, batching and retry belong
//! to the real analytics client a host application plugs in.

use async_trait::async_trait;
use ctxtrack_core::{AnalyticsClient, Properties};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

// ---------------------------------------------------------------------------
// TracingClient
// ---------------------------------------------------------------------------

/// Emits every call as a structured `tracing` event under the
/// `ctxtrack::analytics` target.
#[derive(Debug, Clone)]
pub struct TracingClient {
    init_config: Option<Value>,
}

impl TracingClient {
    /// The token is accepted for parity with real clients but never logged.
    #[must_use]
    pub fn new(_token: &str, init_config: Option<Value>) -> Self {
        Self { init_config }
    }

    #[must_use]
    pub fn init_config(&self) -> Option<&Value> {
        self.init_config.as_ref()
    }
}

#[async_trait]
impl AnalyticsClient for TracingClient {
    async fn track(&self, event: &str, properties: Properties) -> anyhow::Result<()> {
        let properties = Value::Object(properties);
        info!(
            target: "ctxtrack::analytics",
            event,
            properties = %properties,
            "track"
        );
        Ok(())
    }

    async fn people_set(&self, distinct_id: &str, properties: Properties) -> anyhow::Result<()> {
        let properties = Value::Object(properties);
        info!(
            target: "ctxtrack::analytics",
            distinct_id,
            properties = %properties,
            "people.set"
        );
        Ok(())
    }

    async fn people_set_once(
        &self,
        distinct_id: &str,
        properties: Properties,
    ) -> anyhow::Result<()> {
        let properties = Value::Object(properties);
        info!(
            target: "ctxtrack::analytics",
            distinct_id,
            properties = %properties,
            "people.set_once"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryClient
// ---------------------------------------------------------------------------

/// Which client operation a [`RecordedCall`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Track,
    PeopleSet,
    PeopleSetOnce,
}

/// One call received by [`InMemoryClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    /// Event name for `Track`, distinct id for profile calls.
    pub target: String,
    pub properties: Properties,
}

/// Records every call in memory. Useful in tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryClient {
    calls: Mutex<Vec<RecordedCall>>,
}

impl InMemoryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded call, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Recorded `track` calls as `(event, properties)` pairs.
    #[must_use]
    pub fn tracked(&self) -> Vec<(String, Properties)> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.kind == CallKind::Track)
            .map(|c| (c.target.clone(), c.properties.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, kind: CallKind, target: &str, properties: Properties) {
        self.calls.lock().push(RecordedCall {
            kind,
            target: target.to_string(),
            properties,
        });
    }
}

#[async_trait]
impl AnalyticsClient for InMemoryClient {
    async fn track(&self, event: &str, properties: Properties) -> anyhow::Result<()> {
        self.record(CallKind::Track, event, properties);
        Ok(())
    }

    async fn people_set(&self, distinct_id: &str, properties: Properties) -> anyhow::Result<()> {
        self.record(CallKind::PeopleSet, distinct_id, properties);
        Ok(())
    }

    async fn people_set_once(
        &self,
        distinct_id: &str,
        properties: Properties,
    ) -> anyhow::Result<()> {
        self.record(CallKind::PeopleSetOnce, distinct_id, properties);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_client_records_in_order() {
        let client = InMemoryClient::new();
        client.track("signup", props(json!({"plan": "pro"}))).await.unwrap();
        client.people_set("u1", props(json!({"name": "Ada"}))).await.unwrap();
        client.people_set_once("u1", Properties::new()).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].kind, CallKind::Track);
        assert_eq!(calls[1].target, "u1");
        assert_eq!(calls[2].kind, CallKind::PeopleSetOnce);

        let tracked = client.tracked();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].0, "signup");
        assert_eq!(tracked[0].1["plan"], "pro");

        client.clear();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn tracing_client_accepts_calls() {
        let client = TracingClient::new("secret", Some(json!({"debug": true})));
        assert_eq!(client.init_config(), Some(&json!({"debug": true})));
        client.track("e", Properties::new()).await.unwrap();
        client.people_set("u", Properties::new()).await.unwrap();
        client.people_set_once("u", Properties::new()).await.unwrap();
    }
}
