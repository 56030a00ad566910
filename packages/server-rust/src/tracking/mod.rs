//! Tracking facade and bundled analytics sinks.
//!
//! - [`tracker`]: [`Tracker`], the request-aware facade the application depends on
//! - [`clients`]: [`TracingClient`] and [`InMemoryClient`] sinks

pub mod clients;
pub mod tracker;

pub use clients::{CallKind, InMemoryClient, RecordedCall, TracingClient};
pub use tracker::{ProfileSubject, Tracker, DISTINCT_ID_KEY, IP_KEY};
