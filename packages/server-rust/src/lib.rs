//! `ctxtrack` Server — request context capture, tracking facade, and axum wiring.

pub mod middleware;
pub mod module;
pub mod telemetry;
pub mod tracking;

pub use middleware::{AuthenticatedUser, ContextCaptureLayer, SessionData};
pub use module::{tracing_client, TrackingModule};
pub use telemetry::{init_tracing, LogFormat};
pub use tracking::{InMemoryClient, ProfileSubject, TracingClient, Tracker};
