//! `ctxtrack` Core — request-scoped context store, identity extraction, and the
//! analytics client seam.

pub mod config;
pub mod context;
pub mod ip;
pub mod path;
pub mod resolver;
pub mod store;
pub mod traits;

pub use config::{ConfigError, ExtractionStrategy, IpHeader, TrackingOptions};
pub use context::{ContextId, ContextScope, RequestSnapshot};
pub use ip::client_ip;
pub use path::resolve_path;
pub use resolver::{ExtractError, IdentityResolver};
pub use store::ContextStore;
pub use traits::{AnalyticsClient, Properties};
