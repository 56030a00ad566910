//! Tower middleware for request context capture.

pub mod capture;

pub use capture::{
    request_context_id, snapshot_request, AuthenticatedUser, ContextCaptureLayer,
    ContextCaptureService, SessionData,
};
