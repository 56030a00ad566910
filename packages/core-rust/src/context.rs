//! Context Scope and Request Snapshot types.
//!
//! A [`ContextScope`] is created once per inbound request. It carries an
//! immutable [`ContextId`], a read-mostly [`RequestSnapshot`] of the request
//! metadata that identity extraction needs, and a bag of arbitrary entries
//! that application code may attach while the request is in flight.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ContextId
// ---------------------------------------------------------------------------

/// Globally unique identifier of a single request's context scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    /// Generates a fresh UUID v4 identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps a caller-supplied identifier (e.g. one propagated from upstream).
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RequestSnapshot
// ---------------------------------------------------------------------------

/// Snapshot of the request fields identity extraction can draw from.
///
/// Header names are stored lower-cased so lookups are case-insensitive.
/// `session` and `user` are arbitrary JSON trees; `cookies` is `None` when the
/// request carried no `Cookie` header at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSnapshot {
    pub headers: BTreeMap<String, String>,
    pub session: Option<Value>,
    pub user: Option<Value>,
    pub cookies: Option<BTreeMap<String, String>>,
}

impl RequestSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header, lower-casing its name.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: Value) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Looks up a header by name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .as_ref()
            .and_then(|cookies| cookies.get(name))
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// ContextScope
// ---------------------------------------------------------------------------

/// Per-request ambient record: unique id, request snapshot, and free-form entries.
///
/// Shared as `Arc<ContextScope>` between every task belonging to the same
/// logical request. Interior mutability lets late layers (auth, session) and
/// application code attach data without re-binding the scope.
#[derive(Debug)]
pub struct ContextScope {
    id: ContextId,
    snapshot: RwLock<RequestSnapshot>,
    entries: RwLock<HashMap<String, Value>>,
}

impl ContextScope {
    /// Creates a scope with a freshly generated id.
    #[must_use]
    pub fn new(snapshot: RequestSnapshot) -> Self {
        Self::with_id(ContextId::generate(), snapshot)
    }

    #[must_use]
    pub fn with_id(id: ContextId, snapshot: RequestSnapshot) -> Self {
        Self {
            id,
            snapshot: RwLock::new(snapshot),
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Runs `f` against the snapshot without cloning it.
    pub fn read_snapshot<R>(&self, f: impl FnOnce(&RequestSnapshot) -> R) -> R {
        f(&self.snapshot.read())
    }

    /// Returns a copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        self.snapshot.read().clone()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.read_snapshot(|s| s.header(name).map(str::to_owned))
    }

    #[must_use]
    pub fn session(&self) -> Option<Value> {
        self.read_snapshot(|s| s.session.clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<Value> {
        self.read_snapshot(|s| s.user.clone())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.read_snapshot(|s| s.cookie(name).map(str::to_owned))
    }

    /// Attaches the authenticated user after capture (e.g. from an auth layer).
    pub fn set_user(&self, user: Value) {
        self.snapshot.write().user = Some(user);
    }

    /// Attaches session data after capture.
    pub fn set_session(&self, session: Value) {
        self.snapshot.write().session = Some(session);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }
}
