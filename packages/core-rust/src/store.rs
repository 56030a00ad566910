//! Request-scoped ambient context store.
//!
//! The store is keyed by the currently executing tokio task rather than by
//! an explicit handle. A scope bound with [`ContextStore::run_scoped`] stays
//! visible across every `.await` inside the wrapped future and is never
//! visible to futures belonging to other requests, even when they interleave
//! on the same worker thread.
//!
//! Task-locals do not flow into `tokio::spawn`ed tasks on their own; use
//! [`ContextStore::spawn`] or [`ContextStore::scope_current`] to carry the
//! current scope across a spawn boundary.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::{ContextId, ContextScope, RequestSnapshot};

tokio::task_local! {
    /// Slot holding the ambient scope for the current task.
    static CURRENT_SCOPE: RefCell<Option<Arc<ContextScope>>>;
}

/// Handle to the process-wide request-scoped store.
///
/// Zero-sized and `Copy`: every handle observes the same task-local slot, so
/// it can be cloned freely into services and layers. All accessors are total
/// and return `None` outside a bound scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextStore;

impl ContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs `future` with `scope` as the ambient context for its entire
    /// lifetime, including every suspension and resumption.
    pub fn run_scoped<F>(
        &self,
        scope: Arc<ContextScope>,
        future: F,
    ) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        CURRENT_SCOPE.scope(RefCell::new(Some(scope)), future)
    }

    /// Synchronous counterpart of [`run_scoped`](Self::run_scoped).
    pub fn run_scoped_sync<R>(&self, scope: Arc<ContextScope>, f: impl FnOnce() -> R) -> R {
        CURRENT_SCOPE.sync_scope(RefCell::new(Some(scope)), f)
    }

    /// Runs `future` with an empty slot that [`enter_current_scope`](Self::enter_current_scope)
    /// can fill later.
    pub fn with_slot<F>(&self, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        CURRENT_SCOPE.scope(RefCell::new(None), future)
    }

    /// Makes `scope` ambient for the rest of the current task's slot without a
    /// wrapping closure.
    ///
    /// Returns `false` when no slot is bound on this task; the call is then a
    /// no-op.
    pub fn enter_current_scope(&self, scope: Arc<ContextScope>) -> bool {
        let id = scope.id().clone();
        let entered = CURRENT_SCOPE
            .try_with(|slot| {
                *slot.borrow_mut() = Some(scope);
            })
            .is_ok();
        if !entered {
            debug!(context_id = %id, "no context slot bound on this task; enter ignored");
        }
        entered
    }

    /// Wraps `future` so it runs under the scope that is ambient right now.
    ///
    /// Used to carry the current request's scope into work that will be
    /// polled elsewhere (a spawned task, a join set).
    pub fn scope_current<F>(&self, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        CURRENT_SCOPE.scope(RefCell::new(self.current()), future)
    }

    /// Spawns `future` on the tokio runtime, inheriting the ambient scope.
    ///
    /// The child shares the parent's `Arc<ContextScope>`, so entries set on
    /// either side are visible to both.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.scope_current(future))
    }

    /// Returns the ambient scope, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ContextScope>> {
        CURRENT_SCOPE
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }

    /// Returns the ambient scope's id.
    #[must_use]
    pub fn id(&self) -> Option<ContextId> {
        self.current().map(|scope| scope.id().clone())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.current().and_then(|scope| scope.get(key))
    }

    /// Sets an entry on the ambient scope. Silently dropped outside a scope.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        if let Some(scope) = self.current() {
            scope.set(key, value);
        }
    }

    /// Returns a copy of the ambient request snapshot.
    #[must_use]
    pub fn request(&self) -> Option<RequestSnapshot> {
        self.current().map(|scope| scope.snapshot())
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.current().and_then(|scope| scope.header(name))
    }

    #[must_use]
    pub fn session(&self) -> Option<Value> {
        self.current().and_then(|scope| scope.session())
    }

    #[must_use]
    pub fn user(&self) -> Option<Value> {
        self.current().and_then(|scope| scope.user())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.current().and_then(|scope| scope.cookie(name))
    }

    /// Attaches the authenticated user to the ambient scope's snapshot.
    pub fn set_user(&self, user: Value) {
        if let Some(scope) = self.current() {
            scope.set_user(user);
        }
    }

    /// Attaches session data to the ambient scope's snapshot.
    pub fn set_session(&self, session: Value) {
        if let Some(scope) = self.current() {
            scope.set_session(session);
        }
    }
}
