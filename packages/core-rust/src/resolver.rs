//! Distinct-identifier resolution from the ambient request context.
//!
//! Precedence is fixed by the configured [`ExtractionStrategy`]; whatever the
//! strategy yields, an absent or falsy result falls back to the scope's
//! [`ContextId`](crate::ContextId). Extraction failures never reach callers.

use serde_json::Value;
use tracing::warn;

use crate::config::ExtractionStrategy;
use crate::context::{ContextScope, RequestSnapshot};
use crate::path::resolve_path;
use crate::store::ContextStore;

/// Internal extraction failures. Logged and converted into the fallback id.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{source_name} selector is empty")]
    EmptySelector { source_name: &'static str },
    #[error("{source_name} path {path:?} resolved to a non-scalar {kind}")]
    NonScalar {
        source_name: &'static str,
        path: String,
        kind: &'static str,
    },
}

/// Computes the distinct identifier for the current request.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    strategy: ExtractionStrategy,
    store: ContextStore,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(strategy: ExtractionStrategy) -> Self {
        Self {
            strategy,
            store: ContextStore::new(),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> &ExtractionStrategy {
        &self.strategy
    }

    /// Resolves against the ambient scope. `None` only when no scope is bound.
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        let scope = self.store.current();
        self.resolve_in(scope.as_deref())
    }

    /// Resolves against an explicitly supplied scope.
    #[must_use]
    pub fn resolve_in(&self, scope: Option<&ContextScope>) -> Option<String> {
        let scope = scope?;
        match scope.read_snapshot(|snapshot| self.try_extract(snapshot)) {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(err) => warn!(
                context_id = %scope.id(),
                strategy = self.strategy.kind(),
                error = %err,
                "failed to extract distinct id, falling back to context id"
            ),
        }
        Some(scope.id().to_string())
    }

    fn try_extract(&self, snapshot: &RequestSnapshot) -> Result<Option<String>, ExtractError> {
        match &self.strategy {
            ExtractionStrategy::Header(name) => {
                non_empty_selector(name, "header")?;
                Ok(truthy_str(snapshot.header(name)))
            }
            ExtractionStrategy::Session(path) => {
                extract_path("session", snapshot.session.as_ref(), path)
            }
            ExtractionStrategy::User(path) => extract_path("user", snapshot.user.as_ref(), path),
            ExtractionStrategy::Cookie(name) => {
                non_empty_selector(name, "cookie")?;
                Ok(truthy_str(snapshot.cookie(name)))
            }
            ExtractionStrategy::None => Ok(None),
        }
    }
}

fn non_empty_selector(selector: &str, source_name: &'static str) -> Result<(), ExtractError> {
    if selector.is_empty() {
        Err(ExtractError::EmptySelector { source_name })
    } else {
        Ok(())
    }
}

fn truthy_str(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_owned)
}

fn extract_path(
    source_name: &'static str,
    root: Option<&Value>,
    path: &str,
) -> Result<Option<String>, ExtractError> {
    non_empty_selector(path, source_name)?;
    let Some(leaf) = root.and_then(|root| resolve_path(root, path)) else {
        return Ok(None);
    };
    identifier_from_leaf(leaf).map_err(|kind| ExtractError::NonScalar {
        source_name,
        path: path.to_string(),
        kind,
    })
}

/// Converts a resolved leaf into an identifier.
///
/// Falsy leaves (`null`, `false`, `0`, `""`) are "no value". Strings and
/// numbers are accepted; `true`, arrays and objects are rejected.
fn identifier_from_leaf(leaf: &Value) -> Result<Option<String>, &'static str> {
    match leaf {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::String(s) => Ok(truthy_str(Some(s))),
        Value::Number(n) if is_zero(n) => Ok(None),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(true) => Err("boolean"),
        Value::Array(_) => Err("array"),
        Value::Object(_) => Err("object"),
    }
}

#[allow(clippy::float_cmp)]
fn is_zero(n: &serde_json::Number) -> bool {
    n.as_f64().is_some_and(|f| f == 0.0)
}
