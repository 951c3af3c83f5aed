//! Resource handles and the per-control scope that owns them.

use crate::executor::Executor;
use async_trait::async_trait;
use hostspec_profile::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Failure to construct a handle or read one of its properties.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("property '{property}' not found (available: {})", .available.join(", "))]
    PropertyNotFound {
        property: String,
        available: Vec<String>,
    },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl ResourceError {
    pub fn property_not_found(property: &str, available: &[&str]) -> Self {
        ResourceError::PropertyNotFound {
            property: property.to_string(),
            available: available.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<hostspec_common::Error> for ResourceError {
    fn from(e: hostspec_common::Error) -> Self {
        use hostspec_common::Error;
        match e {
            _ if e.is_timeout() => ResourceError::Timeout(e.to_string()),
            Error::SshConnection(_) | Error::SshAuth(_) => ResourceError::Connection(e.to_string()),
            _ => ResourceError::Query(e.to_string()),
        }
    }
}

/// A queryable resource handle.
///
/// Handles are lazy: constructing one validates arguments only, the target
/// is queried on the first property read and the answer is memoised for
/// the lifetime of the handle.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Property names this handle exposes.
    fn properties(&self) -> &'static [&'static str];

    /// Read one property.
    async fn get(&self, property: &str) -> Result<Value, ResourceError>;
}

/// Handles and sessions alive during one control evaluation.
///
/// Created when a control starts and dropped when it finishes, so nothing
/// here is shared between concurrently evaluated controls.
pub struct ResourceScope {
    executor: Arc<dyn Executor>,
    handles: HashMap<String, Arc<dyn Resource>>,
    sessions: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ResourceScope {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            handles: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }

    /// Handle previously constructed under `key`.
    pub fn handle(&self, key: &str) -> Option<Arc<dyn Resource>> {
        self.handles.get(key).cloned()
    }

    pub fn insert_handle(&mut self, key: String, handle: Arc<dyn Resource>) {
        self.handles.insert(key, handle);
    }

    /// Session of type `T` for `key`, created by `init` on first use.
    pub fn session<T, F>(&mut self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let slot = format!("{}::{}", std::any::type_name::<T>(), key);
        if let Some(existing) = self.sessions.get(&slot) {
            if let Ok(session) = Arc::clone(existing).downcast::<T>() {
                return session;
            }
        }

        trace!("Opening session {}", std::any::type_name::<T>());
        let session = Arc::new(init());
        self.sessions.insert(slot, session.clone());
        session
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedExecutor;
    use hostspec_common::OsType;

    struct Counter(u32);

    #[test]
    fn test_session_is_reused_per_key() {
        let mut scope = ResourceScope::new(Arc::new(ScriptedExecutor::new(OsType::Linux)));
        let a = scope.session("k1", || Counter(1));
        let b = scope.session("k1", || Counter(2));
        let c = scope.session("k2", || Counter(3));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.0, 1);
        assert_eq!(c.0, 3);
        assert_eq!(scope.session_count(), 2);
    }

    #[test]
    fn test_sessions_of_different_types_do_not_collide() {
        let mut scope = ResourceScope::new(Arc::new(ScriptedExecutor::new(OsType::Linux)));
        let counter = scope.session("same", || Counter(7));
        let text = scope.session("same", || String::from("x"));
        assert_eq!(counter.0, 7);
        assert_eq!(text.as_str(), "x");
    }

    #[test]
    fn test_property_not_found_message() {
        let err = ResourceError::property_not_found("versoin", &["installed", "version"]);
        assert_eq!(
            err.to_string(),
            "property 'versoin' not found (available: installed, version)"
        );
    }

    #[test]
    fn test_executor_error_conversion() {
        let timeout = hostspec_common::Error::CommandTimeout {
            cmd: "ps -eo pid=,user=,args=".to_string(),
            seconds: 30,
        };
        assert!(matches!(ResourceError::from(timeout), ResourceError::Timeout(_)));

        let auth = hostspec_common::Error::SshAuth("no method succeeded".to_string());
        assert!(matches!(ResourceError::from(auth), ResourceError::Connection(_)));

        let other = hostspec_common::Error::Other("broken pipe".to_string());
        assert_eq!(
            ResourceError::from(other),
            ResourceError::Query("broken pipe".to_string())
        );
    }
}
