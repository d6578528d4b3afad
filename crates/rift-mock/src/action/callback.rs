//! Named callbacks registered at runtime and invoked by `httpResponseCallback`
//! and `httpForwardCallback` actions.

use crate::model::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("no callback registered with name {0}")]
    Unknown(String),
    #[error("callback {name} returned a {returned} where a {expected} was required")]
    WrongOutput {
        name: String,
        expected: &'static str,
        returned: &'static str,
    },
    #[error("callback {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// What a callback produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutput {
    Respond(HttpResponse),
    /// Forwarded to the request's `Host` header.
    Forward(HttpRequest),
}

impl CallbackOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackOutput::Respond(_) => "response",
            CallbackOutput::Forward(_) => "request",
        }
    }
}

#[async_trait]
pub trait ExpectationCallback: Send + Sync {
    async fn handle(&self, request: &HttpRequest) -> Result<CallbackOutput, String>;
}

struct RespondWith<F>(F);

#[async_trait]
impl<F> ExpectationCallback for RespondWith<F>
where
    F: Fn(&HttpRequest) -> HttpResponse + Send + Sync,
{
    async fn handle(&self, request: &HttpRequest) -> Result<CallbackOutput, String> {
        Ok(CallbackOutput::Respond((self.0)(request)))
    }
}

struct ForwardWith<F>(F);

#[async_trait]
impl<F> ExpectationCallback for ForwardWith<F>
where
    F: Fn(&HttpRequest) -> HttpRequest + Send + Sync,
{
    async fn handle(&self, request: &HttpRequest) -> Result<CallbackOutput, String> {
        Ok(CallbackOutput::Forward((self.0)(request)))
    }
}

/// Callback answering from a closure.
pub fn respond_with<F>(f: F) -> Arc<dyn ExpectationCallback>
where
    F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
{
    Arc::new(RespondWith(f))
}

/// Callback rewriting the request before it is forwarded.
pub fn forward_with<F>(f: F) -> Arc<dyn ExpectationCallback>
where
    F: Fn(&HttpRequest) -> HttpRequest + Send + Sync + 'static,
{
    Arc::new(ForwardWith(f))
}

/// Callbacks by name. Survives `reset`; only `unregister` removes an entry.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ExpectationCallback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, returning any handler it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn ExpectationCallback>,
    ) -> Option<Arc<dyn ExpectationCallback>> {
        let name = name.into();
        info!(callback = %name, "Registered callback");
        self.handlers.write().insert(name, handler)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExpectationCallback>> {
        self.handlers.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Run the named callback.
    pub async fn invoke(&self, name: &str, request: &HttpRequest) -> Result<CallbackOutput, CallbackError> {
        let handler = self
            .get(name)
            .ok_or_else(|| CallbackError::Unknown(name.to_string()))?;
        handler.handle(request).await.map_err(|reason| CallbackError::Failed {
            name: name.to_string(),
            reason,
        })
    }
}
