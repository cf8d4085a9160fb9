//! Single-process, in-memory publish/subscribe.
//!
//! Handlers register per event name; `emit` invokes each registered handler
//! in registration order, awaiting it. A handler's failure is logged and
//! does not abort the remaining handlers or propagate to the emitter.
//! Delivery is best-effort, in-order per `emit` call, with no persistence
//! and no cross-process fan-out.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::error;

pub type EventPayload = Value;
type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type Handler = Arc<dyn Fn(EventPayload) -> HandlerFuture + Send + Sync>;

pub const WEBHOOK_RECEIVED: &str = "webhook_received";
pub const ROUTES_UPDATED: &str = "routes_updated";
pub const DEPLOY_COMPLETED: &str = "deploy_completed";

#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<String, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let boxed: Handler = Arc::new(move |payload| Box::pin(handler(payload)));
        self.handlers.write().await.entry(event.to_string()).or_default().push(boxed);
    }

    pub async fn emit(&self, event: &str, payload: EventPayload) {
        let handlers = self.handlers.read().await;
        let Some(subs) = handlers.get(event) else {
            return;
        };
        for handler in subs {
            if let Err(e) = handler(payload.clone()).await {
                error!("event handler for '{event}' failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn emits_to_all_handlers_and_swallows_failures() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        bus.subscribe("x", move |_| {
            let h1 = h1.clone();
            async move {
                h1.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            }
        })
        .await;

        let h2 = hits.clone();
        bus.subscribe("x", move |_| {
            let h2 = h2.clone();
            async move {
                h2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        bus.emit("x", serde_json::json!({})).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn emit_on_unknown_event_is_a_noop() {
        let bus = EventBus::new();
        bus.emit("nothing_subscribed", serde_json::json!(null)).await;
    }
}
