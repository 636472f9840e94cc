//! Routing inbound pushes to the application's handler.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use {
    serde::Serialize,
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

type PushHandler = Arc<dyn Fn(&PushNotification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOrigin {
    /// Received while the process was running.
    Live,
    /// Delivered as the reason the process was launched.
    Launch,
}

/// One inbound push as handed to the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub payload: Map<String, Value>,
    pub app_active: bool,
    pub origin: DeliveryOrigin,
}

impl PushNotification {
    pub fn live(payload: Map<String, Value>, app_active: bool) -> Self {
        Self {
            payload,
            app_active,
            origin: DeliveryOrigin::Live,
        }
    }

    /// Launch pushes are always delivered as inactive.
    pub fn launch(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            app_active: false,
            origin: DeliveryOrigin::Launch,
        }
    }

    pub fn is_launch(&self) -> bool {
        self.origin == DeliveryOrigin::Launch
    }

    /// `aps.alert`, either the string form or the `body` of the dictionary form.
    pub fn alert_text(&self) -> Option<&str> {
        match self.aps()?.get("alert")? {
            Value::String(text) => Some(text.as_str()),
            Value::Object(alert) => alert.get("body").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn badge(&self) -> Option<u64> {
        self.aps()?.get("badge").and_then(Value::as_u64)
    }

    fn aps(&self) -> Option<&Map<String, Value>> {
        self.payload.get("aps").and_then(Value::as_object)
    }
}

/// What happened to a push handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Held until a handler is registered.
    Queued,
    Dropped,
}

struct DispatchState {
    handler: Option<PushHandler>,
    pending: VecDeque<PushNotification>,
    /// A `set_handler` call is draining `pending`; new pushes queue behind it.
    flushing: bool,
}

/// Single-slot handler registry with a bounded queue for pushes that arrive
/// before any handler exists.
pub struct PushDispatcher {
    state: Mutex<DispatchState>,
    max_pending: usize,
}

impl PushDispatcher {
    pub fn new(max_pending: usize) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                handler: None,
                pending: VecDeque::new(),
                flushing: false,
            }),
            max_pending,
        }
    }

    /// Install `handler`, replacing any previous one, and deliver queued
    /// pushes to it in arrival order. Pushes dispatched while the queue is
    /// draining are appended to it. Returns how many were delivered here.
    pub fn set_handler<F>(&self, handler: F) -> usize
    where
        F: Fn(&PushNotification) + Send + Sync + 'static,
    {
        {
            let mut state = self.lock();
            state.handler = Some(Arc::new(handler));
            if state.flushing || state.pending.is_empty() {
                return 0;
            }
            state.flushing = true;
        }

        let mut flushed = 0;
        loop {
            let (handler, notification) = {
                let mut state = self.lock();
                let next = match state.handler.clone() {
                    Some(handler) => state.pending.pop_front().map(|n| (handler, n)),
                    None => None,
                };
                match next {
                    Some(next) => next,
                    None => {
                        state.flushing = false;
                        break;
                    },
                }
            };
            handler(&notification);
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "delivered queued pushes to new handler");
        }
        flushed
    }

    pub fn clear_handler(&self) -> bool {
        self.lock().handler.take().is_some()
    }

    pub fn has_handler(&self) -> bool {
        self.lock().handler.is_some()
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn dispatch(&self, notification: PushNotification) -> Delivery {
        let handler = {
            let mut state = self.lock();
            match state.handler.clone() {
                Some(_) if state.flushing => {
                    state.pending.push_back(notification);
                    debug!(queued = state.pending.len(), "push queued behind flush");
                    return Delivery::Queued;
                },
                Some(handler) => handler,
                None if state.pending.len() < self.max_pending => {
                    state.pending.push_back(notification);
                    debug!(queued = state.pending.len(), "push queued, no handler registered");
                    return Delivery::Queued;
                },
                None => {
                    warn!(
                        max_pending = self.max_pending,
                        origin = ?notification.origin,
                        "push dropped, no handler registered and queue full"
                    );
                    return Delivery::Dropped;
                },
            }
        };
        handler(&notification);
        Delivery::Delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
