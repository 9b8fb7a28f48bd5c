//! Cross-window message listeners.
//!
//! A [`MessageHub`] fans posted messages out to its listeners. A
//! [`SubscriptionRegistry`] runs one background task per accepted origin that
//! forwards that origin's messages to an executor, typically a trigger.

use std::{
    collections::BTreeMap,
    mem,
    sync::{
        Arc, Mutex, PoisonError,
        mpsc::{self, Receiver, Sender},
    },
    thread,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Wildcard accepted by [`SubscriptionRegistry::unsubscribe`].
pub const ALL_ORIGINS: &str = "*";

/// A message posted to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    /// Sender origin.
    pub origin: String,
    /// Message body.
    pub data: Value,
}

/// Listener table.
#[derive(Debug, Default)]
struct HubInner {
    /// Next listener id.
    next: u64,
    /// Listeners by id.
    listeners: BTreeMap<u64, Sender<HubMessage>>,
}

/// Broadcasts messages to every listener.
#[derive(Debug, Clone, Default)]
pub struct MessageHub {
    /// Shared listener table.
    inner: Arc<Mutex<HubInner>>,
}

impl MessageHub {
    /// An empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.
    pub fn listen(&self) -> (u64, Receiver<HubMessage>) {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next += 1;
        let id = inner.next;
        inner.listeners.insert(id, tx);
        (id, rx)
    }

    /// Remove a listener, closing its channel.
    pub fn unlisten(&self, id: u64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .remove(&id)
            .is_some()
    }

    /// Number of listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    /// Deliver a message to every listener. Returns how many received it.
    pub fn post(&self, origin: &str, data: Value) -> usize {
        let msg = HubMessage {
            origin: origin.to_string(),
            data,
        };
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.listeners.retain(|_, tx| tx.send(msg.clone()).is_ok());
        inner.listeners.len()
    }
}

/// A running forwarder.
#[derive(Debug)]
struct Task {
    /// Hub listener feeding the task.
    listener: u64,
    /// Forwarding thread.
    handle: thread::JoinHandle<()>,
}

/// Background forwarders keyed by origin.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    /// Message source.
    hub: MessageHub,
    /// Tasks by origin.
    tasks: BTreeMap<String, Task>,
}

impl SubscriptionRegistry {
    /// A registry listening on `hub`.
    pub fn new(hub: MessageHub) -> Self {
        Self {
            hub,
            tasks: BTreeMap::new(),
        }
    }

    /// The hub listened on.
    pub fn hub(&self) -> &MessageHub {
        &self.hub
    }

    /// True if a task forwards messages from `origin`.
    pub fn is_listening(&self, origin: &str) -> bool {
        self.tasks.contains_key(origin)
    }

    /// Origins with a running task.
    pub fn origins(&self) -> impl Iterator<Item = &str> + '_ {
        self.tasks.keys().map(String::as_str)
    }

    /// Forward messages from `origin` to `executor` on a background task.
    /// A second subscription to the same origin is rejected.
    pub fn subscribe<F>(&mut self, origin: &str, mut executor: F) -> Result<()>
    where
        F: FnMut(Value) + Send + 'static,
    {
        if self.tasks.contains_key(origin) {
            return Err(Error::AlreadyListening(origin.to_string()));
        }
        let (listener, rx) = self.hub.listen();
        let accepted = origin.to_string();
        let handle = thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                if msg.origin == accepted {
                    executor(msg.data);
                }
            }
            debug!(origin = %accepted, "message task finished");
        });
        self.tasks.insert(origin.to_string(), Task { listener, handle });
        Ok(())
    }

    /// Cancel the task for `origin`, or every task for `"*"`, and wait for
    /// it to finish. Returns the number cancelled.
    pub fn unsubscribe(&mut self, origin: &str) -> usize {
        let cancelled: Vec<Task> = if origin == ALL_ORIGINS {
            mem::take(&mut self.tasks).into_values().collect()
        } else {
            self.tasks.remove(origin).into_iter().collect()
        };
        let n = cancelled.len();
        for task in cancelled {
            self.hub.unlisten(task.listener);
            if task.handle.join().is_err() {
                warn!("message task panicked");
            }
        }
        n
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.unsubscribe(ALL_ORIGINS);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use serde_json::json;

    use super::*;

    #[test]
    fn forwards_matching_origin() {
        let hub = MessageHub::new();
        let mut reg = SubscriptionRegistry::new(hub.clone());
        let (tx, rx) = mpsc::channel();
        reg.subscribe("https://a.example", move |v| {
            let _ = tx.send(v);
        })
        .unwrap();
        hub.post("https://b.example", json!("ignored"));
        hub.post("https://a.example", json!({"n": 1}));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), json!({"n": 1}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn duplicate_origin_rejected() {
        let mut reg = SubscriptionRegistry::new(MessageHub::new());
        reg.subscribe("o", |_| {}).unwrap();
        assert_eq!(
            reg.subscribe("o", |_| {}),
            Err(Error::AlreadyListening("o".into()))
        );
    }

    #[test]
    fn wildcard_cancels_everything() {
        let hub = MessageHub::new();
        let mut reg = SubscriptionRegistry::new(hub.clone());
        reg.subscribe("a", |_| {}).unwrap();
        reg.subscribe("b", |_| {}).unwrap();
        assert_eq!(hub.listener_count(), 2);
        assert_eq!(reg.unsubscribe(ALL_ORIGINS), 2);
        assert_eq!(hub.listener_count(), 0);
        assert_eq!(reg.origins().count(), 0);
        assert_eq!(hub.post("a", json!(1)), 0);
        reg.subscribe("a", |_| {}).unwrap();
        assert!(reg.is_listening("a"));
    }
}
