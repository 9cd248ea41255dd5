//! Active subscriptions, kept so they can be replayed after a reconnect.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

/// Called with every `next` frame routed to a subscription.
///
/// The receive loop awaits the returned future before reading the next
/// frame, so a slow callback delays delivery for every subscription.
pub type Callback = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`Callback`]
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |frame| f(frame).boxed())
}

/// Wrap a plain closure as a [`Callback`]
pub fn sync_callback<F>(f: F) -> Callback
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(move |frame| {
        f(frame);
        futures::future::ready(()).boxed()
    })
}

pub struct Subscription {
    pub id: String,
    pub callback: Callback,
    /// Exactly what was sent in the original `subscribe` frame
    pub payload: Value,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered set of subscriptions keyed by id.
///
/// Ids are generated by the caller and not checked for uniqueness.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: String, callback: Callback, payload: Value) {
        self.entries.push(Subscription {
            id,
            callback,
            payload,
        });
    }

    /// Returns whether an entry was removed
    pub fn remove(&mut self, id: &str) -> bool {
        match self.entries.iter().position(|s| s.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|s| s.id == id)
    }

    pub fn callback(&self, id: &str) -> Option<Callback> {
        self.entries
            .iter()
            .find(|s| s.id == id)
            .map(|s| Arc::clone(&s.callback))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
