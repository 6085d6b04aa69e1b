//! Subscription registry and change dispatcher shared by all sources.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, Weak};

use crate::error::PropertyResult;
use crate::locks;
use crate::property::SubscriptionId;

/// Type-erased subscription entry able to accept a raw serialized value.
///
/// The typed decode and default-fallback logic lives behind this trait so the
/// publisher can hold subscriptions of heterogeneous value types in one
/// registry.
pub(crate) trait RawSubscriber: Send + Sync {
    /// Resolves the raw value (`None` means removed) and delivers it to the
    /// listener. Resolution failures are returned for the publisher to log.
    fn deliver(&self, raw: Option<&str>) -> PropertyResult<()>;

    /// Whether the owning subscription was closed.
    fn is_closed(&self) -> bool;

    /// Marks the subscription closed without touching the registry. Used
    /// when the whole source shuts down.
    fn force_close(&self);
}

/// Per-property-name registry of weakly held subscribers.
///
/// Callers must invoke [`notify`](SourcePublisher::notify) while holding the
/// owning source's consistency lock; the registry's own mutex only protects
/// the subscriber lists and nests strictly inside that lock.
#[derive(Default)]
pub(crate) struct SourcePublisher {
    subscriptions: Mutex<HashMap<String, Vec<(SubscriptionId, Weak<dyn RawSubscriber>)>>>,
}

impl SourcePublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, name: &str, id: SubscriptionId, subscriber: Weak<dyn RawSubscriber>) {
        locks::lock(&self.subscriptions)
            .entry(name.to_owned())
            .or_default()
            .push((id, subscriber));
    }

    pub(crate) fn remove(&self, name: &str, id: SubscriptionId) {
        let mut registry = locks::lock(&self.subscriptions);
        let now_empty = match registry.get_mut(name) {
            Some(entries) => {
                entries.retain(|(entry_id, _)| *entry_id != id);
                entries.is_empty()
            }
            None => false,
        };
        if now_empty {
            registry.remove(name);
        }
    }

    /// Delivers `raw` to every live subscriber of `name`.
    ///
    /// Dead and closed entries are pruned first, bounding registry growth
    /// from consumers that dropped a subscription without closing it. A
    /// failing or panicking delivery is logged and does not stop delivery to
    /// the remaining subscribers.
    pub(crate) fn notify(&self, name: &str, raw: Option<&str>) {
        let live = {
            let mut registry = locks::lock(&self.subscriptions);
            let mut live = Vec::new();
            let mut now_empty = false;
            if let Some(entries) = registry.get_mut(name) {
                entries.retain(|(_, weak)| weak.upgrade().is_some_and(|sub| !sub.is_closed()));
                live = entries
                    .iter()
                    .filter_map(|(id, weak)| weak.upgrade().map(|sub| (*id, sub)))
                    .collect();
                now_empty = entries.is_empty();
            }
            if now_empty {
                registry.remove(name);
            }
            live
        };

        for (id, subscriber) in live {
            match catch_unwind(AssertUnwindSafe(|| subscriber.deliver(raw))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(
                        property = name,
                        subscription = %id,
                        error = %err,
                        "failed to deliver property update"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        property = name,
                        subscription = %id,
                        "property listener panicked during delivery"
                    );
                }
            }
        }
    }

    /// Force-detaches every subscriber and empties the registry.
    pub(crate) fn close(&self) {
        let drained = std::mem::take(&mut *locks::lock(&self.subscriptions));
        for (_, entries) in drained {
            for (_, weak) in entries {
                if let Some(subscriber) = weak.upgrade() {
                    subscriber.force_close();
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, name: &str) -> usize {
        locks::lock(&self.subscriptions)
            .get(name)
            .map_or(0, Vec::len)
    }
}
