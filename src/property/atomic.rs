//! Externally settable property with synchronous notification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::locks;
use crate::property::subscription::{Backing, SubscriptionId, SubscriptionShared};
use crate::property::{
    erased_change_subscription, DynamicProperty, PropertyChangeSource, PropertySubscription,
    Subscription,
};

/// Shared state behind every [`AtomicProperty`].
///
/// The value slot and the notification path use separate locks: `get` only
/// touches the value slot, so reads never wait for listener delivery.
pub(crate) struct PropertyShared<T> {
    name: RwLock<Option<String>>,
    value: RwLock<Option<T>>,
    /// Serializes set+notify so concurrent writers produce one total order
    /// of notifications per property instance.
    notify_order: Mutex<()>,
    /// Subscribers in registration order, weakly held.
    subscriptions: Mutex<Vec<Weak<SubscriptionShared<T>>>>,
    closed: AtomicBool,
}

impl<T> PropertyShared<T> {
    pub(crate) fn new(initial: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            name: RwLock::new(None),
            value: RwLock::new(initial),
            notify_order: Mutex::new(()),
            subscriptions: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn set_name(&self, name: impl Into<String>) {
        *locks::write(&self.name) = Some(name.into());
    }

    pub(crate) fn name(&self) -> Option<String> {
        locks::read(&self.name).clone()
    }

    pub(crate) fn register(&self, subscription: &Arc<SubscriptionShared<T>>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        locks::lock(&self.subscriptions).push(Arc::downgrade(subscription));
    }

    pub(crate) fn unregister(&self, id: SubscriptionId) {
        locks::lock(&self.subscriptions)
            .retain(|weak| weak.upgrade().is_some_and(|sub| sub.id() != id));
    }

    pub(crate) fn with_notification_order(&self, f: impl FnOnce()) {
        let _order = locks::lock(&self.notify_order);
        f();
    }

    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let detached = std::mem::take(&mut *locks::lock(&self.subscriptions));
        for weak in detached {
            if let Some(subscription) = weak.upgrade() {
                subscription.mark_closed();
            }
        }
    }

    /// Prunes dead and closed entries, returning the live subscribers in
    /// registration order.
    fn live_subscriptions(&self) -> Vec<Arc<SubscriptionShared<T>>> {
        let mut subscriptions = locks::lock(&self.subscriptions);
        subscriptions.retain(|weak| weak.upgrade().is_some_and(|sub| !sub.is_closed()));
        subscriptions.iter().filter_map(Weak::upgrade).collect()
    }

    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        locks::lock(&self.subscriptions).len()
    }
}

impl<T: Clone> PropertyShared<T> {
    pub(crate) fn get(&self) -> Option<T> {
        locks::read(&self.value).clone()
    }

    /// Replaces the stored value and synchronously notifies subscribers with
    /// `(old, new)` on the calling thread, in registration order. Returns the
    /// previous value.
    pub(crate) fn set(&self, value: T) -> Option<T> {
        let _order = locks::lock(&self.notify_order);
        let old = locks::write(&self.value).replace(value.clone());
        for subscription in self.live_subscriptions() {
            subscription.invoke(old.as_ref(), &value);
        }
        old
    }
}

/// Property whose value is set directly by the application.
///
/// `set` commits the new value, then notifies current subscribers serially on
/// the calling thread. Concurrent `set` calls are mutually exclusive, so
/// every listener observes one total order of writes. An equal value is
/// republished like any other write; no deduplication is applied.
///
/// # Examples
///
/// ```
/// use dynprop::{AtomicProperty, DynamicProperty, DynamicPropertyExt};
///
/// let pool_size = AtomicProperty::new(8u32);
/// let subscription = pool_size.subscribe_and_call(|old, new| {
///     println!("pool size {old:?} -> {new}");
/// });
/// pool_size.set(16);
/// assert_eq!(pool_size.get(), Some(16));
/// # drop(subscription);
/// ```
pub struct AtomicProperty<T> {
    shared: Arc<PropertyShared<T>>,
}

impl<T> AtomicProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a property holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            shared: PropertyShared::new(Some(initial)),
        }
    }

    /// Creates a property with no value yet; `get` returns `None` until the
    /// first `set`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            shared: PropertyShared::new(None),
        }
    }

    /// Replaces the value and notifies subscribers. Returns the previous
    /// value.
    pub fn set(&self, value: T) -> Option<T> {
        self.shared.set(value)
    }

    /// Assigns a human-readable name used by `Display` and logging.
    pub fn set_name(&self, name: impl Into<String>) {
        self.shared.set_name(name);
    }

    /// The assigned name, if any.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.shared.name()
    }

    pub(crate) fn shared_handle(&self) -> Arc<PropertyShared<T>> {
        Arc::clone(&self.shared)
    }

    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        self.shared.subscription_count()
    }
}

impl<T> DynamicProperty<T> for AtomicProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> Option<T> {
        self.shared.get()
    }

    fn create_subscription(&self) -> PropertySubscription<T> {
        PropertySubscription::attach(Backing::Property(Arc::clone(&self.shared)))
    }

    fn close(&self) {
        self.shared.close();
    }
}

impl<T> PropertyChangeSource for AtomicProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        erased_change_subscription(self, on_change)
    }
}

impl<T> Drop for AtomicProperty<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T: std::fmt::Debug + Clone> std::fmt::Display for AtomicProperty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.shared.get() {
            Some(value) => write!(f, "AtomicProperty({value:?})"),
            None => write!(f, "AtomicProperty(unset)"),
        }
    }
}

impl<T: std::fmt::Debug + Clone> std::fmt::Debug for AtomicProperty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicProperty")
            .field("name", &self.shared.name())
            .field("value", &self.shared.get())
            .finish()
    }
}
