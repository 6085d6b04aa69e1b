//! Property subscriptions and their shared bookkeeping.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::locks;
use crate::property::atomic::PropertyShared;
use crate::property::{PropertyListener, Subscription};

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Where a subscription reads its current value from.
pub(crate) enum Backing<T> {
    /// Live property with a subscriber registry.
    Property(Arc<PropertyShared<T>>),
    /// Immutable value captured at subscription time.
    Snapshot(Option<T>),
    /// Value recomputed from a closure on every read.
    Supplier(Arc<dyn Fn() -> T + Send + Sync>),
}

pub(crate) struct SubscriptionShared<T> {
    id: SubscriptionId,
    backing: Backing<T>,
    listener: RwLock<Option<Box<PropertyListener<T>>>>,
    closed: AtomicBool,
}

impl<T> SubscriptionShared<T> {
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Delivers `(old, new)` to the attached listener, if any.
    ///
    /// A panicking listener is contained here so the writer thread and the
    /// remaining subscribers keep going.
    pub(crate) fn invoke(&self, old: Option<&T>, new: &T) {
        if self.is_closed() {
            return;
        }
        let guard = locks::read(&self.listener);
        if let Some(listener) = guard.as_ref() {
            if catch_unwind(AssertUnwindSafe(|| listener(old, new))).is_err() {
                tracing::error!(subscription = %self.id, "property listener panicked during notification");
            }
        }
    }
}

/// A consumer-held registration of a listener on a property.
///
/// The subscription keeps the property's shared state reachable, so
/// [`get`](PropertySubscription::get) keeps answering even after the property
/// handle itself was dropped. Dropping the subscription closes it; the
/// property's registry additionally prunes dead entries on the next
/// notification pass, so a forgotten subscription cannot grow the registry.
pub struct PropertySubscription<T> {
    shared: Arc<SubscriptionShared<T>>,
}

impl<T> PropertySubscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn attach(backing: Backing<T>) -> Self {
        let shared = Arc::new(SubscriptionShared {
            id: SubscriptionId::new(),
            backing,
            listener: RwLock::new(None),
            closed: AtomicBool::new(false),
        });
        if let Backing::Property(property) = &shared.backing {
            property.register(&shared);
        }
        Self { shared }
    }

    /// Attaches the listener and synchronously invokes it once with
    /// `(None, current)`.
    ///
    /// The initial call runs under the property's notification order, so it
    /// cannot interleave with a concurrent `set` on the same property. A
    /// property holding no value produces no initial call.
    #[must_use]
    pub fn set_and_call_listener<F>(self, listener: F) -> Self
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        *locks::write(&self.shared.listener) = Some(Box::new(listener));

        match &self.shared.backing {
            Backing::Property(property) => {
                property.with_notification_order(|| {
                    if let Some(current) = property.get() {
                        self.shared.invoke(None, &current);
                    }
                });
            }
            Backing::Snapshot(value) => {
                if let Some(current) = value {
                    self.shared.invoke(None, current);
                }
            }
            Backing::Supplier(supplier) => {
                let current = (**supplier)();
                self.shared.invoke(None, &current);
            }
        }

        self
    }

    /// Current value of the subscribed property.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        match &self.shared.backing {
            Backing::Property(property) => property.get(),
            Backing::Snapshot(value) => value.clone(),
            Backing::Supplier(supplier) => Some((**supplier)()),
        }
    }
}

impl<T> PropertySubscription<T> {
    /// Identifier of this subscription.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.shared.id()
    }

    fn close_impl(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Backing::Property(property) = &self.shared.backing {
            property.unregister(self.shared.id());
        }
    }
}

impl<T: Send + Sync> Subscription for PropertySubscription<T> {
    fn close(&self) {
        self.close_impl();
    }

    fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl<T> Drop for PropertySubscription<T> {
    fn drop(&mut self) {
        self.close_impl();
    }
}

impl<T> std::fmt::Debug for PropertySubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySubscription")
            .field("id", &self.shared.id())
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}
