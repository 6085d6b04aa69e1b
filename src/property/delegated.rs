//! Property computed from a closure on every read.

use std::sync::Arc;

use crate::property::subscription::Backing;
use crate::property::{
    DynamicProperty, PropertyChangeSource, PropertySubscription, Subscription,
};

/// Property that delegates every `get` to a supplier closure.
///
/// There is no change detection: the supplier is consulted on each read and
/// subscriptions only ever receive the initial call. Useful for bridging
/// values whose freshness is guaranteed elsewhere.
pub struct DelegatedProperty<T> {
    supplier: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T> DelegatedProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps the supplier.
    pub fn new(supplier: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            supplier: Arc::new(supplier),
        }
    }
}

impl<T> DynamicProperty<T> for DelegatedProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> Option<T> {
        Some((*self.supplier)())
    }

    fn create_subscription(&self) -> PropertySubscription<T> {
        PropertySubscription::attach(Backing::Supplier(Arc::clone(&self.supplier)))
    }

    fn close(&self) {}
}

impl<T> PropertyChangeSource for DelegatedProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        crate::property::erased_change_subscription(self, on_change)
    }
}
