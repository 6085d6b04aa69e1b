//! Property with a fixed value.

use crate::property::subscription::Backing;
use crate::property::{
    DynamicProperty, PropertyChangeSource, PropertySubscription, Subscription,
};

/// Property whose value never changes.
///
/// Subscriptions receive the initial call and nothing afterwards.
///
/// # Examples
///
/// ```
/// use dynprop::{ConstantProperty, DynamicProperty};
///
/// let property = ConstantProperty::of(122);
/// assert_eq!(property.get(), Some(122));
/// ```
pub struct ConstantProperty<T> {
    value: Option<T>,
}

impl<T> ConstantProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps a fixed value.
    #[must_use]
    pub fn of(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// A constant property holding no value.
    #[must_use]
    pub fn none() -> Self {
        Self { value: None }
    }
}

impl<T> DynamicProperty<T> for ConstantProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> Option<T> {
        self.value.clone()
    }

    fn create_subscription(&self) -> PropertySubscription<T> {
        PropertySubscription::attach(Backing::Snapshot(self.value.clone()))
    }

    fn close(&self) {}
}

impl<T> PropertyChangeSource for ConstantProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        crate::property::erased_change_subscription(self, on_change)
    }
}
