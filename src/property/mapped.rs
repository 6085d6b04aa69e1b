//! Property derived from one upstream through a pure function.

use crate::property::atomic::AtomicProperty;
use crate::property::{
    DynamicProperty, DynamicPropertyExt, PropertyChangeSource, PropertySubscription, Subscription,
};

/// Property whose value is a function of exactly one upstream property.
///
/// The mapped value is computed when the upstream notifies and cached in an
/// internal slot; `get` returns the cache without re-applying the function.
/// The mapped property exclusively owns its upstream subscription: the
/// upstream registry only holds a weak entry, so dropping the mapped
/// property releases the registration instead of pinning the upstream's
/// subscriber list.
///
/// # Examples
///
/// ```
/// use dynprop::{AtomicProperty, DynamicProperty, DynamicPropertyExt};
///
/// let text = AtomicProperty::new("159".to_string());
/// let number = text.map(|raw| raw.parse::<i32>().unwrap_or(0));
/// assert_eq!(number.get(), Some(159));
///
/// text.set("305".to_string());
/// assert_eq!(number.get(), Some(305));
/// ```
pub struct MappedProperty<R> {
    cache: AtomicProperty<R>,
    upstream: Box<dyn Subscription>,
}

impl<R> MappedProperty<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Derives a property from `upstream` through `map`.
    ///
    /// The initial value is computed immediately when the upstream holds one.
    pub fn new<T, P, F>(upstream: &P, map: F) -> Self
    where
        T: Clone + Send + Sync + 'static,
        P: DynamicProperty<T> + ?Sized,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let cache = AtomicProperty::empty();
        let slot = cache.shared_handle();
        let upstream = upstream.subscribe_and_call(move |_, new| {
            slot.set(map(new));
        });

        Self {
            cache,
            upstream: Box::new(upstream),
        }
    }
}

impl<R> DynamicProperty<R> for MappedProperty<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn get(&self) -> Option<R> {
        self.cache.get()
    }

    fn create_subscription(&self) -> PropertySubscription<R> {
        self.cache.create_subscription()
    }

    fn close(&self) {
        self.upstream.close();
        self.cache.close();
    }
}

impl<R> PropertyChangeSource for MappedProperty<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        crate::property::erased_change_subscription(self, on_change)
    }
}
