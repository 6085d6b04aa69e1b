//! Property derived from several upstreams through a supplier.

use std::sync::Arc;

use crate::property::atomic::AtomicProperty;
use crate::property::{
    DynamicProperty, PropertyChangeSource, PropertySubscription, Subscription,
};

/// Property recomputed from a supplier whenever any upstream changes.
///
/// The supplier must be side-effect free; it typically closes over the
/// upstream properties and reads their current values. Each upstream change
/// triggers an independent recomputation; there is no atomicity across
/// upstreams, so a reader may observe a value reflecting only one of two
/// writes that landed simultaneously on different upstreams.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dynprop::{AtomicProperty, CombinedProperty, DynamicProperty};
///
/// let first = Arc::new(AtomicProperty::new("hello".to_string()));
/// let second = Arc::new(AtomicProperty::new("123".to_string()));
///
/// let greeting = {
///     let (first, second) = (Arc::clone(&first), Arc::clone(&second));
///     CombinedProperty::new(&[&*first.clone(), &*second.clone()], move || {
///         format!("{}{}", first.get().unwrap_or_default(), second.get().unwrap_or_default())
///     })
/// };
/// assert_eq!(greeting.get(), Some("hello123".to_string()));
///
/// first.set("hi".to_string());
/// assert_eq!(greeting.get(), Some("hi123".to_string()));
/// ```
pub struct CombinedProperty<R> {
    cache: AtomicProperty<R>,
    upstreams: Vec<Box<dyn Subscription>>,
}

impl<R> CombinedProperty<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Combines `sources` through `combiner`.
    ///
    /// The combiner runs once during construction and once more after all
    /// upstream subscriptions are in place, so an upstream write racing the
    /// construction is not lost.
    pub fn new<F>(sources: &[&dyn PropertyChangeSource], combiner: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        let combiner = Arc::new(combiner);
        let cache = AtomicProperty::new((*combiner)());
        let slot = cache.shared_handle();

        let mut upstreams = Vec::with_capacity(sources.len());
        for source in sources {
            let slot = Arc::clone(&slot);
            let combiner = Arc::clone(&combiner);
            upstreams.push(source.subscribe_changes(Box::new(move || {
                slot.set((*combiner)());
            })));
        }

        slot.set((*combiner)());
        Self { cache, upstreams }
    }
}

impl<R> DynamicProperty<R> for CombinedProperty<R>
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
        for upstream in &self.upstreams {
            upstream.close();
        }
        self.cache.close();
    }
}

impl<R> PropertyChangeSource for CombinedProperty<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        crate::property::erased_change_subscription(self, on_change)
    }
}
