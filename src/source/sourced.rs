//! Property backed by a source lookup plus subscription.

use crate::error::PropertyResult;
use crate::property::{
    AtomicProperty, DynamicProperty, PropertyChangeSource, PropertySubscription, Subscription,
};
use crate::source::subscription::SourceSubscription;
use crate::source::{DefaultValue, PropertySource, SourceValue};

/// Property whose value follows one key of a [`PropertySource`].
///
/// The constructor subscribes to the source and returns only after the
/// initial synchronous delivery, so the property already holds the store's
/// actual value (or the default for a missing key). Each source update is
/// committed locally and then propagated to this property's own subscribers
/// with `(old, new)`.
///
/// # Examples
///
/// ```
/// use dynprop::{DefaultValue, DynamicProperty, InMemorySource, SourcedProperty};
///
/// let source = InMemorySource::default();
/// source.set("pool.size", "8").unwrap();
///
/// let pool_size =
///     SourcedProperty::<u32>::new(&source, "pool.size", DefaultValue::of(4)).unwrap();
/// assert_eq!(pool_size.get(), Some(8));
///
/// source.set("pool.size", "16").unwrap();
/// assert_eq!(pool_size.get(), Some(16));
/// ```
pub struct SourcedProperty<T> {
    name: String,
    property: AtomicProperty<T>,
    subscription: SourceSubscription<T>,
}

impl<T: SourceValue> SourcedProperty<T> {
    /// Subscribes to `name` on `source`.
    ///
    /// # Errors
    ///
    /// Fails when the source is closed, the key is missing and no default
    /// was supplied, or the stored value does not parse as `T`.
    pub fn new<S>(source: &S, name: &str, default: DefaultValue<T>) -> PropertyResult<Self>
    where
        S: PropertySource + ?Sized,
    {
        let property = AtomicProperty::empty();
        property.set_name(name);

        let slot = property.shared_handle();
        let property_name = name.to_owned();
        let subscription = source
            .create_subscription::<T>(name, default)?
            .set_and_call_listener(move |_, new| {
                slot.set(new.clone());
                tracing::trace!(property = %property_name, "sourced property updated");
            })?;

        Ok(Self {
            name: name.to_owned(),
            property,
            subscription,
        })
    }

    /// Property name within the source.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: SourceValue> DynamicProperty<T> for SourcedProperty<T> {
    fn get(&self) -> Option<T> {
        self.property.get()
    }

    fn create_subscription(&self) -> PropertySubscription<T> {
        self.property.create_subscription()
    }

    fn close(&self) {
        self.subscription.close();
        self.property.close();
    }
}

impl<T: SourceValue> PropertyChangeSource for SourcedProperty<T> {
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        crate::property::erased_change_subscription(self, on_change)
    }
}

impl<T: SourceValue + std::fmt::Debug> std::fmt::Debug for SourcedProperty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcedProperty")
            .field("name", &self.name)
            .field("property", &self.property)
            .field("subscription", &self.subscription)
            .finish()
    }
}

impl<T: SourceValue + std::fmt::Debug> std::fmt::Display for SourcedProperty<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SourcedProperty(name: {:?}, value: {:?})",
            self.name,
            self.property.get()
        )
    }
}
