//! Observable property graph.
//!
//! A property is a typed value holder that notifies registered listeners
//! when its value changes. Properties compose: a [`MappedProperty`] derives
//! its value from one upstream property through a pure function, and a
//! [`CombinedProperty`] derives its value from several upstreams through a
//! supplier closure. Derived properties exclusively own their upstream
//! subscriptions and release them on disposal, so the dependency graph is
//! acyclic by construction.
//!
//! Subscribing is a two-phase operation: [`DynamicProperty::create_subscription`]
//! registers the subscription's identity, and
//! [`PropertySubscription::set_and_call_listener`] attaches the listener and
//! synchronously delivers the current value. Listeners run on whichever
//! thread performed the write, so they must return promptly and must not
//! write back into the property they observe.

mod atomic;
mod combined;
mod constant;
mod delegated;
mod mapped;
mod subscription;

pub use atomic::AtomicProperty;
pub use combined::CombinedProperty;
pub use constant::ConstantProperty;
pub use delegated::DelegatedProperty;
pub use mapped::MappedProperty;
pub use subscription::{PropertySubscription, SubscriptionId};

/// Listener invoked with `(old, new)` on every accepted value transition.
///
/// The old value is `None` on the initial call made while attaching the
/// listener, and reflects the previously delivered value afterwards.
pub type PropertyListener<T> = dyn Fn(Option<&T>, &T) + Send + Sync;

/// An observable typed value holder.
///
/// `get` returns the last committed value and never waits for listener
/// delivery to finish.
pub trait DynamicProperty<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Current value of the property, or `None` if no value was ever set.
    fn get(&self) -> Option<T>;

    /// Registers a new subscription without attaching a listener yet.
    fn create_subscription(&self) -> PropertySubscription<T>;

    /// Detaches every subscription held on this property. Idempotent.
    fn close(&self);
}

/// Convenience combinators available on every [`DynamicProperty`].
pub trait DynamicPropertyExt<T>: DynamicProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Subscribes and synchronously delivers the current value.
    fn subscribe_and_call<F>(&self, listener: F) -> PropertySubscription<T>
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        self.create_subscription().set_and_call_listener(listener)
    }

    /// Derives a property whose value is `map` applied to this property.
    fn map<R, F>(&self, map: F) -> MappedProperty<R>
    where
        R: Clone + Send + Sync + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        MappedProperty::new(self, map)
    }
}

impl<T, P> DynamicPropertyExt<T> for P
where
    T: Clone + Send + Sync + 'static,
    P: DynamicProperty<T> + ?Sized,
{
}

/// A revocable listener registration.
///
/// Closing is idempotent and safe to call concurrently with an in-flight
/// notification: the detach either happens before the delivery starts (the
/// subscription is skipped) or after it (one final delivery may still occur,
/// none will follow).
pub trait Subscription: Send + Sync {
    /// Stops future deliveries to the listener.
    fn close(&self);

    /// Whether this subscription was closed.
    fn is_closed(&self) -> bool;
}

/// Type-erased view of a property used where only the fact of a change
/// matters, not the value, e.g. the upstream list of a [`CombinedProperty`]
/// whose upstreams hold values of different types.
pub trait PropertyChangeSource: Send + Sync {
    /// Invokes `on_change` once immediately and then after every value
    /// transition, until the returned subscription is closed or dropped.
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription>;
}

/// Shared body for [`PropertyChangeSource`] implementations.
pub(crate) fn erased_change_subscription<T, P>(
    property: &P,
    on_change: Box<dyn Fn() + Send + Sync>,
) -> Box<dyn Subscription>
where
    T: Clone + Send + Sync + 'static,
    P: DynamicProperty<T> + ?Sized,
{
    Box::new(
        property
            .create_subscription()
            .set_and_call_listener(move |_, _| on_change()),
    )
}
