//! Typed subscriptions onto property sources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::error::{MarshalError, PropertyResult, SourceError};
use crate::locks;
use crate::property::{PropertyListener, Subscription, SubscriptionId};
use crate::source::publisher::{RawSubscriber, SourcePublisher};
use crate::source::{DefaultValue, SourceValue};

/// Internal hooks a concrete source exposes to its subscriptions.
pub(crate) trait SourceBackend: Send + Sync {
    /// Runs `f` with the current raw value of `name` while holding the
    /// source's consistency lock. No notification for any property can
    /// interleave with `f`.
    fn with_property_locked(&self, name: &str, f: &mut dyn FnMut(Option<&str>));

    /// The source's subscription registry.
    fn publisher(&self) -> &SourcePublisher;

    /// Whether the source was closed.
    fn is_closed(&self) -> bool;
}

pub(crate) struct SourceSubscriptionShared<T> {
    id: SubscriptionId,
    name: String,
    type_name: &'static str,
    default: DefaultValue<T>,
    decode: Box<dyn Fn(&str) -> Result<T, MarshalError> + Send + Sync>,
    cached: RwLock<Option<T>>,
    listener: RwLock<Option<Box<PropertyListener<T>>>>,
    closed: AtomicBool,
}

impl<T: SourceValue> SourceSubscriptionShared<T> {
    /// Resolution order: stored value, then the subscription's own default,
    /// then a not-found error.
    fn resolve(&self, raw: Option<&str>) -> PropertyResult<T> {
        if let Some(raw) = raw {
            return Ok((self.decode)(raw)?);
        }
        match self.default.value() {
            Some(default) => Ok(default.clone()),
            None => Err(SourceError::PropertyNotFound {
                name: self.name.clone(),
                type_name: self.type_name,
            }
            .into()),
        }
    }
}

impl<T: SourceValue> RawSubscriber for SourceSubscriptionShared<T> {
    fn deliver(&self, raw: Option<&str>) -> PropertyResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        let new = self.resolve(raw)?;

        // The cache is written before the listener runs so a re-entrant
        // `get` from inside the listener observes the new value.
        let old = locks::write(&self.cached).replace(new.clone());

        let guard = locks::read(&self.listener);
        if let Some(listener) = guard.as_ref() {
            listener(old.as_ref(), &new);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn force_close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// A consumer-held registration of a listener on one source property.
///
/// Created in two phases: the source's `create_subscription` registers the
/// identity, and [`set_and_call_listener`](Self::set_and_call_listener)
/// attaches the listener and synchronously delivers the current resolved
/// value. Dropping the subscription closes it.
pub struct SourceSubscription<T> {
    shared: Arc<SourceSubscriptionShared<T>>,
    backend: Arc<dyn SourceBackend>,
}

impl<T: SourceValue> SourceSubscription<T> {
    pub(crate) fn new(
        backend: Arc<dyn SourceBackend>,
        name: &str,
        default: DefaultValue<T>,
        decode: Box<dyn Fn(&str) -> Result<T, MarshalError> + Send + Sync>,
    ) -> Self {
        Self {
            shared: Arc::new(SourceSubscriptionShared {
                id: SubscriptionId::new(),
                name: name.to_owned(),
                type_name: std::any::type_name::<T>(),
                default,
                decode,
                cached: RwLock::new(None),
                listener: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
            backend,
        }
    }

    /// Attaches the listener, registers with the source's publisher, and
    /// synchronously delivers the current value: the stored one if present,
    /// otherwise the default.
    ///
    /// # Errors
    ///
    /// Fails with
    /// [`SourceError::PropertyNotFound`](crate::SourceError::PropertyNotFound)
    /// when the property is absent and no default was supplied, or with a
    /// [`MarshalError`] when the stored value does not parse; either way the
    /// subscription is closed and discarded.
    pub fn set_and_call_listener<F>(self, listener: F) -> PropertyResult<Self>
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        if self.backend.is_closed() {
            return Err(SourceError::SourceClosed.into());
        }

        *locks::write(&self.shared.listener) = Some(Box::new(listener));

        let shared = Arc::clone(&self.shared);
        let publisher = self.backend.publisher();
        let mut outcome = Ok(());
        self.backend
            .with_property_locked(&self.shared.name, &mut |raw| {
                let erased: Arc<dyn RawSubscriber> = shared.clone();
                let weak: Weak<dyn RawSubscriber> = Arc::downgrade(&erased);
                publisher.add(&shared.name, shared.id, weak);
                outcome = shared.deliver(raw);
            });

        match outcome {
            Ok(()) => Ok(self),
            Err(err) => {
                self.close_impl();
                Err(err)
            }
        }
    }

    /// Last value delivered to this subscription.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        locks::read(&self.shared.cached).clone()
    }
}

impl<T> SourceSubscription<T> {
    /// Property name this subscription listens on.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Identifier of this subscription.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    fn close_impl(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.backend
            .publisher()
            .remove(&self.shared.name, self.shared.id);
    }
}

impl<T: Send + Sync> Subscription for SourceSubscription<T> {
    fn close(&self) {
        self.close_impl();
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for SourceSubscription<T> {
    fn drop(&mut self) {
        self.close_impl();
    }
}

impl<T> std::fmt::Debug for SourceSubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSubscription")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("type", &self.shared.type_name)
            .finish()
    }
}
