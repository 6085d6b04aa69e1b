//! In-memory property source.
//!
//! The reference source implementation: a map guarded by one mutex that is
//! held across both reads and change notifications. The file and distributed
//! sources delegate their delivery to this type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::error::{PropertyResult, SourceError};
use crate::locks;
use crate::marshaller::{JsonMarshaller, PropertyMarshaller};
use crate::source::publisher::SourcePublisher;
use crate::source::subscription::{SourceBackend, SourceSubscription};
use crate::source::{DefaultValue, PropertySource, SourceValue};

struct InMemoryState<M> {
    properties: Mutex<HashMap<String, String>>,
    publisher: SourcePublisher,
    marshaller: M,
    closed: AtomicBool,
}

impl<M: PropertyMarshaller> SourceBackend for InMemoryState<M> {
    fn with_property_locked(&self, name: &str, f: &mut dyn FnMut(Option<&str>)) {
        let properties = locks::lock(&self.properties);
        f(properties.get(name).map(String::as_str));
    }

    fn publisher(&self) -> &SourcePublisher {
        &self.publisher
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Property source backed by a process-local map.
///
/// `set` and `remove` mutate the map and notify subscribers before releasing
/// the map lock, so a concurrent read never observes a value without its
/// notification having been dispatched. A `set` with an unchanged value
/// notifies again; the source applies no deduplication.
///
/// # Examples
///
/// ```
/// use dynprop::{DefaultValue, InMemorySource, PropertySource};
///
/// let source = InMemorySource::default();
/// source.set("retries", "3").unwrap();
///
/// let subscription = source
///     .create_subscription::<u32>("retries", DefaultValue::none())
///     .unwrap()
///     .set_and_call_listener(|_, retries| println!("retries = {retries}"))
///     .unwrap();
/// assert_eq!(subscription.get(), Some(3));
/// ```
pub struct InMemorySource<M: PropertyMarshaller = JsonMarshaller> {
    state: Arc<InMemoryState<M>>,
}

impl<M: PropertyMarshaller> InMemorySource<M> {
    /// Creates an empty source using `marshaller` for value conversion.
    #[must_use]
    pub fn new(marshaller: M) -> Self {
        Self {
            state: Arc::new(InMemoryState {
                properties: Mutex::new(HashMap::new()),
                publisher: SourcePublisher::new(),
                marshaller,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Stores a raw serialized value and notifies subscribers of `key`.
    ///
    /// # Errors
    ///
    /// Fails with [`SourceError::SourceClosed`] on a closed source.
    pub fn set(&self, key: &str, value: impl Into<String>) -> PropertyResult<()> {
        self.ensure_open()?;
        let value = value.into();
        let mut properties = locks::lock(&self.state.properties);
        properties.insert(key.to_owned(), value.clone());
        self.state.publisher.notify(key, Some(&value));
        Ok(())
    }

    /// Marshals `value` and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Fails if the source is closed or the value cannot be serialized.
    pub fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> PropertyResult<()> {
        let raw = self.state.marshaller.marshal(value)?;
        self.set(key, raw)
    }

    /// Removes `key`; subscribers fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Fails with [`SourceError::SourceClosed`] on a closed source.
    pub fn remove(&self, key: &str) -> PropertyResult<()> {
        self.ensure_open()?;
        let mut properties = locks::lock(&self.state.properties);
        properties.remove(key);
        self.state.publisher.notify(key, None);
        Ok(())
    }

    /// Names of all stored properties.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        locks::lock(&self.state.properties).keys().cloned().collect()
    }

    /// Copy of the current name→value map.
    pub(crate) fn snapshot(&self) -> HashMap<String, String> {
        locks::lock(&self.state.properties).clone()
    }

    fn ensure_open(&self) -> PropertyResult<()> {
        if self.state.is_closed() {
            return Err(SourceError::SourceClosed.into());
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, name: &str) -> usize {
        self.state.publisher.subscriber_count(name)
    }
}

impl<M: PropertyMarshaller> PropertySource for InMemorySource<M> {
    fn create_subscription<T: SourceValue>(
        &self,
        name: &str,
        default: DefaultValue<T>,
    ) -> PropertyResult<SourceSubscription<T>> {
        self.ensure_open()?;
        let state = Arc::clone(&self.state);
        let decode = Box::new(move |raw: &str| state.marshaller.unmarshal::<T>(raw));
        let backend: Arc<dyn SourceBackend> = self.state.clone();
        Ok(SourceSubscription::new(backend, name, default, decode))
    }

    fn get_property_value(&self, name: &str) -> PropertyResult<Option<String>> {
        self.ensure_open()?;
        Ok(locks::lock(&self.state.properties).get(name).cloned())
    }

    fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.publisher.close();
        locks::lock(&self.state.properties).clear();
    }
}

impl Default for InMemorySource<JsonMarshaller> {
    fn default() -> Self {
        Self::new(JsonMarshaller)
    }
}

impl<M: PropertyMarshaller> Clone for InMemorySource<M> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::property::Subscription;

    use super::*;

    #[test]
    fn subscribe_with_default_then_track_updates() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let source = InMemorySource::default();

        let captor = Arc::clone(&observed);
        let subscription = source
            .create_subscription::<u32>("foo", DefaultValue::of(12))
            .unwrap()
            .set_and_call_listener(move |_, new| captor.lock().unwrap().push(*new))
            .unwrap();

        assert_eq!(observed.lock().unwrap().as_slice(), &[12]);

        // A write to an unrelated key does not notify.
        source.set("my", "14").unwrap();
        assert_eq!(observed.lock().unwrap().len(), 1);

        source.set("foo", "14").unwrap();
        assert_eq!(observed.lock().unwrap().as_slice(), &[12, 14]);

        subscription.close();
        source.set("foo", "42").unwrap();
        assert_eq!(observed.lock().unwrap().as_slice(), &[12, 14]);
    }

    #[test]
    fn stored_value_wins_over_default() {
        let source = InMemorySource::default();
        source.set("key", "some Value").unwrap();

        let subscription = source
            .create_subscription::<String>("key", DefaultValue::of("zzz".to_string()))
            .unwrap()
            .set_and_call_listener(|_, _| {})
            .unwrap();

        assert_eq!(subscription.get(), Some("some Value".to_string()));
    }

    #[test]
    fn missing_value_without_default_fails_subscription() {
        let source = InMemorySource::default();
        let err = source
            .create_subscription::<String>("absent", DefaultValue::none())
            .unwrap()
            .set_and_call_listener(|_, _| {})
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn malformed_value_fails_subscription() {
        let source = InMemorySource::default();
        source.set("port", "not-a-number").unwrap();

        let err = source
            .create_subscription::<u16>("port", DefaultValue::none())
            .unwrap()
            .set_and_call_listener(|_, _| {})
            .unwrap_err();
        assert!(err.is_marshal());
    }

    #[test]
    fn removal_falls_back_to_default() {
        let source = InMemorySource::default();
        source.set("key", "1").unwrap();

        let subscription = source
            .create_subscription::<u32>("key", DefaultValue::of(99))
            .unwrap()
            .set_and_call_listener(|_, _| {})
            .unwrap();
        assert_eq!(subscription.get(), Some(1));

        source.remove("key").unwrap();
        assert_eq!(subscription.get(), Some(99));
    }

    #[test]
    fn removal_without_default_keeps_last_value() {
        let source = InMemorySource::default();
        source.set("key", "1").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = source
            .create_subscription::<u32>("key", DefaultValue::none())
            .unwrap()
            .set_and_call_listener(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Resolution fails, the failure is logged, and the listener keeps
        // its previous value.
        source.remove("key").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(subscription.get(), Some(1));
    }

    #[test]
    fn redundant_set_notifies_again() {
        let source = InMemorySource::default();
        source.set("key", "5").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _subscription = source
            .create_subscription::<u32>("key", DefaultValue::none())
            .unwrap()
            .set_and_call_listener(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        source.set("key", "5").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropped_subscription_is_pruned_on_next_notify() {
        let source = InMemorySource::default();
        source.set("key", "1").unwrap();

        let subscription = source
            .create_subscription::<u32>("key", DefaultValue::none())
            .unwrap()
            .set_and_call_listener(|_, _| {})
            .unwrap();
        assert_eq!(source.subscriber_count("key"), 1);

        drop(subscription);
        source.set("key", "2").unwrap();
        assert_eq!(source.subscriber_count("key"), 0);
    }

    #[test]
    fn operations_on_closed_source_fail() {
        let source = InMemorySource::default();
        source.set("key", "1").unwrap();
        source.close();

        assert!(source.set("key", "2").is_err());
        assert!(source.remove("key").is_err());
        assert!(source.get_property_value("key").is_err());
        assert!(source
            .create_subscription::<u32>("key", DefaultValue::none())
            .is_err());
    }

    #[test]
    fn close_detaches_live_subscriptions() {
        let source = InMemorySource::default();
        source.set("key", "1").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = source
            .create_subscription::<u32>("key", DefaultValue::none())
            .unwrap()
            .set_and_call_listener(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        source.close();
        assert!(subscription.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_typed_round_trips_through_marshaller() {
        let source = InMemorySource::default();
        source.set_typed("limit", &250u64).unwrap();
        assert_eq!(
            source.get_property_value("limit").unwrap().as_deref(),
            Some("250")
        );
    }
}
