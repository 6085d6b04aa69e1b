//! Property sources: external key/value stores with change notification.
//!
//! A source maps property names to serialized string values and notifies
//! typed subscriptions when a value is added, updated, or removed. Every
//! variant funnels its changes through one internal publisher and holds one
//! consistency lock around both its read path and its notification path, so
//! a direct read and a concurrent change event can never produce two
//! different "current" answers for the same write.
//!
//! Listener threading is owned by the backing medium: the caller's thread
//! for [`InMemorySource::set`], the watch thread for [`FileSource`] and
//! [`DistributedStoreSource`], the poller thread for [`PropertyPoller`]
//! properties. Listeners must not call back into the source that invoked
//! them: the consistency lock is not reentrant.

mod distributed;
mod file;
mod in_memory;
mod polling;
pub(crate) mod publisher;
mod sourced;
mod subscription;

pub use distributed::{
    DistributedSourceConfig, DistributedStoreSource, SourceLifecycle, StoreWatchEvent,
    WatchStoreClient,
};
pub use file::FileSource;
pub use in_memory::InMemorySource;
pub use polling::{PolledProperty, PollerConfig, PropertyPoller};
pub use sourced::SourcedProperty;
pub use subscription::SourceSubscription;

use serde::de::DeserializeOwned;

use crate::error::PropertyResult;

/// Bound for values a source subscription can produce.
pub trait SourceValue: DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T: DeserializeOwned + Clone + Send + Sync + 'static> SourceValue for T {}

/// Optional fallback used when a property is absent from its source.
///
/// Absence of both a stored value and a default fails the subscription with
/// [`SourceError::PropertyNotFound`](crate::SourceError::PropertyNotFound).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultValue<T> {
    value: Option<T>,
}

impl<T> DefaultValue<T> {
    /// A present default.
    #[must_use]
    pub fn of(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// No default; a missing property becomes an error.
    #[must_use]
    pub fn none() -> Self {
        Self { value: None }
    }

    /// Whether a default was supplied.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// The default value, if present.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

/// External key/value store feeding typed subscriptions.
pub trait PropertySource: Send + Sync {
    /// Registers a subscription identity for `name`.
    ///
    /// The subscription starts receiving events once a listener is attached
    /// via [`SourceSubscription::set_and_call_listener`].
    ///
    /// # Errors
    ///
    /// Fails with [`SourceError::SourceClosed`](crate::SourceError::SourceClosed)
    /// on a closed source.
    fn create_subscription<T: SourceValue>(
        &self,
        name: &str,
        default: DefaultValue<T>,
    ) -> PropertyResult<SourceSubscription<T>>;

    /// Current serialized value for `name`, read under the source's
    /// consistency lock.
    ///
    /// # Errors
    ///
    /// Fails with [`SourceError::SourceClosed`](crate::SourceError::SourceClosed)
    /// on a closed source.
    fn get_property_value(&self, name: &str) -> PropertyResult<Option<String>>;

    /// Detaches every subscription and releases owned resources (watches,
    /// store connections, worker threads). Subsequent operations fail with
    /// [`SourceError::SourceClosed`](crate::SourceError::SourceClosed).
    fn close(&self);
}
