//! # dynprop - Live Configuration Property Propagation
//!
//! dynprop distributes externally-stored configuration values to in-process
//! consumers as live, observable handles. A change in the backing store
//! (a coordination-service node, a properties file, a polled supplier, or a
//! plain in-memory map) is re-published to every registered listener as a
//! typed update, without consumers polling.
//!
//! ## Core Concepts
//!
//! - **Property**: an observable typed value holder ([`AtomicProperty`],
//!   [`ConstantProperty`], derived [`MappedProperty`]/[`CombinedProperty`],
//!   source-backed [`SourcedProperty`])
//! - **Source**: an external key/value store with change notification
//!   ([`InMemorySource`], [`FileSource`], [`DistributedStoreSource`],
//!   [`PropertyPoller`])
//! - **Subscription**: a revocable registration of a listener, created in two
//!   phases: register identity, then attach the listener and receive the
//!   current value synchronously
//! - **Marshaller**: typed (de)serialization of stored string values
//!
//! ## Usage
//!
//! ```rust
//! use dynprop::{DefaultValue, DynamicProperty, DynamicPropertyExt, InMemorySource, SourcedProperty};
//!
//! let source = InMemorySource::default();
//! source.set("pool.size", "8").unwrap();
//!
//! let pool_size =
//!     SourcedProperty::<u32>::new(&source, "pool.size", DefaultValue::of(4)).unwrap();
//! let subscription = pool_size.subscribe_and_call(|old, new| {
//!     println!("pool size {old:?} -> {new}");
//! });
//!
//! source.set("pool.size", "16").unwrap();
//! assert_eq!(pool_size.get(), Some(16));
//! # drop(subscription);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod marshaller;
pub mod property;
pub mod source;

mod locks;

// Re-export primary types at crate root for convenience
pub use error::{MarshalError, PropertyError, PropertyResult, SourceError};
pub use marshaller::{JsonMarshaller, PropertyMarshaller};
pub use property::{
    AtomicProperty, CombinedProperty, ConstantProperty, DelegatedProperty, DynamicProperty,
    DynamicPropertyExt, MappedProperty, PropertyChangeSource, PropertyListener,
    PropertySubscription, Subscription, SubscriptionId,
};
pub use source::{
    DefaultValue, DistributedSourceConfig, DistributedStoreSource, FileSource, InMemorySource,
    PolledProperty, PollerConfig, PropertyPoller, PropertySource, SourceLifecycle,
    SourceSubscription, SourceValue, SourcedProperty, StoreWatchEvent, WatchStoreClient,
};
