//! Property source backed by a hierarchical watch-capable store.
//!
//! The store client (e.g. a coordination-service connection) stays behind
//! [`WatchStoreClient`]; this module owns the mirroring of the store's
//! subtree into the local delivery path and the lifecycle around it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{PropertyResult, SourceError};
use crate::locks;
use crate::marshaller::{JsonMarshaller, PropertyMarshaller};
use crate::source::in_memory::InMemorySource;
use crate::source::subscription::SourceSubscription;
use crate::source::{DefaultValue, PropertySource, SourceValue};

/// Change event pushed by a [`WatchStoreClient`] tree watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWatchEvent {
    /// The watch has delivered the complete initial state of the subtree.
    Initialized,
    /// A node appeared under the watched root. `data` is `None` when the
    /// node's payload could not be read as text.
    NodeAdded {
        /// Absolute node path.
        path: String,
        /// Node payload.
        data: Option<String>,
    },
    /// A node's payload changed.
    NodeUpdated {
        /// Absolute node path.
        path: String,
        /// Node payload.
        data: Option<String>,
    },
    /// A node was deleted.
    NodeRemoved {
        /// Absolute node path.
        path: String,
    },
}

/// Client-side view of a hierarchical store with recursive watches.
///
/// Implementations wrap the actual store connection. The contract:
///
/// - `start_tree_watch` registers a recursive watch under `root` and pushes
///   every add/update/remove plus one [`StoreWatchEvent::Initialized`] marker
///   into `events`, from whatever thread the client uses for callbacks.
/// - `stop_tree_watch` releases the watch **and drops the event sender**, so
///   the source's worker thread can drain out and exit.
/// - `read_async` issues a direct (non-cached) read and replies with
///   `(path, payload)` on the supplied channel.
pub trait WatchStoreClient: Send + Sync + 'static {
    /// Starts a recursive watch under `root`.
    ///
    /// # Errors
    ///
    /// Fails if the watch cannot be registered.
    fn start_tree_watch(
        &self,
        root: &str,
        events: Sender<StoreWatchEvent>,
    ) -> PropertyResult<()>;

    /// Lists the immediate children of `root` (names, not paths).
    ///
    /// # Errors
    ///
    /// Fails if the listing cannot be served.
    fn children(&self, root: &str) -> PropertyResult<Vec<String>>;

    /// Issues an asynchronous direct read of `path`.
    ///
    /// # Errors
    ///
    /// Fails if the read cannot be issued.
    fn read_async(&self, path: &str, reply: Sender<(String, Option<String>)>)
        -> PropertyResult<()>;

    /// Releases the watch registered by `start_tree_watch`.
    fn stop_tree_watch(&self, root: &str);
}

/// Configuration for [`DistributedStoreSource`].
#[derive(Debug, Clone)]
pub struct DistributedSourceConfig {
    /// Store path under which all properties live, e.g. `/my-app/config`.
    pub root_path: String,
    /// How long construction may wait for the initial full sync.
    pub init_timeout: Duration,
    /// Budget for [`DistributedStoreSource::read_all_properties`].
    pub bulk_read_timeout: Duration,
}

impl DistributedSourceConfig {
    /// Configuration for `root_path` with default timeouts.
    #[must_use]
    pub fn new(root_path: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Self::default()
        }
    }
}

impl Default for DistributedSourceConfig {
    fn default() -> Self {
        Self {
            root_path: "/config".to_string(),
            init_timeout: Duration::from_secs(60),
            bulk_read_timeout: Duration::from_secs(120),
        }
    }
}

/// Lifecycle of a [`DistributedStoreSource`].
///
/// `Starting` covers watch registration, `Initializing` the wait for the
/// full sync. A timeout during `Initializing` fails construction (the
/// `FailedInit` terminal state); a constructed source is `Ready` until
/// closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLifecycle {
    #[allow(missing_docs)]
    Starting,
    #[allow(missing_docs)]
    Initializing,
    #[allow(missing_docs)]
    Ready,
    #[allow(missing_docs)]
    FailedInit,
    #[allow(missing_docs)]
    Closed,
}

/// Property source mirroring a subtree of an external hierarchical store.
///
/// Construction blocks until the store's watch confirms the complete initial
/// state, so a subscription created right after the constructor returns sees
/// the actual stored value, never its default, for keys that already exist.
/// Watch events and direct reads go through one lock: a read can never
/// observe a value whose notification is still in flight.
pub struct DistributedStoreSource<C: WatchStoreClient, M: PropertyMarshaller = JsonMarshaller> {
    client: Arc<C>,
    config: DistributedSourceConfig,
    root: String,
    store: InMemorySource<M>,
    lifecycle: Mutex<SourceLifecycle>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<C: WatchStoreClient, M: PropertyMarshaller> DistributedStoreSource<C, M> {
    /// Connects the source: registers the recursive watch, spawns the event
    /// worker, and waits for the initial full sync.
    ///
    /// # Errors
    ///
    /// Fails with [`SourceError::InitializationTimeout`] when the full-sync
    /// marker does not arrive within `config.init_timeout`; the watch is
    /// released before returning.
    pub fn new(client: C, config: DistributedSourceConfig, marshaller: M) -> PropertyResult<Self> {
        let client = Arc::new(client);
        let root = normalize_root(&config.root_path);
        let store = InMemorySource::new(marshaller);

        let (event_tx, event_rx) = unbounded::<StoreWatchEvent>();
        let (init_tx, init_rx) = bounded::<()>(1);

        client.start_tree_watch(&root, event_tx)?;

        let worker_root = root.clone();
        let worker_store = store.clone();
        let worker = thread::Builder::new()
            .name("dynprop-store-watch".to_string())
            .spawn(move || watch_loop(&worker_root, &worker_store, &event_rx, &init_tx))
            .map_err(|err| SourceError::Watch {
                message: format!("failed to spawn store watch worker: {err}"),
            })?;

        if init_rx.recv_timeout(config.init_timeout).is_err() {
            client.stop_tree_watch(&root);
            let _ = worker.join();
            return Err(SourceError::InitializationTimeout {
                timeout: config.init_timeout,
            }
            .into());
        }

        Ok(Self {
            client,
            config,
            root,
            store,
            lifecycle: Mutex::new(SourceLifecycle::Ready),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> SourceLifecycle {
        *locks::lock(&self.lifecycle)
    }

    /// Reads every immediate child of the root directly from the store.
    ///
    /// # Errors
    ///
    /// Fails with [`SourceError::BulkReadTimeout`] when not all reads
    /// complete within `config.bulk_read_timeout`; no partial result is
    /// returned.
    pub fn read_all_properties(&self) -> PropertyResult<HashMap<String, String>> {
        self.ensure_ready()?;

        let children = self.client.children(&self.root)?;
        if children.is_empty() {
            return Ok(HashMap::new());
        }

        let (reply_tx, reply_rx): (
            Sender<(String, Option<String>)>,
            Receiver<(String, Option<String>)>,
        ) = bounded(children.len());
        for child in &children {
            self.client
                .read_async(&format!("{}/{child}", self.root), reply_tx.clone())?;
        }
        drop(reply_tx);

        let deadline = Instant::now() + self.config.bulk_read_timeout;
        let mut all = HashMap::new();
        for _ in 0..children.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match reply_rx.recv_timeout(remaining) {
                Ok((path, Some(value))) => {
                    if let Some(name) = relative_name(&self.root, &path) {
                        all.insert(name.to_owned(), value);
                    }
                }
                Ok((_, None)) => {}
                Err(_) => {
                    return Err(SourceError::BulkReadTimeout {
                        timeout: self.config.bulk_read_timeout,
                    }
                    .into())
                }
            }
        }
        Ok(all)
    }

    fn ensure_ready(&self) -> PropertyResult<()> {
        if self.lifecycle() != SourceLifecycle::Ready {
            return Err(SourceError::SourceClosed.into());
        }
        Ok(())
    }
}

impl<C: WatchStoreClient, M: PropertyMarshaller> PropertySource for DistributedStoreSource<C, M> {
    fn create_subscription<T: SourceValue>(
        &self,
        name: &str,
        default: DefaultValue<T>,
    ) -> PropertyResult<SourceSubscription<T>> {
        self.ensure_ready()?;
        self.store.create_subscription(name, default)
    }

    fn get_property_value(&self, name: &str) -> PropertyResult<Option<String>> {
        self.ensure_ready()?;
        self.store.get_property_value(name)
    }

    fn close(&self) {
        {
            let mut lifecycle = locks::lock(&self.lifecycle);
            if *lifecycle == SourceLifecycle::Closed {
                return;
            }
            *lifecycle = SourceLifecycle::Closed;
        }

        // Stopping the watch drops the client's event sender, which lets
        // the worker drain the channel and exit.
        self.client.stop_tree_watch(&self.root);
        if let Some(worker) = locks::lock(&self.worker).take() {
            let _ = worker.join();
        }
        self.store.close();
    }
}

impl<C: WatchStoreClient, M: PropertyMarshaller> Drop for DistributedStoreSource<C, M> {
    fn drop(&mut self) {
        self.close();
    }
}

fn watch_loop<M: PropertyMarshaller>(
    root: &str,
    store: &InMemorySource<M>,
    events: &Receiver<StoreWatchEvent>,
    init_tx: &Sender<()>,
) {
    for event in events.iter() {
        match event {
            StoreWatchEvent::Initialized => {
                let _ = init_tx.try_send(());
            }
            StoreWatchEvent::NodeAdded { path, data }
            | StoreWatchEvent::NodeUpdated { path, data } => {
                let Some(name) = relative_name(root, &path) else {
                    continue;
                };
                let applied = match data {
                    Some(value) => store.set(name, value),
                    // Unreadable payload: publish as a removal so
                    // subscribers fall back to their defaults.
                    None => store.remove(name),
                };
                if let Err(err) = applied {
                    tracing::error!(property = name, error = %err, "failed to apply store update");
                }
            }
            StoreWatchEvent::NodeRemoved { path } => {
                let Some(name) = relative_name(root, &path) else {
                    continue;
                };
                if let Err(err) = store.remove(name) {
                    tracing::error!(property = name, error = %err, "failed to apply store removal");
                }
            }
        }
    }
    tracing::debug!(root, "store watch worker stopped");
}

fn normalize_root(root: &str) -> String {
    root.trim_end_matches('/').to_string()
}

/// `/root/name` → `name`; events outside the root yield `None`.
fn relative_name<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(root)?.strip_prefix('/').filter(|name| !name.is_empty())
}
