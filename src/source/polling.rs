//! Scheduled-refresh adapter turning pull-only values into properties.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};

use crate::locks;
use crate::property::{
    AtomicProperty, DynamicProperty, PropertyChangeSource, PropertySubscription, Subscription,
};

/// Configuration for [`PropertyPoller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between poll passes.
    pub period: Duration,
    /// How long [`PropertyPoller::close`] waits for the worker to stop.
    pub shutdown_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

trait PollTarget: Send + Sync {
    fn poll(&self);
}

struct PolledShared<T> {
    property: AtomicProperty<T>,
    retriever: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> PollTarget for PolledShared<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn poll(&self) {
        match catch_unwind(AssertUnwindSafe(|| (self.retriever)())) {
            Ok(value) => {
                // Republish only on an actual change; a poll that returns
                // the same value produces no notification.
                let changed = self.property.get().is_none_or(|current| current != value);
                if changed {
                    self.property.set(value);
                }
            }
            Err(_) => {
                tracing::error!("property retriever panicked during poll");
            }
        }
    }
}

type TargetRegistry = Mutex<Vec<Weak<dyn PollTarget>>>;

/// Property backed by a user-supplied retriever polled on a schedule.
///
/// Between polls the property can miss intermediate values the retriever's
/// backing data went through; only the value observed at each tick is
/// published.
pub struct PolledProperty<T> {
    shared: Arc<PolledShared<T>>,
    registry: Weak<TargetRegistry>,
}

impl<T> PolledProperty<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn erased(&self) -> Weak<dyn PollTarget> {
        let shared: Arc<dyn PollTarget> = self.shared.clone();
        let weak: Weak<dyn PollTarget> = Arc::downgrade(&shared);
        weak
    }

    fn remove_from_registry(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let target = self.erased();
            locks::lock(&registry).retain(|entry| !Weak::ptr_eq(entry, &target));
        }
    }
}

impl<T> DynamicProperty<T> for PolledProperty<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> Option<T> {
        self.shared.property.get()
    }

    fn create_subscription(&self) -> PropertySubscription<T> {
        self.shared.property.create_subscription()
    }

    fn close(&self) {
        self.remove_from_registry();
        self.shared.property.close();
    }
}

impl<T> PropertyChangeSource for PolledProperty<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn subscribe_changes(&self, on_change: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        crate::property::erased_change_subscription(self, on_change)
    }
}

/// Polls registered retrievers on one worker thread and republishes changed
/// values.
///
/// Properties are held weakly: dropping a [`PolledProperty`] removes it from
/// the schedule no later than the next tick, and
/// [`delete_property`](Self::delete_property) removes it immediately.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dynprop::{DynamicProperty, PollerConfig, PropertyPoller};
///
/// let poller = PropertyPoller::new(PollerConfig {
///     period: Duration::from_millis(50),
///     ..PollerConfig::default()
/// });
/// let property = poller.create_property(|| std::process::id());
/// assert!(property.get().is_some());
/// poller.close();
/// ```
pub struct PropertyPoller {
    targets: Arc<TargetRegistry>,
    shutdown_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: PollerConfig,
}

impl PropertyPoller {
    /// Spawns the poll worker.
    #[must_use]
    pub fn new(config: PollerConfig) -> Self {
        let targets: Arc<TargetRegistry> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker_targets = Arc::clone(&targets);
        let period = config.period;
        let worker = thread::Builder::new()
            .name("dynprop-poller".to_string())
            .spawn(move || poll_loop(period, &worker_targets, &shutdown_rx, &done_tx))
            .expect("failed to spawn dynprop poller worker");

        Self {
            targets,
            shutdown_tx,
            done_rx,
            worker: Mutex::new(Some(worker)),
            config,
        }
    }

    /// Creates a property fed by `retriever`.
    ///
    /// The retriever is invoked once immediately, so the returned property
    /// already holds a value.
    pub fn create_property<T, F>(&self, retriever: F) -> PolledProperty<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let shared = Arc::new(PolledShared {
            property: AtomicProperty::empty(),
            retriever: Box::new(retriever),
        });
        shared.poll();

        let erased_arc: Arc<dyn PollTarget> = shared.clone();
        let erased: Weak<dyn PollTarget> = Arc::downgrade(&erased_arc);
        locks::lock(&self.targets).push(erased);

        PolledProperty {
            shared,
            registry: Arc::downgrade(&self.targets),
        }
    }

    /// Removes `property` from the schedule; no further polls will touch it.
    pub fn delete_property<T>(&self, property: &PolledProperty<T>)
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        property.remove_from_registry();
    }

    /// Stops the worker, waiting up to the configured shutdown timeout.
    pub fn close(&self) {
        let _ = self.shutdown_tx.try_send(());
        locks::lock(&self.targets).clear();

        if let Some(worker) = locks::lock(&self.worker).take() {
            match self.done_rx.recv_timeout(self.config.shutdown_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = worker.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::error!(
                        timeout = ?self.config.shutdown_timeout,
                        "poller worker did not stop in time; detaching"
                    );
                    drop(worker);
                }
            }
        }
    }
}

impl Drop for PropertyPoller {
    fn drop(&mut self) {
        self.close();
    }
}

fn poll_loop(
    period: Duration,
    targets: &TargetRegistry,
    shutdown_rx: &Receiver<()>,
    done_tx: &Sender<()>,
) {
    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            default(period) => {
                let live: Vec<Arc<dyn PollTarget>> = {
                    let mut targets = locks::lock(targets);
                    targets.retain(|weak| weak.upgrade().is_some());
                    targets.iter().filter_map(Weak::upgrade).collect()
                };
                for target in live {
                    target.poll();
                }
            }
        }
    }
    let _ = done_tx.send(());
}
