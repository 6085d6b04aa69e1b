use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use dynprop::{
    DefaultValue, DistributedSourceConfig, DistributedStoreSource, DynamicProperty,
    DynamicPropertyExt, JsonMarshaller, PropertyResult, PropertySource, SourceError,
    SourceLifecycle, SourcedProperty, StoreWatchEvent, WatchStoreClient,
};

const ROOT: &str = "/test-app/config";

/// In-process stand-in for a coordination-service client: a node map plus a
/// tree-watch channel that replays the current state before signalling the
/// full sync.
#[derive(Clone, Default)]
struct FakeStoreClient {
    state: Arc<FakeStoreState>,
}

#[derive(Default)]
struct FakeStoreState {
    nodes: Mutex<HashMap<String, String>>,
    watch: Mutex<Option<Sender<StoreWatchEvent>>>,
    reply_delay: Mutex<Option<Duration>>,
    skip_initialized: Mutex<bool>,
}

impl FakeStoreClient {
    fn with_nodes(entries: &[(&str, &str)]) -> Self {
        let client = Self::default();
        {
            let mut nodes = client.state.nodes.lock().unwrap();
            for (name, value) in entries {
                nodes.insert(format!("{ROOT}/{name}"), (*value).to_string());
            }
        }
        client
    }

    /// A client whose watch never confirms the initial sync.
    fn never_syncing() -> Self {
        let client = Self::default();
        *client.state.skip_initialized.lock().unwrap() = true;
        client
    }

    fn delay_replies(&self, delay: Duration) {
        *self.state.reply_delay.lock().unwrap() = Some(delay);
    }

    fn write(&self, name: &str, value: &str) {
        let path = format!("{ROOT}/{name}");
        let added = self
            .state
            .nodes
            .lock()
            .unwrap()
            .insert(path.clone(), value.to_string())
            .is_none();
        if let Some(watch) = self.state.watch.lock().unwrap().as_ref() {
            let event = if added {
                StoreWatchEvent::NodeAdded {
                    path,
                    data: Some(value.to_string()),
                }
            } else {
                StoreWatchEvent::NodeUpdated {
                    path,
                    data: Some(value.to_string()),
                }
            };
            let _ = watch.send(event);
        }
    }

    fn delete(&self, name: &str) {
        let path = format!("{ROOT}/{name}");
        self.state.nodes.lock().unwrap().remove(&path);
        if let Some(watch) = self.state.watch.lock().unwrap().as_ref() {
            let _ = watch.send(StoreWatchEvent::NodeRemoved { path });
        }
    }
}

impl WatchStoreClient for FakeStoreClient {
    fn start_tree_watch(&self, _root: &str, events: Sender<StoreWatchEvent>) -> PropertyResult<()> {
        for (path, value) in self.state.nodes.lock().unwrap().iter() {
            let _ = events.send(StoreWatchEvent::NodeAdded {
                path: path.clone(),
                data: Some(value.clone()),
            });
        }
        if !*self.state.skip_initialized.lock().unwrap() {
            let _ = events.send(StoreWatchEvent::Initialized);
        }
        *self.state.watch.lock().unwrap() = Some(events);
        Ok(())
    }

    fn children(&self, root: &str) -> PropertyResult<Vec<String>> {
        let prefix = format!("{root}/");
        Ok(self
            .state
            .nodes
            .lock()
            .unwrap()
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .map(ToOwned::to_owned)
            .collect())
    }

    fn read_async(
        &self,
        path: &str,
        reply: Sender<(String, Option<String>)>,
    ) -> PropertyResult<()> {
        let data = self.state.nodes.lock().unwrap().get(path).cloned();
        let delay = *self.state.reply_delay.lock().unwrap();
        let path = path.to_owned();
        thread::spawn(move || {
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
            let _ = reply.send((path, data));
        });
        Ok(())
    }

    fn stop_tree_watch(&self, _root: &str) {
        *self.state.watch.lock().unwrap() = None;
    }
}

fn config_with_timeouts(init: Duration, bulk: Duration) -> DistributedSourceConfig {
    DistributedSourceConfig {
        root_path: ROOT.to_string(),
        init_timeout: init,
        bulk_read_timeout: bulk,
    }
}

fn ready_source(client: FakeStoreClient) -> DistributedStoreSource<FakeStoreClient> {
    DistributedStoreSource::new(
        client,
        config_with_timeouts(Duration::from_secs(5), Duration::from_secs(5)),
        JsonMarshaller,
    )
    .unwrap()
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn construction_blocks_until_sync_then_serves_stored_values_over_defaults() {
    let client = FakeStoreClient::with_nodes(&[("k", "v")]);
    let source = ready_source(client);
    assert_eq!(source.lifecycle(), SourceLifecycle::Ready);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let captor = Arc::clone(&observed);
    let _subscription = source
        .create_subscription::<String>("k", DefaultValue::of("zzz".to_string()))
        .unwrap()
        .set_and_call_listener(move |_, new| captor.lock().unwrap().push(new.clone()))
        .unwrap();

    // The first delivered value is the stored one, never the default.
    assert_eq!(observed.lock().unwrap().first().map(String::as_str), Some("v"));
}

#[test]
fn initialization_timeout_fails_construction() {
    let client = FakeStoreClient::never_syncing();
    let err = DistributedStoreSource::new(
        client,
        config_with_timeouts(Duration::from_millis(50), Duration::from_secs(1)),
        JsonMarshaller,
    )
    .err()
    .expect("construction must fail without full sync");

    assert!(matches!(
        err,
        dynprop::PropertyError::Source(SourceError::InitializationTimeout { .. })
    ));
}

#[test]
fn watch_events_flow_to_subscribers() {
    let client = FakeStoreClient::with_nodes(&[]);
    let source = ready_source(client.clone());

    let property = SourcedProperty::<String>::new(
        &source,
        "feature.flag",
        DefaultValue::of("off".to_string()),
    )
    .unwrap();
    assert_eq!(property.get(), Some("off".to_string()));

    client.write("feature.flag", "on");
    assert!(wait_until(Duration::from_secs(2), || {
        property.get() == Some("on".to_string())
    }));

    client.write("feature.flag", "canary");
    assert!(wait_until(Duration::from_secs(2), || {
        property.get() == Some("canary".to_string())
    }));

    client.delete("feature.flag");
    assert!(wait_until(Duration::from_secs(2), || {
        property.get() == Some("off".to_string())
    }));
}

#[test]
fn typed_updates_recompute_derived_properties() {
    let client = FakeStoreClient::with_nodes(&[("pool.size", "4")]);
    let source = ready_source(client.clone());

    let pool_size =
        SourcedProperty::<u32>::new(&source, "pool.size", DefaultValue::none()).unwrap();
    let doubled = pool_size.map(|v| v * 2);
    assert_eq!(doubled.get(), Some(8));

    client.write("pool.size", "16");
    assert!(wait_until(Duration::from_secs(2), || doubled.get() == Some(32)));
}

#[test]
fn bulk_written_keys_never_resolve_to_defaults() {
    const KEYS: usize = 200;

    let entries: Vec<(String, String)> = (0..KEYS)
        .map(|i| (format!("prop-{i}"), format!("value-{i}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let source = ready_source(FakeStoreClient::with_nodes(&borrowed));

    for i in 0..KEYS {
        let property = SourcedProperty::<String>::new(
            &source,
            &format!("prop-{i}"),
            DefaultValue::of("default".to_string()),
        )
        .unwrap();
        assert_eq!(property.get(), Some(format!("value-{i}")));
    }
}

#[test]
fn read_all_properties_returns_every_child() {
    let client = FakeStoreClient::with_nodes(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let source = ready_source(client);

    let all = source.read_all_properties().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all["a"], "1");
    assert_eq!(all["b"], "2");
    assert_eq!(all["c"], "3");
}

#[test]
fn read_all_properties_times_out_without_partial_result() {
    let client = FakeStoreClient::with_nodes(&[("a", "1"), ("b", "2")]);
    client.delay_replies(Duration::from_secs(10));

    let source = DistributedStoreSource::new(
        client,
        config_with_timeouts(Duration::from_secs(5), Duration::from_millis(50)),
        JsonMarshaller,
    )
    .unwrap();

    let err = source.read_all_properties().unwrap_err();
    assert!(matches!(
        err,
        dynprop::PropertyError::Source(SourceError::BulkReadTimeout { .. })
    ));
}

#[test]
fn closed_source_fails_deterministically_and_stops_worker() {
    let client = FakeStoreClient::with_nodes(&[("k", "v")]);
    let source = ready_source(client.clone());

    let property = SourcedProperty::<String>::new(&source, "k", DefaultValue::none()).unwrap();
    assert_eq!(property.get(), Some("v".to_string()));

    source.close();
    assert_eq!(source.lifecycle(), SourceLifecycle::Closed);

    assert!(source.get_property_value("k").is_err());
    assert!(source
        .create_subscription::<String>("k", DefaultValue::none())
        .is_err());
    assert!(source.read_all_properties().is_err());

    // Events after close no longer reach the detached property.
    client.write("k", "v2");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(property.get(), Some("v".to_string()));
}
