use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use dynprop::{
    AtomicProperty, DefaultValue, DynamicProperty, FileSource, JsonMarshaller, PropertySource,
    SourcedProperty,
};

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn initial_file_contents_are_served_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.properties");
    std::fs::write(&path, "name=foo\nport=8080\n").unwrap();

    let source = FileSource::watching(&path).unwrap();

    let name = SourcedProperty::<String>::new(&source, "name", DefaultValue::none()).unwrap();
    assert_eq!(name.get(), Some("foo".to_string()));

    let port = SourcedProperty::<u16>::new(&source, "port", DefaultValue::none()).unwrap();
    assert_eq!(port.get(), Some(8080));

    source.close();
}

#[test]
fn content_change_propagates_to_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.properties");
    std::fs::write(&path, "name=foo\n").unwrap();

    let source = FileSource::watching(&path).unwrap();
    let property = SourcedProperty::<String>::new(&source, "name", DefaultValue::none()).unwrap();
    assert_eq!(property.get(), Some("foo".to_string()));

    std::fs::write(&path, "name=bar\n").unwrap();
    assert!(
        wait_until(Duration::from_secs(10), || property.get()
            == Some("bar".to_string())),
        "file content change was not propagated"
    );

    source.close();
}

#[test]
fn path_property_change_switches_to_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.properties");
    let second = dir.path().join("second.properties");
    std::fs::write(&first, "name=foo\n").unwrap();
    std::fs::write(&second, "name=bar\n").unwrap();

    let path = AtomicProperty::new(first.clone());
    let source = FileSource::new(&path, JsonMarshaller).unwrap();

    let property = SourcedProperty::<String>::new(&source, "name", DefaultValue::none()).unwrap();
    assert_eq!(property.get(), Some("foo".to_string()));

    // Repointing the path property reloads synchronously on this thread.
    path.set(second.clone());
    assert_eq!(property.get(), Some("bar".to_string()));

    source.close();
}

#[test]
fn vanished_keys_are_published_as_removals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.properties");
    std::fs::write(&path, "keep=1\ndrop=2\n").unwrap();

    let path_property = AtomicProperty::new(path.clone());
    let source = FileSource::new(&path_property, JsonMarshaller).unwrap();

    let kept = SourcedProperty::<u32>::new(&source, "keep", DefaultValue::none()).unwrap();
    let dropped =
        SourcedProperty::<u32>::new(&source, "drop", DefaultValue::of(99)).unwrap();
    assert_eq!(kept.get(), Some(1));
    assert_eq!(dropped.get(), Some(2));

    // Rewrite without the second key, then force a reload via a path "change"
    // to the same file, which is synchronous and watcher-independent.
    std::fs::write(&path, "keep=1\n").unwrap();
    path_property.set(path.clone());

    assert_eq!(kept.get(), Some(1));
    assert_eq!(dropped.get(), Some(99));

    source.close();
}

#[test]
fn unchanged_keys_are_not_renotified_on_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.properties");
    std::fs::write(&path, "stable=1\nmoving=1\n").unwrap();

    let path_property = AtomicProperty::new(path.clone());
    let source = FileSource::new(&path_property, JsonMarshaller).unwrap();

    let stable_calls = Arc::new(AtomicUsize::new(0));
    let moving_values = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&stable_calls);
    let _stable = source
        .create_subscription::<u32>("stable", DefaultValue::none())
        .unwrap()
        .set_and_call_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let captor = Arc::clone(&moving_values);
    let _moving = source
        .create_subscription::<u32>("moving", DefaultValue::none())
        .unwrap()
        .set_and_call_listener(move |_, new| captor.lock().unwrap().push(*new))
        .unwrap();

    std::fs::write(&path, "stable=1\nmoving=2\n").unwrap();
    path_property.set(path.clone());

    assert_eq!(moving_values.lock().unwrap().as_slice(), &[1, 2]);
    assert_eq!(stable_calls.load(Ordering::SeqCst), 1);

    source.close();
}

#[test]
fn closed_file_source_rejects_operations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.properties");
    std::fs::write(&path, "name=foo\n").unwrap();

    let source = FileSource::watching(&path).unwrap();
    source.close();

    assert!(source.get_property_value("name").is_err());
    assert!(source
        .create_subscription::<String>("name", DefaultValue::none())
        .is_err());
}

#[test]
fn watching_accepts_pathbuf_and_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("app.properties");
    std::fs::write(&path, "k=v\n").unwrap();

    let source = FileSource::watching(path.clone()).unwrap();
    assert_eq!(
        source.get_property_value("k").unwrap().as_deref(),
        Some("v")
    );
    source.close();
}
