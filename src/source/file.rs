//! File-backed property source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{PropertyResult, SourceError};
use crate::locks;
use crate::marshaller::{JsonMarshaller, PropertyMarshaller};
use crate::property::{ConstantProperty, DynamicProperty, DynamicPropertyExt, PropertySubscription, Subscription};
use crate::source::in_memory::InMemorySource;
use crate::source::subscription::SourceSubscription;
use crate::source::{DefaultValue, PropertySource, SourceValue};

struct FileState<M: PropertyMarshaller> {
    store: InMemorySource<M>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    current_path: Mutex<Option<PathBuf>>,
    closed: AtomicBool,
}

impl<M: PropertyMarshaller> FileState<M> {
    /// Re-parses the currently watched file and pushes the difference into
    /// the in-memory store: changed keys are set, vanished keys are removed.
    /// Unchanged keys produce no notification.
    fn reload_current(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let Some(path) = locks::lock(&self.current_path).clone() else {
            return;
        };

        let parsed = match parse_properties_file(&path) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to reload properties file");
                return;
            }
        };

        let previous = self.store.snapshot();
        for (key, value) in &parsed {
            if previous.get(key) != Some(value) {
                if let Err(err) = self.store.set(key, value.clone()) {
                    tracing::error!(property = %key, error = %err, "failed to apply file property update");
                }
            }
        }
        for key in previous.keys().filter(|key| !parsed.contains_key(*key)) {
            if let Err(err) = self.store.remove(key) {
                tracing::error!(property = %key, error = %err, "failed to apply file property removal");
            }
        }
    }

    /// Installs a watch on `path`; the previous watch is dropped only after
    /// the new one is active, so there is no window with zero watches.
    fn swap_watch(this: &Arc<Self>, path: &Path) {
        *locks::lock(&this.current_path) = Some(path.to_path_buf());
        match Self::make_watcher(this, path) {
            Ok(next) => {
                *locks::lock(&this.watcher) = Some(next);
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to watch properties file; keeping previous watch");
            }
        }
    }

    fn make_watcher(this: &Arc<Self>, path: &Path) -> Result<RecommendedWatcher, notify::Error> {
        let state = Arc::downgrade(this);
        let mut watcher =
            notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
                let Some(state) = state.upgrade() else {
                    return;
                };
                match event {
                    Ok(_) => state.reload_current(),
                    Err(err) => {
                        tracing::error!(error = %err, "properties file watch error");
                    }
                }
            })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

/// Property source reading a flat `key=value` file.
///
/// The watched path is itself a property, so configuration can repoint the
/// source at runtime; a plain [`PathBuf`] is wrapped in a constant property.
/// Content changes and path changes both re-parse the whole file and publish
/// only the keys whose values actually differ. Reload failures are logged
/// and leave the previously published values untouched.
pub struct FileSource<M: PropertyMarshaller = JsonMarshaller> {
    state: Arc<FileState<M>>,
    path_subscription: PropertySubscription<PathBuf>,
}

impl FileSource<JsonMarshaller> {
    /// Watches a fixed path with the default JSON marshaller.
    ///
    /// # Errors
    ///
    /// Fails if the initial watch cannot be installed.
    pub fn watching(path: impl Into<PathBuf>) -> PropertyResult<Self> {
        Self::new(&ConstantProperty::of(path.into()), JsonMarshaller)
    }
}

impl<M: PropertyMarshaller> FileSource<M> {
    /// Creates a source following `path` with `marshaller` for values.
    ///
    /// The initial file content is loaded synchronously before this returns.
    ///
    /// # Errors
    ///
    /// Fails with [`SourceError::Watch`] if no watch could be installed on
    /// the initial path.
    pub fn new<P>(path: &P, marshaller: M) -> PropertyResult<Self>
    where
        P: DynamicProperty<PathBuf> + ?Sized,
    {
        let state = Arc::new(FileState {
            store: InMemorySource::new(marshaller),
            watcher: Mutex::new(None),
            current_path: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let watch_state = Arc::clone(&state);
        let path_subscription = path.subscribe_and_call(move |_, new_path: &PathBuf| {
            FileState::swap_watch(&watch_state, new_path);
            watch_state.reload_current();
        });

        if locks::lock(&state.watcher).is_none() {
            path_subscription.close();
            return Err(SourceError::Watch {
                message: "failed to install watch on initial properties path".to_string(),
            }
            .into());
        }

        Ok(Self {
            state,
            path_subscription,
        })
    }

    /// Names of all currently published properties.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.state.store.property_names()
    }
}

impl<M: PropertyMarshaller> PropertySource for FileSource<M> {
    fn create_subscription<T: SourceValue>(
        &self,
        name: &str,
        default: DefaultValue<T>,
    ) -> PropertyResult<SourceSubscription<T>> {
        self.state.store.create_subscription(name, default)
    }

    fn get_property_value(&self, name: &str) -> PropertyResult<Option<String>> {
        self.state.store.get_property_value(name)
    }

    fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.path_subscription.close();
        *locks::lock(&self.state.watcher) = None;
        self.state.store.close();
    }
}

/// Parses the flat properties format: one `key=value` (or `key: value`) per
/// line, `#` and `!` comments, blank lines ignored.
fn parse_properties_file(path: &Path) -> std::io::Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some(split) = line.find(|c| c == '=' || c == ':') else {
            continue;
        };
        let key = line[..split].trim();
        let value = line[split + 1..].trim();
        if !key.is_empty() {
            entries.insert(key.to_owned(), value.to_owned());
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_flat_properties_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.properties");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "! also a comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "name = foo").unwrap();
        writeln!(file, "port: 8080").unwrap();
        writeln!(file, "broken-line-no-separator").unwrap();
        drop(file);

        let entries = parse_properties_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["name"], "foo");
        assert_eq!(entries["port"], "8080");
    }

    #[test]
    fn initial_load_publishes_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.properties");
        std::fs::write(&path, "name=foo\n").unwrap();

        let source = FileSource::watching(&path).unwrap();
        assert_eq!(
            source.get_property_value("name").unwrap().as_deref(),
            Some("foo")
        );
        source.close();
    }

    #[test]
    fn missing_initial_file_still_watches_but_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.properties");

        // The parent directory exists, so the watch may or may not install
        // depending on the backend; if it does, the store starts empty.
        if let Ok(source) = FileSource::watching(&path) {
            assert!(source.property_names().is_empty());
            source.close();
        }
    }
}
