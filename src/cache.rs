//! Per-platform cache of resolved schemas and libraries.
//!
//! The cache is an explicit object handed to [`Catalog`]; nothing here is
//! process-global. Each key owns a `OnceCell`, so concurrent callers asking
//! for the same platform run one build between them and the rest wait for
//! its result. A failed build leaves the cell empty and the next call
//! retries.

use crate::build::{load_document_path, load_schema_path};
use crate::config::{LoadOptions, Settings};
use crate::error::{Result, XpjsonError};
use crate::node::Document;
use crate::schema::PlanSchema;
use crate::types::NodeKind;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A platform's resolved schema and, optionally, its library.
#[derive(Debug)]
pub struct PlatformBundle {
    pub schema: Arc<PlanSchema>,
    pub library: Option<Document>,
}

type Cell = Arc<OnceCell<Arc<PlatformBundle>>>;

#[derive(Debug, Default)]
pub struct SchemaCache {
    cells: Mutex<HashMap<String, Cell>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bundle for `key`, building it with `init` if needed.
    pub fn get_or_try_init<F>(&self, key: &str, init: F) -> Result<Arc<PlatformBundle>>
    where
        F: FnOnce() -> Result<PlatformBundle>,
    {
        // The map lock only guards the cell lookup; the build runs outside it.
        let cell = {
            let mut cells = self.cells.lock();
            cells.entry(key.to_string()).or_default().clone()
        };
        cell.get_or_try_init(|| init().map(Arc::new)).cloned()
    }

    pub fn get(&self, key: &str) -> Option<Arc<PlatformBundle>> {
        let cell = self.cells.lock().get(key).cloned()?;
        cell.get().cloned()
    }

    /// Drop the entry for `key`; the next lookup rebuilds it.
    pub fn invalidate(&self, key: &str) {
        self.cells.lock().remove(key);
    }

    /// Number of platforms with a built bundle.
    pub fn len(&self) -> usize {
        self.cells.lock().values().filter(|c| c.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Platform lookup backed by [`Settings`] and a shared [`SchemaCache`].
#[derive(Debug, Clone)]
pub struct Catalog {
    settings: Settings,
    cache: Arc<SchemaCache>,
}

impl Catalog {
    pub fn new(settings: Settings, cache: Arc<SchemaCache>) -> Self {
        Self { settings, cache }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn platform(&self, name: &str) -> Result<Arc<PlatformBundle>> {
        let config = self
            .settings
            .platform(name)
            .ok_or_else(|| XpjsonError::UnknownPlatform(name.to_string()))?;
        let opts = self.settings.load_options();

        self.cache.get_or_try_init(name, || {
            let schema = load_schema_path(&config.schema, &opts)?;
            let library = match &config.library {
                Some(path) => Some(load_library(path, schema.clone(), &opts)?),
                None => None,
            };
            info!(
                platform = name,
                schema = %config.schema.display(),
                library = library.is_some(),
                "loaded platform"
            );
            Ok(PlatformBundle { schema, library })
        })
    }

    pub fn schema(&self, name: &str) -> Result<Arc<PlanSchema>> {
        Ok(self.platform(name)?.schema.clone())
    }
}

fn load_library(
    path: &std::path::Path,
    schema: Arc<PlanSchema>,
    opts: &LoadOptions,
) -> Result<Document> {
    let doc = load_document_path(path, Some(schema), opts)?;
    if doc.kind() != NodeKind::PlanLibrary {
        return Err(XpjsonError::UnknownDocumentType(format!(
            "{} (expected PlanLibrary)",
            doc.kind()
        )));
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn bundle() -> PlatformBundle {
        let schema = PlanSchema::from_raw(&serde_json::json!({"type": "PlanSchema", "xpjson": "0.2"})).unwrap();
        PlatformBundle {
            schema: Arc::new(schema),
            library: None,
        }
    }

    #[test]
    fn concurrent_callers_share_one_build() {
        let cache = SchemaCache::new();
        let builds = AtomicUsize::new(0);

        let results: Vec<Arc<PlatformBundle>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        cache
                            .get_or_try_init("rover", || {
                                builds.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                Ok(bundle())
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_build_is_retried() {
        let cache = SchemaCache::new();
        let err = cache
            .get_or_try_init("rover", || Err(XpjsonError::UnknownPlatform("rover".into())))
            .unwrap_err();
        assert!(matches!(err, XpjsonError::UnknownPlatform(_)));
        assert!(cache.get("rover").is_none());

        cache.get_or_try_init("rover", || Ok(bundle())).unwrap();
        assert!(cache.get("rover").is_some());

        cache.invalidate("rover");
        assert!(cache.is_empty());
    }

    #[test]
    fn catalog_loads_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("schema.json"),
            r#"{"type": "PlanSchema", "xpjson": "0.2", "id": "rover-schema",
                "commandSpecs": [{"type": "CommandSpec", "id": "Drive"}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("library.json"),
            r#"{"type": "PlanLibrary", "xpjson": "0.2", "commands": [{"type": "Drive", "id": "d"}]}"#,
        )
        .unwrap();
        let settings_path = dir.path().join("xpjson.json");
        fs::write(
            &settings_path,
            r#"{"platforms": {"rover": {"schema": "schema.json", "library": "library.json"}}}"#,
        )
        .unwrap();

        let catalog = Catalog::new(Settings::from_path(&settings_path).unwrap(), Arc::new(SchemaCache::new()));
        let bundle = catalog.platform("rover").unwrap();
        assert_eq!(bundle.schema.id.as_deref(), Some("rover-schema"));
        let library = bundle.library.as_ref().unwrap();
        assert_eq!(library.root.nodes("commands").count(), 1);

        // second lookup is served from the cache
        let again = catalog.platform("rover").unwrap();
        assert!(Arc::ptr_eq(&bundle, &again));

        assert!(matches!(catalog.platform("drone"), Err(XpjsonError::UnknownPlatform(_))));
    }
}
