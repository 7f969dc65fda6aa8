//! Engine options and the platform settings file.
//!
//! Settings file shape:
//! {
//!   "platforms": {
//!     "rover": { "schema": "schemas/rover.json", "library": "libraries/rover.json" }
//!   },
//!   "warnUnknownFields": true
//! }
//!
//! Relative paths are resolved against the settings file's directory.

use crate::error::{Result, XpjsonError};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Options for a single `build` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Write resolved defaults into the emitted document.
    pub fill_defaults: bool,
    /// Log and collect unknown-field diagnostics.
    pub warn_unknown_fields: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            fill_defaults: false,
            warn_unknown_fields: true,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_defaults(mut self, yes: bool) -> Self {
        self.fill_defaults = yes;
        self
    }

    pub fn warn_unknown_fields(mut self, yes: bool) -> Self {
        self.warn_unknown_fields = yes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformConfig {
    pub schema: PathBuf,
    #[serde(default)]
    pub library: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
    #[serde(default = "default_warn")]
    pub warn_unknown_fields: bool,
}

fn default_warn() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platforms: BTreeMap::new(),
            warn_unknown_fields: true,
        }
    }
}

impl Settings {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| XpjsonError::io(path, e))?;
        let mut settings: Settings = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            settings.rebase(base);
        }
        Ok(settings)
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms.get(name)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::new().warn_unknown_fields(self.warn_unknown_fields)
    }

    fn rebase(&mut self, base: &Path) {
        for platform in self.platforms.values_mut() {
            if platform.schema.is_relative() {
                platform.schema = base.join(&platform.schema);
            }
            if let Some(library) = platform.library.as_mut() {
                if library.is_relative() {
                    *library = base.join(&*library);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_options_builder() {
        let opts = LoadOptions::new().fill_defaults(true).warn_unknown_fields(false);
        assert!(opts.fill_defaults);
        assert!(!opts.warn_unknown_fields);
        assert!(LoadOptions::default().warn_unknown_fields);
    }

    #[test]
    fn settings_paths_are_rebased() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xpjson.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"platforms": {{"rover": {{"schema": "rover.json", "library": "/abs/lib.json"}}}},
                "warnUnknownFields": false}}"#
        )
        .unwrap();

        let settings = Settings::from_path(&path).unwrap();
        let rover = settings.platform("rover").unwrap();
        assert_eq!(rover.schema, dir.path().join("rover.json"));
        assert_eq!(rover.library.as_deref(), Some(Path::new("/abs/lib.json")));
        assert!(!settings.load_options().warn_unknown_fields);
    }

    #[test]
    fn missing_settings_file_is_io_error() {
        let err = Settings::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, XpjsonError::Io { .. }));
    }
}
