//! Configuration store mapping objects to their render configs and icon paths.
//!
//! The store is plain data: the pipeline only reads configs from it, and the
//! caller decides where and when to persist it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::error::{IconError, Result};

/// Where one object's icons live and which named config renders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconEntry {
    pub object: String,
    /// Name of the config in the store. `None` uses the default config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<PathBuf>,
}

impl IconEntry {
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            config: None,
            icon_path: None,
            mask_path: None,
        }
    }

    pub fn with_config(mut self, name: impl Into<String>) -> Self {
        self.config = Some(name.into());
        self
    }
}

/// Named render configs plus per-object entries.
///
/// Entries registered ahead of time are searched before entries added at
/// runtime through [`ConfigStore::entry_or_insert`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigStore {
    icons_path: PathBuf,
    default_config: Option<String>,
    configs: BTreeMap<String, RenderConfig>,
    entries: Vec<IconEntry>,
    runtime_entries: Vec<IconEntry>,
}

impl ConfigStore {
    /// Creates an empty store writing icons under `icons_path`.
    pub fn new(icons_path: impl Into<PathBuf>) -> Self {
        Self {
            icons_path: icons_path.into(),
            ..Self::default()
        }
    }

    pub fn icons_path(&self) -> &Path {
        &self.icons_path
    }

    /// Adds or replaces a named config.
    pub fn insert_config(&mut self, name: impl Into<String>, config: RenderConfig) {
        self.configs.insert(name.into(), config);
    }

    /// Builder form of [`insert_config`](Self::insert_config).
    pub fn with_config(mut self, name: impl Into<String>, config: RenderConfig) -> Self {
        self.insert_config(name, config);
        self
    }

    /// Selects the named config used when an object has none of its own.
    pub fn set_default_config(&mut self, name: Option<String>) {
        self.default_config = name;
    }

    pub fn with_default_config(mut self, name: impl Into<String>) -> Self {
        self.default_config = Some(name.into());
        self
    }

    pub fn config(&self, name: &str) -> Option<&RenderConfig> {
        self.configs.get(name)
    }

    pub fn config_mut(&mut self, name: &str) -> Option<&mut RenderConfig> {
        self.configs.get_mut(name)
    }

    /// The default config, if one is selected and present.
    pub fn default_config(&self) -> Option<&RenderConfig> {
        self.default_config.as_deref().and_then(|name| self.configs.get(name))
    }

    /// Registers an entry ahead of time.
    pub fn add_entry(&mut self, entry: IconEntry) {
        self.entries.push(entry);
    }

    /// Looks up an object's entry, registered entries first.
    pub fn entry(&self, object: &str) -> Option<&IconEntry> {
        self.entries
            .iter()
            .chain(self.runtime_entries.iter())
            .find(|e| e.object == object)
    }

    /// Returns the object's entry, adding a runtime entry on the default
    /// config if there is none.
    pub fn entry_or_insert(&mut self, object: &str) -> &mut IconEntry {
        if let Some(i) = self.entries.iter().position(|e| e.object == object) {
            return &mut self.entries[i];
        }
        let i = match self.runtime_entries.iter().position(|e| e.object == object) {
            Some(i) => i,
            None => {
                let mut entry = IconEntry::new(object);
                entry.config = self.default_config.clone();
                self.runtime_entries.push(entry);
                self.runtime_entries.len() - 1
            }
        };
        &mut self.runtime_entries[i]
    }

    pub fn entries(&self) -> impl Iterator<Item = &IconEntry> {
        self.entries.iter().chain(self.runtime_entries.iter())
    }

    /// Resolves the config for an object: its own named config, then the
    /// default config, otherwise [`IconError::ConfigurationMissing`].
    pub fn config_for(&self, object: &str) -> Result<&RenderConfig> {
        let named = self.entry(object).and_then(|e| e.config.as_deref());
        if let Some(name) = named {
            if let Some(config) = self.configs.get(name) {
                return Ok(config);
            }
            warn!("config `{name}` for `{object}` not found, using default");
        }
        self.default_config().ok_or_else(|| IconError::ConfigurationMissing {
            object: object.to_string(),
        })
    }

    /// Icon output path for an object, from its entry or the icons directory.
    pub fn icon_path(&self, object: &str) -> PathBuf {
        self.entry(object)
            .and_then(|e| e.icon_path.clone())
            .unwrap_or_else(|| self.icons_path.join(format!("{object}.png")))
    }

    /// Mask output path for an object, from its entry or the icons directory.
    pub fn mask_path(&self, object: &str) -> PathBuf {
        self.entry(object)
            .and_then(|e| e.mask_path.clone())
            .unwrap_or_else(|| self.icons_path.join(format!("{object}_mask.png")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        let mut close_up = RenderConfig::default();
        close_up.set_padding(0.05);
        ConfigStore::new("icons")
            .with_config("default", RenderConfig::default())
            .with_config("closeUp", close_up)
            .with_default_config("default")
    }

    #[test]
    fn object_config_wins_over_default() {
        let mut store = store();
        store.add_entry(IconEntry::new("tower").with_config("closeUp"));
        assert_eq!(store.config_for("tower").unwrap().padding(), 0.05);
        assert_eq!(store.config_for("wall").unwrap().padding(), 0.0);
    }

    #[test]
    fn dangling_config_name_falls_back_to_default() {
        let mut store = store();
        store.add_entry(IconEntry::new("tower").with_config("gone"));
        assert_eq!(store.config_for("tower").unwrap(), store.config("default").unwrap());
    }

    #[test]
    fn no_default_is_configuration_missing() {
        let store = ConfigStore::new("icons");
        let err = store.config_for("tower").unwrap_err();
        assert!(matches!(err, IconError::ConfigurationMissing { ref object } if object == "tower"));
    }

    #[test]
    fn registered_entries_shadow_runtime_entries() {
        let mut store = store();
        store.entry_or_insert("tower").config = Some("closeUp".into());
        assert_eq!(store.entry("tower").unwrap().config.as_deref(), Some("closeUp"));

        store.add_entry(IconEntry::new("tower"));
        assert_eq!(store.entry("tower").unwrap().config, None);
        assert_eq!(store.entries().count(), 2);
    }

    #[test]
    fn entry_or_insert_uses_default_config_once() {
        let mut store = store();
        assert_eq!(store.entry_or_insert("gate").config.as_deref(), Some("default"));
        store.entry_or_insert("gate");
        assert_eq!(store.entries().count(), 1);
    }

    #[test]
    fn paths_default_to_icons_directory() {
        let mut store = store();
        assert_eq!(store.icon_path("gate"), PathBuf::from("icons/gate.png"));
        assert_eq!(store.mask_path("gate"), PathBuf::from("icons/gate_mask.png"));
        store.entry_or_insert("gate").icon_path = Some("ui/gate.png".into());
        assert_eq!(store.icon_path("gate"), PathBuf::from("ui/gate.png"));
    }

    #[test]
    fn store_json_roundtrip() {
        let mut store = store();
        store.add_entry(IconEntry::new("tower").with_config("closeUp"));
        let json = store.to_json_pretty().unwrap();
        assert!(json.contains("\"defaultConfig\""));
        assert!(json.contains("\"runtimeEntries\""));

        let restored = ConfigStore::from_json(&json).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn stored_configs_are_clamped_on_load() {
        use crate::composite::fit_transform;
        use crate::icon::BoundingBox;
        use crate::math::Vec2;

        let json = r#"{
            "defaultConfig": "default",
            "configs": { "default": { "padding": -0.8, "ssaa": 0 } }
        }"#;
        let store = ConfigStore::from_json(json).unwrap();
        let config = store.config_for("tower").unwrap();
        assert_eq!(config.padding(), 0.0);
        assert_eq!(config.ssaa(), 1);

        let fit = fit_transform(&BoundingBox::new(30, 30, 70, 70), 100, config.padding(), Vec2::zeros());
        assert!(fit.scale > 0.0);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = ConfigStore::from_json("{ not json").unwrap_err();
        assert!(matches!(err, IconError::Serialization(_)));
    }
}
