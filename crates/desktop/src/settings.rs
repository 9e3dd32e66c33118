//! Shop branding and UI labels, passed explicitly to whatever renders them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::OfflineResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSettings {
    pub shop_name: String,
    /// UI label overrides, keyed by label id.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for ShopSettings {
    fn default() -> Self {
        let labels = [
            ("work_orders", "Munkalapok"),
            ("inventory", "Raktár"),
            ("clients", "Ügyfelek"),
            ("dashboard", "Áttekintés"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            shop_name: "Turbó Szerviz".to_string(),
            labels,
        }
    }
}

impl ShopSettings {
    /// Label for `key`, or the key itself when none is configured.
    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.labels.get(key).map(String::as_str).unwrap_or(key)
    }
}

/// Persistence port for [`ShopSettings`].
pub trait SettingsStore: Send + Sync {
    /// Saved settings, or the defaults when nothing was saved yet.
    fn load(&self) -> OfflineResult<ShopSettings>;

    fn save(&self, settings: &ShopSettings) -> OfflineResult<()>;
}

/// Settings kept as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn load(&self) -> OfflineResult<ShopSettings> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ShopSettings::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, settings: &ShopSettings) -> OfflineResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(settings)?)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: RwLock<Option<ShopSettings>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn load(&self) -> OfflineResult<ShopSettings> {
        let guard = self
            .settings
            .read()
            .map_err(|_| crate::error::OfflineError::corrupt("settings lock poisoned"))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, settings: &ShopSettings) -> OfflineResult<()> {
        let mut guard = self
            .settings
            .write()
            .map_err(|_| crate::error::OfflineError::corrupt("settings lock poisoned"))?;
        *guard = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults_and_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettingsStore::new(dir.path().join("nested").join("settings.json"));
        assert_eq!(store.load().unwrap(), ShopSettings::default());

        let mut settings = ShopSettings::default();
        settings.shop_name = "Turbo Garage Kft.".into();
        settings.labels.insert("inventory".into(), "Stock".into());
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.shop_name, "Turbo Garage Kft.");
        assert_eq!(loaded.label("inventory"), "Stock");
        assert_eq!(loaded.label("unknown_label"), "unknown_label");
    }

    #[test]
    fn in_memory_store_keeps_the_last_save() {
        let store = InMemorySettingsStore::new();
        let mut settings = store.load().unwrap();
        settings.shop_name = "X".into();
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap().shop_name, "X");
    }
}
