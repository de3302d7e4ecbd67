//! Persisted chain state
//!
//! Which plugins are active, in what order, and their control values, stored
//! through a small sectioned key/value store and written to disk as JSON.
//!
//! Schema, one section per active instance in chain order:
//!
//! ```text
//! ladspa            plugins = <instance count>
//! ladspa_plugin<k>  id      = <unique id>
//!                   file    = <source library path>
//!                   label   = <descriptor label, informational>
//!                   ports   = <count of persisted control values>
//!                   port0..portN-1 = <control values>
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::catalog::PluginCatalog;
use crate::instance::{DescriptorLoader, PluginInstance};
use crate::types::{PluginError, PluginResult, MAX_KNOBS};

/// Section → key → value store backing the host's persisted settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigStore {
    sections: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file is an empty store, not an error.
    pub fn load(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| PluginError::SerdeError(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> PluginResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| PluginError::SerdeError(e.to_string()))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    fn set(&mut self, section: &str, key: &str, value: Value) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    pub fn set_int(&mut self, section: &str, key: &str, value: i64) {
        self.set(section, key, Value::from(value));
    }

    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.get(section, key).and_then(Value::as_i64)
    }

    pub fn set_float(&mut self, section: &str, key: &str, value: f64) {
        self.set(section, key, Value::from(value));
    }

    pub fn get_float(&self, section: &str, key: &str) -> Option<f64> {
        self.get(section, key).and_then(Value::as_f64)
    }

    pub fn set_str(&mut self, section: &str, key: &str, value: &str) {
        self.set(section, key, Value::from(value));
    }

    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).and_then(Value::as_str)
    }
}

fn section_name(index: usize) -> String {
    format!("ladspa_plugin{}", index)
}

/// Record the running chain into `store`, in processing order.
pub fn save_chain(store: &mut ConfigStore, chain: &[PluginInstance]) {
    for (k, instance) in chain.iter().enumerate() {
        let section = section_name(k);
        store.set_int(&section, "id", instance.info().unique_id as i64);
        store.set_str(&section, "file", &instance.info().path.to_string_lossy());
        store.set_str(&section, "label", instance.label());

        let ports = instance.control_port_count();
        for port in 0..ports {
            if let Some(value) = instance.knob(port) {
                store.set_float(&section, &format!("port{}", port), f64::from(value));
            }
        }
        store.set_int(&section, "ports", ports as i64);
    }
    store.set_int("ladspa", "plugins", chain.len() as i64);
}

/// Rebuild instances from `store`. A record whose id no longer resolves in
/// the catalog (plugin uninstalled) is skipped; the rest restore in their
/// original relative order.
pub fn restore_chain(
    store: &ConfigStore,
    catalog: &PluginCatalog,
    loader: &dyn DescriptorLoader,
) -> Vec<PluginInstance> {
    let count = store.get_int("ladspa", "plugins").unwrap_or(0).max(0) as usize;
    let mut instances = Vec::new();

    for k in 0..count {
        let section = section_name(k);
        let id = match store.get_int(&section, "id") {
            Some(id) => id as u64,
            None => continue,
        };
        let info = match catalog.find_by_unique_id(id) {
            Some(info) => info,
            None => {
                tracing::warn!("saved plugin {} is no longer installed, skipping", id);
                continue;
            }
        };
        let mut instance = match PluginInstance::load(info, loader) {
            Ok(instance) => instance,
            Err(e) => {
                tracing::warn!("could not restore {}: {}", info.name, e);
                continue;
            }
        };

        let ports = store
            .get_int(&section, "ports")
            .unwrap_or(0)
            .clamp(0, MAX_KNOBS as i64) as usize;
        for port in 0..ports {
            if let Some(value) = store.get_float(&section, &format!("port{}", port)) {
                instance.set_knob(port, value as f32);
            }
        }

        instance.mark_restored();
        instances.push(instance);
    }

    instances
}
