//! Plugin catalog
//!
//! Scans directories for LADSPA libraries and maintains the list of available
//! plugins. The search path comes from `LADSPA_PATH` (colon-separated); when
//! unset, two conventional system directories are tried. Files that are not
//! loadable plugin libraries are skipped quietly — in a scanned directory,
//! most files are not plugins.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ffi::{FfiDescriptor, LadspaLibrary, NativeDescriptor};

/// Environment variable holding the colon-separated plugin search path.
pub const PATH_VAR: &str = "LADSPA_PATH";

const FALLBACK_DIRS: [&str; 2] = ["/usr/lib/ladspa", "/usr/local/lib/ladspa"];

/// One available plugin, as discovered during a scan. `slot` is the plugin's
/// index within its library's descriptor table; `unique_id` is the
/// LADSPA-registry id used for persistence and lookup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub label: String,
    pub path: PathBuf,
    pub slot: usize,
    pub unique_id: u64,
    /// True when the plugin has at least two audio inputs and two audio
    /// outputs and can process a stereo stream with a single engine.
    pub stereo: bool,
}

impl PluginInfo {
    /// Build a catalog entry from a live descriptor.
    pub fn from_descriptor(api: &dyn NativeDescriptor, path: &Path, slot: usize) -> Self {
        let mut inputs = 0;
        let mut outputs = 0;
        for port in 0..api.port_count() {
            let flags = api.port_flags(port);
            if flags.is_audio() {
                if flags.is_input() {
                    inputs += 1;
                }
                if flags.is_output() {
                    outputs += 1;
                }
            }
        }

        PluginInfo {
            name: api.name().to_string(),
            label: api.label().to_string(),
            path: path.to_path_buf(),
            slot,
            unique_id: api.unique_id(),
            stereo: inputs >= 2 && outputs >= 2,
        }
    }
}

/// The set of plugins available on this system. Catalogs are small (tens to
/// low hundreds of entries), so lookups are linear scans.
#[derive(Clone, Debug, Default)]
pub struct PluginCatalog {
    plugins: Vec<PluginInfo>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the configured search path.
    pub fn scan() -> Self {
        let catalog = Self::scan_paths(&search_paths());
        tracing::info!("catalog holds {} LADSPA plugins", catalog.len());
        catalog
    }

    /// Scan an explicit list of directories, in order.
    pub fn scan_paths(paths: &[PathBuf]) -> Self {
        let mut catalog = Self::new();
        for path in paths {
            catalog.scan_directory(path);
        }
        catalog
    }

    fn scan_directory(&mut self, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let library = match LadspaLibrary::open(&path) {
                Ok(library) => library,
                Err(_) => {
                    tracing::debug!("skipping {}: not a LADSPA library", path.display());
                    continue;
                }
            };

            // Enumerate the descriptor table until it runs out. The library
            // is closed again when `library` drops; catalog entries carry
            // everything needed to reopen it later.
            let mut slot = 0;
            loop {
                match FfiDescriptor::from_library(&library, slot) {
                    Ok(Some(descriptor)) => {
                        self.add(PluginInfo::from_descriptor(&descriptor, &path, slot));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("skipping descriptor {} in {}: {}", slot, path.display(), e);
                    }
                }
                slot += 1;
            }
        }
    }

    pub fn add(&mut self, info: PluginInfo) {
        self.plugins.push(info);
    }

    pub fn find_by_unique_id(&self, id: u64) -> Option<&PluginInfo> {
        self.plugins.iter().find(|p| p.unique_id == id)
    }

    pub fn plugins(&self) -> &[PluginInfo] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Resolve the directories to scan from the environment.
pub fn search_paths() -> Vec<PathBuf> {
    search_paths_from(std::env::var(PATH_VAR).ok())
}

fn search_paths_from(var: Option<String>) -> Vec<PathBuf> {
    match var {
        Some(list) => list
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .collect(),
        None => FALLBACK_DIRS.iter().map(PathBuf::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_info(id: u64, name: &str) -> PluginInfo {
        PluginInfo {
            name: name.to_string(),
            label: name.to_lowercase(),
            path: PathBuf::from(format!("/usr/lib/ladspa/{}.so", name.to_lowercase())),
            slot: 0,
            unique_id: id,
            stereo: false,
        }
    }

    #[test]
    fn test_search_paths_from_env() {
        let paths = search_paths_from(Some("/a/plugins:/b/plugins".to_string()));
        assert_eq!(paths, vec![PathBuf::from("/a/plugins"), PathBuf::from("/b/plugins")]);

        // empty segments are dropped
        let paths = search_paths_from(Some(":/a::".to_string()));
        assert_eq!(paths, vec![PathBuf::from("/a")]);
    }

    #[test]
    fn test_search_paths_fallback() {
        let paths = search_paths_from(None);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], PathBuf::from("/usr/lib/ladspa"));
    }

    #[test]
    fn test_find_by_unique_id() {
        let mut catalog = PluginCatalog::new();
        catalog.add(make_info(1043, "Delay"));
        catalog.add(make_info(1075, "Amp"));

        assert!(catalog.find_by_unique_id(1043).is_some());
        assert_eq!(catalog.find_by_unique_id(1075).unwrap().name, "Amp");
        assert!(catalog.find_by_unique_id(9999).is_none());
    }

    #[test]
    fn test_scan_skips_non_plugins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), b"not a library").unwrap();
        std::fs::write(dir.path().join("noise.so"), b"\x7fELF but truncated").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let catalog = PluginCatalog::scan_paths(&[dir.path().to_path_buf()]);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_scan_missing_directory() {
        let catalog = PluginCatalog::scan_paths(&[PathBuf::from("/nonexistent/ladspa")]);
        assert!(catalog.is_empty());
    }
}
