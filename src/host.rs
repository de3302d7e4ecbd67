//! Host facade
//!
//! The lifecycle boundary the surrounding player drives — `start`, `stop`,
//! and the per-buffer `apply` — plus the command queue a configuration UI
//! posts chain edits through. `stop` persists the chain and releases every
//! native resource; the first `start` restores the persisted chain.
//!
//! UI threads never mutate the chain directly: they post [`ChainCommand`]s
//! and the control path drains them under the chain lock. The real-time
//! `apply` path never touches the queue.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{self, Receiver, Sender};

use crate::catalog::{PluginCatalog, PluginInfo};
use crate::chain::Engine;
use crate::instance::{DescriptorLoader, LibraryLoader, PluginInstance};
use crate::state::{restore_chain, save_chain, ConfigStore};
use crate::types::{PluginError, PluginResult, SampleFormat};

/// A chain edit posted by the UI thread.
#[derive(Clone, Debug)]
pub enum ChainCommand {
    /// Load the catalog plugin with this unique id and append it.
    Add { unique_id: u64 },
    /// Remove the instance at `index`; no-op when out of range.
    Remove { index: usize },
    /// Move the instance at `from` to position `to`.
    Reorder { from: usize, to: usize },
    /// Write a control value (ordinal among the instance's control ports).
    SetControl { index: usize, port: usize, value: f32 },
}

/// The LADSPA host subsystem, as the player sees it.
pub struct LadspaHost {
    engine: Engine,
    loader: Arc<dyn DescriptorLoader>,
    catalog: Mutex<Option<PluginCatalog>>,
    commands_tx: Sender<ChainCommand>,
    commands_rx: Receiver<ChainCommand>,
    config_path: PathBuf,
    initialised: AtomicBool,
}

impl LadspaHost {
    /// Host backed by real plugin libraries, persisting to `config_path`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self::with_loader(config_path, Arc::new(LibraryLoader))
    }

    /// Host with a custom descriptor loader (tests use mock descriptors).
    pub fn with_loader(config_path: impl Into<PathBuf>, loader: Arc<dyn DescriptorLoader>) -> Self {
        let (commands_tx, commands_rx) = channel::unbounded();
        Self {
            engine: Engine::new(),
            loader,
            catalog: Mutex::new(None),
            commands_tx,
            commands_rx,
            config_path: config_path.into(),
            initialised: AtomicBool::new(false),
        }
    }

    /// Inject a pre-built catalog instead of scanning the search path.
    pub fn set_catalog(&self, catalog: PluginCatalog) {
        *self.catalog.lock().unwrap() = Some(catalog);
    }

    /// Throw the catalog away and scan again on next use.
    pub fn rescan(&self) {
        *self.catalog.lock().unwrap() = None;
    }

    fn with_catalog<R>(&self, f: impl FnOnce(&PluginCatalog) -> R) -> R {
        let mut guard = self.catalog.lock().unwrap();
        let catalog = guard.get_or_insert_with(PluginCatalog::scan);
        f(catalog)
    }

    /// Begin processing. The first start restores the persisted chain; later
    /// starts reboot the chain for the last known stream format.
    pub fn start(&self) {
        if !self.initialised.swap(true, Ordering::SeqCst) {
            self.restore();
        } else {
            self.engine.reboot();
        }
        self.engine.set_running(true);
    }

    /// Stop processing: persist the chain, then release every native engine.
    /// Instances stay in the chain so a later start can reboot them.
    pub fn stop(&self) {
        if !self.engine.is_running() {
            return;
        }
        self.engine.set_running(false);

        if let Err(e) = self.persist() {
            tracing::warn!("failed to save effect chain: {}", e);
        }
        self.engine.shutdown_all();
    }

    /// The per-buffer callback. Interleaved PCM is processed in place; the
    /// byte length never changes.
    pub fn apply(&self, data: &mut [u8], format: SampleFormat, rate: u32, channels: u32) {
        self.engine.apply(data, format, rate, channels);
    }

    /// Sender half of the command queue, for UI threads.
    pub fn sender(&self) -> Sender<ChainCommand> {
        self.commands_tx.clone()
    }

    pub fn post(&self, command: ChainCommand) {
        // the receiver lives as long as the host, so this cannot fail
        let _ = self.commands_tx.send(command);
    }

    /// Execute queued UI edits. Runs on the control path, never inside
    /// `apply`; failures degrade to log lines so one bad edit cannot take
    /// playback down.
    pub fn drain_commands(&self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                ChainCommand::Add { unique_id } => {
                    if let Err(e) = self.add_plugin(unique_id) {
                        tracing::warn!("could not add plugin {}: {}", unique_id, e);
                    }
                }
                ChainCommand::Remove { index } => {
                    self.engine.remove(index);
                }
                ChainCommand::Reorder { from, to } => self.engine.reorder(from, to),
                ChainCommand::SetControl { index, port, value } => {
                    self.engine.set_control(index, port, value);
                }
            }
        }
    }

    /// Load the catalog plugin with `unique_id` and append it to the chain.
    /// The chain is left unchanged when the library cannot be loaded or the
    /// plugin will not instantiate.
    pub fn add_plugin(&self, unique_id: u64) -> PluginResult<()> {
        let info = self
            .with_catalog(|catalog| catalog.find_by_unique_id(unique_id).cloned())
            .ok_or_else(|| PluginError::NotFound(format!("no plugin with id {}", unique_id)))?;
        let instance = PluginInstance::load(&info, self.loader.as_ref())?;
        self.engine.append(instance)
    }

    pub fn remove_plugin(&self, index: usize) -> bool {
        self.engine.remove(index)
    }

    pub fn reorder(&self, from: usize, to: usize) {
        self.engine.reorder(from, to);
    }

    pub fn set_control(&self, index: usize, port: usize, value: f32) -> bool {
        self.engine.set_control(index, port, value)
    }

    /// Read a control value back, e.g. for the UI's periodic poll of output
    /// control ports.
    pub fn control_value(&self, index: usize, port: usize) -> Option<f32> {
        self.engine.control_value(index, port)
    }

    /// Everything the catalog knows about, scanning lazily on first use.
    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.with_catalog(|catalog| catalog.plugins().to_vec())
    }

    /// Display names of the running chain, in processing order.
    pub fn running(&self) -> Vec<String> {
        self.engine.names()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn restore(&self) {
        let store = match ConfigStore::load(&self.config_path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("failed to read saved effect chain: {}", e);
                return;
            }
        };
        let instances =
            self.with_catalog(|catalog| restore_chain(&store, catalog, self.loader.as_ref()));
        for instance in instances {
            if let Err(e) = self.engine.append(instance) {
                tracing::warn!("could not restore instance: {}", e);
            }
        }
    }

    fn persist(&self) -> PluginResult<()> {
        let mut store = ConfigStore::load(&self.config_path).unwrap_or_default();
        self.engine.with_chain(|chain| save_chain(&mut store, chain));
        store.save(&self.config_path)
    }
}
