//! Plugin instance lifecycle
//!
//! A [`PluginInstance`] owns the native engine(s) for one chain slot: load
//! resolves the catalog entry back to a live descriptor, boot (re)creates the
//! engines for a stream format and wires their ports, shutdown releases them.
//! Dropping the instance releases the engines and, with them, the library.

use std::sync::Arc;

use crate::catalog::PluginInfo;
use crate::ffi::{FfiDescriptor, LadspaLibrary, NativeDescriptor, NativeHandle};
use crate::ports::{self, ScratchBuffers};
use crate::types::{PluginError, PluginResult, StreamFormat, MAX_KNOBS};

/// Resolves a catalog entry back to a live native descriptor.
///
/// The dlopen-backed [`LibraryLoader`] is the production implementation;
/// tests substitute mock descriptors through the same seam.
pub trait DescriptorLoader: Send + Sync {
    fn load(&self, info: &PluginInfo) -> PluginResult<Arc<dyn NativeDescriptor>>;
}

/// Loads descriptors by reopening the plugin's shared library. The library
/// may have been unloaded since the catalog scan, so the descriptor is
/// re-fetched at the recorded table slot.
pub struct LibraryLoader;

impl DescriptorLoader for LibraryLoader {
    fn load(&self, info: &PluginInfo) -> PluginResult<Arc<dyn NativeDescriptor>> {
        let library = LadspaLibrary::open(&info.path)?;
        let descriptor = FfiDescriptor::from_library(&library, info.slot)?.ok_or_else(|| {
            PluginError::LoadFailed(format!(
                "{} has no descriptor at index {}",
                info.path.display(),
                info.slot
            ))
        })?;
        tracing::info!("loaded {} from {}", descriptor.name(), info.path.display());
        Ok(Arc::new(descriptor))
    }
}

/// One active plugin in the chain.
pub struct PluginInstance {
    // Handles are declared (and so dropped) before the descriptor: native
    // cleanup must run while the library is still mapped.
    primary: Option<Box<dyn NativeHandle>>,
    secondary: Option<Box<dyn NativeHandle>>,
    knobs: Box<[f32; MAX_KNOBS]>,
    api: Arc<dyn NativeDescriptor>,
    info: PluginInfo,
    restored: bool,
}

impl PluginInstance {
    /// Build an instance around a live descriptor. Control values start at
    /// the plugin's range-hint defaults; restoring persisted state or UI
    /// edits overwrite them afterwards.
    pub fn new(info: PluginInfo, api: Arc<dyn NativeDescriptor>) -> Self {
        let mut instance = Self {
            primary: None,
            secondary: None,
            knobs: Box::new([0.0; MAX_KNOBS]),
            api,
            info,
            restored: false,
        };
        instance.apply_defaults(0);
        instance
    }

    /// Resolve `info` through `loader` and build an instance for it.
    pub fn load(info: &PluginInfo, loader: &dyn DescriptorLoader) -> PluginResult<Self> {
        Ok(Self::new(info.clone(), loader.load(info)?))
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        self.api.name()
    }

    pub fn label(&self) -> &str {
        self.api.label()
    }

    /// True when this instance was rebuilt from persisted state, so saved
    /// control values must not be overwritten with fresh defaults.
    pub fn restored(&self) -> bool {
        self.restored
    }

    pub fn mark_restored(&mut self) {
        self.restored = true;
    }

    /// Number of control values this instance persists: its control ports,
    /// capped at [`MAX_KNOBS`].
    pub fn control_port_count(&self) -> usize {
        let mut controls = 0;
        for port in 0..self.api.port_count() {
            if self.api.port_flags(port).is_control() {
                controls += 1;
            }
        }
        controls.min(MAX_KNOBS)
    }

    /// Read control value `index` (ordinal among control ports).
    pub fn knob(&self, index: usize) -> Option<f32> {
        if index < MAX_KNOBS {
            Some(self.knobs[index])
        } else {
            None
        }
    }

    /// Set control value `index`. Indices past the cap are inert and return
    /// false.
    pub fn set_knob(&mut self, index: usize, value: f32) -> bool {
        if index < MAX_KNOBS {
            self.knobs[index] = value;
            true
        } else {
            false
        }
    }

    pub fn is_booted(&self) -> bool {
        self.primary.is_some()
    }

    /// Number of live native engines (one, or two for a mono plugin
    /// duplicated over a stereo stream).
    pub fn handle_count(&self) -> usize {
        usize::from(self.primary.is_some()) + usize::from(self.secondary.is_some())
    }

    /// (Re)create the native engines for `format` and wire their ports.
    ///
    /// Any existing engines are released first; handles never survive a
    /// format change. A mono-only plugin on a multi-channel stream gets a
    /// second engine so each channel is processed independently.
    pub fn boot(&mut self, format: StreamFormat, buffers: &ScratchBuffers) -> PluginResult<()> {
        self.shutdown();

        let primary = self.api.instantiate(format.rate).ok_or_else(|| {
            PluginError::InitFailed(format!(
                "{} would not instantiate at {} Hz",
                self.api.name(),
                format.rate
            ))
        })?;
        self.primary = Some(primary);

        if format.channels > 1 && !self.info.stereo {
            match self.api.instantiate(format.rate) {
                Some(handle) => self.secondary = Some(handle),
                None => {
                    self.shutdown();
                    return Err(PluginError::InitFailed(format!(
                        "{} would not instantiate a second engine at {} Hz",
                        self.api.name(),
                        format.rate
                    )));
                }
            }
        }

        let api = self.api.clone();
        if let Some(primary) = self.primary.as_deref_mut() {
            ports::connect(
                api.as_ref(),
                self.info.stereo,
                primary,
                self.secondary.as_deref_mut(),
                &mut self.knobs,
                buffers,
            );
        }

        if let Some(handle) = self.primary.as_deref_mut() {
            handle.activate();
        }
        if let Some(handle) = self.secondary.as_deref_mut() {
            handle.activate();
        }

        Ok(())
    }

    /// Initialise control values from the plugin's range-hint defaults.
    /// A zero `sample_rate` lets rate-scaled hints fall back to 44100.
    fn apply_defaults(&mut self, sample_rate: u32) {
        let mut controls = 0;
        for port in 0..self.api.port_count() {
            if !self.api.port_flags(port).is_control() {
                continue;
            }
            if controls < MAX_KNOBS {
                self.knobs[controls] = self.api.port_default(port, sample_rate);
            }
            controls += 1;
        }
    }

    /// Release the native engines. Safe to call on an instance that has
    /// none.
    pub fn shutdown(&mut self) {
        if let Some(mut handle) = self.primary.take() {
            handle.deactivate();
            // drop runs native cleanup
        }
        if let Some(mut handle) = self.secondary.take() {
            handle.deactivate();
        }
    }

    /// Run every engine for `sample_count` samples per channel. Skips
    /// silently when the instance is not booted.
    pub fn run(&mut self, sample_count: usize) {
        // Safety: boot connected every audio port to an arena buffer of
        // MAX_SAMPLES samples, and callers cap sample_count at MAX_SAMPLES.
        unsafe {
            if let Some(handle) = self.primary.as_deref_mut() {
                handle.run(sample_count);
            }
            if let Some(handle) = self.secondary.as_deref_mut() {
                handle.run(sample_count);
            }
        }
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        self.shutdown();
    }
}
