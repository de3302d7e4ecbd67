//! LADSPA binary ABI
//!
//! The C boundary every native plugin implements: a shared library exporting
//! `ladspa_descriptor(index)`, returning fixed-layout descriptor structs until
//! the index runs past the end of the table. This module owns the raw layout,
//! a safe wrapper around the library handle, and the two traits
//! ([`NativeDescriptor`], [`NativeHandle`]) the rest of the host programs
//! against — tests substitute in-process implementations at the same seam.

use std::ffi::{c_char, c_ulong, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{PluginError, PluginResult};

/// Audio sample type used across the ABI.
pub type LadspaData = f32;

/// Opaque per-instance state owned by the native plugin.
pub type LadspaHandle = *mut c_void;

/// Entry point every plugin library exports.
pub type DescriptorFn = unsafe extern "C" fn(c_ulong) -> *const LadspaDescriptor;

pub const DESCRIPTOR_SYMBOL: &[u8] = b"ladspa_descriptor";

/// Per-port classification bits: control vs. audio and input vs. output are
/// independent axes, both always present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortFlags(pub i32);

impl PortFlags {
    pub const INPUT: i32 = 0x1;
    pub const OUTPUT: i32 = 0x2;
    pub const CONTROL: i32 = 0x4;
    pub const AUDIO: i32 = 0x8;

    pub fn is_input(self) -> bool {
        self.0 & Self::INPUT != 0
    }

    pub fn is_output(self) -> bool {
        self.0 & Self::OUTPUT != 0
    }

    pub fn is_control(self) -> bool {
        self.0 & Self::CONTROL != 0
    }

    pub fn is_audio(self) -> bool {
        self.0 & Self::AUDIO != 0
    }

    pub fn control_input() -> Self {
        PortFlags(Self::CONTROL | Self::INPUT)
    }

    pub fn control_output() -> Self {
        PortFlags(Self::CONTROL | Self::OUTPUT)
    }

    pub fn audio_input() -> Self {
        PortFlags(Self::AUDIO | Self::INPUT)
    }

    pub fn audio_output() -> Self {
        PortFlags(Self::AUDIO | Self::OUTPUT)
    }
}

// Range hint bits.
pub const HINT_BOUNDED_BELOW: i32 = 0x1;
pub const HINT_BOUNDED_ABOVE: i32 = 0x2;
pub const HINT_TOGGLED: i32 = 0x4;
pub const HINT_SAMPLE_RATE: i32 = 0x8;
pub const HINT_LOGARITHMIC: i32 = 0x10;
pub const HINT_INTEGER: i32 = 0x20;
pub const HINT_DEFAULT_MASK: i32 = 0x3C0;
pub const HINT_DEFAULT_MINIMUM: i32 = 0x40;
pub const HINT_DEFAULT_LOW: i32 = 0x80;
pub const HINT_DEFAULT_MIDDLE: i32 = 0xC0;
pub const HINT_DEFAULT_HIGH: i32 = 0x100;
pub const HINT_DEFAULT_MAXIMUM: i32 = 0x140;
pub const HINT_DEFAULT_0: i32 = 0x200;
pub const HINT_DEFAULT_1: i32 = 0x240;
pub const HINT_DEFAULT_100: i32 = 0x280;
pub const HINT_DEFAULT_440: i32 = 0x2C0;

/// Per-port bounds and default hints, as laid out in the plugin binary.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PortRangeHint {
    pub hint: i32,
    pub lower_bound: LadspaData,
    pub upper_bound: LadspaData,
}

/// The fixed-layout descriptor struct a plugin library hands back, one per
/// table index. Function pointers are `Option` so a NULL in the table reads
/// as `None` instead of undefined behavior.
#[repr(C)]
pub struct LadspaDescriptor {
    pub unique_id: c_ulong,
    pub label: *const c_char,
    pub properties: i32,
    pub name: *const c_char,
    pub maker: *const c_char,
    pub copyright: *const c_char,
    pub port_count: c_ulong,
    pub port_descriptors: *const i32,
    pub port_names: *const *const c_char,
    pub port_range_hints: *const PortRangeHint,
    pub implementation_data: *mut c_void,
    pub instantiate:
        Option<unsafe extern "C" fn(*const LadspaDescriptor, c_ulong) -> LadspaHandle>,
    pub connect_port: Option<unsafe extern "C" fn(LadspaHandle, c_ulong, *mut LadspaData)>,
    pub activate: Option<unsafe extern "C" fn(LadspaHandle)>,
    pub run: Option<unsafe extern "C" fn(LadspaHandle, c_ulong)>,
    pub run_adding: Option<unsafe extern "C" fn(LadspaHandle, c_ulong)>,
    pub set_run_adding_gain: Option<unsafe extern "C" fn(LadspaHandle, LadspaData)>,
    pub deactivate: Option<unsafe extern "C" fn(LadspaHandle)>,
    pub cleanup: Option<unsafe extern "C" fn(LadspaHandle)>,
}

/// Default value for a port derived from its range hints.
///
/// Bounds scale by the sample rate when the SAMPLE_RATE hint is set (44100
/// stands in when the rate is not yet known); unbounded sides fall back to
/// ±10000. Without an explicit default: integer ports take the lower bound,
/// ranges spanning zero take zero, everything else the midpoint.
pub fn default_for_hint(hint: &PortRangeHint, sample_rate: u32) -> f32 {
    let fact = if hint.hint & HINT_SAMPLE_RATE != 0 {
        if sample_rate > 0 {
            sample_rate as f32
        } else {
            44100.0
        }
    } else {
        1.0
    };

    let min = if hint.hint & HINT_BOUNDED_BELOW != 0 {
        hint.lower_bound * fact
    } else {
        -10000.0
    };
    let max = if hint.hint & HINT_BOUNDED_ABOVE != 0 {
        hint.upper_bound * fact
    } else {
        10000.0
    };

    match hint.hint & HINT_DEFAULT_MASK {
        HINT_DEFAULT_MINIMUM => min,
        HINT_DEFAULT_LOW => min * 0.75 + max * 0.25,
        HINT_DEFAULT_MIDDLE => min * 0.5 + max * 0.5,
        HINT_DEFAULT_HIGH => min * 0.25 + max * 0.75,
        HINT_DEFAULT_MAXIMUM => max,
        HINT_DEFAULT_0 => 0.0,
        HINT_DEFAULT_1 => 1.0,
        HINT_DEFAULT_100 => 100.0,
        HINT_DEFAULT_440 => 440.0,
        _ => {
            if hint.hint & HINT_INTEGER != 0 {
                min
            } else if min <= 0.0 && max >= 0.0 {
                0.0
            } else {
                min * 0.5 + max * 0.5
            }
        }
    }
}

/// What a loaded plugin descriptor exposes to the host: identity, port
/// layout, defaults, and instantiation. Implemented by [`FfiDescriptor`] for
/// real libraries and by the mock module for tests.
pub trait NativeDescriptor: Send + Sync {
    fn unique_id(&self) -> u64;
    fn label(&self) -> &str;
    fn name(&self) -> &str;
    fn port_count(&self) -> usize;
    fn port_flags(&self, port: usize) -> PortFlags;
    fn port_name(&self, port: usize) -> &str;
    /// Default control value for `port`, derived from its range hints.
    fn port_default(&self, port: usize, sample_rate: u32) -> f32;
    /// Create one engine at `sample_rate`. `None` when the plugin refuses.
    fn instantiate(&self, sample_rate: u32) -> Option<Box<dyn NativeHandle>>;
}

/// One live engine created by [`NativeDescriptor::instantiate`]. Native
/// cleanup runs on drop.
pub trait NativeHandle: Send {
    /// # Safety
    ///
    /// `data` must stay valid, at a stable address, until the handle is
    /// dropped or the port is reconnected.
    unsafe fn connect_port(&mut self, port: usize, data: *mut f32);

    /// No-op when the plugin has no activation hook.
    fn activate(&mut self);

    /// # Safety
    ///
    /// Every audio port must be connected to a buffer holding at least
    /// `sample_count` samples.
    unsafe fn run(&mut self, sample_count: usize);

    /// No-op when the plugin has no deactivation hook.
    fn deactivate(&mut self);
}

/// An open plugin library with its entry point resolved. Descriptors and
/// handles keep an `Arc` to this, so the library stays mapped for as long as
/// anything still points into it.
pub struct LadspaLibrary {
    entry: DescriptorFn,
    path: PathBuf,
    _lib: libloading::Library,
}

impl LadspaLibrary {
    /// Open `path` as a plugin library and resolve `ladspa_descriptor`.
    /// Fails for anything that is not a loadable library exporting the entry
    /// point — which in a scanned directory is most files, so callers treat
    /// this as a skip, not an error to report.
    pub fn open(path: &Path) -> PluginResult<Arc<Self>> {
        // Safety: loading a foreign library runs its initializers. That is
        // the entire point of a plugin host; nothing can be checked beyond
        // what the loader itself verifies.
        let lib = unsafe { libloading::Library::new(path) }
            .map_err(|e| PluginError::LoadFailed(format!("{}: {}", path.display(), e)))?;

        let entry: DescriptorFn = unsafe {
            *lib.get::<DescriptorFn>(DESCRIPTOR_SYMBOL).map_err(|e| {
                PluginError::LoadFailed(format!("{}: {}", path.display(), e))
            })?
        };

        Ok(Arc::new(Self {
            entry,
            path: path.to_path_buf(),
            _lib: lib,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw descriptor at `index`; `None` past the end of the table.
    fn raw_descriptor(&self, index: usize) -> Option<*const LadspaDescriptor> {
        // Safety: the entry point was resolved from this library and the
        // library is still mapped.
        let raw = unsafe { (self.entry)(index as c_ulong) };
        if raw.is_null() {
            None
        } else {
            Some(raw)
        }
    }
}

fn cstr_owned(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        // Safety: the plugin promises a NUL-terminated string for the
        // lifetime of the library, which the caller keeps mapped.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

/// A validated descriptor from a real plugin library. Strings and port
/// metadata are copied out eagerly; only instantiation and the per-handle
/// calls go back through the raw table.
pub struct FfiDescriptor {
    library: Arc<LadspaLibrary>,
    raw: *const LadspaDescriptor,
    unique_id: u64,
    label: String,
    name: String,
    flags: Vec<PortFlags>,
    names: Vec<String>,
    hints: Vec<PortRangeHint>,
}

// Safety: the descriptor table is static const data inside the library, which
// the Arc keeps mapped; the copied metadata is plain owned data.
unsafe impl Send for FfiDescriptor {}
unsafe impl Sync for FfiDescriptor {}

impl FfiDescriptor {
    /// Fetch and validate descriptor `index` from `library`. `Ok(None)` means
    /// the table ended; `Err` means the descriptor is malformed (a mandatory
    /// function pointer is NULL) and must not be used.
    pub fn from_library(
        library: &Arc<LadspaLibrary>,
        index: usize,
    ) -> PluginResult<Option<FfiDescriptor>> {
        let raw = match library.raw_descriptor(index) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        // Safety: non-NULL descriptor from the entry point; the library
        // guarantees it points at a complete LadspaDescriptor.
        let desc = unsafe { &*raw };

        if desc.instantiate.is_none()
            || desc.connect_port.is_none()
            || desc.run.is_none()
            || desc.cleanup.is_none()
        {
            return Err(PluginError::LoadFailed(format!(
                "{} descriptor {} is missing mandatory entry points",
                library.path().display(),
                index
            )));
        }

        let port_count = desc.port_count as usize;
        let mut flags = Vec::with_capacity(port_count);
        let mut names = Vec::with_capacity(port_count);
        let mut hints = Vec::with_capacity(port_count);
        for port in 0..port_count {
            // Safety: the three per-port arrays are valid for port_count
            // entries per the ABI.
            unsafe {
                flags.push(PortFlags(*desc.port_descriptors.add(port)));
                names.push(cstr_owned(*desc.port_names.add(port)));
                hints.push(*desc.port_range_hints.add(port));
            }
        }

        Ok(Some(FfiDescriptor {
            library: library.clone(),
            raw,
            unique_id: desc.unique_id as u64,
            label: cstr_owned(desc.label),
            name: cstr_owned(desc.name),
            flags,
            names,
            hints,
        }))
    }
}

impl NativeDescriptor for FfiDescriptor {
    fn unique_id(&self) -> u64 {
        self.unique_id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn port_count(&self) -> usize {
        self.flags.len()
    }

    fn port_flags(&self, port: usize) -> PortFlags {
        self.flags.get(port).copied().unwrap_or_default()
    }

    fn port_name(&self, port: usize) -> &str {
        self.names.get(port).map(String::as_str).unwrap_or("")
    }

    fn port_default(&self, port: usize, sample_rate: u32) -> f32 {
        self.hints
            .get(port)
            .map(|hint| default_for_hint(hint, sample_rate))
            .unwrap_or(0.0)
    }

    fn instantiate(&self, sample_rate: u32) -> Option<Box<dyn NativeHandle>> {
        // Safety: validated non-NULL at construction; descriptor and library
        // are still alive.
        let instantiate = unsafe { (*self.raw).instantiate }?;
        let handle = unsafe { instantiate(self.raw, sample_rate as c_ulong) };
        if handle.is_null() {
            return None;
        }
        Some(Box::new(FfiHandle {
            handle,
            raw: self.raw,
            _library: self.library.clone(),
        }))
    }
}

/// Owns one native engine. All calls funnel through the descriptor's
/// function-pointer table; `cleanup` runs on drop.
struct FfiHandle {
    handle: LadspaHandle,
    raw: *const LadspaDescriptor,
    _library: Arc<LadspaLibrary>,
}

// Safety: a handle is used from one thread at a time (the chain mutex
// serializes it); LADSPA requires instances to tolerate being run from a
// different thread than the one that created them.
unsafe impl Send for FfiHandle {}

impl NativeHandle for FfiHandle {
    unsafe fn connect_port(&mut self, port: usize, data: *mut f32) {
        if let Some(connect) = (*self.raw).connect_port {
            connect(self.handle, port as c_ulong, data);
        }
    }

    fn activate(&mut self) {
        // Safety: descriptor outlives the handle via _library.
        unsafe {
            if let Some(activate) = (*self.raw).activate {
                activate(self.handle);
            }
        }
    }

    unsafe fn run(&mut self, sample_count: usize) {
        if let Some(run) = (*self.raw).run {
            run(self.handle, sample_count as c_ulong);
        }
    }

    fn deactivate(&mut self) {
        // Safety: as for activate.
        unsafe {
            if let Some(deactivate) = (*self.raw).deactivate {
                deactivate(self.handle);
            }
        }
    }
}

impl Drop for FfiHandle {
    fn drop(&mut self) {
        // Safety: cleanup was validated present; the handle is dropped
        // exactly once.
        unsafe {
            if let Some(cleanup) = (*self.raw).cleanup {
                cleanup(self.handle);
            }
        }
    }
}
