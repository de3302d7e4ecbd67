//! Core types for the LADSPA host
//!
//! Defines the types shared across the host subsystem:
//! - Stream format description (sample encoding, rate, channel count)
//! - Error types
//! - Host-wide capacity constants

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scratch buffer capacity, in samples per channel.
pub const MAX_SAMPLES: usize = 8192;

/// Control values kept per plugin instance. Control ports beyond this cap are
/// wired to the trash sink and their values are not persisted.
pub const MAX_KNOBS: usize = 64;

/// Sample encodings the host player can hand us, matching its output format
/// enum. Only signed 16-bit in native byte order reaches the effect chain;
/// everything else passes through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    S8,
    U16Le,
    U16Be,
    U16Ne,
    S16Le,
    S16Be,
    S16Ne,
}

impl SampleFormat {
    /// True when samples are signed 16-bit integers in this machine's byte
    /// order, the only encoding the chain processes directly.
    pub fn is_native_s16(self) -> bool {
        match self {
            SampleFormat::S16Ne => true,
            #[cfg(target_endian = "little")]
            SampleFormat::S16Le => true,
            #[cfg(target_endian = "big")]
            SampleFormat::S16Be => true,
            _ => false,
        }
    }
}

/// One observed stream configuration. Replaced wholesale when the player's
/// output format changes; a change triggers a chain-wide reboot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u32,
}

/// Host error types
#[derive(Debug)]
pub enum PluginError {
    /// Plugin not found in the catalog
    NotFound(String),
    /// Failed to load a plugin library or resolve its descriptor
    LoadFailed(String),
    /// Native instantiation failed
    InitFailed(String),
    /// IO error
    IoError(std::io::Error),
    /// Serialization error
    SerdeError(String),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginError::NotFound(name) => write!(f, "Plugin not found: {}", name),
            PluginError::LoadFailed(msg) => write!(f, "Failed to load plugin: {}", msg),
            PluginError::InitFailed(msg) => write!(f, "Plugin instantiation failed: {}", msg),
            PluginError::IoError(e) => write!(f, "IO error: {}", e),
            PluginError::SerdeError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for PluginError {}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        PluginError::IoError(e)
    }
}

/// Result type for host operations
pub type PluginResult<T> = Result<T, PluginError>;
