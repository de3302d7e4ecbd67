//! LADSPA effect-chain host
//!
//! Discovers native LADSPA plugins on disk, loads them over the C ABI, and
//! runs an ordered, user-editable chain of them across every audio buffer
//! the host player hands us. The chain, its control values, and its order
//! persist across sessions.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ PluginCatalog │  scan LADSPA_PATH, enumerate descriptor tables
//! └───────┬───────┘
//!         ▼
//! ┌────────────────┐
//! │ PluginInstance │  load library, boot engines, own control values
//! └───────┬────────┘
//!         ▼
//! ┌────────────────┐
//! │  port router   │  wire ports to the left/right/trash scratch arena
//! └───────┬────────┘
//!         ▼
//! ┌────────────────┐
//! │     Engine     │  ordered chain under one mutex; per-buffer pump
//! └───────┬────────┘
//!         ▼
//! ┌────────────────┐
//! │   LadspaHost   │  start/stop/apply lifecycle, UI command queue,
//! └────────────────┘  state persistence
//! ```
//!
//! The audio path converts 16-bit PCM to floats, runs every instance under
//! the chain lock, and converts back with a hard clamp. Everything that can
//! fail — unsupported formats, oversized buffers, uninstalled plugins —
//! degrades to passing audio through untouched.

pub mod catalog;
pub mod chain;
pub mod ffi;
pub mod host;
pub mod instance;
pub mod mock;
pub mod ports;
pub mod state;
pub mod types;

pub use catalog::{PluginCatalog, PluginInfo};
pub use chain::Engine;
pub use host::{ChainCommand, LadspaHost};
pub use instance::{DescriptorLoader, LibraryLoader, PluginInstance};
pub use state::ConfigStore;
pub use types::{PluginError, PluginResult, SampleFormat, StreamFormat, MAX_KNOBS, MAX_SAMPLES};
