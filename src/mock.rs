//! Mock plugins for testing
//!
//! Deterministic in-process implementations of the native-plugin traits, so
//! chain behaviour can be exercised without shared libraries on disk. A mock
//! engine copies each audio input to the matching audio output, scaled by the
//! value of its first control input (or unity when it has none) — enough to
//! observe routing, duplication, clamping, and lifecycle behaviour.

use std::path::PathBuf;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::catalog::PluginInfo;
use crate::ffi::{NativeDescriptor, NativeHandle, PortFlags};
use crate::instance::DescriptorLoader;
use crate::types::{PluginError, PluginResult};

/// One mock port: ABI flags plus the default reported through range hints.
#[derive(Clone, Debug)]
pub struct MockPort {
    pub flags: PortFlags,
    pub default: f32,
    pub name: String,
}

impl MockPort {
    pub fn new(flags: PortFlags, name: &str) -> Self {
        Self {
            flags,
            default: 0.0,
            name: name.to_string(),
        }
    }

    pub fn with_default(flags: PortFlags, name: &str, default: f32) -> Self {
        Self {
            flags,
            default,
            name: name.to_string(),
        }
    }
}

#[derive(Default)]
struct Counters {
    instantiated: AtomicUsize,
    live: AtomicUsize,
    active: AtomicIsize,
}

/// A scriptable plugin descriptor with lifecycle counters.
pub struct MockDescriptor {
    unique_id: u64,
    label: String,
    name: String,
    ports: Vec<MockPort>,
    counters: Arc<Counters>,
}

impl MockDescriptor {
    pub fn with_ports(unique_id: u64, label: &str, ports: Vec<MockPort>) -> Self {
        Self {
            unique_id,
            label: label.to_string(),
            name: format!("Mock {}", label),
            ports,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Unity gain, one audio input and one audio output. Not stereo-capable,
    /// so stereo streams duplicate it.
    pub fn unity(unique_id: u64) -> Self {
        Self::with_ports(
            unique_id,
            "unity",
            vec![
                MockPort::new(PortFlags::audio_input(), "Input"),
                MockPort::new(PortFlags::audio_output(), "Output"),
            ],
        )
    }

    /// Unity gain with two audio inputs and outputs; stereo-capable.
    pub fn unity_stereo(unique_id: u64) -> Self {
        Self::with_ports(
            unique_id,
            "unity_stereo",
            vec![
                MockPort::new(PortFlags::audio_input(), "Input L"),
                MockPort::new(PortFlags::audio_input(), "Input R"),
                MockPort::new(PortFlags::audio_output(), "Output L"),
                MockPort::new(PortFlags::audio_output(), "Output R"),
            ],
        )
    }

    /// Mono amplifier with a single "Gain" control defaulting to 1.0.
    pub fn gain(unique_id: u64) -> Self {
        Self::with_ports(
            unique_id,
            "gain",
            vec![
                MockPort::with_default(PortFlags::control_input(), "Gain", 1.0),
                MockPort::new(PortFlags::audio_input(), "Input"),
                MockPort::new(PortFlags::audio_output(), "Output"),
            ],
        )
    }

    /// Catalog entry for this descriptor.
    pub fn info(&self) -> PluginInfo {
        PluginInfo::from_descriptor(self, &PathBuf::from(format!("mock://{}", self.label)), 0)
    }

    /// Engines created so far (never decremented).
    pub fn instantiated(&self) -> usize {
        self.counters.instantiated.load(Ordering::SeqCst)
    }

    /// Engines created and not yet cleaned up.
    pub fn live_handles(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Engines activated and not yet deactivated.
    pub fn active_handles(&self) -> isize {
        self.counters.active.load(Ordering::SeqCst)
    }
}

impl NativeDescriptor for MockDescriptor {
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
        self.ports.len()
    }

    fn port_flags(&self, port: usize) -> PortFlags {
        self.ports.get(port).map(|p| p.flags).unwrap_or_default()
    }

    fn port_name(&self, port: usize) -> &str {
        self.ports.get(port).map(|p| p.name.as_str()).unwrap_or("")
    }

    fn port_default(&self, port: usize, _sample_rate: u32) -> f32 {
        self.ports.get(port).map(|p| p.default).unwrap_or(0.0)
    }

    fn instantiate(&self, _sample_rate: u32) -> Option<Box<dyn NativeHandle>> {
        self.counters.instantiated.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MockHandle {
            flags: self.ports.iter().map(|p| p.flags).collect(),
            connections: vec![None; self.ports.len()],
            counters: self.counters.clone(),
        }))
    }
}

struct MockHandle {
    flags: Vec<PortFlags>,
    connections: Vec<Option<*mut f32>>,
    counters: Arc<Counters>,
}

// Safety: handles are driven from one thread at a time under the chain lock;
// the pointers they hold come from the engine's stable arena and knob boxes.
unsafe impl Send for MockHandle {}

impl MockHandle {
    fn gain(&self) -> f32 {
        for (flags, connection) in self.flags.iter().zip(&self.connections) {
            if flags.is_control() && flags.is_input() {
                if let Some(ptr) = connection {
                    // Safety: connected pointers are valid per connect_port's
                    // contract.
                    return unsafe { **ptr };
                }
            }
        }
        1.0
    }
}

impl NativeHandle for MockHandle {
    unsafe fn connect_port(&mut self, port: usize, data: *mut f32) {
        if port < self.connections.len() {
            self.connections[port] = Some(data);
        }
    }

    fn activate(&mut self) {
        self.counters.active.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn run(&mut self, sample_count: usize) {
        let gain = self.gain();

        let inputs: Vec<*mut f32> = self
            .flags
            .iter()
            .zip(&self.connections)
            .filter(|(flags, _)| flags.is_audio() && flags.is_input())
            .filter_map(|(_, connection)| *connection)
            .collect();
        let outputs: Vec<*mut f32> = self
            .flags
            .iter()
            .zip(&self.connections)
            .filter(|(flags, _)| flags.is_audio() && flags.is_output())
            .filter_map(|(_, connection)| *connection)
            .collect();

        for (index, output) in outputs.iter().enumerate() {
            let input = inputs.get(index).copied();
            for sample in 0..sample_count {
                let value = match input {
                    Some(input) => *input.add(sample),
                    None => 0.0,
                };
                *output.add(sample) = value * gain;
            }
        }
    }

    fn deactivate(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Loader that resolves catalog entries against registered mock descriptors.
#[derive(Default)]
pub struct MockLoader {
    plugins: Mutex<Vec<Arc<MockDescriptor>>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor and return its catalog entry.
    pub fn register(&self, descriptor: Arc<MockDescriptor>) -> PluginInfo {
        let info = descriptor.info();
        self.plugins.lock().unwrap().push(descriptor);
        info
    }
}

impl DescriptorLoader for MockLoader {
    fn load(&self, info: &PluginInfo) -> PluginResult<Arc<dyn NativeDescriptor>> {
        self.plugins
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.unique_id() == info.unique_id)
            .cloned()
            .map(|d| d as Arc<dyn NativeDescriptor>)
            .ok_or_else(|| PluginError::NotFound(format!("mock plugin {}", info.unique_id)))
    }
}
