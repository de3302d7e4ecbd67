//! Effect chain engine
//!
//! The ordered chain of plugin instances shared between the control thread
//! and the audio callback, plus the per-buffer pump that feeds it. One mutex
//! guards chain edits, the format-change reboot pass, and the run loop; the
//! audio callback holds it only for those, never while converting samples.
//!
//! The pump never allocates, blocks on IO, or loads libraries — all of that
//! happens on the control path in `boot`/`shutdown`/`load`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::instance::PluginInstance;
use crate::ports::ScratchBuffers;
use crate::types::{SampleFormat, StreamFormat, MAX_SAMPLES};

#[derive(Default)]
struct StreamState {
    format: Option<StreamFormat>,
    supported: bool,
}

struct Shared {
    chain: Vec<PluginInstance>,
    stream: StreamState,
}

/// Chain, stream state, and scratch arena behind one lock.
pub struct Engine {
    // Declared before `buffers`: instances (whose native handles hold
    // pointers into the arena) must drop first.
    shared: Mutex<Shared>,
    buffers: ScratchBuffers,
    running: AtomicBool,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                chain: Vec::new(),
                stream: StreamState::default(),
            }),
            buffers: ScratchBuffers::new(),
            running: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Append `instance` to the end of the chain. When the stream is live
    /// and a format is known the instance boots immediately, so adding an
    /// effect mid-playback takes effect on the next buffer.
    pub fn append(&self, mut instance: PluginInstance) -> crate::types::PluginResult<()> {
        let mut shared = self.lock();
        if self.is_running() {
            if let Some(format) = shared.stream.format {
                instance.boot(format, &self.buffers)?;
            }
        }
        shared.chain.push(instance);
        Ok(())
    }

    /// Remove the instance at `index`. A no-op (returning false) when the
    /// index is out of range. The native engines are released after the lock
    /// drops — the lock boundary guarantees the audio thread is no longer
    /// touching them.
    pub fn remove(&self, index: usize) -> bool {
        let removed = {
            let mut shared = self.lock();
            if index < shared.chain.len() {
                Some(shared.chain.remove(index))
            } else {
                None
            }
        };
        removed.is_some()
    }

    /// Move the instance at `from` so it ends up at position `to`.
    pub fn reorder(&self, from: usize, to: usize) {
        let mut shared = self.lock();
        if from >= shared.chain.len() {
            return;
        }
        let instance = shared.chain.remove(from);
        let to = to.min(shared.chain.len());
        shared.chain.insert(to, instance);
    }

    pub fn len(&self) -> usize {
        self.lock().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chain.is_empty()
    }

    /// Display names of the running chain, in processing order.
    pub fn names(&self) -> Vec<String> {
        self.lock()
            .chain
            .iter()
            .map(|instance| instance.name().to_string())
            .collect()
    }

    /// Write a control value on the instance at `index`. Returns false when
    /// either index is out of range. Runs under the chain lock so the store
    /// cannot race a reboot.
    pub fn set_control(&self, index: usize, port: usize, value: f32) -> bool {
        let mut shared = self.lock();
        match shared.chain.get_mut(index) {
            Some(instance) => instance.set_knob(port, value),
            None => false,
        }
    }

    /// Read a control value back, e.g. to display an output port the plugin
    /// keeps updating.
    pub fn control_value(&self, index: usize, port: usize) -> Option<f32> {
        self.lock().chain.get(index).and_then(|i| i.knob(port))
    }

    /// Run `f` against the chain in processing order.
    pub fn with_chain<R>(&self, f: impl FnOnce(&[PluginInstance]) -> R) -> R {
        f(&self.lock().chain)
    }

    /// Last stream format observed by the pump, if any.
    pub fn last_format(&self) -> Option<StreamFormat> {
        self.lock().stream.format
    }

    /// Release every instance's native engines but keep the chain intact, so
    /// a later start can reboot it.
    pub fn shutdown_all(&self) {
        let mut shared = self.lock();
        for instance in &mut shared.chain {
            instance.shutdown();
        }
    }

    /// Reboot every instance for the last observed format, if one is known.
    pub fn reboot(&self) {
        let mut shared = self.lock();
        if let Some(format) = shared.stream.format {
            boot_all(&mut shared.chain, format, &self.buffers);
        }
    }

    /// Compare `format` against the last observed one; on change store it,
    /// reclassify support, and reboot the whole chain. Called for every
    /// buffer — a cheap no-op when nothing changed.
    fn on_format_change(shared: &mut Shared, format: StreamFormat, buffers: &ScratchBuffers) {
        if shared.stream.format == Some(format) {
            return;
        }
        shared.stream.format = Some(format);
        shared.stream.supported =
            (1..=2).contains(&format.channels) && format.format.is_native_s16();
        boot_all(&mut shared.chain, format, buffers);
    }

    /// Process one buffer of interleaved PCM in place. Pass-through (bytes
    /// untouched) when the host is stopped, the chain is empty, the format
    /// is unsupported, or the buffer exceeds the arena. The byte length
    /// never changes.
    pub fn apply(&self, data: &mut [u8], format: SampleFormat, rate: u32, channels: u32) {
        if !self.is_running() {
            return;
        }

        let stream = StreamFormat {
            format,
            rate,
            channels,
        };

        {
            let mut shared = self.lock();
            Self::on_format_change(&mut shared, stream, &self.buffers);
            if shared.chain.is_empty() || !shared.stream.supported {
                return;
            }
        }

        if data.len() > MAX_SAMPLES * 2 {
            return;
        }
        let frames = data.len() / 2 / channels as usize;
        if frames == 0 {
            return;
        }

        // De-interleave and normalise into the arena. Safety: the audio
        // callback is the arena's only sample writer, and the plugins that
        // share these buffers run only under the lock below.
        unsafe {
            let left = self.buffers.left_mut(frames);
            if channels == 1 {
                for (k, raw) in data.chunks_exact(2).take(frames).enumerate() {
                    left[k] = i16::from_ne_bytes([raw[0], raw[1]]) as f32 * (1.0 / 32768.0);
                }
            } else {
                let right = self.buffers.right_mut(frames);
                for (k, raw) in data.chunks_exact(4).take(frames).enumerate() {
                    left[k] = i16::from_ne_bytes([raw[0], raw[1]]) as f32 * (1.0 / 32768.0);
                    right[k] = i16::from_ne_bytes([raw[2], raw[3]]) as f32 * (1.0 / 32768.0);
                }
            }
        }

        {
            let mut shared = self.lock();
            for instance in &mut shared.chain {
                instance.run(frames);
            }
        }

        // Re-interleave with the mandatory clamp: cascaded gain stages can
        // push samples far outside the 16-bit range.
        unsafe {
            let left = self.buffers.left_mut(frames);
            if channels == 1 {
                for (k, raw) in data.chunks_exact_mut(2).take(frames).enumerate() {
                    raw.copy_from_slice(&denormalise(left[k]).to_ne_bytes());
                }
            } else {
                let right = self.buffers.right_mut(frames);
                for (k, raw) in data.chunks_exact_mut(4).take(frames).enumerate() {
                    raw[0..2].copy_from_slice(&denormalise(left[k]).to_ne_bytes());
                    raw[2..4].copy_from_slice(&denormalise(right[k]).to_ne_bytes());
                }
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn boot_all(chain: &mut [PluginInstance], format: StreamFormat, buffers: &ScratchBuffers) {
    for instance in chain {
        if let Err(e) = instance.boot(format, buffers) {
            // the run loop skips unbooted instances, so playback continues
            tracing::warn!("failed to boot {}: {}", instance.name(), e);
        }
    }
}

fn denormalise(sample: f32) -> i16 {
    ((sample * 32768.0) as i32).clamp(-32768, 32767) as i16
}
