//! Port wiring
//!
//! Connects a plugin's control and audio ports to the shared scratch arena
//! and the instance's control-value array. The wiring rules:
//!
//! - The Nth control port (counting control ports only) maps to control
//!   value N; control ports past the cap go to the trash sink.
//! - The first audio input/output maps to the left channel; the second, on a
//!   stereo-capable plugin, to the right channel; anything further to trash.
//! - When a mono-only plugin runs duplicated for a stereo stream, the second
//!   engine's audio ports map to the right channel.
//!
//! Wiring is redone on every boot — native handles are not reusable across
//! boots and forget their connections.

use std::cell::UnsafeCell;

use crate::ffi::{NativeDescriptor, NativeHandle};
use crate::types::{MAX_KNOBS, MAX_SAMPLES};

/// Fixed arena of channel buffers shared by every plugin in the chain.
///
/// Native plugins hold raw pointers into these arrays across calls, so the
/// storage is boxed once and never moves or resizes. `trash` absorbs reads
/// and writes on ports beyond the supported layout; nothing ever reads it
/// back.
pub struct ScratchBuffers {
    left: Box<UnsafeCell<[f32; MAX_SAMPLES]>>,
    right: Box<UnsafeCell<[f32; MAX_SAMPLES]>>,
    trash: Box<UnsafeCell<[f32; MAX_SAMPLES]>>,
}

// Safety: the audio callback is the only sample writer, and plugins touch the
// arrays only while the chain lock is held. See `Engine::apply`.
unsafe impl Send for ScratchBuffers {}
unsafe impl Sync for ScratchBuffers {}

impl ScratchBuffers {
    pub fn new() -> Self {
        Self {
            left: Box::new(UnsafeCell::new([0.0; MAX_SAMPLES])),
            right: Box::new(UnsafeCell::new([0.0; MAX_SAMPLES])),
            trash: Box::new(UnsafeCell::new([0.0; MAX_SAMPLES])),
        }
    }

    pub fn left_ptr(&self) -> *mut f32 {
        self.left.get().cast()
    }

    pub fn right_ptr(&self) -> *mut f32 {
        self.right.get().cast()
    }

    pub fn trash_ptr(&self) -> *mut f32 {
        self.trash.get().cast()
    }

    /// # Safety
    ///
    /// Caller must be the arena's only accessor for the lifetime of the
    /// slice (see struct docs for the threading discipline).
    pub unsafe fn left_mut(&self, len: usize) -> &mut [f32] {
        std::slice::from_raw_parts_mut(self.left_ptr(), len.min(MAX_SAMPLES))
    }

    /// # Safety
    ///
    /// As for [`ScratchBuffers::left_mut`].
    pub unsafe fn right_mut(&self, len: usize) -> &mut [f32] {
        std::slice::from_raw_parts_mut(self.right_ptr(), len.min(MAX_SAMPLES))
    }
}

impl Default for ScratchBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire every port of `primary` (and `secondary`, for mono plugins running
/// duplicated) following the rules above.
pub(crate) fn connect(
    api: &dyn NativeDescriptor,
    stereo: bool,
    primary: &mut (dyn NativeHandle + 'static),
    mut secondary: Option<&mut (dyn NativeHandle + 'static)>,
    knobs: &mut [f32; MAX_KNOBS],
    buffers: &ScratchBuffers,
) {
    let mut controls = 0;
    let mut inputs = 0;
    let mut outputs = 0;

    for port in 0..api.port_count() {
        let flags = api.port_flags(port);

        // Safety (all connect_port calls below): the knob array is boxed in
        // the instance and the arena is boxed in the engine; both outlive the
        // handles, which are dropped on shutdown before either moves.
        if flags.is_control() {
            let target = if controls < MAX_KNOBS {
                &mut knobs[controls] as *mut f32
            } else {
                buffers.trash_ptr()
            };
            unsafe {
                primary.connect_port(port, target);
                if let Some(handle) = secondary.as_deref_mut() {
                    handle.connect_port(port, target);
                }
            }
            controls += 1;
        } else if flags.is_audio() {
            if flags.is_input() {
                unsafe {
                    if inputs == 0 {
                        primary.connect_port(port, buffers.left_ptr());
                        if let Some(handle) = secondary.as_deref_mut() {
                            handle.connect_port(port, buffers.right_ptr());
                        }
                    } else if inputs == 1 && stereo {
                        primary.connect_port(port, buffers.right_ptr());
                    } else {
                        primary.connect_port(port, buffers.trash_ptr());
                        if let Some(handle) = secondary.as_deref_mut() {
                            handle.connect_port(port, buffers.trash_ptr());
                        }
                    }
                }
                inputs += 1;
            } else if flags.is_output() {
                unsafe {
                    if outputs == 0 {
                        primary.connect_port(port, buffers.left_ptr());
                        if let Some(handle) = secondary.as_deref_mut() {
                            handle.connect_port(port, buffers.right_ptr());
                        }
                    } else if outputs == 1 && stereo {
                        primary.connect_port(port, buffers.right_ptr());
                    } else {
                        primary.connect_port(port, buffers.trash_ptr());
                        if let Some(handle) = secondary.as_deref_mut() {
                            handle.connect_port(port, buffers.trash_ptr());
                        }
                    }
                }
                outputs += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::PortFlags;
    use crate::mock::{MockDescriptor, MockPort};

    /// Records which buffer each port was wired to.
    #[derive(Default)]
    struct RecordingHandle {
        connections: Vec<(usize, *mut f32)>,
    }

    // test-only: the recorded pointers are never dereferenced
    unsafe impl Send for RecordingHandle {}

    impl NativeHandle for RecordingHandle {
        unsafe fn connect_port(&mut self, port: usize, data: *mut f32) {
            self.connections.push((port, data));
        }
        fn activate(&mut self) {}
        unsafe fn run(&mut self, _sample_count: usize) {}
        fn deactivate(&mut self) {}
    }

    impl RecordingHandle {
        fn target_of(&self, port: usize) -> *mut f32 {
            self.connections
                .iter()
                .find(|(p, _)| *p == port)
                .map(|(_, data)| *data)
                .expect("port not connected")
        }
    }

    fn control(name: &str) -> MockPort {
        MockPort::new(PortFlags::control_input(), name)
    }

    #[test]
    fn test_control_ports_map_by_ordinal() {
        // audio port first, so ordinal and raw port index diverge
        let desc = MockDescriptor::with_ports(
            900,
            "wiring",
            vec![
                MockPort::new(PortFlags::audio_input(), "In"),
                control("Attack"),
                MockPort::new(PortFlags::audio_output(), "Out"),
                control("Release"),
            ],
        );

        let mut knobs = Box::new([0.0f32; MAX_KNOBS]);
        let buffers = ScratchBuffers::new();
        let mut handle = RecordingHandle::default();

        connect(&desc, false, &mut handle, None, &mut knobs, &buffers);

        assert_eq!(handle.target_of(1), &mut knobs[0] as *mut f32);
        assert_eq!(handle.target_of(3), &mut knobs[1] as *mut f32);
        assert_eq!(handle.target_of(0), buffers.left_ptr());
        assert_eq!(handle.target_of(2), buffers.left_ptr());
    }

    #[test]
    fn test_excess_control_ports_go_to_trash() {
        let mut ports: Vec<MockPort> = (0..MAX_KNOBS + 1)
            .map(|_| control("Knob"))
            .collect();
        ports.push(MockPort::new(PortFlags::audio_input(), "In"));
        ports.push(MockPort::new(PortFlags::audio_output(), "Out"));
        let desc = MockDescriptor::with_ports(901, "crowded", ports);

        let mut knobs = Box::new([0.0f32; MAX_KNOBS]);
        let buffers = ScratchBuffers::new();
        let mut handle = RecordingHandle::default();

        connect(&desc, false, &mut handle, None, &mut knobs, &buffers);

        assert_eq!(handle.target_of(MAX_KNOBS - 1), &mut knobs[MAX_KNOBS - 1] as *mut f32);
        assert_eq!(handle.target_of(MAX_KNOBS), buffers.trash_ptr());
    }

    #[test]
    fn test_mono_duplicate_wiring() {
        let desc = MockDescriptor::unity(902);

        let mut knobs = Box::new([0.0f32; MAX_KNOBS]);
        let buffers = ScratchBuffers::new();
        let mut primary = RecordingHandle::default();
        let mut secondary = RecordingHandle::default();

        connect(
            &desc,
            false,
            &mut primary,
            Some(&mut secondary),
            &mut knobs,
            &buffers,
        );

        // primary processes the left channel, the duplicate the right
        assert_eq!(primary.target_of(0), buffers.left_ptr());
        assert_eq!(primary.target_of(1), buffers.left_ptr());
        assert_eq!(secondary.target_of(0), buffers.right_ptr());
        assert_eq!(secondary.target_of(1), buffers.right_ptr());
    }

    #[test]
    fn test_stereo_wiring_with_excess_ports() {
        let desc = MockDescriptor::with_ports(
            903,
            "wide",
            vec![
                MockPort::new(PortFlags::audio_input(), "In L"),
                MockPort::new(PortFlags::audio_input(), "In R"),
                MockPort::new(PortFlags::audio_input(), "Sidechain"),
                MockPort::new(PortFlags::audio_output(), "Out L"),
                MockPort::new(PortFlags::audio_output(), "Out R"),
            ],
        );

        let mut knobs = Box::new([0.0f32; MAX_KNOBS]);
        let buffers = ScratchBuffers::new();
        let mut handle = RecordingHandle::default();

        connect(&desc, true, &mut handle, None, &mut knobs, &buffers);

        assert_eq!(handle.target_of(0), buffers.left_ptr());
        assert_eq!(handle.target_of(1), buffers.right_ptr());
        assert_eq!(handle.target_of(2), buffers.trash_ptr());
        assert_eq!(handle.target_of(3), buffers.left_ptr());
        assert_eq!(handle.target_of(4), buffers.right_ptr());
    }
}
