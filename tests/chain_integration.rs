//! End-to-end chain behaviour through the public host API, against mock
//! plugins. Covers the normalize→run→denormalize pipeline, fail-safe
//! pass-through, the mono-duplication rule, and persistence across a full
//! stop/start cycle.

use std::sync::Arc;

use ladspa_host::catalog::PluginCatalog;
use ladspa_host::ffi::PortFlags;
use ladspa_host::host::{ChainCommand, LadspaHost};
use ladspa_host::mock::{MockDescriptor, MockLoader, MockPort};
use ladspa_host::state::ConfigStore;
use ladspa_host::types::{SampleFormat, MAX_KNOBS};

fn bytes_from(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

fn samples_from(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|raw| i16::from_ne_bytes([raw[0], raw[1]]))
        .collect()
}

struct Fixture {
    host: LadspaHost,
    _dir: tempfile::TempDir,
}

fn fixture(descriptors: Vec<Arc<MockDescriptor>>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new());
    let mut catalog = PluginCatalog::new();
    for desc in descriptors {
        catalog.add(loader.register(desc));
    }

    let host = LadspaHost::with_loader(dir.path().join("effects.json"), loader);
    host.set_catalog(catalog);
    Fixture { host, _dir: dir }
}

#[test]
fn unity_chain_is_identity_for_stereo_buffers() {
    let unity = Arc::new(MockDescriptor::unity(100));
    let f = fixture(vec![unity.clone()]);

    f.host.start();
    f.host.add_plugin(100).unwrap();

    // L,R interleaved; a mono-only plugin must process both channels
    let mut data = bytes_from(&[100, -100, 200, -200]);
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);

    assert_eq!(samples_from(&data), vec![100, -100, 200, -200]);
    // the mono plugin was duplicated: one engine per channel
    assert_eq!(
        f.host.engine().with_chain(|chain| chain[0].handle_count()),
        2
    );
}

#[test]
fn stereo_capable_plugin_uses_one_engine() {
    let stereo = Arc::new(MockDescriptor::unity_stereo(101));
    let f = fixture(vec![stereo.clone()]);

    f.host.start();
    f.host.add_plugin(101).unwrap();

    let mut data = bytes_from(&[1000, -1000, 2000, -2000]);
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);

    assert_eq!(samples_from(&data), vec![1000, -1000, 2000, -2000]);
    assert_eq!(
        f.host.engine().with_chain(|chain| chain[0].handle_count()),
        1
    );
    assert_eq!(stereo.instantiated(), 1);
}

#[test]
fn cascaded_gain_clamps_to_i16_range() {
    let f = fixture(vec![
        Arc::new(MockDescriptor::gain(102)),
        Arc::new(MockDescriptor::gain(103)),
    ]);

    f.host.start();
    f.host.add_plugin(102).unwrap();
    f.host.add_plugin(103).unwrap();
    f.host.set_control(0, 0, 4.0);
    f.host.set_control(1, 0, 4.0);

    let mut data = bytes_from(&[10000, -10000, 50, -50]);
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);

    // 10000 * 16 overflows: clamped, not wrapped
    assert_eq!(samples_from(&data), vec![32767, -32768, 800, -800]);
}

#[test]
fn unsupported_formats_pass_through_unchanged() {
    let f = fixture(vec![Arc::new(MockDescriptor::gain(104))]);

    f.host.start();
    f.host.add_plugin(104).unwrap();
    f.host.set_control(0, 0, 4.0);

    // four channels
    let mut data = bytes_from(&[100, 200, 300, 400]);
    let before = data.clone();
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 4);
    assert_eq!(data, before);

    // unsigned 8-bit encoding
    let mut data = bytes_from(&[100, 200]);
    let before = data.clone();
    f.host.apply(&mut data, SampleFormat::U8, 44100, 2);
    assert_eq!(data, before);
}

#[test]
fn format_changes_reboot_the_chain_exactly_once() {
    let unity = Arc::new(MockDescriptor::unity(105));
    let f = fixture(vec![unity.clone()]);

    f.host.start();
    f.host.add_plugin(105).unwrap();

    let mut data = bytes_from(&[0, 0]);
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);
    assert_eq!(unity.instantiated(), 2);

    // same format: no new engines
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);
    assert_eq!(unity.instantiated(), 2);

    // rate change: full reboot
    f.host.apply(&mut data, SampleFormat::S16Ne, 48000, 2);
    assert_eq!(unity.instantiated(), 4);

    // drop to mono: one engine is enough now
    f.host.apply(&mut data, SampleFormat::S16Ne, 48000, 1);
    assert_eq!(unity.instantiated(), 5);
    assert_eq!(unity.live_handles(), 1);
}

#[test]
fn chain_edits_through_the_command_queue() {
    let f = fixture(vec![
        Arc::new(MockDescriptor::gain(106)),
        Arc::new(MockDescriptor::unity(107)),
    ]);

    f.host.start();
    f.host.post(ChainCommand::Add { unique_id: 106 });
    f.host.post(ChainCommand::Add { unique_id: 107 });
    f.host.post(ChainCommand::SetControl {
        index: 0,
        port: 0,
        value: 2.0,
    });
    f.host.drain_commands();

    assert_eq!(f.host.running(), vec!["Mock gain", "Mock unity"]);

    let mut data = bytes_from(&[100, -100]);
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);
    assert_eq!(samples_from(&data), vec![200, -200]);

    f.host.post(ChainCommand::Remove { index: 0 });
    f.host.drain_commands();

    let mut data = bytes_from(&[100, -100]);
    f.host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);
    assert_eq!(samples_from(&data), vec![100, -100]);
}

#[test]
fn chain_persists_across_host_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("effects.json");

    let loader = Arc::new(MockLoader::new());
    let mut catalog = PluginCatalog::new();
    catalog.add(loader.register(Arc::new(MockDescriptor::gain(108))));
    catalog.add(loader.register(Arc::new(MockDescriptor::unity(109))));

    {
        let host = LadspaHost::with_loader(&config, loader.clone());
        host.set_catalog(catalog.clone());
        host.start();
        host.add_plugin(108).unwrap();
        host.add_plugin(109).unwrap();
        host.set_control(0, 0, 3.25);
        host.stop();
    }

    // a new session restores the same chain, order, and control values
    let host = LadspaHost::with_loader(&config, loader);
    host.set_catalog(catalog);
    host.start();

    assert_eq!(host.running(), vec!["Mock gain", "Mock unity"]);
    assert_eq!(host.control_value(0, 0), Some(3.25));

    let mut data = bytes_from(&[100, -100]);
    host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);
    assert_eq!(samples_from(&data), vec![325, -325]);
}

#[test]
fn partial_restore_skips_uninstalled_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("effects.json");

    let loader = Arc::new(MockLoader::new());
    let a = loader.register(Arc::new(MockDescriptor::unity(110)));
    let b = loader.register(Arc::new(MockDescriptor::gain(111)));
    let c = loader.register(Arc::new(MockDescriptor::unity_stereo(112)));

    {
        let mut catalog = PluginCatalog::new();
        catalog.add(a.clone());
        catalog.add(b.clone());
        catalog.add(c.clone());

        let host = LadspaHost::with_loader(&config, loader.clone());
        host.set_catalog(catalog);
        host.start();
        host.add_plugin(110).unwrap();
        host.add_plugin(111).unwrap();
        host.add_plugin(112).unwrap();
        host.stop();
    }

    // plugin 111 was uninstalled between sessions
    let mut catalog = PluginCatalog::new();
    catalog.add(a);
    catalog.add(c);

    let host = LadspaHost::with_loader(&config, loader);
    host.set_catalog(catalog);
    host.start();

    assert_eq!(host.running(), vec!["Mock unity", "Mock unity_stereo"]);
}

#[test]
fn control_ports_beyond_the_cap_are_inert() {
    // more control ports than the host keeps values for
    let mut ports: Vec<MockPort> = (0..MAX_KNOBS + 1)
        .map(|i| MockPort::new(PortFlags::control_input(), &format!("Knob {}", i)))
        .collect();
    ports.push(MockPort::new(PortFlags::audio_input(), "Input"));
    ports.push(MockPort::new(PortFlags::audio_output(), "Output"));
    let crowded = Arc::new(MockDescriptor::with_ports(113, "crowded", ports));

    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("effects.json");
    let loader = Arc::new(MockLoader::new());
    let mut catalog = PluginCatalog::new();
    catalog.add(loader.register(crowded));

    let host = LadspaHost::with_loader(&config, loader);
    host.set_catalog(catalog);
    host.start();
    host.add_plugin(113).unwrap();

    // wiring and processing survive the excess ports
    let mut data = bytes_from(&[100, -100]);
    host.apply(&mut data, SampleFormat::S16Ne, 44100, 2);

    // in-cap writes land, out-of-cap writes are rejected
    assert!(host.set_control(0, MAX_KNOBS - 1, 1.0));
    assert!(!host.set_control(0, MAX_KNOBS, 1.0));

    host.stop();

    // persisted count is capped as well
    let store = ConfigStore::load(&config).unwrap();
    assert_eq!(store.get_int("ladspa_plugin0", "ports"), Some(MAX_KNOBS as i64));
    assert!(store
        .get_float("ladspa_plugin0", &format!("port{}", MAX_KNOBS - 1))
        .is_some());
    assert!(store
        .get_float("ladspa_plugin0", &format!("port{}", MAX_KNOBS))
        .is_none());
}
