use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fieldtap::{CollectorConfig, Datatype, Error, QuantaClock, Registry, Value};

const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Example CPU
cpu:MHz:2400
cache size\t: 8192 KB
";

/// Clock returning 1000, 2000, 3000, ... on successive calls.
fn scripted_clock() -> impl Fn() -> u64 + Send + Sync + 'static {
    let ticks = AtomicU64::new(0);
    move || ticks.fetch_add(1000, Ordering::SeqCst) + 1000
}

fn registry_with_clock() -> Registry {
    let mut registry = Registry::new(&CollectorConfig::default());
    registry.set_clock(Arc::new(scripted_clock()));
    registry
}

fn spec(name: &str, datatype: &str, path: &Path, params: &str) -> String {
    format!("{name}:{datatype}@{}+{params}", path.display())
}

#[test]
fn unchanged_source_yields_one_sample() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cpuinfo");
    fs::write(&path, CPUINFO)?;

    let mut registry = registry_with_clock();
    let metadata = registry.describe(&spec("freq", "uint", &path, "c=2;r=3;s=:"))?;
    assert_eq!(metadata.datatype, Datatype::Uint64);
    assert!(metadata.unit.is_empty());

    let id = registry.activate("freq")?;
    assert_eq!(id, metadata.id);
    let field = registry.field(id).expect("registered");
    assert_eq!(field.log().map(|log| log.baseline().bits()), Some(2400));

    registry.run_cycle();
    let stats = registry.run_cycle();
    assert_eq!(stats.sources_scanned, 1);
    assert_eq!(stats.repeats, 1);
    let log = registry.field(id).and_then(|field| field.log()).expect("active");
    assert_eq!(log.total_observations(), 2);

    let samples = registry.drain(id);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].timestamp, 1000);
    assert_eq!(samples[0].value.typed(Datatype::Uint64), Value::Unsigned(2400));
    assert!(registry.drain(id).is_empty());
    Ok(())
}

#[test]
fn changing_source_with_diff() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("counters");
    fs::write(&path, "rx 100\ntx 7\n")?;

    let mut registry = registry_with_clock();
    registry.describe(&spec("rx", "int", &path, "r=0;c=1;d"))?;
    let id = registry.activate("rx")?;

    registry.run_cycle();
    fs::write(&path, "rx 150\ntx 7\n")?;
    registry.run_cycle();
    fs::write(&path, "rx 90\ntx 7\n")?;
    registry.run_cycle();

    let values: Vec<(u64, i64)> = registry
        .drain(id)
        .iter()
        .map(|sample| (sample.timestamp, sample.value.as_i64()))
        .collect();
    assert_eq!(values, vec![(1000, 0), (2000, 50), (3000, -10)]);
    Ok(())
}

#[test]
fn fields_on_one_path_share_a_source() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stat");
    fs::write(&path, "a 1 2\nb 3 4\n")?;

    let mut registry = registry_with_clock();
    registry.describe(&spec("b4", "int", &path, "r=1;c=2"))?;
    registry.describe(&spec("a1", "int", &path, "r=0;c=1"))?;
    assert_eq!(registry.sources().len(), 1);
    let rows: Vec<u64> = registry.sources()[0]
        .text_fields()
        .iter()
        .map(|field| field.scan_key())
        .collect();
    assert_eq!(rows, vec![0, 1]);

    let b4 = registry.activate("b4")?;
    let a1 = registry.activate("a1")?;
    let stats = registry.run_cycle();
    assert_eq!(stats.sources_scanned, 1);
    assert_eq!(stats.values_extracted, 2);
    assert_eq!(registry.drain(b4)[0].value.as_i64(), 4);
    assert_eq!(registry.drain(a1)[0].value.as_i64(), 1);
    Ok(())
}

#[test]
fn inactive_fields_are_neither_logged_nor_drained() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pair");
    fs::write(&path, "5 6\n")?;

    let mut registry = registry_with_clock();
    let idle = registry.describe(&spec("idle", "int", &path, "c=0"))?;
    registry.describe(&spec("busy", "int", &path, "c=1"))?;
    registry.activate("busy")?;
    registry.run_cycle();

    assert!(registry.drain(idle.id).is_empty());
    assert_eq!(registry.active_fields(), 1);
    Ok(())
}

#[test]
fn activation_fails_for_unreachable_values() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("short");
    fs::write(&path, "only one line\n")?;

    let mut registry = registry_with_clock();
    registry.describe(&spec("far", "int", &path, "r=9"))?;
    registry.describe(&spec("wide", "int", &path, "c=7"))?;
    assert!(matches!(registry.activate("far"), Err(Error::Activation(_))));
    assert!(matches!(registry.activate("wide"), Err(Error::Activation(_))));
    assert_eq!(registry.active_fields(), 0);

    let missing = dir.path().join("missing");
    registry.describe(&spec("ghost", "int", &missing, "r=0"))?;
    assert!(matches!(
        registry.activate("ghost"),
        Err(Error::SourceUnavailable { .. })
    ));
    Ok(())
}

#[test]
fn same_name_falls_through_to_later_sources() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("missing");
    let present = dir.path().join("present");
    fs::write(&present, "42\n")?;

    let mut registry = registry_with_clock();
    registry.describe(&spec("v", "int", &missing, "r=0"))?;
    let second = registry.describe(&spec("v", "int", &present, "r=0"))?;
    assert_eq!(registry.activate("v")?, second.id);
    Ok(())
}

#[test]
fn cycles_without_a_clock_store_nothing() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("one");
    fs::write(&path, "1\n")?;

    let mut registry = Registry::new(&CollectorConfig::default());
    registry.describe(&spec("one", "int", &path, "r=0"))?;
    let id = registry.activate("one")?;
    assert!(registry.run_cycle().skipped);
    assert!(registry.drain(id).is_empty());
    Ok(())
}

#[test]
fn tsc_clock_stamps_samples_from_its_anchor() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tsc");
    fs::write(&path, "12\n")?;

    let mut registry = Registry::new(&CollectorConfig::default());
    registry.set_clock(Arc::new(QuantaClock::anchored_at(5_000)));
    registry.describe(&spec("t", "uint", &path, "r=0"))?;
    let id = registry.activate("t")?;
    registry.run_cycle();

    let samples = registry.drain(id);
    assert_eq!(samples.len(), 1);
    assert!(samples[0].timestamp >= 5_000);
    assert_eq!(samples[0].value.bits(), 12);
    Ok(())
}
