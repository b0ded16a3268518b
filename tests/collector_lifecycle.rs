use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use fieldtap::{Collector, CollectorConfig, Sample};

fn fast_collector() -> Collector {
    Collector::new(CollectorConfig {
        interval_us: 1_000,
        ..CollectorConfig::default()
    })
}

fn counting_clock() -> impl Fn() -> u64 + Send + Sync + 'static {
    let ticks = AtomicU64::new(0);
    move || ticks.fetch_add(1, Ordering::SeqCst) + 1
}

/// Drain `id` until a sample satisfying `done` arrived or two seconds passed.
fn drain_until(collector: &Collector, id: i32, done: impl Fn(&Sample) -> bool) -> Vec<Sample> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut samples = Vec::new();
    while !samples.iter().any(&done) && Instant::now() < deadline {
        samples.extend(collector.drain(id));
        thread::sleep(Duration::from_millis(5));
    }
    samples
}

#[test]
fn worker_starts_once_and_stops_on_shutdown() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("gauge");
    fs::write(&path, "level 7\nother 1\n")?;

    let collector = fast_collector();
    collector.set_clock(counting_clock());
    assert!(!collector.is_running());

    let level = collector.describe(&format!("level:int@{}+c=1", path.display()))?;
    let other = collector.describe(&format!("other:int@{}+r=1;c=1", path.display()))?;
    assert_eq!(collector.activate("level")?, level.id);
    assert!(collector.is_running());
    assert_eq!(collector.activate("other")?, other.id);
    assert_eq!(collector.activate("level")?, level.id);

    let first = drain_until(&collector, level.id, |_| true);
    assert!(!first.is_empty());
    assert!(first.iter().all(|sample| sample.value.as_i64() == 7));

    // A drained log starts over, so the unchanged 7 may be stored again
    // before the new value shows up.
    fs::write(&path, "level 9\nother 1\n")?;
    let next = drain_until(&collector, level.id, |sample| sample.value.as_i64() == 9);
    let last = next.last().expect("samples after the change");
    assert_eq!(last.value.as_i64(), 9);
    assert!(last.timestamp > first[0].timestamp);

    collector.shutdown();
    assert!(!collector.is_running());
    Ok(())
}

#[test]
fn worker_is_not_restarted_after_shutdown() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("value");
    fs::write(&path, "3\n")?;

    let collector = fast_collector();
    collector.shutdown();
    collector.describe(&format!("v:uint@{}+", path.display()))?;
    collector.activate("v")?;
    assert!(!collector.is_running());
    Ok(())
}

#[test]
fn shutdown_returns_promptly_with_a_long_interval() -> fieldtap::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("slow");
    fs::write(&path, "1\n")?;

    let collector = Collector::new(CollectorConfig {
        interval_us: 60_000_000,
        ..CollectorConfig::default()
    });
    collector.describe(&format!("s:int@{}+", path.display()))?;
    collector.activate("s")?;
    assert!(collector.is_running());

    let start = Instant::now();
    drop(collector);
    assert!(start.elapsed() < Duration::from_secs(5));
    Ok(())
}
