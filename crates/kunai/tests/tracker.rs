use std::time::Duration;

use kunai::process::{MockMemoryBuilder, MockProcess, MockProcessProvider};
use kunai::{
    Engine, LifecycleEvent, ManualClock, MemoryRegion, PointerWidth, SpeedTracker, TrackerConfig,
    VELOCITY_X, VELOCITY_Y,
};

const CODE: u64 = 0x40_0000;

/// A running game whose `player_system` signature sits after `padding`
/// bytes of code and points at `slot`.
fn game(pid: u32, padding: usize, slot: u64, x: f32, y: f32) -> MockProcess {
    let mut code = vec![0xCC; padding];
    code.push(0xBA);
    code.extend_from_slice(&(slot as u32).to_le_bytes());
    code.extend_from_slice(&[
        0x8B, 0xC0, 0xE8, 0x00, 0x10, 0x00, 0x00, 0x8B, 0x40, 0x0C, 0x89, 0x45, 0xCC,
    ]);
    code.extend_from_slice(&[0xCC; 0x20]);

    let object = slot + 0x10_0000;
    let memory = MockMemoryBuilder::new()
        .pointer_width(PointerWidth::Bits32)
        .write_bytes(CODE, &code)
        .write_pointer(slot + 0x24, object)
        .write_pointer(object + 0x4, object + 0x100)
        .write_pointer(object + 0x100, object + 0x200)
        .write_pointer(object + 0x200 + 0xC, object + 0x300)
        .write_pointer(object + 0x300 + 0x10, object + 0x400)
        .write_pointer(object + 0x400 + 0x30, object + 0x500)
        .write_f32(object + 0x500 + 0x94, x)
        .write_f32(object + 0x500 + 0x98, y)
        .build();

    MockProcess::new(pid, "KUNAI.exe", memory)
        .with_main_module(MemoryRegion::new(CODE, code.len() as u64))
}

fn tracker(
    provider: &MockProcessProvider,
    clock: &ManualClock,
) -> SpeedTracker<MockProcessProvider, ManualClock> {
    SpeedTracker::new(provider.clone(), clock.clone(), &TrackerConfig::default()).unwrap()
}

#[test]
fn relaunch_rescans_signature() {
    let provider = MockProcessProvider::new();
    let clock = ManualClock::new();
    provider.launch_process(game(100, 0x10, 0x50_0000, 1.5, 0.0));

    let mut engine =
        Engine::new(provider.clone(), clock.clone(), &TrackerConfig::default()).unwrap();
    assert!(matches!(engine.tick(), LifecycleEvent::Attached(_)));
    assert_eq!(engine.try_read_value::<f32>(VELOCITY_X).unwrap(), Some(1.5));
    assert_eq!(engine.resolve_anchor("player_system").unwrap(), Some(0x50_0000));

    provider.exit();
    assert!(matches!(engine.tick(), LifecycleEvent::Exited(_)));
    assert_eq!(engine.try_read_value::<f32>(VELOCITY_X).unwrap(), None);

    // New build: signature moved, static slot moved
    provider.launch_process(game(200, 0x80, 0x70_0000, -2.25, 0.5));
    match engine.tick() {
        LifecycleEvent::Attached(info) => assert_eq!(info.pid, 200),
        other => panic!("unexpected {:?}", other),
    }
    assert!(
        engine
            .session()
            .unwrap()
            .cached_anchor("player_system")
            .is_none()
    );
    assert_eq!(engine.try_read_value::<f32>(VELOCITY_X).unwrap(), Some(-2.25));
    assert_eq!(engine.try_read_value::<f32>(VELOCITY_Y).unwrap(), Some(0.5));
    assert_eq!(engine.resolve_anchor("player_system").unwrap(), Some(0x70_0000));
}

#[test]
fn detached_updates_are_rate_limited() {
    let provider = MockProcessProvider::new();
    let clock = ManualClock::new();
    let mut tracker = tracker(&provider, &clock);

    for _ in 0..10 {
        let update = tracker.update();
        assert!(update.reading.is_none());
        assert!(!update.changed);
        clock.advance(Duration::from_millis(50));
    }
    assert_eq!(provider.lookups(), 1);

    clock.advance(Duration::from_millis(500));
    provider.launch_process(game(300, 0x10, 0x50_0000, 3.0, 4.0));
    let update = tracker.update();
    assert!(matches!(update.event, LifecycleEvent::Attached(_)));
    assert_eq!(provider.lookups(), 2);
    assert_eq!(update.reading.unwrap().magnitude, 5.0);
}

#[test]
fn display_changes_only_when_text_changes() {
    let provider = MockProcessProvider::new();
    let clock = ManualClock::new();
    provider.launch_process(game(100, 0x10, 0x50_0000, 3.0, 4.0));
    let mut tracker = tracker(&provider, &clock);

    let first = tracker.update();
    assert!(first.sampled);
    assert!(first.changed);
    let display = tracker.display().unwrap();
    assert_eq!(
        (display.x.as_str(), display.y.as_str(), display.total.as_str()),
        ("3.00", "4.00", "5.00")
    );

    clock.advance(Duration::from_millis(50));
    let second = tracker.update();
    assert!(second.sampled);
    assert!(!second.changed);
    assert_eq!(second.reading.unwrap().samples, 2);
}

#[test]
fn window_keeps_trailing_second() {
    let provider = MockProcessProvider::new();
    let clock = ManualClock::new();
    provider.launch_process(game(100, 0x10, 0x50_0000, 1.0, 1.0));
    let mut tracker = tracker(&provider, &clock);

    for at in [0, 500, 999, 1500] {
        clock.set(Duration::from_millis(at));
        tracker.update();
    }

    let kept: Vec<u64> = tracker.window().samples().map(|s| s.timestamp_ms).collect();
    assert_eq!(kept, vec![999, 1500]);
}

#[test]
fn read_failure_keeps_previous_summary() {
    let provider = MockProcessProvider::new();
    let clock = ManualClock::new();
    let process = game(100, 0x10, 0x50_0000, 6.0, 8.0);
    provider.launch_process(process.clone());
    let mut tracker = tracker(&provider, &clock);

    let before = tracker.update().reading.unwrap();

    process.set_faulted(true);
    clock.advance(Duration::from_millis(50));
    let update = tracker.update();
    assert_eq!(update.event, LifecycleEvent::Running);
    assert!(!update.sampled);
    assert!(!update.changed);
    assert_eq!(update.reading, Some(before));
    assert_eq!(tracker.window().len(), 1);

    process.set_faulted(false);
    clock.advance(Duration::from_millis(50));
    let update = tracker.update();
    assert!(update.sampled);
    assert_eq!(update.reading.unwrap().samples, 2);
}

#[test]
fn exit_clears_window() {
    let provider = MockProcessProvider::new();
    let clock = ManualClock::new();
    provider.launch_process(game(100, 0x10, 0x50_0000, 6.0, 8.0));
    let mut tracker = tracker(&provider, &clock);

    tracker.update();
    assert_eq!(tracker.window().len(), 1);

    provider.exit();
    let update = tracker.update();
    assert!(matches!(update.event, LifecycleEvent::Exited(_)));
    assert!(update.reading.is_none());
    assert!(tracker.window().is_empty());

    // Display text survives until a new reading replaces it
    assert_eq!(tracker.display().unwrap().total, "10.00");
}

#[test]
fn dispose_releases_and_allows_reattach() {
    let provider = MockProcessProvider::new();
    let clock = ManualClock::new();
    provider.launch_process(game(100, 0x10, 0x50_0000, 1.0, 0.0));
    let mut tracker = tracker(&provider, &clock);

    tracker.update();
    tracker.dispose();
    assert!(!tracker.engine().is_attached());
    assert!(tracker.window().is_empty());

    let update = tracker.update();
    assert!(matches!(update.event, LifecycleEvent::Attached(_)));
    assert_eq!(provider.opens(), 2);
}
