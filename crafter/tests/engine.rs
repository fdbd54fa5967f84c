//! End-to-end engine tests against the scripted driver.

use std::sync::Arc;
use std::time::Duration;

use crafter::config::{CellAddress, CellArea, Config, ConfigStore};
use crafter::driver::{SimAction, SimDriver, TooltipReader};
use crafter::engine::{self, EngineHandle, EngineOptions};
use crafter::error::CraftError;
use crafter::events::{Event, EventBus};
use crafter::session::{SessionReport, SessionState};
use grid::{GridCalibration, Point};
use mods::Language;
use tokio::sync::broadcast;

/// 12×5 grid with 60px cells: workbench at (130,230), pending row 1,
/// results row 2.
fn test_config(rolls_per_item: u32, batch_cols: u32) -> Config {
    Config {
        grid: GridCalibration::new(Point::new(100, 200), Point::new(820, 500)),
        consumable_pos: Point::new(50, 60),
        workbench: CellAddress { row: 0, col: 0 },
        pending_area: CellArea { row: 1, col: 0, rows: 1, cols: batch_cols },
        result_area: CellArea { row: 2, col: 0, rows: 1, cols: batch_cols },
        tooltip_offset: Point::new(40, -10),
        tooltip_size: Point::new(300, 200),
        rolls_per_item,
        roll_delay_ms: 0,
        target_mods: vec![mods::parse_target_mod("life 80", Language::English).unwrap()],
        ..Config::default()
    }
}

fn spawn_engine(
    cfg: Option<Config>,
    sim: &Arc<SimDriver>,
    countdown_secs: u32,
    countdown_tick: Duration,
) -> (EngineHandle, EventBus) {
    let store = Arc::new(ConfigStore::in_memory(cfg));
    let bus = EventBus::default();
    let opts = EngineOptions {
        countdown_secs,
        countdown_tick,
        snapshots_dir: std::env::temp_dir().join("crafter-test-snapshots"),
    };
    let handle = engine::spawn(store, bus.clone(), sim.clone(), sim.clone(), opts);
    (handle, bus)
}

/// Drain the bus until the session ends, returning everything seen.
async fn wait_for_report(rx: &mut broadcast::Receiver<Event>) -> (Vec<Event>, SessionReport) {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no session_ended within 5s")
            .expect("event bus closed");
        let done = matches!(event, Event::SessionEnded { .. });
        events.push(event);
        if done {
            let Some(Event::SessionEnded { report }) = events.last().cloned() else {
                unreachable!();
            };
            return (events, report);
        }
    }
}

#[tokio::test]
async fn controls_are_rejected_while_idle() {
    let sim = Arc::new(SimDriver::default());
    let (handle, _bus) = spawn_engine(Some(test_config(3, 1)), &sim, 0, Duration::from_millis(1));

    assert!(matches!(
        handle.pause_toggle().await,
        Err(CraftError::InvalidTransition { action: "pause", .. })
    ));
    assert!(matches!(
        handle.stop().await,
        Err(CraftError::InvalidTransition { action: "stop", .. })
    ));

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.total_rolls, 0);
}

#[tokio::test]
async fn start_without_config_is_refused() {
    let sim = Arc::new(SimDriver::default());
    let (handle, _bus) = spawn_engine(None, &sim, 0, Duration::from_millis(1));

    assert!(matches!(handle.start().await, Err(CraftError::Config(_))));
    assert_eq!(handle.status().await.unwrap().state, SessionState::Idle);
}

#[tokio::test]
async fn start_with_unset_grid_is_refused() {
    let sim = Arc::new(SimDriver::default());
    let cfg = Config { grid: GridCalibration::default(), ..test_config(3, 1) };
    let (handle, _bus) = spawn_engine(Some(cfg), &sim, 0, Duration::from_millis(1));

    assert!(matches!(handle.start().await, Err(CraftError::Uncalibrated(_))));
}

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let sim = Arc::new(SimDriver::default());
    // A long countdown keeps the session alive while we poke it.
    let (handle, _bus) = spawn_engine(Some(test_config(3, 1)), &sim, 5, Duration::from_millis(200));

    handle.start().await.unwrap();
    assert!(matches!(handle.start().await, Err(CraftError::AlreadyRunning)));
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn stop_during_countdown_rolls_nothing() {
    let sim = Arc::new(SimDriver::default());
    let (handle, bus) = spawn_engine(Some(test_config(3, 1)), &sim, 5, Duration::from_millis(200));
    let mut rx = bus.subscribe();

    handle.start().await.unwrap();
    handle.stop().await.unwrap();

    let (events, report) = wait_for_report(&mut rx).await;
    assert_eq!(report.total_rolls, 0);
    assert!(!report.target_mod_hit);
    assert!(sim.actions().is_empty());
    // Straight from countdown to stopped, never through running.
    assert!(
        events
            .iter()
            .all(|e| !matches!(e, Event::StateChange { state: SessionState::Running }))
    );

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, SessionState::Stopped);
}

#[tokio::test]
async fn target_hit_completes_item_successfully() {
    let sim = Arc::new(SimDriver::scripted([
        "+40 to maximum Mana",
        "+85(80-89) to maximum Life",
    ]));
    let (handle, bus) = spawn_engine(Some(test_config(5, 1)), &sim, 0, Duration::from_millis(1));
    let mut rx = bus.subscribe();

    handle.start().await.unwrap();
    let (events, report) = wait_for_report(&mut rx).await;

    let hits: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::TargetFound { mod_name, value, attempt_num, .. } => {
                Some((mod_name.clone(), *value, *attempt_num))
            }
            _ => None,
        })
        .collect();
    assert_eq!(hits, [("Life".to_string(), 85, 2)]);

    assert!(report.target_mod_hit);
    assert_eq!(report.target_mod_name.as_deref(), Some("Life"));
    assert_eq!(report.target_value, Some(85));
    assert_eq!(report.total_rolls, 2);
    assert_eq!(report.round_results.len(), 1);
    assert!(report.round_results[0].success);

    // Item in, two orbs, item out.
    let workbench = Point::new(130, 230);
    assert_eq!(
        sim.actions(),
        [
            SimAction::MoveItem { from: Point::new(130, 290), to: workbench },
            SimAction::ApplyConsumable { orb: Point::new(50, 60), item: workbench },
            SimAction::ApplyConsumable { orb: Point::new(50, 60), item: workbench },
            SimAction::MoveItem { from: workbench, to: Point::new(130, 350) },
        ]
    );
}

#[tokio::test]
async fn exhausted_budget_moves_item_out_unsuccessfully() {
    let sim = Arc::new(SimDriver::scripted(["+40 to maximum Mana", "+41 to maximum Mana"]));
    let (handle, bus) = spawn_engine(Some(test_config(2, 1)), &sim, 0, Duration::from_millis(1));
    let mut rx = bus.subscribe();

    handle.start().await.unwrap();
    let (events, report) = wait_for_report(&mut rx).await;

    assert!(events.iter().all(|e| !matches!(e, Event::TargetFound { .. })));
    assert!(!report.target_mod_hit);
    assert_eq!(report.total_rolls, 2);
    assert_eq!(report.round_results.len(), 1);
    assert!(!report.round_results[0].success);
    assert!(report.round_results[0].error.is_none());

    // The item still moves to the result area.
    let moves = sim
        .actions()
        .into_iter()
        .filter(|a| matches!(a, SimAction::MoveItem { .. }))
        .count();
    assert_eq!(moves, 2);
}

#[tokio::test]
async fn batch_processes_every_slot() {
    // Item 1 hits on its first roll; item 2 exhausts two rolls.
    let sim = Arc::new(SimDriver::scripted([
        "+85 to maximum Life",
        "+40 to maximum Mana",
        "+41 to maximum Mana",
    ]));
    let (handle, bus) = spawn_engine(Some(test_config(2, 2)), &sim, 0, Duration::from_millis(1));
    let mut rx = bus.subscribe();

    handle.start().await.unwrap();
    let (events, report) = wait_for_report(&mut rx).await;

    let started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::ItemStarted { item_number, .. } => Some(*item_number),
            _ => None,
        })
        .collect();
    assert_eq!(started, [1, 2]);

    assert_eq!(report.total_rolls, 3);
    assert_eq!(report.round_results.len(), 2);
    assert!(report.round_results[0].success);
    assert!(!report.round_results[1].success);

    // Stats accumulate across items within one session.
    let mana = report.mod_stats.iter().find(|s| s.stat.key == "mana").unwrap();
    assert_eq!(mana.stat.count, 2);
}

/// Fails the first recognition pass, then behaves like the wrapped driver.
struct FlakyReader {
    failed: std::sync::Mutex<bool>,
    inner: Arc<SimDriver>,
}

impl TooltipReader for FlakyReader {
    fn read_region(&self, region: grid::Rect, language: Language) -> anyhow::Result<String> {
        let mut failed = self.failed.lock().unwrap();
        if !*failed {
            *failed = true;
            anyhow::bail!("capture backend offline");
        }
        self.inner.read_region(region, language)
    }
}

#[tokio::test]
async fn capture_failure_aborts_the_item_but_not_the_session() {
    let sim = Arc::new(SimDriver::scripted(["+85 to maximum Life"]));
    let reader = Arc::new(FlakyReader { failed: std::sync::Mutex::new(false), inner: sim.clone() });

    let store = Arc::new(ConfigStore::in_memory(Some(test_config(2, 2))));
    let bus = EventBus::default();
    let opts = EngineOptions {
        countdown_secs: 0,
        countdown_tick: Duration::from_millis(1),
        snapshots_dir: std::env::temp_dir().join("crafter-test-snapshots"),
    };
    let handle = engine::spawn(store, bus.clone(), sim.clone(), reader, opts);
    let mut rx = bus.subscribe();

    handle.start().await.unwrap();
    let (_, report) = wait_for_report(&mut rx).await;

    // Item 1's roll never completed, so it never counted.
    assert_eq!(report.total_rolls, 1);
    assert_eq!(report.round_results.len(), 2);
    assert!(!report.round_results[0].success);
    assert!(report.round_results[0].error.is_some());
    assert!(report.round_results[1].success);
    assert!(report.target_mod_hit);
}

#[tokio::test]
async fn pause_holds_the_loop_and_resume_finishes() {
    let sim = Arc::new(SimDriver::scripted([
        "+40 to maximum Mana",
        "+41 to maximum Mana",
        "+42 to maximum Mana",
    ]));
    let mut cfg = test_config(3, 1);
    cfg.roll_delay_ms = 100;
    let (handle, bus) = spawn_engine(Some(cfg), &sim, 0, Duration::from_millis(1));
    let mut rx = bus.subscribe();

    handle.start().await.unwrap();
    // Land the pause inside the first inter-roll delay.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handle.pause_toggle().await.unwrap(), SessionState::Paused);

    let paused = handle.status().await.unwrap();
    assert_eq!(paused.state, SessionState::Paused);
    let rolls_at_pause = paused.total_rolls;
    assert!(rolls_at_pause >= 1);

    // Holding: no new rolls arrive while paused.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(handle.status().await.unwrap().total_rolls, rolls_at_pause);

    assert_eq!(handle.pause_toggle().await.unwrap(), SessionState::Running);
    let (_, report) = wait_for_report(&mut rx).await;
    assert_eq!(report.total_rolls, 3);
}

#[tokio::test]
async fn status_after_stop_retains_final_stats() {
    let sim = Arc::new(SimDriver::scripted(["+85 to maximum Life"]));
    let (handle, bus) = spawn_engine(Some(test_config(3, 1)), &sim, 0, Duration::from_millis(1));
    let mut rx = bus.subscribe();

    handle.start().await.unwrap();
    let _ = wait_for_report(&mut rx).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, SessionState::Stopped);
    assert_eq!(status.total_rolls, 1);
    assert_eq!(status.round_history.len(), 1);
    assert!(status.mod_stats.iter().any(|s| s.stat.key == "life"));
}
