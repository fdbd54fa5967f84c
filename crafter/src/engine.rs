//! The crafting engine: a single task that owns the session and drives the
//! roll loop.
//!
//! Control arrives as commands on an mpsc channel; each command carries a
//! oneshot for its reply. While a session runs, the loop re-checks the
//! channel at every roll boundary, so pause and stop take effect between
//! rolls, never mid-roll.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TryRecvError;

use crate::config::{ConfigStore, RunConfig};
use crate::driver::{InputDriver, TooltipReader};
use crate::error::CraftError;
use crate::events::{Event, EventBus};
use crate::session::{CraftSession, RoundRecord, SessionState, StatusSnapshot};
use crate::snapshot::SnapshotWriter;

enum Command {
    Start { reply: oneshot::Sender<Result<(), CraftError>> },
    PauseToggle { reply: oneshot::Sender<Result<SessionState, CraftError>> },
    Stop { reply: oneshot::Sender<Result<(), CraftError>> },
    Status { reply: oneshot::Sender<StatusSnapshot> },
}

/// Whether the session keeps going after a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// How one item ended.
enum ItemOutcome {
    /// A roll satisfied a target rule.
    Success { name: String, value: i64 },
    /// The roll budget ran out without a hit.
    Exhausted,
    /// A driver call failed or timed out; the item is left where it is.
    Aborted(String),
    /// Stop arrived mid-item.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Seconds counted down before rolling starts (and after a resume).
    pub countdown_secs: u32,
    /// Real duration of one countdown tick. Tests shrink this.
    pub countdown_tick: Duration,
    /// Where debug snapshots land.
    pub snapshots_dir: std::path::PathBuf,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            countdown_secs: 5,
            countdown_tick: Duration::from_secs(1),
            snapshots_dir: std::env::temp_dir().join("crafter-snapshots"),
        }
    }
}

/// Cloneable handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub async fn start(&self) -> Result<(), CraftError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Start { reply }).await.map_err(|_| CraftError::Unavailable)?;
        rx.await.map_err(|_| CraftError::Unavailable)?
    }

    /// Toggle pause; resolves to the state the session ended up in.
    pub async fn pause_toggle(&self) -> Result<SessionState, CraftError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::PauseToggle { reply })
            .await
            .map_err(|_| CraftError::Unavailable)?;
        rx.await.map_err(|_| CraftError::Unavailable)?
    }

    pub async fn stop(&self) -> Result<(), CraftError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Stop { reply }).await.map_err(|_| CraftError::Unavailable)?;
        rx.await.map_err(|_| CraftError::Unavailable)?
    }

    pub async fn status(&self) -> Result<StatusSnapshot, CraftError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Status { reply }).await.map_err(|_| CraftError::Unavailable)?;
        rx.await.map_err(|_| CraftError::Unavailable)
    }
}

/// Spawn the engine task and return its handle.
pub fn spawn(
    store: Arc<ConfigStore>,
    bus: EventBus,
    input: Arc<dyn InputDriver>,
    reader: Arc<dyn TooltipReader>,
    opts: EngineOptions,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel(32);
    let engine = Engine {
        rx,
        store,
        bus,
        input,
        reader,
        opts,
        state: SessionState::Idle,
        session: None,
        snapshots: None,
        resume_pending: false,
    };
    tokio::spawn(engine.run());
    EngineHandle { tx }
}

struct Engine {
    rx: mpsc::Receiver<Command>,
    store: Arc<ConfigStore>,
    bus: EventBus,
    input: Arc<dyn InputDriver>,
    reader: Arc<dyn TooltipReader>,
    opts: EngineOptions,
    state: SessionState,
    /// Retained after stop so status keeps answering with final stats.
    session: Option<CraftSession>,
    snapshots: Option<SnapshotWriter>,
    /// Set when a pause toggle resumed the session; the next checkpoint
    /// runs the resume countdown before rolling continues.
    resume_pending: bool,
}

impl Engine {
    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            // Only idle and stopped are legal here; anything else means the
            // state machine leaked out of drive_session.
            if !matches!(self.state, SessionState::Idle | SessionState::Stopped) {
                tracing::error!(state = %self.state, "session state corrupted between sessions; resetting");
                self.session = None;
                self.set_state(SessionState::Idle);
            }

            match cmd {
                Command::Start { reply } => match self.prepare_session() {
                    Ok(run) => {
                        let _ = reply.send(Ok(()));
                        if let Err(err) = self.drive_session(&run).await {
                            tracing::error!(error = %err, "session aborted; resetting to idle");
                            self.session = None;
                            self.set_state(SessionState::Idle);
                        }
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                },
                Command::Status { reply } => {
                    let _ = reply.send(self.status_snapshot());
                }
                Command::Stop { reply } => {
                    let _ = reply.send(Err(CraftError::InvalidTransition {
                        action: "stop",
                        state: self.state,
                    }));
                }
                Command::PauseToggle { reply } => {
                    let _ = reply.send(Err(CraftError::InvalidTransition {
                        action: "pause",
                        state: self.state,
                    }));
                }
            }
        }
    }

    fn prepare_session(&mut self) -> Result<RunConfig, CraftError> {
        let cfg = self
            .store
            .get()
            .ok_or_else(|| CraftError::Config("no config found".into()))?;
        let run = RunConfig::from_config(&cfg)?;

        self.session = Some(CraftSession::new(
            run.language,
            run.targets.clone(),
            run.rolls_per_item,
        ));
        self.snapshots = run
            .save_snapshots
            .then(|| SnapshotWriter::new(self.opts.snapshots_dir.clone()));
        self.resume_pending = false;
        Ok(run)
    }

    async fn drive_session(&mut self, run: &RunConfig) -> Result<(), CraftError> {
        self.set_state(SessionState::Countdown);
        if self.countdown_wait(self.opts.countdown_secs).await? == Flow::Stop {
            return self.finish_session();
        }

        self.set_state(SessionState::Running);
        self.batch_loop(run).await?;
        self.finish_session()
    }

    /// Emit the final report and settle in `stopped`. The session object is
    /// kept so status queries keep returning the final numbers.
    fn finish_session(&mut self) -> Result<(), CraftError> {
        let report = self.session()?.report();
        tracing::info!(
            total_rolls = report.total_rolls,
            target_hit = report.target_mod_hit,
            "session ended"
        );
        self.bus.emit(Event::SessionEnded { report });
        self.set_state(SessionState::Stopped);
        self.snapshots = None;
        Ok(())
    }

    /// Process items until capacity runs out or stop arrives.
    async fn batch_loop(&mut self, run: &RunConfig) -> Result<Flow, CraftError> {
        for slot in 0..run.batch_capacity() {
            if self.checkpoint().await? == Flow::Stop {
                return Ok(Flow::Stop);
            }

            let item_number = (slot + 1) as u32;
            let pending = run.pending_slots[slot];
            let result = run.result_slots[slot];
            {
                let session = self.session_mut()?;
                session.item_number = item_number;
                session.attempt_num = 0;
            }
            self.bus.emit(Event::ItemStarted {
                item_number,
                pending_x: pending.x,
                pending_y: pending.y,
            });

            // Bring the item onto the workbench.
            let input = Arc::clone(&self.input);
            let to = run.workbench_px;
            if let Err(err) = self
                .input_call(run.input_timeout, move || input.move_item(pending, to))
                .await
            {
                self.abort_item(item_number, pending, err.to_string());
                continue;
            }

            match self.craft_item(run).await? {
                ItemOutcome::Stopped => return Ok(Flow::Stop),
                ItemOutcome::Aborted(reason) => {
                    self.abort_item(item_number, run.workbench_px, reason);
                }
                outcome @ (ItemOutcome::Success { .. } | ItemOutcome::Exhausted) => {
                    let input = Arc::clone(&self.input);
                    let from = run.workbench_px;
                    if let Err(err) = self
                        .input_call(run.input_timeout, move || input.move_item(from, result))
                        .await
                    {
                        self.abort_item(item_number, from, err.to_string());
                        continue;
                    }

                    let (success, name, value) = match outcome {
                        ItemOutcome::Success { name, value } => (true, Some(name), Some(value)),
                        _ => (false, None, None),
                    };
                    self.session_mut()?.round_history.push(RoundRecord {
                        item_number,
                        success,
                        target_mod_name: name,
                        target_value: value,
                        error: None,
                    });
                    self.bus.emit(Event::ItemCompleted {
                        item_number,
                        success,
                        result_x: result.x,
                        result_y: result.y,
                    });
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Record a failed round without moving the item out.
    fn abort_item(&mut self, item_number: u32, at: grid::Point, reason: String) {
        tracing::warn!(item_number, error = %reason, "item aborted");
        if let Some(session) = self.session.as_mut() {
            session.round_history.push(RoundRecord {
                item_number,
                success: false,
                target_mod_name: None,
                target_value: None,
                error: Some(reason),
            });
        }
        self.bus.emit(Event::ItemCompleted {
            item_number,
            success: false,
            result_x: at.x,
            result_y: at.y,
        });
    }

    /// Roll the workbench item until a target hits, the budget runs out,
    /// stop arrives, or a driver call fails.
    async fn craft_item(&mut self, run: &RunConfig) -> Result<ItemOutcome, CraftError> {
        for attempt in 1..=run.rolls_per_item {
            if self.checkpoint().await? == Flow::Stop {
                return Ok(ItemOutcome::Stopped);
            }

            match self.roll_once(run, attempt).await {
                Ok(Some((name, value))) => return Ok(ItemOutcome::Success { name, value }),
                Ok(None) => {}
                // Driver trouble costs the item, not the session.
                Err(
                    err @ (CraftError::CaptureTimeout(_)
                    | CraftError::InputTimeout(_)
                    | CraftError::Driver(_)),
                ) => return Ok(ItemOutcome::Aborted(err.to_string())),
                Err(err) => return Err(err),
            }

            if attempt < run.rolls_per_item
                && self.controllable_sleep(run.roll_delay).await? == Flow::Stop
            {
                return Ok(ItemOutcome::Stopped);
            }
        }
        Ok(ItemOutcome::Exhausted)
    }

    /// One roll: apply a consumable, read the tooltip, feed the stats, and
    /// check the targets against the fresh observations.
    async fn roll_once(
        &mut self,
        run: &RunConfig,
        attempt: u32,
    ) -> Result<Option<(String, i64)>, CraftError> {
        self.session_mut()?.attempt_num = attempt;

        let input = Arc::clone(&self.input);
        let (orb, item) = (run.consumable_px, run.workbench_px);
        self.input_call(run.input_timeout, move || input.apply_consumable(orb, item))
            .await?;

        let reader = Arc::clone(&self.reader);
        let (region, language) = (run.tooltip_rect, run.language);
        let text = self
            .capture_call(run.capture_timeout, move || {
                reader.read_region(region, language)
            })
            .await?;

        let timestamp = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        self.bus.emit(Event::TooltipCaptured { timestamp });

        let item_number = self.session()?.item_number;
        self.write_snapshot(item_number, attempt, &text);

        let observations = mods::extract_observations(&text, run.language);
        let (total_rolls, rolls_per_min, mod_stats) = {
            let session = self.session_mut()?;
            session.aggregator.record_roll(observations);
            let snap = session.aggregator.snapshot();
            (snap.total_rolls, session.rolls_per_min(), snap.stats)
        };

        self.bus.emit(Event::RollAttempted {
            attempt_num: attempt,
            max_attempts: run.rolls_per_item,
            total_rolls,
            rolls_per_min,
        });
        self.bus.emit(Event::ModsTracked {
            ocr_text: text,
            mod_stats,
            total_rolls,
        });

        let hit = {
            let session = self.session()?;
            run.targets.iter().find_map(|target| {
                session
                    .aggregator
                    .last_roll()
                    .iter()
                    .find(|obs| obs.key == target.key && obs.value >= target.min_value)
                    .map(|obs| (mods::display_name(&obs.key, run.language), obs.value))
            })
        };

        if let Some((name, value)) = &hit {
            let session = self.session_mut()?;
            if session.target_hit.is_none() {
                session.target_hit = Some((name.clone(), *value));
            }
            self.bus.emit(Event::TargetFound {
                mod_name: name.clone(),
                value: *value,
                attempt_num: attempt,
                total_rolls,
            });
            tracing::info!(mod_name = %name, value, attempt, "target mod found");
        }
        Ok(hit)
    }

    fn write_snapshot(&mut self, item_number: u32, attempt: u32, text: &str) {
        let Some(writer) = self.snapshots.as_mut() else {
            return;
        };
        let step_name = format!("item{item_number}_roll{attempt}");
        match writer.write(&step_name, text) {
            Ok(filename) => self.bus.emit(Event::SnapshotUpdated {
                filename,
                step_name,
                item_number,
            }),
            Err(err) => tracing::warn!(error = %err, "snapshot write failed"),
        }
    }

    /// Drain pending control commands, park while paused, and run the
    /// resume countdown when coming back. Call at every roll boundary.
    async fn checkpoint(&mut self) -> Result<Flow, CraftError> {
        loop {
            loop {
                match self.rx.try_recv() {
                    Ok(cmd) => {
                        if self.apply_control(cmd) == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Ok(Flow::Stop),
                }
            }

            if self.state == SessionState::Paused {
                match self.rx.recv().await {
                    Some(cmd) => {
                        if self.apply_control(cmd) == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                    }
                    None => return Ok(Flow::Stop),
                }
                continue;
            }

            if self.resume_pending {
                self.resume_pending = false;
                if self.countdown_wait(self.opts.countdown_secs).await? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
                // Re-check: a pause may have landed during the countdown.
                continue;
            }

            return Ok(Flow::Continue);
        }
    }

    /// Count down `secs` one tick at a time, staying responsive to control.
    async fn countdown_wait(&mut self, secs: u32) -> Result<Flow, CraftError> {
        for seconds_left in (1..=secs).rev() {
            self.bus.emit(Event::CraftCountdown { seconds_left });
            if self.controllable_sleep(self.opts.countdown_tick).await? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Sleep while still answering control commands.
    async fn controllable_sleep(&mut self, duration: Duration) -> Result<Flow, CraftError> {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(Flow::Continue),
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.apply_control(cmd) == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                        // A pause taken here holds at the next checkpoint.
                        if self.state == SessionState::Paused {
                            return Ok(Flow::Continue);
                        }
                    }
                    None => return Ok(Flow::Stop),
                },
            }
        }
    }

    /// Handle one control command against the current state.
    fn apply_control(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Start { reply } => {
                let _ = reply.send(Err(CraftError::AlreadyRunning));
                Flow::Continue
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status_snapshot());
                Flow::Continue
            }
            Command::Stop { reply } => {
                let _ = reply.send(Ok(()));
                Flow::Stop
            }
            Command::PauseToggle { reply } => match self.state {
                SessionState::Running => {
                    self.set_state(SessionState::Paused);
                    let _ = reply.send(Ok(SessionState::Paused));
                    Flow::Continue
                }
                SessionState::Paused => {
                    // State flips immediately; the checkpoint runs the
                    // resume countdown before the next roll.
                    self.resume_pending = true;
                    self.set_state(SessionState::Running);
                    let _ = reply.send(Ok(SessionState::Running));
                    Flow::Continue
                }
                state => {
                    let _ = reply.send(Err(CraftError::InvalidTransition {
                        action: "pause",
                        state,
                    }));
                    Flow::Continue
                }
            },
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "state change");
        }
        self.state = state;
        self.bus.emit(Event::StateChange { state });
    }

    fn status_snapshot(&self) -> StatusSnapshot {
        match &self.session {
            Some(session) => StatusSnapshot {
                state: self.state,
                item_number: session.item_number,
                attempt_num: session.attempt_num,
                max_attempts: session.max_attempts_for_item,
                total_rolls: session.aggregator.total_rolls(),
                rolls_per_min: session.rolls_per_min(),
                target_mods: session.target_mods.clone(),
                mod_stats: session.stats_view(),
                round_history: session.round_history.clone(),
            },
            None => StatusSnapshot::idle(self.state),
        }
    }

    fn session(&self) -> Result<&CraftSession, CraftError> {
        self.session
            .as_ref()
            .ok_or(CraftError::Internal("no active session"))
    }

    fn session_mut(&mut self) -> Result<&mut CraftSession, CraftError> {
        self.session
            .as_mut()
            .ok_or(CraftError::Internal("no active session"))
    }

    /// Run a blocking input call under the configured budget.
    async fn input_call<F>(&self, budget: Duration, f: F) -> Result<(), CraftError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        match tokio::time::timeout(budget, tokio::task::spawn_blocking(f)).await {
            Err(_) => Err(CraftError::InputTimeout(budget)),
            Ok(Err(join)) => Err(CraftError::Driver(anyhow::Error::new(join))),
            Ok(Ok(result)) => result.map_err(CraftError::Driver),
        }
    }

    /// Run a blocking capture call under the configured budget.
    async fn capture_call<F>(&self, budget: Duration, f: F) -> Result<String, CraftError>
    where
        F: FnOnce() -> anyhow::Result<String> + Send + 'static,
    {
        match tokio::time::timeout(budget, tokio::task::spawn_blocking(f)).await {
            Err(_) => Err(CraftError::CaptureTimeout(budget)),
            Ok(Err(join)) => Err(CraftError::Driver(anyhow::Error::new(join))),
            Ok(Ok(result)) => result.map_err(CraftError::Driver),
        }
    }
}
