//! Driver lifecycle and the contexts that feed it
//!
//! Tasks spawned by [`Driver::start`]:
//!
//! - edge pump: receives button edges and calls the trigger path
//! - commit timer: sleeps until the session deadline and commits on expiry
//! - deferred worker: takes committed counts from the dispatch slot and
//!   drives the LED lines
//!
//! Locking: the LED bank (`tokio::sync::Mutex`) is always taken before the
//! fast state (`parking_lot::Mutex`). The trigger and timer contexts only
//! take the fast state and never touch lines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pressled_line::{EdgeDetect, InputLine, Level, LineProvider};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::DriverConfig;
use crate::debounce::DebounceFilter;
use crate::dispatch::{DispatchResult, DispatchSlot, DispatchStats};
use crate::error::ControlError;
use crate::led::{LedBank, LedSlot, LedState};
use crate::session::{CommitReason, PressOutcome, PressSession, PressTracker};
use crate::state::{Commit, DriverEvent, FastState, StatusSnapshot};
use crate::surface::{
    AggregateEndpoint, ButtonEndpoint, ControlCommand, ControlSurface, DeviceHandle, EndpointId,
    LedEndpoint,
};

/// Capacity of the driver event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// State shared between the driver tasks and the endpoints
pub(crate) struct Shared {
    config: DriverConfig,
    tracker: PressTracker,
    fast: Mutex<FastState>,
    bank: tokio::sync::Mutex<LedBank>,
    led_names: Vec<String>,
    slot: DispatchSlot<Commit>,
    timer_wake: Notify,
    button: Mutex<Option<Box<dyn InputLine>>>,
    pressed_level: Level,
    events: broadcast::Sender<DriverEvent>,
    accepting: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    pub(crate) fn led_names(&self) -> &[String] {
        &self.led_names
    }

    fn emit(&self, event: DriverEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn ensure_running(&self) -> Result<(), ControlError> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ControlError::ShutDown)
        }
    }

    fn button_held(&self) -> bool {
        let button = self.button.lock();
        match button.as_ref().map(|line| line.level()) {
            Some(Ok(level)) => level == self.pressed_level,
            Some(Err(e)) => {
                warn!("Button level read failed: {}", e);
                false
            }
            None => false,
        }
    }

    // === Trigger context ===

    /// Feed one press edge observed at `now`
    ///
    /// Never blocks and never touches lines.
    pub(crate) fn trigger(&self, now: Instant) -> Option<PressOutcome> {
        if !self.accepting.load(Ordering::Acquire) {
            return None;
        }

        let (outcome, dispatched) = {
            let mut fast = self.fast.lock();
            if !fast.debounce.accept_edge(now) {
                drop(fast);
                trace!("Edge rejected by debounce");
                return None;
            }
            fast.press_seq += 1;
            let outcome = self.tracker.on_accepted_press(&mut fast.session, now);
            let dispatched = match outcome {
                PressOutcome::Commit { count, .. } => Some(self.slot.dispatch(fast.commit(count))),
                PressOutcome::Armed { .. } => None,
            };
            (outcome, dispatched)
        };
        self.timer_wake.notify_one();

        match outcome {
            PressOutcome::Armed { count, .. } => {
                debug!("Press accepted, count={}", count);
                self.emit(DriverEvent::PressAccepted { count });
            }
            PressOutcome::Commit { count, reason } => {
                debug!("Press accepted, count={} ({}), committing", count, reason);
                self.emit(DriverEvent::PressAccepted { count });
                self.emit(DriverEvent::Committed { count, reason });
            }
        }
        if let Some(result) = dispatched {
            self.log_dispatch(result);
        }
        Some(outcome)
    }

    // === Timer context ===

    fn expire(&self, now: Instant) {
        let committed = {
            let mut fast = self.fast.lock();
            self.tracker
                .on_deadline_expired(&mut fast.session, now)
                .map(|count| (count, self.slot.dispatch(fast.commit(count))))
        };
        if let Some((count, result)) = committed {
            debug!("Session timed out, count={}", count);
            self.emit(DriverEvent::Committed {
                count,
                reason: CommitReason::Timeout,
            });
            self.log_dispatch(result);
        }
    }

    fn log_dispatch(&self, result: DispatchResult<Commit>) {
        match result {
            DispatchResult::Queued => {}
            DispatchResult::Coalesced(previous) => {
                warn!("Pending press count {} replaced before it was applied", previous.count)
            }
            DispatchResult::Closed => warn!("Commit arrived after shutdown began, dropped"),
        }
    }

    // === Deferred context ===

    async fn apply_committed(&self, commit: Commit) {
        let Commit { count, generation } = commit;
        let target = LedState::for_press_count(count, self.led_names.len());
        let mut bank = self.bank.lock().await;
        // A reset may have run while this commit waited for the bank
        if self.fast.lock().reset_gen != generation {
            warn!("Reset superseded press count {}, not applied", count);
            return;
        }
        match bank.apply(target) {
            Ok(state) => {
                info!("Press count {}: {}", count, state.describe(&self.led_names));
                self.emit(DriverEvent::Applied { count, state });
            }
            Err(e) => warn!("Failed to apply press count {}: {}", count, e),
        }
    }

    // === Client context ===

    /// Consistent snapshot; does not consume the pressed flag
    pub(crate) async fn snapshot(&self) -> Result<StatusSnapshot, ControlError> {
        self.ensure_running()?;
        let bank = self.bank.lock().await;
        Ok(self.snapshot_locked(&bank))
    }

    fn snapshot_locked(&self, bank: &LedBank) -> StatusSnapshot {
        let button_held = self.button_held();
        let fast = self.fast.lock();
        StatusSnapshot {
            led_state: bank.state(),
            led_mask: bank.mask(),
            button_pressed: fast.pressed_latch(),
            button_held,
            press_count: fast.session.count,
            press_seq: fast.press_seq,
        }
    }

    pub(crate) fn consume_pressed(&self, snap: &StatusSnapshot) {
        self.fast.lock().consume_through(snap.press_seq);
    }

    /// Direct LED command, independent per LED
    pub(crate) async fn led_command(
        &self,
        endpoint: EndpointId,
        command: ControlCommand,
    ) -> Result<LedState, ControlError> {
        self.ensure_running()?;
        let mut bank = self.bank.lock().await;
        let state = match (endpoint, command) {
            (EndpointId::Led(i), ControlCommand::TurnOn) => bank.set_led(i, true)?,
            (EndpointId::Led(i), ControlCommand::TurnOff) => bank.set_led(i, false)?,
            (EndpointId::Led(i), ControlCommand::Toggle) => bank.toggle_led(i)?,
            (EndpointId::AllLeds, ControlCommand::TurnOn) => bank.set_all(true)?,
            (EndpointId::AllLeds, ControlCommand::TurnOff) => bank.set_all(false)?,
            (EndpointId::AllLeds, ControlCommand::Toggle) => bank.toggle_all()?,
            _ => {
                return Err(ControlError::UnsupportedOperation(format!(
                    "{command:?} on {endpoint}"
                )))
            }
        };
        drop(bank);

        debug!("{} {:?} -> {:?}", endpoint, command, state);
        self.emit(DriverEvent::Commanded {
            endpoint,
            command,
            state,
        });
        Ok(state)
    }

    /// Clear the session, drop any pending or in-flight commit, turn every
    /// LED off
    pub(crate) async fn reset(&self) -> Result<(), ControlError> {
        self.ensure_running()?;
        let mut bank = self.bank.lock().await;
        self.reset_locked(&mut bank)
    }

    fn reset_locked(&self, bank: &mut LedBank) -> Result<(), ControlError> {
        bank.apply(LedState::AllOff)?;
        let discarded = {
            let mut fast = self.fast.lock();
            fast.session = PressSession::default();
            fast.reset_gen += 1;
            self.slot.discard()
        };
        self.timer_wake.notify_one();

        if let Some(commit) = discarded {
            warn!("Reset discarded pending press count {}", commit.count);
        }
        info!("Button state reset");
        self.emit(DriverEvent::Reset);
        Ok(())
    }
}

async fn edge_pump(shared: Arc<Shared>, mut edges: broadcast::Receiver<pressled_line::EdgeEvent>) {
    loop {
        match edges.recv().await {
            Ok(event) => {
                shared.trigger(event.timestamp);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Edge receiver lagged, {} edges lost", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Edge stream closed");
                break;
            }
        }
    }
}

async fn commit_timer(shared: Arc<Shared>) {
    loop {
        let deadline = shared.fast.lock().session.deadline;
        match deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => shared.expire(Instant::now()),
                    _ = shared.timer_wake.notified() => {}
                }
            }
            None => shared.timer_wake.notified().await,
        }
    }
}

async fn deferred_worker(shared: Arc<Shared>) {
    while let Some(commit) = shared.slot.next().await {
        shared.apply_committed(commit).await;
    }
    debug!("Deferred worker stopped");
}

struct DriverTasks {
    edge_pump: JoinHandle<()>,
    commit_timer: JoinHandle<()>,
    deferred: JoinHandle<()>,
}

/// One button, its press session, and the LEDs it drives
pub struct Driver {
    shared: Arc<Shared>,
    endpoints: Vec<Arc<dyn ControlSurface>>,
    tasks: Mutex<Option<DriverTasks>>,
}

impl Driver {
    /// Acquire the lines and spawn the driver tasks
    ///
    /// Fails with `HardwareUnavailable` if any line can't be acquired; lines
    /// acquired before the failure are released again.
    pub async fn start(
        provider: &dyn LineProvider,
        config: DriverConfig,
    ) -> Result<Self, ControlError> {
        config.validate()?;

        let mut slots = Vec::with_capacity(config.leds.len());
        for (index, led) in config.leds.iter().enumerate() {
            let line = provider
                .request_output(led.offset, &config.consumer, Level::Low)
                .map_err(|source| ControlError::HardwareUnavailable {
                    line: format!("{} (line {})", led.name, led.offset),
                    source,
                })?;
            slots.push(LedSlot::new(index, led.name.clone(), line));
        }

        let (detect, pressed_level) = if config.button.active_low {
            (EdgeDetect::Falling, Level::Low)
        } else {
            (EdgeDetect::Rising, Level::High)
        };
        let button = provider
            .request_input(config.button.offset, &config.consumer, detect)
            .map_err(|source| ControlError::HardwareUnavailable {
                line: format!("button (line {})", config.button.offset),
                source,
            })?;
        let edges = button.subscribe_edges();

        let led_names: Vec<String> = config.leds.iter().map(|l| l.name.clone()).collect();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            tracker: PressTracker::new(config.multi_press_timeout, config.max_presses),
            fast: Mutex::new(FastState::new(DebounceFilter::new(config.debounce))),
            bank: tokio::sync::Mutex::new(LedBank::new(slots)),
            led_names: led_names.clone(),
            slot: DispatchSlot::new(),
            timer_wake: Notify::new(),
            button: Mutex::new(Some(button)),
            pressed_level,
            events,
            accepting: AtomicBool::new(true),
            running: AtomicBool::new(true),
            config,
        });

        let mut endpoints: Vec<Arc<dyn ControlSurface>> = led_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Arc::new(LedEndpoint::new(i, name.clone(), Arc::clone(&shared)))
                    as Arc<dyn ControlSurface>
            })
            .collect();
        endpoints.push(Arc::new(ButtonEndpoint::new(Arc::clone(&shared))));
        endpoints.push(Arc::new(AggregateEndpoint::new(
            led_names,
            Arc::clone(&shared),
        )));

        let tasks = DriverTasks {
            edge_pump: tokio::spawn(edge_pump(Arc::clone(&shared), edges)),
            commit_timer: tokio::spawn(commit_timer(Arc::clone(&shared))),
            deferred: tokio::spawn(deferred_worker(Arc::clone(&shared))),
        };

        info!(
            "Driver started on {}: {} LEDs, button on line {}",
            provider.chip_name(),
            shared.led_names.len(),
            shared.config.button.offset
        );

        Ok(Self {
            shared,
            endpoints,
            tasks: Mutex::new(Some(tasks)),
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    /// Feed a press edge directly, bypassing the button line
    pub fn trigger(&self, now: Instant) -> Option<PressOutcome> {
        self.shared.trigger(now)
    }

    /// Every endpoint, LEDs first
    pub fn endpoints(&self) -> Vec<EndpointId> {
        self.endpoints.iter().map(|e| e.id()).collect()
    }

    pub fn led_names(&self) -> &[String] {
        self.shared.led_names()
    }

    pub fn surface(&self, id: EndpointId) -> Result<Arc<dyn ControlSurface>, ControlError> {
        self.endpoints
            .iter()
            .find(|e| e.id() == id)
            .cloned()
            .ok_or_else(|| ControlError::NoSuchEndpoint(id.to_string()))
    }

    /// Open a handle with its own read offset
    pub fn open(&self, id: EndpointId) -> Result<DeviceHandle, ControlError> {
        self.shared.ensure_running()?;
        Ok(DeviceHandle::new(self.surface(id)?))
    }

    pub fn open_by_name(&self, name: &str) -> Result<DeviceHandle, ControlError> {
        self.open(name.parse()?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot without consuming the pressed flag
    pub async fn status(&self) -> Result<StatusSnapshot, ControlError> {
        self.shared.snapshot().await
    }

    /// Live press session
    pub fn session(&self) -> PressSession {
        self.shared.fast.lock().session
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.shared.slot.stats()
    }

    /// Snapshot plus the LED line levels read back under the same bank lock
    ///
    /// The second value has bit i set when LED i's line is driven high.
    pub async fn status_with_lines(&self) -> Result<(StatusSnapshot, u8), ControlError> {
        self.shared.ensure_running()?;
        let bank = self.shared.bank.lock().await;
        let levels = bank.read_back()?;
        Ok((self.shared.snapshot_locked(&bank), levels))
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Stop every context and release the lines
    ///
    /// An LED mutation already in progress finishes; a commit not yet taken
    /// by the worker is discarded. Calling this twice is a no-op.
    pub async fn shutdown(&self) {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else {
            return;
        };
        info!("Driver shutting down");

        self.shared.accepting.store(false, Ordering::Release);
        tasks.edge_pump.abort();
        let _ = tasks.edge_pump.await;

        tasks.commit_timer.abort();
        let _ = tasks.commit_timer.await;
        self.shared.fast.lock().session = PressSession::default();

        if let Some(commit) = self.shared.slot.close() {
            warn!("Discarding press count {} that was never applied", commit.count);
        }
        if let Err(e) = tasks.deferred.await {
            warn!("Deferred worker ended abnormally: {}", e);
        }

        self.shared.running.store(false, Ordering::Release);
        self.shared.bank.lock().await.release();
        self.shared.button.lock().take();
        info!("Driver stopped");
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            debug!("Driver dropped without shutdown, aborting tasks");
            tasks.edge_pump.abort();
            tasks.commit_timer.abort();
            tasks.deferred.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressled_line::SimChip;
    use std::time::Duration;

    async fn start_single_press() -> (SimChip, Driver) {
        let chip = SimChip::new("sim0");
        let config = DriverConfig {
            debounce: Duration::ZERO,
            max_presses: 1,
            ..DriverConfig::default()
        };
        let driver = Driver::start(&chip, config).await.unwrap();
        (chip, driver)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_supersedes_commit_waiting_for_bank() {
        let (chip, driver) = start_single_press().await;
        let shared = Arc::clone(&driver.shared);
        let mut events = driver.subscribe();

        // Hold the bank as a reset in progress would
        let mut bank = shared.bank.lock().await;
        assert!(matches!(
            shared.trigger(Instant::now()),
            Some(PressOutcome::Commit { count: 1, .. })
        ));
        // Worker takes the commit and queues on the bank lock
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(shared.slot.take(), None);

        shared.reset_locked(&mut bank).unwrap();
        drop(bank);
        tokio::time::sleep(Duration::from_millis(50)).await;

        for led in &driver.config().leds {
            assert!(!chip.level(led.offset).is_high(), "{} lit after reset", led.name);
        }
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&DriverEvent::Reset));
        assert!(
            !seen.iter().any(|e| matches!(e, DriverEvent::Applied { .. })),
            "{seen:?}"
        );
        assert_eq!(driver.status().await.unwrap().led_state, LedState::AllOff);

        // Commits after the reset apply normally
        shared.trigger(Instant::now());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(driver.status().await.unwrap().led_state, LedState::Slot(0));
        assert!(chip.level(17).is_high());

        driver.shutdown().await;
    }
}
