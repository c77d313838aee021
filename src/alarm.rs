//! Room-wide hazard countdown.
//!
//! The hazard is started and stopped by server broadcasts, never by the local
//! click alone, so every client in the room walks the same path:
//!
//! ```text
//! Idle ──global_alarm──► Active(max) ──2 s──► Resolving(r) ──global_alarm_stop──► Idle
//!                           │                      │
//!                           └──── r reaches 0 ─────┴──► Expired ──3 s──► Terminal
//! ```
//!
//! [`AlarmMachine`] is the pure transition table. [`AlarmCoordinator`] pairs
//! it with a [`Scheduler`] that drives the countdown, minigame delay and
//! grace period.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::event::GameEvent;
use crate::protocol::PlayerId;
use crate::scheduler::Scheduler;

const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_MINIGAME_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_GRACE: Duration = Duration::from_secs(3);

/// What a `global_alarm` does while the hazard is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetriggerPolicy {
    /// Keep counting down.
    #[default]
    Ignore,
    /// Start over from the full duration.
    Restart,
}

/// Hazard timing.
#[derive(Debug, Clone)]
pub struct AlarmConfig {
    /// Full countdown length. Defaults to **60 s**.
    pub max_duration: Duration,
    /// Countdown step. Defaults to **1 s**.
    pub tick: Duration,
    /// Delay between activation and the minigame opening. Defaults to **2 s**.
    pub minigame_delay: Duration,
    /// Time spent in `Expired` before `Terminal`. Defaults to **3 s**.
    pub grace: Duration,
    pub retrigger: RetriggerPolicy,
}

impl AlarmConfig {
    pub fn new() -> Self {
        Self {
            max_duration: DEFAULT_MAX_DURATION,
            tick: DEFAULT_TICK,
            minigame_delay: DEFAULT_MINIGAME_DELAY,
            grace: DEFAULT_GRACE,
            retrigger: RetriggerPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    #[must_use]
    pub fn with_minigame_delay(mut self, delay: Duration) -> Self {
        self.minigame_delay = delay;
        self
    }

    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub fn with_retrigger(mut self, policy: RetriggerPolicy) -> Self {
        self.retrigger = policy;
        self
    }

    /// Countdown length in ticks.
    pub fn max_ticks(&self) -> u32 {
        let tick = self.tick.as_millis().max(1);
        u32::try_from(self.max_duration.as_millis() / tick).unwrap_or(u32::MAX)
    }

    /// Whole seconds covered by `ticks` countdown steps, rounded up.
    pub fn ticks_to_seconds(&self, ticks: u32) -> u32 {
        let millis = u128::from(ticks) * self.tick.as_millis().max(1);
        u32::try_from(millis.div_ceil(1000)).unwrap_or(u32::MAX)
    }

    /// Countdown steps needed to cover `seconds`, rounded up.
    pub fn seconds_to_ticks(&self, seconds: u32) -> u32 {
        let tick = self.tick.as_millis().max(1);
        u32::try_from((u128::from(seconds) * 1000).div_ceil(tick)).unwrap_or(u32::MAX)
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the hazard is. `remaining` counts ticks, which are seconds with the
/// default [`AlarmConfig::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmPhase {
    Idle,
    /// Counting down, minigame not open yet.
    Active { remaining: u32 },
    /// Counting down with the minigame open.
    Resolving { remaining: u32 },
    /// The countdown hit zero; grace period running.
    Expired,
    /// The run is lost. Held until [`AlarmMachine::reset`].
    Terminal,
}

impl AlarmPhase {
    /// `true` while the countdown is running.
    pub fn is_counting(&self) -> bool {
        matches!(self, Self::Active { .. } | Self::Resolving { .. })
    }

    /// `true` once the countdown reached zero.
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Expired | Self::Terminal)
    }
}

/// The hazard as the UI shows it.
///
/// `active == false` always comes with `remaining_seconds == max`. Seconds are
/// rounded up from the remaining ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmState {
    pub active: bool,
    pub remaining_seconds: u32,
    pub triggered_by: Option<PlayerId>,
}

/// Timer work a transition asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPlan {
    /// Leave running timers alone.
    Keep,
    /// Cancel, then start the tick and, unless the minigame is already
    /// open, a minigame timer firing after `minigame_in`.
    Countdown { minigame_in: Option<Duration> },
    /// Cancel, then start the grace period.
    Grace,
    /// Cancel everything.
    Cancel,
}

/// Pure hazard transition table.
#[derive(Debug, Clone)]
pub struct AlarmMachine {
    config: AlarmConfig,
    max: u32,
    phase: AlarmPhase,
    triggered_by: Option<PlayerId>,
}

impl AlarmMachine {
    pub fn new(config: AlarmConfig) -> Self {
        Self {
            max: config.max_ticks(),
            config,
            phase: AlarmPhase::Idle,
            triggered_by: None,
        }
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    pub fn phase(&self) -> AlarmPhase {
        self.phase
    }

    pub fn state(&self) -> AlarmState {
        let (active, ticks) = match self.phase {
            AlarmPhase::Idle => (false, self.max),
            AlarmPhase::Active { remaining } | AlarmPhase::Resolving { remaining } => {
                (true, remaining)
            }
            AlarmPhase::Expired | AlarmPhase::Terminal => (true, 0),
        };
        AlarmState {
            active,
            remaining_seconds: self.config.ticks_to_seconds(ticks),
            triggered_by: self.triggered_by,
        }
    }

    /// A `global_alarm` broadcast arrived.
    pub fn on_trigger(&mut self, triggered_by: Option<PlayerId>) -> TimerPlan {
        match self.phase {
            AlarmPhase::Idle => {
                self.start(triggered_by);
                self.full_countdown()
            }
            AlarmPhase::Active { .. } | AlarmPhase::Resolving { .. } => {
                if self.config.retrigger == RetriggerPolicy::Restart {
                    self.start(triggered_by);
                    self.full_countdown()
                } else {
                    debug!(?triggered_by, "hazard already running, trigger ignored");
                    TimerPlan::Keep
                }
            }
            AlarmPhase::Expired | AlarmPhase::Terminal => TimerPlan::Keep,
        }
    }

    /// A `global_alarm_stop` broadcast arrived.
    pub fn on_stop(&mut self) -> TimerPlan {
        if self.phase.is_counting() {
            self.go_idle();
            TimerPlan::Cancel
        } else {
            TimerPlan::Keep
        }
    }

    /// One countdown step elapsed.
    pub fn tick(&mut self) -> TimerPlan {
        match self.phase {
            AlarmPhase::Active { remaining } | AlarmPhase::Resolving { remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    warn!("hazard countdown reached zero");
                    self.phase = AlarmPhase::Expired;
                    TimerPlan::Grace
                } else {
                    self.set_remaining(remaining);
                    TimerPlan::Keep
                }
            }
            _ => TimerPlan::Keep,
        }
    }

    /// The minigame delay elapsed.
    pub fn open_minigame(&mut self) -> TimerPlan {
        if let AlarmPhase::Active { remaining } = self.phase {
            self.phase = AlarmPhase::Resolving { remaining };
        }
        TimerPlan::Keep
    }

    /// The grace period after expiry elapsed.
    pub fn grace_elapsed(&mut self) -> TimerPlan {
        if self.phase == AlarmPhase::Expired {
            self.phase = AlarmPhase::Terminal;
            TimerPlan::Cancel
        } else {
            TimerPlan::Keep
        }
    }

    /// Apply an `alarm_state` snapshot (late join, reconnect). `remaining` is
    /// in seconds, as the server sends it.
    ///
    /// A running countdown only moves down, so a snapshot never raises the
    /// remaining time of a hazard already counting locally. A hazard picked up
    /// mid-flight lands in `Resolving` once the time already elapsed covers
    /// the minigame delay; otherwise only the rest of the delay is armed.
    pub fn restore(
        &mut self,
        active: bool,
        remaining: u32,
        triggered_by: Option<PlayerId>,
    ) -> TimerPlan {
        if self.phase.is_lost() {
            return TimerPlan::Keep;
        }
        if !active {
            let was_idle = self.phase == AlarmPhase::Idle;
            self.go_idle();
            return if was_idle {
                TimerPlan::Keep
            } else {
                TimerPlan::Cancel
            };
        }

        let remaining = self.config.seconds_to_ticks(remaining).min(self.max);
        self.triggered_by = triggered_by.or(self.triggered_by);
        if remaining == 0 {
            self.phase = AlarmPhase::Expired;
            return TimerPlan::Grace;
        }
        match self.phase {
            AlarmPhase::Active { remaining: current }
            | AlarmPhase::Resolving { remaining: current } => {
                self.set_remaining(remaining.min(current));
                TimerPlan::Keep
            }
            _ => {
                let elapsed = self.config.tick.saturating_mul(self.max - remaining);
                let minigame_in = self
                    .config
                    .minigame_delay
                    .checked_sub(elapsed)
                    .filter(|rest| !rest.is_zero());
                self.phase = if minigame_in.is_some() {
                    AlarmPhase::Active { remaining }
                } else {
                    AlarmPhase::Resolving { remaining }
                };
                debug!(remaining, ?elapsed, ?minigame_in, "hazard restored");
                TimerPlan::Countdown { minigame_in }
            }
        }
    }

    /// Back to `Idle` from any phase (room exit, rejoin).
    pub fn reset(&mut self) -> TimerPlan {
        self.go_idle();
        TimerPlan::Cancel
    }

    fn start(&mut self, triggered_by: Option<PlayerId>) {
        info!(?triggered_by, remaining = self.max, "hazard started");
        self.phase = AlarmPhase::Active {
            remaining: self.max,
        };
        self.triggered_by = triggered_by;
    }

    fn full_countdown(&self) -> TimerPlan {
        TimerPlan::Countdown {
            minigame_in: Some(self.config.minigame_delay),
        }
    }

    fn go_idle(&mut self) {
        self.phase = AlarmPhase::Idle;
        self.triggered_by = None;
    }

    fn set_remaining(&mut self, remaining: u32) {
        self.phase = match self.phase {
            AlarmPhase::Resolving { .. } => AlarmPhase::Resolving { remaining },
            _ => AlarmPhase::Active { remaining },
        };
    }
}

/// Timer inputs of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmInput {
    Tick,
    OpenMinigame,
    GraceElapsed,
}

/// [`AlarmMachine`] plus its timers.
#[derive(Debug)]
pub struct AlarmCoordinator {
    machine: AlarmMachine,
    timers: Scheduler<AlarmInput>,
}

impl AlarmCoordinator {
    pub fn new(config: AlarmConfig) -> Self {
        Self {
            machine: AlarmMachine::new(config),
            timers: Scheduler::new(),
        }
    }

    pub fn phase(&self) -> AlarmPhase {
        self.machine.phase()
    }

    pub fn state(&self) -> AlarmState {
        self.machine.state()
    }

    /// Feed a game event. Returns the new phase when it changed.
    pub fn handle_event(&mut self, event: &GameEvent) -> Option<AlarmPhase> {
        match event {
            GameEvent::AlarmStarted { triggered_by, .. } => self.on_trigger(*triggered_by),
            GameEvent::AlarmStopped { .. } => self.on_stop(),
            GameEvent::AlarmSnapshot {
                active,
                remaining,
                triggered_by,
            } => self.restore(*active, *remaining, *triggered_by),
            _ => None,
        }
    }

    pub fn on_trigger(&mut self, triggered_by: Option<PlayerId>) -> Option<AlarmPhase> {
        self.step(|m| m.on_trigger(triggered_by))
    }

    pub fn on_stop(&mut self) -> Option<AlarmPhase> {
        self.step(AlarmMachine::on_stop)
    }

    pub fn restore(
        &mut self,
        active: bool,
        remaining: u32,
        triggered_by: Option<PlayerId>,
    ) -> Option<AlarmPhase> {
        self.step(|m| m.restore(active, remaining, triggered_by))
    }

    /// Back to `Idle` and cancel every timer.
    pub fn reset(&mut self) -> Option<AlarmPhase> {
        self.step(AlarmMachine::reset)
    }

    /// Wait for the next timer-driven phase change. Cancel-safe.
    pub async fn next(&mut self) -> AlarmPhase {
        loop {
            let input = self.timers.next().await;
            let changed = self.step(|m| match input {
                AlarmInput::Tick => m.tick(),
                AlarmInput::OpenMinigame => m.open_minigame(),
                AlarmInput::GraceElapsed => m.grace_elapsed(),
            });
            if let Some(phase) = changed {
                return phase;
            }
        }
    }

    fn step(&mut self, f: impl FnOnce(&mut AlarmMachine) -> TimerPlan) -> Option<AlarmPhase> {
        let before = self.machine.phase();
        let plan = f(&mut self.machine);
        self.arm(plan);
        let after = self.machine.phase();
        (before != after || matches!(plan, TimerPlan::Countdown { .. })).then_some(after)
    }

    fn arm(&mut self, plan: TimerPlan) {
        let config = self.machine.config().clone();
        match plan {
            TimerPlan::Keep => {}
            TimerPlan::Countdown { minigame_in } => {
                self.timers.cancel_all();
                self.timers.every(config.tick, AlarmInput::Tick);
                if let Some(delay) = minigame_in {
                    self.timers.after(delay, AlarmInput::OpenMinigame);
                }
            }
            TimerPlan::Grace => {
                self.timers.cancel_all();
                self.timers.after(config.grace, AlarmInput::GraceElapsed);
            }
            TimerPlan::Cancel => self.timers.cancel_all(),
        }
    }
}

impl Default for AlarmCoordinator {
    fn default() -> Self {
        Self::new(AlarmConfig::default())
    }
}
