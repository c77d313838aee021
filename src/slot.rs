//! Four-column letter slot machine that unlocks the hazard stop.
//!
//! Every column spins from `A`, one letter per tick. Clicking a spinning
//! column freezes it. With all four frozen the word is checked against the
//! target: a match solves the machine once; a mismatch resets every column
//! after a short delay. Letter animation is local to each client; only the
//! outcome (a `stop_alarm`) is shared.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::scheduler::Scheduler;

/// Number of columns.
pub const COLUMNS: usize = 4;

const LETTERS: u8 = 26;
/// Unlock word used when none is configured.
pub const DEFAULT_TARGET: &str = "STOP";
const DEFAULT_TICK: Duration = Duration::from_millis(500);
const DEFAULT_RESET_DELAY: Duration = Duration::from_secs(1);

/// One column of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    offset: u8,
    spinning: bool,
}

impl Column {
    fn fresh() -> Self {
        Self {
            offset: 0,
            spinning: true,
        }
    }

    /// The letter currently shown.
    pub fn letter(&self) -> char {
        char::from(b'A' + self.offset % LETTERS)
    }

    pub fn is_spinning(&self) -> bool {
        self.spinning
    }
}

/// Result of freezing the last column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    Solved,
    Failed,
}

/// Where the machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Playing,
    /// Wrong word; every column restarts after the reset delay.
    ResetPending,
    /// Right word. Terminal.
    Solved,
}

/// A validated four-letter target word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWord([u8; COLUMNS]);

impl TargetWord {
    /// Parse a word of exactly four ASCII letters. Lowercase is accepted.
    ///
    /// ```
    /// use escape_sync_client::slot::TargetWord;
    ///
    /// assert_eq!(TargetWord::parse("stop").unwrap().to_string(), "STOP");
    /// assert!(TargetWord::parse("ST0P").is_err());
    /// assert!(TargetWord::parse("STOPS").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidTarget`] for anything else.
    pub fn parse(word: &str) -> Result<Self> {
        let invalid = || SyncError::InvalidTarget(word.to_string());
        let bytes = word.as_bytes();
        if bytes.len() != COLUMNS {
            return Err(invalid());
        }
        let mut offsets = [0u8; COLUMNS];
        for (slot, byte) in offsets.iter_mut().zip(bytes) {
            if !byte.is_ascii_alphabetic() {
                return Err(invalid());
            }
            *slot = byte.to_ascii_uppercase() - b'A';
        }
        Ok(Self(offsets))
    }
}

impl fmt::Display for TargetWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for offset in self.0 {
            write!(f, "{}", char::from(b'A' + offset))?;
        }
        Ok(())
    }
}

/// Pure slot machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMachine {
    target: TargetWord,
    columns: [Column; COLUMNS],
    phase: SlotPhase,
}

impl SlotMachine {
    pub fn new(target: TargetWord) -> Self {
        Self {
            target,
            columns: [Column::fresh(); COLUMNS],
            phase: SlotPhase::Playing,
        }
    }

    pub fn columns(&self) -> &[Column; COLUMNS] {
        &self.columns
    }

    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    pub fn target(&self) -> TargetWord {
        self.target
    }

    /// The letters currently shown, left to right.
    pub fn letters(&self) -> String {
        self.columns.iter().map(Column::letter).collect()
    }

    /// Advance every spinning column by one letter. Returns `true` if any
    /// column moved.
    pub fn tick(&mut self) -> bool {
        if self.phase != SlotPhase::Playing {
            return false;
        }
        let mut moved = false;
        for column in self.columns.iter_mut().filter(|c| c.spinning) {
            column.offset = (column.offset + 1) % LETTERS;
            moved = true;
        }
        moved
    }

    /// Freeze column `index`.
    ///
    /// Returns the outcome when this click froze the last spinning column.
    /// Clicks on a frozen column, or while the machine is not playing, do
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`SyncError::ColumnOutOfRange`] when `index >= COLUMNS`.
    pub fn click(&mut self, index: usize) -> Result<Option<SlotOutcome>> {
        let column = self
            .columns
            .get_mut(index)
            .ok_or(SyncError::ColumnOutOfRange(index))?;
        if self.phase != SlotPhase::Playing || !column.spinning {
            return Ok(None);
        }
        column.spinning = false;
        debug!(index, letter = %column.letter(), "column stopped");

        if self.columns.iter().any(|c| c.spinning) {
            return Ok(None);
        }
        Ok(Some(self.evaluate()))
    }

    /// Put frozen column `index` back to spinning from `A`.
    ///
    /// Returns `true` if the column was reloaded. Ignored once solved and
    /// while a reset is pending.
    ///
    /// # Errors
    ///
    /// [`SyncError::ColumnOutOfRange`] when `index >= COLUMNS`.
    pub fn reload(&mut self, index: usize) -> Result<bool> {
        let column = self
            .columns
            .get_mut(index)
            .ok_or(SyncError::ColumnOutOfRange(index))?;
        if self.phase != SlotPhase::Playing || column.spinning {
            return Ok(false);
        }
        *column = Column::fresh();
        Ok(true)
    }

    /// Restart every column after a failed attempt. Returns `true` if a
    /// reset was pending.
    pub fn reset_all(&mut self) -> bool {
        if self.phase != SlotPhase::ResetPending {
            return false;
        }
        self.columns = [Column::fresh(); COLUMNS];
        self.phase = SlotPhase::Playing;
        true
    }

    fn evaluate(&mut self) -> SlotOutcome {
        let word: [u8; COLUMNS] = self.columns.map(|c| c.offset);
        if word == self.target.0 {
            info!(word = %self.letters(), "minigame solved");
            self.phase = SlotPhase::Solved;
            SlotOutcome::Solved
        } else {
            debug!(word = %self.letters(), "wrong word, resetting");
            self.phase = SlotPhase::ResetPending;
            SlotOutcome::Failed
        }
    }
}

/// Minigame timing and target.
#[derive(Debug, Clone)]
pub struct SlotConfig {
    /// Target word. Defaults to `STOP`.
    pub target: String,
    /// Letter step. Defaults to **500 ms**.
    pub tick: Duration,
    /// Delay before a failed attempt restarts. Defaults to **1 s**.
    pub reset_delay: Duration,
}

impl SlotConfig {
    pub fn new() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            tick: DEFAULT_TICK,
            reset_delay: DEFAULT_RESET_DELAY,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    #[must_use]
    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotInput {
    Tick,
    Reset,
}

/// Timer-driven change reported by [`SlotMinigame::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    /// Spinning columns moved one letter.
    Advanced,
    /// All columns restarted after a failed attempt.
    Reset,
}

/// [`SlotMachine`] plus its letter ticker and reset timer.
#[derive(Debug)]
pub struct SlotMinigame {
    machine: SlotMachine,
    reset_delay: Duration,
    timers: Scheduler<SlotInput>,
}

impl SlotMinigame {
    /// Open the minigame and start spinning.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidTarget`] if the configured target is not a
    /// four-letter word.
    pub fn open(config: &SlotConfig) -> Result<Self> {
        let target = TargetWord::parse(&config.target)?;
        let mut timers = Scheduler::new();
        timers.every(config.tick, SlotInput::Tick);
        Ok(Self {
            machine: SlotMachine::new(target),
            reset_delay: config.reset_delay,
            timers,
        })
    }

    pub fn machine(&self) -> &SlotMachine {
        &self.machine
    }

    /// Freeze a column. See [`SlotMachine::click`].
    ///
    /// # Errors
    ///
    /// [`SyncError::ColumnOutOfRange`] when `index >= COLUMNS`.
    pub fn click(&mut self, index: usize) -> Result<Option<SlotOutcome>> {
        let outcome = self.machine.click(index)?;
        match outcome {
            Some(SlotOutcome::Solved) => self.timers.cancel_all(),
            Some(SlotOutcome::Failed) => self.timers.after(self.reset_delay, SlotInput::Reset),
            None => {}
        }
        Ok(outcome)
    }

    /// Reload a frozen column. See [`SlotMachine::reload`].
    ///
    /// # Errors
    ///
    /// [`SyncError::ColumnOutOfRange`] when `index >= COLUMNS`.
    pub fn reload(&mut self, index: usize) -> Result<bool> {
        self.machine.reload(index)
    }

    /// Wait for the next visible timer-driven change. Cancel-safe.
    pub async fn next(&mut self) -> SlotChange {
        loop {
            match self.timers.next().await {
                SlotInput::Tick => {
                    if self.machine.tick() {
                        return SlotChange::Advanced;
                    }
                }
                SlotInput::Reset => {
                    if self.machine.reset_all() {
                        return SlotChange::Reset;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn stop() -> SlotMachine {
        SlotMachine::new(TargetWord::parse("STOP").unwrap())
    }

    fn spin_to(m: &mut SlotMachine, letter: char) {
        while m.columns().iter().any(|c| c.is_spinning() && c.letter() != letter) {
            m.tick();
        }
    }

    #[test]
    fn columns_start_at_a_and_wrap() {
        let mut m = stop();
        assert_eq!(m.letters(), "AAAA");
        for _ in 0..26 {
            m.tick();
        }
        assert_eq!(m.letters(), "AAAA");
        m.tick();
        assert_eq!(m.letters(), "BBBB");
    }

    #[test]
    fn stopped_column_stays_put() {
        let mut m = stop();
        m.tick();
        assert_eq!(m.click(0).unwrap(), None);
        assert_eq!(m.click(0).unwrap(), None);
        m.tick();
        assert_eq!(m.letters(), "BCCC");
    }

    #[test]
    fn right_word_solves_once() {
        let mut m = stop();
        // all columns spin together, so freeze them in alphabetical order
        spin_to(&mut m, 'O');
        m.click(2).unwrap();
        spin_to(&mut m, 'P');
        m.click(3).unwrap();
        spin_to(&mut m, 'S');
        m.click(0).unwrap();
        spin_to(&mut m, 'T');
        assert_eq!(m.click(1).unwrap(), Some(SlotOutcome::Solved));
        assert_eq!(m.letters(), "STOP");

        assert_eq!(m.click(1).unwrap(), None);
        assert!(!m.reload(0).unwrap());
        assert!(!m.tick());
        assert_eq!(m.phase(), SlotPhase::Solved);
    }

    #[test]
    fn wrong_word_waits_for_reset() {
        let mut m = stop();
        spin_to(&mut m, 'X');
        for i in 0..3 {
            assert_eq!(m.click(i).unwrap(), None);
        }
        assert_eq!(m.click(3).unwrap(), Some(SlotOutcome::Failed));
        assert!(!m.reload(1).unwrap());

        assert!(m.reset_all());
        assert_eq!(m.letters(), "AAAA");
        assert!(m.columns().iter().all(Column::is_spinning));
        assert!(!m.reset_all());
    }

    #[test]
    fn last_letter_wrong_still_fails() {
        let mut m = stop();
        let mut outcomes = Vec::new();
        spin_to(&mut m, 'O');
        outcomes.push(m.click(2).unwrap());
        spin_to(&mut m, 'S');
        outcomes.push(m.click(0).unwrap());
        spin_to(&mut m, 'T');
        outcomes.push(m.click(1).unwrap());
        spin_to(&mut m, 'X');
        outcomes.push(m.click(3).unwrap());

        assert_eq!(m.letters(), "STOX");
        assert_eq!(outcomes, [None, None, None, Some(SlotOutcome::Failed)]);
        assert_eq!(m.phase(), SlotPhase::ResetPending);

        assert!(m.reset_all());
        assert_eq!(m.letters(), "AAAA");
        assert!(m.columns().iter().all(Column::is_spinning));
        assert_eq!(m.phase(), SlotPhase::Playing);
    }

    #[test]
    fn reloading_a_correct_column_is_not_a_failure() {
        let mut m = stop();
        spin_to(&mut m, 'S');
        assert_eq!(m.click(0).unwrap(), None);
        assert!(m.reload(0).unwrap());

        assert_eq!(m.phase(), SlotPhase::Playing);
        assert!(m.columns()[0].is_spinning());
        assert_eq!(m.columns()[0].letter(), 'A');
        assert!(!m.reset_all());
    }

    #[test]
    fn reload_restarts_a_single_column() {
        let mut m = stop();
        m.tick();
        m.tick();
        m.click(1).unwrap();
        assert!(!m.reload(0).unwrap());
        assert!(m.reload(1).unwrap());
        assert_eq!(m.letters(), "CACC");
        assert_eq!(m.phase(), SlotPhase::Playing);
    }

    #[test]
    fn out_of_range_column() {
        let mut m = stop();
        assert!(matches!(m.click(4), Err(SyncError::ColumnOutOfRange(4))));
        assert!(matches!(m.reload(9), Err(SyncError::ColumnOutOfRange(9))));
    }

    #[test]
    fn target_validation() {
        assert_eq!(TargetWord::parse("OpEn").unwrap().to_string(), "OPEN");
        for bad in ["", "ST P", "STÖP", "STO"] {
            assert!(matches!(
                TargetWord::parse(bad),
                Err(SyncError::InvalidTarget(w)) if w == bad
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempt_resets_after_delay() {
        let mut game = SlotMinigame::open(&SlotConfig::default()).unwrap();
        assert_eq!(game.next().await, SlotChange::Advanced);
        for i in 0..COLUMNS {
            game.click(i).unwrap();
        }
        let failed_at = Instant::now();
        assert_eq!(game.next().await, SlotChange::Reset);
        assert_eq!(failed_at.elapsed(), Duration::from_secs(1));
        assert_eq!(game.machine().letters(), "AAAA");
        assert_eq!(game.next().await, SlotChange::Advanced);
        assert_eq!(game.machine().letters(), "BBBB");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_target_refuses_to_open() {
        let config = SlotConfig::new().with_target("NOPE!");
        assert!(matches!(
            SlotMinigame::open(&config),
            Err(SyncError::InvalidTarget(_))
        ));
    }
}
