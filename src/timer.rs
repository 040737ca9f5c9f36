use crate::ticker::Ticker;
use crate::timer_log;
use log::Level::{Debug, Info};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

pub const DEFAULT_COUNTDOWN_MINUTES: u32 = 25;
pub const DEFAULT_COUNTDOWN_SECONDS: u32 = DEFAULT_COUNTDOWN_MINUTES * 60;
/// Accepted countdown lengths for user input.
pub const COUNTDOWN_MINUTES_RANGE: RangeInclusive<u32> = 1..=999;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Notifications emitted by the timer machine, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    CountdownRunningChanged(bool),
    StopwatchRunningChanged(bool),
    RemainingChanged(u32),
    ElapsedChanged(u64),
    /// The countdown reached zero.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    CountdownRunning,
    CountdownPaused,
    StopwatchRunning,
    StopwatchPaused,
}

/// Counter values observable by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub countdown_remaining: u32,
    pub countdown_running: bool,
    pub stopwatch_elapsed: u64,
    pub stopwatch_running: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            countdown_remaining: DEFAULT_COUNTDOWN_SECONDS,
            countdown_running: false,
            stopwatch_elapsed: 0,
            stopwatch_running: false,
        }
    }
}

/// Countdown and stopwatch counters with their one-second tickers.
///
/// The two counters are independent; both may run at once. Choosing which
/// one to show is left to the display layer.
pub struct TimerMachine {
    state: TimerState,
    countdown_started: bool,
    stopwatch_started: bool,
    countdown_ticker: Ticker,
    stopwatch_ticker: Ticker,
    events: Vec<TimerEvent>,
}

impl Default for TimerMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerMachine {
    pub fn new() -> Self {
        Self {
            state: TimerState::default(),
            countdown_started: false,
            stopwatch_started: false,
            countdown_ticker: Ticker::new(TICK_INTERVAL),
            stopwatch_ticker: Ticker::new(TICK_INTERVAL),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn phase(&self) -> TimerPhase {
        if self.state.countdown_running {
            TimerPhase::CountdownRunning
        } else if self.state.stopwatch_running {
            TimerPhase::StopwatchRunning
        } else if self.countdown_started {
            TimerPhase::CountdownPaused
        } else if self.stopwatch_started {
            TimerPhase::StopwatchPaused
        } else {
            TimerPhase::Idle
        }
    }

    /// Takes the events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<TimerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        crate::ticker::earliest([
            self.countdown_ticker.deadline(),
            self.stopwatch_ticker.deadline(),
        ])
    }

    /// Runs whichever tick handlers are due. Returns true if any ran.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut fired = false;
        if self.countdown_ticker.fire(now) {
            self.on_countdown_tick();
            fired = true;
        }
        if self.stopwatch_ticker.fire(now) {
            self.on_stopwatch_tick();
            fired = true;
        }
        fired
    }

    pub fn start_countdown(&mut self, minutes: Option<u32>) {
        if let Some(minutes) = minutes {
            self.state.countdown_remaining = minutes.saturating_mul(60);
        }
        if self.state.countdown_running || self.state.countdown_remaining == 0 {
            return;
        }
        self.state.countdown_running = true;
        self.countdown_started = true;
        self.countdown_ticker.start();
        timer_log!(Debug, "Countdown started at {}s", self.state.countdown_remaining);
        self.events.push(TimerEvent::CountdownRunningChanged(true));
    }

    pub fn pause_countdown(&mut self) {
        self.state.countdown_running = false;
        self.countdown_ticker.stop();
        self.events.push(TimerEvent::CountdownRunningChanged(false));
    }

    pub fn toggle_countdown(&mut self) {
        if self.state.countdown_running {
            self.pause_countdown();
        } else {
            self.start_countdown(None);
        }
    }

    pub fn reset_countdown(&mut self, minutes: Option<u32>) {
        self.pause_countdown();
        self.countdown_started = false;
        self.state.countdown_remaining = minutes
            .unwrap_or(DEFAULT_COUNTDOWN_MINUTES)
            .saturating_mul(60);
        self.events
            .push(TimerEvent::RemainingChanged(self.state.countdown_remaining));
    }

    /// Sets the remaining time. While paused the new value is announced
    /// right away so observers can preview it.
    pub fn set_countdown_minutes(&mut self, minutes: u32) {
        self.state.countdown_remaining = minutes.saturating_mul(60);
        if !self.state.countdown_running {
            self.events
                .push(TimerEvent::RemainingChanged(self.state.countdown_remaining));
        }
    }

    pub fn start_stopwatch(&mut self) {
        if self.state.stopwatch_running {
            return;
        }
        self.state.stopwatch_running = true;
        self.stopwatch_started = true;
        self.stopwatch_ticker.start();
        timer_log!(Debug, "Stopwatch started at {}s", self.state.stopwatch_elapsed);
        self.events.push(TimerEvent::StopwatchRunningChanged(true));
    }

    pub fn pause_stopwatch(&mut self) {
        self.state.stopwatch_running = false;
        self.stopwatch_ticker.stop();
        self.events.push(TimerEvent::StopwatchRunningChanged(false));
    }

    pub fn toggle_stopwatch(&mut self) {
        if self.state.stopwatch_running {
            self.pause_stopwatch();
        } else {
            self.start_stopwatch();
        }
    }

    pub fn reset_stopwatch(&mut self) {
        self.pause_stopwatch();
        self.stopwatch_started = false;
        self.state.stopwatch_elapsed = 0;
        self.events.push(TimerEvent::ElapsedChanged(0));
    }

    pub fn on_countdown_tick(&mut self) {
        if self.state.countdown_remaining == 0 {
            self.pause_countdown();
            return;
        }
        self.state.countdown_remaining -= 1;
        self.events
            .push(TimerEvent::RemainingChanged(self.state.countdown_remaining));
        if self.state.countdown_remaining == 0 {
            timer_log!(Info, "Countdown finished");
            self.events.push(TimerEvent::Finished);
            self.pause_countdown();
        }
    }

    pub fn on_stopwatch_tick(&mut self) {
        self.state.stopwatch_elapsed += 1;
        self.events
            .push(TimerEvent::ElapsedChanged(self.state.stopwatch_elapsed));
    }
}

/// `MM:SS`; minutes keep growing past two digits.
pub fn format_countdown(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `HH:MM:SS`; hours keep growing past two digits.
pub fn format_stopwatch(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remaining_values(events: &[TimerEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                TimerEvent::RemainingChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_countdown_runs_to_zero_and_finishes_once() {
        let mut timers = TimerMachine::new();
        timers.state.countdown_remaining = 5;
        timers.start_countdown(None);
        timers.drain_events();

        for _ in 0..5 {
            timers.on_countdown_tick();
        }
        let events = timers.drain_events();

        assert_eq!(remaining_values(&events), vec![4, 3, 2, 1, 0]);
        assert_eq!(events.iter().filter(|e| **e == TimerEvent::Finished).count(), 1);
        assert_eq!(
            &events[events.len() - 2..],
            &[TimerEvent::Finished, TimerEvent::CountdownRunningChanged(false)]
        );
        assert!(!timers.state().countdown_running);
        assert!(timers.next_deadline().is_none());
    }

    #[test]
    fn test_exhausted_countdown_cannot_start() {
        let mut timers = TimerMachine::new();
        timers.set_countdown_minutes(0);
        timers.drain_events();

        timers.start_countdown(None);
        assert!(!timers.state().countdown_running);
        assert!(timers.drain_events().is_empty());

        timers.start_countdown(Some(1));
        assert!(timers.state().countdown_running);
        assert_eq!(timers.state().countdown_remaining, 60);
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut timers = TimerMachine::new();
        timers.start_countdown(None);
        timers.drain_events();
        timers.start_countdown(None);
        assert!(timers.drain_events().is_empty());
    }

    #[test]
    fn test_tick_at_zero_only_pauses() {
        let mut timers = TimerMachine::new();
        timers.state.countdown_remaining = 0;
        timers.state.countdown_running = true;

        timers.on_countdown_tick();
        assert_eq!(timers.state().countdown_remaining, 0);
        assert_eq!(
            timers.drain_events(),
            vec![TimerEvent::CountdownRunningChanged(false)]
        );
    }

    #[test]
    fn test_set_minutes_previews_only_while_paused() {
        let mut timers = TimerMachine::new();
        timers.set_countdown_minutes(10);
        assert_eq!(timers.drain_events(), vec![TimerEvent::RemainingChanged(600)]);

        timers.start_countdown(None);
        timers.drain_events();
        timers.set_countdown_minutes(3);
        assert!(timers.drain_events().is_empty());
        assert_eq!(timers.state().countdown_remaining, 180);
    }

    #[test]
    fn test_reset_countdown_restores_default() {
        let mut timers = TimerMachine::new();
        timers.start_countdown(Some(3));
        timers.on_countdown_tick();
        timers.drain_events();

        timers.reset_countdown(None);
        assert_eq!(
            timers.drain_events(),
            vec![
                TimerEvent::CountdownRunningChanged(false),
                TimerEvent::RemainingChanged(DEFAULT_COUNTDOWN_SECONDS),
            ]
        );
        assert_eq!(timers.phase(), TimerPhase::Idle);

        timers.reset_countdown(Some(7));
        assert_eq!(timers.state().countdown_remaining, 420);
    }

    #[test]
    fn test_stopwatch_counts_up() {
        let mut timers = TimerMachine::new();
        timers.start_stopwatch();
        for _ in 0..3661 {
            timers.on_stopwatch_tick();
        }
        assert_eq!(timers.state().stopwatch_elapsed, 3661);
        assert_eq!(format_stopwatch(timers.state().stopwatch_elapsed), "01:01:01");

        timers.reset_stopwatch();
        assert_eq!(timers.state().stopwatch_elapsed, 0);
        assert!(!timers.state().stopwatch_running);
        assert_eq!(timers.drain_events().last(), Some(&TimerEvent::ElapsedChanged(0)));
    }

    #[test]
    fn test_phases() {
        let mut timers = TimerMachine::new();
        assert_eq!(timers.phase(), TimerPhase::Idle);

        timers.pause_countdown();
        assert_eq!(timers.phase(), TimerPhase::Idle);

        timers.start_stopwatch();
        assert_eq!(timers.phase(), TimerPhase::StopwatchRunning);
        timers.pause_stopwatch();
        assert_eq!(timers.phase(), TimerPhase::StopwatchPaused);

        timers.start_countdown(None);
        assert_eq!(timers.phase(), TimerPhase::CountdownRunning);
        timers.toggle_countdown();
        assert_eq!(timers.phase(), TimerPhase::CountdownPaused);
    }

    #[test]
    fn test_poll_drives_running_counters() {
        let mut timers = TimerMachine::new();
        timers.start_countdown(None);
        timers.start_stopwatch();
        let due = timers.next_deadline().unwrap() + Duration::from_millis(5);

        assert!(timers.poll(due));
        assert_eq!(timers.state().countdown_remaining, DEFAULT_COUNTDOWN_SECONDS - 1);
        assert_eq!(timers.state().stopwatch_elapsed, 1);

        timers.pause_countdown();
        timers.pause_stopwatch();
        assert!(!timers.poll(due + Duration::from_secs(5)));
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(25 * 60), "25:00");
        assert_eq!(format_countdown(65), "01:05");
        assert_eq!(format_countdown(999 * 60 + 59), "999:59");
    }
}
