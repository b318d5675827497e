use crate::domain::models::format_time;
use crate::infrastructure::error::InfraError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick arrived while the timer was not running; nothing changed.
    Ignored,
    Ticked,
    /// The countdown just reached zero. Reported exactly once per run.
    Completed,
}

/// Reusable ticking countdown backing every timer screen (focus
/// sessions, breathing patterns, Pomodoro). Ticks are wall-clock
/// driven and delivered by the caller or by [`drive_countdown`].
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    initial_seconds: u64,
    time_left: u64,
    state: TimerState,
}

impl CountdownTimer {
    pub fn new(initial_seconds: u64) -> Self {
        Self {
            initial_seconds,
            time_left: initial_seconds,
            state: TimerState::Idle,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn time_left(&self) -> u64 {
        self.time_left
    }

    pub fn formatted_time(&self) -> String {
        format_time(self.time_left)
    }

    pub fn start(&mut self) {
        match self.state {
            TimerState::Idle | TimerState::Paused => self.state = TimerState::Running,
            TimerState::Running | TimerState::Completed => {}
        }
    }

    pub fn pause(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
        }
    }

    pub fn reset(&mut self) {
        self.state = TimerState::Idle;
        self.time_left = self.initial_seconds;
    }

    /// Overwrites the remaining time without changing the run state;
    /// used to restore persisted sessions and to switch phases. A
    /// completed timer given a non-zero duration moves to paused so it
    /// can be restarted.
    pub fn set_time(&mut self, seconds: u64) {
        self.time_left = seconds;
        if self.state == TimerState::Completed && seconds > 0 {
            self.state = TimerState::Paused;
        }
    }

    /// Advances the countdown by one wall-clock second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Ignored;
        }

        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            self.state = TimerState::Completed;
            return TickOutcome::Completed;
        }
        TickOutcome::Ticked
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    pub seconds: u64,
}

impl Phase {
    pub fn new(name: impl Into<String>, seconds: u64) -> Self {
        Self {
            name: name.into(),
            seconds,
        }
    }
}

/// Explicit phase transition table: an ordered list of named phases,
/// optionally looping (breathing patterns loop, Pomodoro focus/break
/// alternation loops, a one-shot focus session does not).
#[derive(Debug, Clone)]
pub struct PhaseSequencer {
    phases: Vec<Phase>,
    current: usize,
    looping: bool,
}

impl PhaseSequencer {
    pub fn new(phases: Vec<Phase>, looping: bool) -> Result<Self, InfraError> {
        if phases.is_empty() {
            return Err(InfraError::InvalidConfig(
                "phase sequence must not be empty".to_string(),
            ));
        }
        if phases.iter().any(|phase| phase.seconds == 0) {
            return Err(InfraError::InvalidConfig(
                "phase durations must be > 0".to_string(),
            ));
        }
        Ok(Self {
            phases,
            current: 0,
            looping,
        })
    }

    pub fn current_phase(&self) -> &Phase {
        &self.phases[self.current]
    }

    pub fn rewind(&mut self) {
        self.current = 0;
    }

    /// Moves to the next phase; `None` once a non-looping sequence ends.
    pub fn advance(&mut self) -> Option<&Phase> {
        if self.current + 1 < self.phases.len() {
            self.current += 1;
            return Some(&self.phases[self.current]);
        }
        if self.looping {
            self.current = 0;
            return Some(&self.phases[self.current]);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTransition {
    pub completed: String,
    pub next: Option<String>,
}

/// Couples a countdown to a phase table. When a phase completes, the
/// next one is loaded and the timer restarted in the same tick, so
/// chained phases (inhale -> hold -> exhale) never double-fire
/// completion and never lose a second.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    timer: CountdownTimer,
    sequencer: PhaseSequencer,
}

impl SessionTimer {
    pub fn new(sequencer: PhaseSequencer) -> Self {
        let timer = CountdownTimer::new(sequencer.current_phase().seconds);
        Self { timer, sequencer }
    }

    pub fn timer(&self) -> &CountdownTimer {
        &self.timer
    }

    pub fn current_phase(&self) -> &Phase {
        self.sequencer.current_phase()
    }

    pub fn start(&mut self) {
        self.timer.start();
    }

    pub fn pause(&mut self) {
        self.timer.pause();
    }

    pub fn reset(&mut self) {
        self.sequencer.rewind();
        self.timer = CountdownTimer::new(self.sequencer.current_phase().seconds);
    }

    pub fn tick(&mut self) -> Option<PhaseTransition> {
        if self.timer.tick() != TickOutcome::Completed {
            return None;
        }

        let completed = self.sequencer.current_phase().name.clone();
        let next = match self.sequencer.advance() {
            Some(phase) => {
                let name = phase.name.clone();
                let seconds = phase.seconds;
                self.timer.set_time(seconds);
                self.timer.start();
                Some(name)
            }
            None => None,
        };

        Some(PhaseTransition { completed, next })
    }
}

/// Ticks a shared countdown once per wall-clock second until it
/// completes. Stop it early by dropping or aborting the future; the
/// timer itself stays valid.
pub async fn drive_countdown(timer: Arc<Mutex<CountdownTimer>>) {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it so the first
    // decrement lands a full second after start.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let outcome = match timer.lock() {
            Ok(mut timer) => timer.tick(),
            Err(error) => {
                log::warn!("countdown lock poisoned, stopping ticker: {error}");
                return;
            }
        };
        if outcome == TickOutcome::Completed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_idle_with_configured_time() {
        let timer = CountdownTimer::new(300);
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.time_left(), 300);
        assert_eq!(timer.formatted_time(), "05:00");
    }

    #[test]
    fn start_pause_reset_transitions() {
        let mut timer = CountdownTimer::new(300);
        timer.start();
        assert!(timer.is_running());

        // Starting while running is a no-op.
        timer.start();
        assert!(timer.is_running());

        timer.pause();
        assert_eq!(timer.state(), TimerState::Paused);

        // Pausing while paused is a no-op.
        timer.pause();
        assert_eq!(timer.state(), TimerState::Paused);

        timer.start();
        timer.tick();
        timer.reset();
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.time_left(), 300);
    }

    #[test]
    fn ticks_are_ignored_unless_running() {
        let mut timer = CountdownTimer::new(10);
        assert_eq!(timer.tick(), TickOutcome::Ignored);
        timer.start();
        timer.pause();
        assert_eq!(timer.tick(), TickOutcome::Ignored);
        assert_eq!(timer.time_left(), 10);
    }

    #[test]
    fn completion_fires_exactly_once_and_time_never_goes_negative() {
        let mut timer = CountdownTimer::new(2);
        timer.start();
        assert_eq!(timer.tick(), TickOutcome::Ticked);
        assert_eq!(timer.tick(), TickOutcome::Completed);
        assert_eq!(timer.state(), TimerState::Completed);
        assert_eq!(timer.time_left(), 0);

        // Further ticks neither re-fire completion nor underflow.
        assert_eq!(timer.tick(), TickOutcome::Ignored);
        assert_eq!(timer.time_left(), 0);
    }

    #[test]
    fn set_time_restores_a_persisted_session() {
        let mut timer = CountdownTimer::new(1500);
        timer.set_time(642);
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.formatted_time(), "10:42");
    }

    #[test]
    fn set_time_revives_a_completed_timer_for_restart() {
        let mut timer = CountdownTimer::new(1);
        timer.start();
        assert_eq!(timer.tick(), TickOutcome::Completed);

        timer.set_time(4);
        assert_eq!(timer.state(), TimerState::Paused);
        timer.start();
        assert!(timer.is_running());
    }

    #[test]
    fn sequencer_rejects_empty_and_zero_duration_tables() {
        assert!(PhaseSequencer::new(Vec::new(), false).is_err());
        assert!(PhaseSequencer::new(vec![Phase::new("inhale", 0)], true).is_err());
    }

    #[test]
    fn breathing_phases_chain_without_double_firing() {
        let sequencer = PhaseSequencer::new(
            vec![
                Phase::new("inhale", 4),
                Phase::new("hold", 7),
                Phase::new("exhale", 8),
            ],
            true,
        )
        .expect("valid sequence");
        let mut session = SessionTimer::new(sequencer);
        session.start();

        for _ in 0..3 {
            assert_eq!(session.tick(), None);
        }
        let transition = session.tick().expect("inhale completes");
        assert_eq!(transition.completed, "inhale");
        assert_eq!(transition.next.as_deref(), Some("hold"));

        // The next phase is already running with its full duration.
        assert!(session.timer().is_running());
        assert_eq!(session.timer().time_left(), 7);
        assert_eq!(session.current_phase().name, "hold");
        assert_eq!(session.tick(), None);
    }

    #[test]
    fn looping_sequence_wraps_to_first_phase() {
        let sequencer = PhaseSequencer::new(
            vec![Phase::new("focus", 2), Phase::new("break", 1)],
            true,
        )
        .expect("valid sequence");
        let mut session = SessionTimer::new(sequencer);
        session.start();

        session.tick();
        let focus_done = session.tick().expect("focus completes");
        assert_eq!(focus_done.next.as_deref(), Some("break"));

        let break_done = session.tick().expect("break completes");
        assert_eq!(break_done.completed, "break");
        assert_eq!(break_done.next.as_deref(), Some("focus"));
        assert_eq!(session.timer().time_left(), 2);
    }

    #[test]
    fn non_looping_sequence_ends_completed() {
        let sequencer =
            PhaseSequencer::new(vec![Phase::new("focus", 1)], false).expect("valid sequence");
        let mut session = SessionTimer::new(sequencer);
        session.start();

        let transition = session.tick().expect("focus completes");
        assert_eq!(transition.next, None);
        assert_eq!(session.timer().state(), TimerState::Completed);
        assert_eq!(session.tick(), None);
    }

    #[test]
    fn session_reset_returns_to_first_phase() {
        let sequencer = PhaseSequencer::new(
            vec![Phase::new("inhale", 1), Phase::new("exhale", 5)],
            false,
        )
        .expect("valid sequence");
        let mut session = SessionTimer::new(sequencer);
        session.start();
        session.tick();
        assert_eq!(session.current_phase().name, "exhale");

        session.reset();
        assert_eq!(session.current_phase().name, "inhale");
        assert_eq!(session.timer().state(), TimerState::Idle);
        assert_eq!(session.timer().time_left(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drive_countdown_ticks_once_per_second_to_completion() {
        let timer = Arc::new(Mutex::new(CountdownTimer::new(3)));
        timer.lock().expect("timer lock").start();

        drive_countdown(Arc::clone(&timer)).await;

        let timer = timer.lock().expect("timer lock");
        assert_eq!(timer.state(), TimerState::Completed);
        assert_eq!(timer.time_left(), 0);
    }
}
