//! Pausable stopwatch for timing setup phases

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
enum TimerState {
    Idle,
    Running { started: Instant },
    Paused { accumulated: Duration },
}

/// Stopwatch that can be paused and resumed
#[derive(Debug, Clone)]
pub struct Timer {
    label: String,
    state: TimerState,
}

impl Timer {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: TimerState::Idle,
        }
    }

    /// Create and immediately start a timer
    pub fn started(label: &str) -> Self {
        let mut timer = Self::new(label);
        timer.start();
        timer
    }

    /// Start, or resume after a pause
    pub fn start(&mut self) {
        self.state = match self.state {
            TimerState::Idle => TimerState::Running {
                started: Instant::now(),
            },
            TimerState::Paused { accumulated } => TimerState::Running {
                started: Instant::now() - accumulated,
            },
            running @ TimerState::Running { .. } => {
                log::warn!("Timer '{}' is already running", self.label);
                running
            }
        };
    }

    pub fn pause(&mut self) {
        if let TimerState::Running { started } = self.state {
            self.state = TimerState::Paused {
                accumulated: started.elapsed(),
            };
        }
    }

    /// Stop the timer, log and return the measured duration
    pub fn stop(&mut self) -> Option<Duration> {
        let elapsed = match self.state {
            TimerState::Running { started } => started.elapsed(),
            TimerState::Paused { accumulated } => accumulated,
            TimerState::Idle => {
                log::warn!("Timer '{}' is not running", self.label);
                return None;
            }
        };
        self.state = TimerState::Idle;
        log::info!("{}: {:.3} s", self.label, elapsed.as_secs_f32());
        Some(elapsed)
    }

    pub fn reset(&mut self) {
        self.state = TimerState::Idle;
    }

    /// Time measured so far; zero when idle
    pub fn elapsed(&self) -> Duration {
        match self.state {
            TimerState::Idle => Duration::ZERO,
            TimerState::Running { started } => started.elapsed(),
            TimerState::Paused { accumulated } => accumulated,
        }
    }

    pub fn elapsed_micros(&self) -> u128 {
        self.elapsed().as_micros()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_idle_timer_reports_zero() {
        let mut timer = Timer::new("idle");
        assert_eq!(timer.elapsed(), Duration::ZERO);
        assert_eq!(timer.stop(), None);
    }

    #[test]
    fn test_stop_returns_elapsed() {
        let mut timer = Timer::started("run");
        sleep(Duration::from_millis(5));
        let elapsed = timer.stop().unwrap();
        assert!(elapsed >= Duration::from_millis(5));
        assert!(!timer.is_running());
    }

    #[test]
    fn test_pause_freezes_elapsed() {
        let mut timer = Timer::started("pause");
        sleep(Duration::from_millis(2));
        timer.pause();
        let frozen = timer.elapsed();
        sleep(Duration::from_millis(5));
        assert_eq!(timer.elapsed(), frozen);

        timer.start();
        assert!(timer.is_running());
        assert!(timer.elapsed() >= frozen);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut timer = Timer::started("reset");
        timer.reset();
        assert_eq!(timer.elapsed_micros(), 0);
    }
}
