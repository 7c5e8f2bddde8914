use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: u32 = 20;
pub const MIN_THRESHOLD: u32 = 10;
pub const MAX_THRESHOLD: u32 = 120;

/// Automatic mode keeps polling every tick while the counter is at or below this.
const ACTIVE_POLLS: u32 = 5;
/// Counter an unchanged automatic re-poll resumes from.
const RESUME_AT: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum PollingMode {
    /// every tick
    #[default]
    Fast,
    /// every `threshold` ticks
    Slow,
    /// every tick while the value changes, backs off once it settles
    Automatic,
}

/// Per-entity tick counter deciding when an entity is due.
#[derive(Debug, Clone)]
pub struct Schedule {
    mode: PollingMode,
    threshold: u32,
    counter: u32,
    seeded: bool,
    force: bool,
}

impl Schedule {
    pub fn new(mode: PollingMode, threshold: u32) -> Self {
        Self {
            mode,
            threshold: threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD),
            counter: 0,
            seeded: false,
            force: false,
        }
    }

    pub fn mode(&self) -> PollingMode {
        self.mode
    }

    pub fn is_due(&self) -> bool {
        if !self.seeded || self.force {
            return true;
        }
        match self.mode {
            PollingMode::Fast => true,
            PollingMode::Slow => self.counter >= self.threshold,
            PollingMode::Automatic => self.counter <= ACTIVE_POLLS || self.counter >= self.threshold,
        }
    }

    pub fn skipped(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    /// `changed` compares the new value to the cached one.
    pub fn polled(&mut self, changed: bool) {
        let first = !self.seeded;
        self.seeded = true;
        self.force = false;

        if first || changed {
            self.counter = 0;
            return;
        }

        self.counter = match self.mode {
            PollingMode::Slow => 0,
            PollingMode::Automatic if self.counter >= self.threshold => RESUME_AT,
            _ => self.counter.saturating_add(1),
        };
    }

    /// Makes the entity due on the next tick.
    pub fn failed(&mut self) {
        self.force = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs `ticks` ticks with a constant value, returns which ticks polled.
    fn run(schedule: &mut Schedule, ticks: u32) -> Vec<u32> {
        let mut polled = Vec::new();
        for t in 0..ticks {
            if schedule.is_due() {
                schedule.polled(false);
                polled.push(t);
            } else {
                schedule.skipped();
            }
        }
        polled
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(Schedule::new(PollingMode::Slow, 1).threshold, MIN_THRESHOLD);
        assert_eq!(Schedule::new(PollingMode::Slow, 500).threshold, MAX_THRESHOLD);
    }

    #[test]
    fn test_fast_every_tick() {
        let mut s = Schedule::new(PollingMode::Fast, 10);
        assert_eq!(run(&mut s, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_slow_every_threshold() {
        let mut s = Schedule::new(PollingMode::Slow, 10);
        assert_eq!(run(&mut s, 25), vec![0, 11, 22]);
    }

    #[test]
    fn test_automatic_backs_off_and_resumes() {
        let mut s = Schedule::new(PollingMode::Automatic, 10);
        // seed, six more polls while the counter is at most 5, idle until it reaches 10
        let polled = run(&mut s, 12);
        assert_eq!(polled, vec![0, 1, 2, 3, 4, 5, 6, 11]);
        // unchanged at threshold: resumes at 7, so three idle ticks
        assert_eq!(s.counter, RESUME_AT);
    }

    #[test]
    fn test_automatic_change_resets() {
        let mut s = Schedule::new(PollingMode::Automatic, 10);
        run(&mut s, 8);
        assert!(!s.is_due());
        s.failed();
        assert!(s.is_due());
        s.polled(true);
        assert_eq!(s.counter, 0);
        assert!(s.is_due());
    }

    #[test]
    fn test_failure_forces_slow() {
        let mut s = Schedule::new(PollingMode::Slow, 10);
        s.polled(false);
        assert!(!s.is_due());
        s.failed();
        assert!(s.is_due());
        s.polled(false);
        assert!(!s.is_due());
    }
}
