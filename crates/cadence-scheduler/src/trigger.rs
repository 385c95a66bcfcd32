use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SchedulerError};

/// Computes when a recurring job fires next.
///
/// Implementations are pure in `(now, execution_count)`; the only state they
/// may carry is their own exhaustion flag, which is why `next_fire_time`
/// takes `&mut self`. Each trigger is owned by exactly one scheduled task.
pub trait Trigger: Send + std::fmt::Debug {
    /// Next fire time computed from `now`, or `None` when no further
    /// execution is possible.
    fn next_fire_time(&mut self, now: DateTime<Utc>, execution_count: u64) -> Option<DateTime<Utc>>;

    /// Whether the owning task should be evicted once `next_fire_time`
    /// returns `None`.
    fn should_remove_after_exhaustion(&self) -> bool;
}

/// Inclusive `[start, end]` UTC validity window shared by all trigger kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireWindow {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl FireWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a window. Fails when `start` is after `end`.
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(SchedulerError::InvalidTrigger(format!(
                    "window start {s} is after window end {e}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start: Some(start), end: None }
    }

    pub fn ending_at(end: DateTime<Utc>) -> Self {
        Self { start: None, end: Some(end) }
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Raise `now` to the window start. `None` once past the window end.
    pub fn clamp(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let clamped = match self.start {
            Some(start) if now < start => start,
            _ => now,
        };
        if self.end.is_some_and(|end| clamped > end) {
            return None;
        }
        Some(clamped)
    }

    /// True when `t` does not exceed the window end.
    pub fn admits(&self, t: DateTime<Utc>) -> bool {
        self.end.map_or(true, |end| t <= end)
    }
}

/// Fires every `interval`, optionally bounded by a window and a repeat count.
#[derive(Debug, Clone)]
pub struct IntervalTrigger {
    interval: Duration,
    window: FireWindow,
    repeat_count: Option<u64>,
    exhausted: bool,
}

impl IntervalTrigger {
    /// Unbounded trigger firing every `interval`. A zero interval is legal
    /// and fires on every tick; a negative one is rejected.
    pub fn new(interval: Duration) -> Result<Self> {
        if interval < Duration::zero() {
            return Err(SchedulerError::InvalidTrigger(format!(
                "interval must not be negative (got {interval})"
            )));
        }
        Ok(Self {
            interval,
            window: FireWindow::unbounded(),
            repeat_count: None,
            exhausted: false,
        })
    }

    pub fn every_secs(secs: i64) -> Result<Self> {
        let interval = Duration::try_seconds(secs).ok_or_else(|| {
            SchedulerError::InvalidTrigger(format!("interval of {secs} seconds is out of range"))
        })?;
        Self::new(interval)
    }

    pub fn every_minutes(minutes: i64) -> Result<Self> {
        let interval = Duration::try_minutes(minutes).ok_or_else(|| {
            SchedulerError::InvalidTrigger(format!("interval of {minutes} minutes is out of range"))
        })?;
        Self::new(interval)
    }

    pub fn with_window(mut self, window: FireWindow) -> Self {
        self.window = window;
        self
    }

    /// Stop after `count` executions. Zero is rejected: such a trigger
    /// could never fire.
    pub fn with_repeat_count(mut self, count: u64) -> Result<Self> {
        if count == 0 {
            return Err(SchedulerError::InvalidTrigger(
                "repeat count must be at least 1".to_string(),
            ));
        }
        self.repeat_count = Some(count);
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl Trigger for IntervalTrigger {
    fn next_fire_time(&mut self, now: DateTime<Utc>, execution_count: u64) -> Option<DateTime<Utc>> {
        if self.repeat_count.is_some_and(|limit| execution_count >= limit) {
            self.exhausted = true;
            return None;
        }
        let clamped = self.window.clamp(now)?;
        clamped.checked_add_signed(self.interval)
    }

    fn should_remove_after_exhaustion(&self) -> bool {
        self.exhausted
    }
}

/// Never fires. Stands in for "no schedule" without optional triggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTrigger;

impl Trigger for NullTrigger {
    fn next_fire_time(&mut self, _now: DateTime<Utc>, _execution_count: u64) -> Option<DateTime<Utc>> {
        None
    }

    fn should_remove_after_exhaustion(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn unbounded_interval_adds_interval() {
        let mut trigger = IntervalTrigger::every_minutes(5).unwrap();
        for (t, n) in [(at(0, 0, 0), 0), (at(9, 30, 15), 7), (at(23, 59, 59), 10_000)] {
            assert_eq!(trigger.next_fire_time(t, n), Some(t + Duration::minutes(5)));
        }
        assert!(!trigger.should_remove_after_exhaustion());
    }

    #[test]
    fn repeat_count_exhausts() {
        let mut trigger = IntervalTrigger::every_secs(10).unwrap().with_repeat_count(3).unwrap();
        assert!(trigger.next_fire_time(at(1, 0, 0), 2).is_some());
        assert!(!trigger.should_remove_after_exhaustion());

        assert_eq!(trigger.next_fire_time(at(1, 0, 0), 3), None);
        assert!(trigger.should_remove_after_exhaustion());
        assert_eq!(trigger.next_fire_time(at(1, 0, 0), 4), None);
    }

    #[test]
    fn future_start_defers_first_fire() {
        let start = at(12, 0, 0);
        let mut trigger = IntervalTrigger::every_minutes(1)
            .unwrap()
            .with_window(FireWindow::starting_at(start));
        assert_eq!(trigger.next_fire_time(at(8, 0, 0), 0), Some(start + Duration::minutes(1)));
        // after start the window no longer shifts anything
        assert_eq!(trigger.next_fire_time(at(13, 0, 0), 0), Some(at(13, 1, 0)));
    }

    #[test]
    fn past_end_returns_none_without_exhaustion() {
        let mut trigger = IntervalTrigger::every_minutes(1)
            .unwrap()
            .with_window(FireWindow::ending_at(at(10, 0, 0)));
        assert_eq!(trigger.next_fire_time(at(10, 0, 1), 0), None);
        assert!(!trigger.should_remove_after_exhaustion());
    }

    #[test]
    fn zero_interval_is_legal() {
        let mut trigger = IntervalTrigger::new(Duration::zero()).unwrap();
        assert_eq!(trigger.next_fire_time(at(5, 0, 0), 1), Some(at(5, 0, 0)));
    }

    #[test]
    fn invalid_parameters_fail_fast() {
        assert!(matches!(
            IntervalTrigger::every_secs(-1),
            Err(SchedulerError::InvalidTrigger(_))
        ));
        assert!(matches!(
            IntervalTrigger::every_secs(i64::MAX),
            Err(SchedulerError::InvalidTrigger(_))
        ));
        assert!(matches!(
            IntervalTrigger::every_minutes(i64::MIN),
            Err(SchedulerError::InvalidTrigger(_))
        ));
        assert!(IntervalTrigger::every_secs(1).unwrap().with_repeat_count(0).is_err());
        assert!(FireWindow::new(Some(at(2, 0, 0)), Some(at(1, 0, 0))).is_err());
        assert!(FireWindow::new(Some(at(1, 0, 0)), Some(at(1, 0, 0))).is_ok());
    }

    #[test]
    fn null_trigger_never_fires() {
        let mut trigger = NullTrigger;
        assert_eq!(trigger.next_fire_time(at(0, 0, 0), 0), None);
        assert!(trigger.should_remove_after_exhaustion());
    }
}
