//! Cron trigger built from one or more 5-field expressions.
//!
//! `"0 9 * * 1-5; 0 12 * * 0,6"` fires at 09:00 on weekdays and at 12:00 on
//! weekends. Each sub-expression is parsed on its own and the earliest
//! candidate wins; on a tie the expression declared first is reported.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use croner::Cron;
use tracing::warn;

use crate::error::{Result, SchedulerError};
use crate::trigger::{FireWindow, Trigger};

/// Number of fields accepted per expression: minute hour day-of-month month day-of-week.
const CRON_FIELDS: usize = 5;

#[derive(Debug, Clone)]
struct CronExpression {
    source: Box<str>,
    cron: Cron,
}

impl CronExpression {
    fn parse(expr: &str) -> Result<Self> {
        let fields = expr.split_whitespace().count();
        if fields != CRON_FIELDS {
            return Err(SchedulerError::InvalidCron {
                expression: expr.to_string(),
                reason: format!("expected {CRON_FIELDS} fields, found {fields}"),
            });
        }
        let cron = Cron::from_str(expr).map_err(|e| SchedulerError::InvalidCron {
            expression: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { source: expr.into(), cron })
    }

    fn next_occurrence(&self, from: DateTime<Utc>, inclusive: bool) -> Option<DateTime<Utc>> {
        match self.cron.find_next_occurrence(&from, inclusive) {
            Ok(next) => Some(next),
            Err(e) => {
                warn!(expression = %self.source, "no next cron occurrence: {e}");
                None
            }
        }
    }
}

/// Recurring trigger over the union of several cron schedules.
///
/// Never self-exhausts; past the window end it keeps returning `None` and
/// the owning task stays in the pool.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expressions: Vec<CronExpression>,
    window: FireWindow,
}

impl CronTrigger {
    /// Parse semicolon-separated expressions. Fails on the first malformed
    /// one, or when no expression is given.
    pub fn parse(source: &str) -> Result<Self> {
        let expressions = source
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(CronExpression::parse)
            .collect::<Result<Vec<_>>>()?;

        if expressions.is_empty() {
            return Err(SchedulerError::InvalidCron {
                expression: source.to_string(),
                reason: "no cron expression given".to_string(),
            });
        }

        Ok(Self { expressions, window: FireWindow::unbounded() })
    }

    /// Every day at `hour:minute` UTC.
    pub fn daily_at(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(SchedulerError::InvalidTrigger(format!(
                "invalid time of day {hour:02}:{minute:02}"
            )));
        }
        Self::parse(&format!("{minute} {hour} * * *"))
    }

    /// Weekly at `hour:minute` UTC. `weekday`: 0 = Sunday … 6 = Saturday.
    pub fn weekly_at(weekday: u8, hour: u8, minute: u8) -> Result<Self> {
        if weekday > 6 || hour > 23 || minute > 59 {
            return Err(SchedulerError::InvalidTrigger(format!(
                "invalid weekly schedule day={weekday} {hour:02}:{minute:02}"
            )));
        }
        Self::parse(&format!("{minute} {hour} * * {weekday}"))
    }

    pub fn with_window(mut self, window: FireWindow) -> Self {
        self.window = window;
        self
    }

    /// The sub-expressions in declaration order.
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.expressions.iter().map(|e| e.source.as_ref())
    }
}

impl Trigger for CronTrigger {
    fn next_fire_time(&mut self, now: DateTime<Utc>, _execution_count: u64) -> Option<DateTime<Utc>> {
        let from = self.window.clamp(now)?;
        // Before the window opens the start instant itself may fire.
        let inclusive = from != now;

        let mut earliest: Option<DateTime<Utc>> = None;
        for expr in &self.expressions {
            let Some(candidate) = expr.next_occurrence(from, inclusive) else {
                continue;
            };
            if !self.window.admits(candidate) {
                continue;
            }
            if earliest.map_or(true, |best| candidate < best) {
                earliest = Some(candidate);
            }
        }
        earliest
    }

    fn should_remove_after_exhaustion(&self) -> bool {
        false
    }
}
