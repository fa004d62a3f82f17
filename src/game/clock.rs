use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The coarse season clock: which game year is being played and when it ends.
///
/// The game counts as running while a year end is scheduled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonClock {
    current_year: Option<i32>,
    year_end: Option<DateTime<Utc>>,
}

impl SeasonClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing `year`, ending `year_length` after `now`.
    pub fn start_at(&mut self, year: i32, now: DateTime<Utc>, year_length: Duration) -> i32 {
        self.current_year = Some(year);
        self.year_end = Some(now + year_length);
        year
    }

    /// Stop the clock, returning the year that was being played.
    pub fn stop(&mut self) -> Option<i32> {
        self.year_end = None;
        self.current_year
    }

    /// Move on to the next year, ending `year_length` after `now`.
    ///
    /// Returns the new year, or `None` when no year was ever started.
    pub fn advance_at(&mut self, now: DateTime<Utc>, year_length: Duration) -> Option<i32> {
        let next = self.current_year?.checked_add(1)?;
        Some(self.start_at(next, now, year_length))
    }

    pub fn current_year(&self) -> Option<i32> {
        self.current_year
    }

    pub fn year_end(&self) -> Option<DateTime<Utc>> {
        self.year_end
    }

    pub fn is_running(&self) -> bool {
        self.year_end.is_some()
    }

    pub fn is_passed_year_end(&self, now: DateTime<Utc>) -> bool {
        matches!(self.year_end, Some(end) if now > end)
    }
}
