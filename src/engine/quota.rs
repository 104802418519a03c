use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSettings {
    pub max_per_window: usize,
    pub window: Duration,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            max_per_window: 150,
            window: Duration::from_secs(3600),
        }
    }
}

/// Local advisory limit on how many deletions may be started per window.
/// Checked before a job starts, never while one runs. The count is zeroed
/// by the owner's recurring timer through [`QuotaWindow::reset`].
#[derive(Debug, Clone)]
pub struct QuotaWindow {
    settings: QuotaSettings,
    count_in_window: usize,
    last_deletion_at: Option<DateTime<Utc>>,
}

impl QuotaWindow {
    pub fn new(settings: QuotaSettings) -> Self {
        Self {
            settings,
            count_in_window: 0,
            last_deletion_at: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.settings.window
    }

    pub fn count_in_window(&self) -> usize {
        self.count_in_window
    }

    pub fn last_deletion_at(&self) -> Option<DateTime<Utc>> {
        self.last_deletion_at
    }

    /// `Err` carries the time at which a new job will be accepted.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), DateTime<Utc>> {
        if self.count_in_window < self.settings.max_per_window {
            return Ok(());
        }
        let Some(last) = self.last_deletion_at else {
            return Ok(());
        };

        let window = TimeDelta::from_std(self.settings.window).unwrap_or(TimeDelta::MAX);
        match last.checked_add_signed(window) {
            Some(next) if now < next => Err(next),
            Some(_) => Ok(()),
            None => Err(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn record(&mut self, deleted: usize, at: DateTime<Utc>) {
        self.count_in_window = self.count_in_window.saturating_add(deleted);
        self.last_deletion_at = Some(at);
    }

    pub fn reset(&mut self) {
        self.count_in_window = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
    }

    fn window(max: usize) -> QuotaWindow {
        QuotaWindow::new(QuotaSettings {
            max_per_window: max,
            window: Duration::from_secs(3600),
        })
    }

    #[test]
    fn fresh_window_allows_start() {
        assert!(window(150).check(at(9, 0)).is_ok());
    }

    #[test]
    fn under_budget_allows_start() {
        let mut quota = window(150);
        quota.record(149, at(9, 0));
        assert!(quota.check(at(9, 1)).is_ok());
    }

    #[test]
    fn exhausted_budget_rejects_until_window_elapses() {
        let mut quota = window(150);
        quota.record(100, at(9, 0));
        quota.record(60, at(9, 30));

        assert_eq!(quota.check(at(9, 45)), Err(at(10, 30)));
        assert!(quota.check(at(10, 30)).is_ok());
    }

    #[test]
    fn reset_reopens_the_window() {
        let mut quota = window(10);
        quota.record(10, at(9, 0));
        assert!(quota.check(at(9, 5)).is_err());

        quota.reset();
        assert_eq!(quota.count_in_window(), 0);
        assert!(quota.check(at(9, 5)).is_ok());
        assert_eq!(quota.last_deletion_at(), Some(at(9, 0)));
    }
}
