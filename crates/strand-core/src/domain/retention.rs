//! Retention window arithmetic for analysis folders.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_RETENTION_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    period: Duration,
}

impl RetentionWindow {
    pub fn days(days: i64) -> Self {
        Self {
            period: Duration::days(days),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Earliest instant the folder may be deleted.
    ///
    /// The window starts at `queued_time`. A folder touched after the window
    /// closed gets a fresh window from its last modification.
    pub fn cutoff(&self, queued_time: DateTime<Utc>, last_modified: DateTime<Utc>) -> DateTime<Utc> {
        let deadline = queued_time + self.period;
        if last_modified <= deadline {
            deadline
        } else {
            last_modified + self.period
        }
    }

    pub fn has_expired(
        &self,
        queued_time: DateTime<Utc>,
        last_modified: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        now >= self.cutoff(queued_time, last_modified)
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::days(DEFAULT_RETENTION_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[rstest]
    #[case::modified_inside_window_probe_after(10, 15, true)]
    #[case::modified_inside_window_probe_before(10, 13, false)]
    #[case::probe_exactly_at_deadline(0, 14, true)]
    #[case::modified_after_deadline(20, 30, false)]
    #[case::modified_after_deadline_expired(20, 34, true)]
    fn expiry(#[case] modified_day: i64, #[case] now_day: i64, #[case] expired: bool) {
        let window = RetentionWindow::default();
        assert_eq!(
            window.has_expired(
                t(),
                t() + Duration::days(modified_day),
                t() + Duration::days(now_day)
            ),
            expired
        );
    }
}
