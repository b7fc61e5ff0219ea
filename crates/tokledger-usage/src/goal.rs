//! Goal progress and projection.
//!
//! Everything here is recomputed from the current totals on each call.
//! Day counts are whole days, rounded toward the past.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::CumulativeUsage;

/// Progress toward a processed-token goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalProgress {
    pub goal: u64,

    /// input + output + cache-write
    pub processed: u64,

    /// Negative once the goal is exceeded
    pub remaining: i64,

    pub percent: f64,

    pub days_remaining: i64,

    /// Tokens per day still needed, 0 once the deadline has passed
    pub daily_needed: f64,

    pub days_elapsed: i64,

    pub daily_average: f64,

    /// Days from period start to deadline
    pub window_days: i64,

    /// `daily_average` over the whole window
    pub projected_total: f64,
}

/// Where the current pace leads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Pace {
    OnTrack { surplus: f64 },
    Behind { deficit: f64, daily_increase: f64 },
    DeadlinePassed { achieved: bool },
    /// Less than a day into the period
    NoHistory,
}

fn whole_days(span: Duration) -> i64 {
    span.num_seconds().div_euclid(86_400)
}

impl GoalProgress {
    pub fn calculate(
        usage: &CumulativeUsage,
        goal: u64,
        period_start: DateTime<Utc>,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let processed = usage.tokens.processed();
        let remaining = i64::try_from(i128::from(goal) - i128::from(processed)).unwrap_or(i64::MIN);
        let percent = if goal > 0 {
            processed as f64 / goal as f64 * 100.0
        } else {
            0.0
        };

        let days_remaining = whole_days(deadline - now);
        let daily_needed = if days_remaining > 0 {
            remaining as f64 / days_remaining as f64
        } else {
            0.0
        };

        let days_elapsed = whole_days(now - period_start);
        let daily_average = if days_elapsed > 0 {
            processed as f64 / days_elapsed as f64
        } else {
            0.0
        };

        let window_days = whole_days(deadline - period_start);

        Self {
            goal,
            processed,
            remaining,
            percent,
            days_remaining,
            daily_needed,
            days_elapsed,
            daily_average,
            window_days,
            projected_total: daily_average * window_days as f64,
        }
    }

    pub fn pace(&self) -> Pace {
        if self.days_remaining <= 0 {
            return Pace::DeadlinePassed {
                achieved: self.remaining <= 0,
            };
        }
        if self.days_elapsed <= 0 {
            return Pace::NoHistory;
        }

        let goal = self.goal as f64;
        if self.projected_total >= goal {
            Pace::OnTrack {
                surplus: self.projected_total - goal,
            }
        } else {
            Pace::Behind {
                deficit: goal - self.projected_total,
                daily_increase: self.daily_needed - self.daily_average,
            }
        }
    }

    /// Progress bar of `width` cells, clamped to full.
    pub fn bar(&self, width: usize) -> String {
        let filled = ((width as f64 * self.percent / 100.0) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenCounts;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap()
    }

    fn usage(processed: u64) -> CumulativeUsage {
        CumulativeUsage::new(TokenCounts::new(processed, 0, 0, 5_000_000), 10)
    }

    #[test]
    fn test_behind_pace() {
        let now = start() + Duration::days(60);
        let deadline = now + Duration::days(30);

        let progress = GoalProgress::calculate(&usage(40_000_000), 100_000_000, start(), deadline, now);

        assert_eq!(progress.processed, 40_000_000);
        assert_eq!(progress.remaining, 60_000_000);
        assert!((progress.percent - 40.0).abs() < 1e-9);
        assert_eq!(progress.days_remaining, 30);
        assert!((progress.daily_needed - 2_000_000.0).abs() < 1e-6);
        assert_eq!(progress.days_elapsed, 60);
        assert_eq!(progress.daily_average.round(), 666_667.0);
        assert_eq!(progress.window_days, 90);
        assert!((progress.projected_total - 60_000_000.0).abs() < 1e-3);

        let Pace::Behind { deficit, daily_increase } = progress.pace() else {
            panic!("expected behind pace");
        };
        assert!((deficit - 40_000_000.0).abs() < 1e-3);
        assert_eq!(daily_increase.round(), 1_333_333.0);
    }

    #[test]
    fn test_on_track() {
        let now = start() + Duration::days(45);
        let deadline = start() + Duration::days(90);

        let progress = GoalProgress::calculate(&usage(60_000_000), 100_000_000, start(), deadline, now);

        assert!(matches!(progress.pace(), Pace::OnTrack { surplus } if (surplus - 20_000_000.0).abs() < 1e-3));
    }

    #[test]
    fn test_cache_reads_not_counted() {
        let now = start() + Duration::days(1);
        let progress = GoalProgress::calculate(&usage(0), 100, start(), now + Duration::days(5), now);
        assert_eq!(progress.processed, 0);
    }

    #[test]
    fn test_deadline_passed() {
        let deadline = start() + Duration::days(90);
        let now = deadline + Duration::hours(1);

        let short = GoalProgress::calculate(&usage(10), 100, start(), deadline, now);
        assert_eq!(short.days_remaining, -1);
        assert_eq!(short.daily_needed, 0.0);
        assert_eq!(short.pace(), Pace::DeadlinePassed { achieved: false });

        let met = GoalProgress::calculate(&usage(150), 100, start(), deadline, now);
        assert_eq!(met.remaining, -50);
        assert_eq!(met.pace(), Pace::DeadlinePassed { achieved: true });
    }

    #[test]
    fn test_partial_days_round_down() {
        let now = start() + Duration::hours(36);
        let deadline = now + Duration::hours(47);

        let progress = GoalProgress::calculate(&usage(10), 100, start(), deadline, now);
        assert_eq!(progress.days_elapsed, 1);
        assert_eq!(progress.days_remaining, 1);
    }

    #[test]
    fn test_no_history_on_first_day() {
        let now = start() + Duration::hours(5);
        let progress = GoalProgress::calculate(&usage(10), 100, start(), start() + Duration::days(90), now);
        assert_eq!(progress.daily_average, 0.0);
        assert_eq!(progress.pace(), Pace::NoHistory);
    }

    #[test]
    fn test_bar() {
        let now = start() + Duration::days(1);
        let deadline = start() + Duration::days(10);
        let half = GoalProgress::calculate(&usage(50), 100, start(), deadline, now);
        assert_eq!(half.bar(10), "█████░░░░░");

        let over = GoalProgress::calculate(&usage(250), 100, start(), deadline, now);
        assert_eq!(over.bar(4), "████");
    }
}
