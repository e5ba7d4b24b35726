/// Simulation clock: stamps messages with display timestamps.
///
/// Timestamps never feed back into the simulation.
use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

/// First message of a day, in minutes after midnight (08:30).
const DAY_START_MINUTES: i64 = 8 * 60 + 30;

/// Length of the messaging window, 08:30 to 22:00.
const DAY_WINDOW_MINUTES: i64 = 13 * 60 + 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimClock {
    start: NaiveDate,
    offset: FixedOffset,
}

impl SimClock {
    pub fn new(start: NaiveDate, offset: FixedOffset) -> Self {
        Self { start, offset }
    }

    /// Monday (or whatever `start` is) of week `week`.
    pub fn week_start(&self, week: u32) -> NaiveDate {
        self.start
            .checked_add_days(Days::new(u64::from(week) * 7))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Timestamps for `count` messages in week `week`, strictly increasing.
    ///
    /// Message `i` lands on day `⌊7i/count⌋`; the messages sharing a day are
    /// spread evenly from 08:30 towards 22:00.
    pub fn timestamps(&self, week: u32, count: usize) -> Vec<DateTime<FixedOffset>> {
        if count == 0 {
            return Vec::new();
        }

        let days: Vec<usize> = (0..count).map(|i| 7 * i / count).collect();
        let mut stamps = Vec::with_capacity(count);
        let mut i = 0;
        while i < count {
            let day = days[i];
            let same_day = days[i..].iter().take_while(|d| **d == day).count();
            let step = DAY_WINDOW_MINUTES / same_day as i64;
            for slot in 0..same_day {
                let minutes = DAY_START_MINUTES + step * slot as i64;
                stamps.push(self.local(week, day as u64, minutes));
            }
            i += same_day;
        }
        stamps
    }

    fn local(&self, week: u32, day: u64, minutes: i64) -> DateTime<FixedOffset> {
        let date = self
            .week_start(week)
            .checked_add_days(Days::new(day))
            .unwrap_or(NaiveDate::MAX);
        let local: NaiveDateTime = date.and_time(NaiveTime::MIN) + Duration::minutes(minutes);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn clock() -> SimClock {
        SimClock::new(
            NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            FixedOffset::east_opt(8 * 3600).unwrap(),
        )
    }

    #[test]
    fn single_message_at_half_past_eight() {
        let stamps = clock().timestamps(0, 1);
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].to_rfc3339(), "2025-01-06T08:30:00+08:00");
    }

    #[test]
    fn weeks_start_seven_days_apart() {
        let stamps = clock().timestamps(2, 1);
        assert_eq!(stamps[0].day(), 20);
        assert_eq!(stamps[0].month(), 1);
    }

    #[test]
    fn messages_spread_over_the_week() {
        let stamps = clock().timestamps(0, 14);
        assert_eq!(stamps.len(), 14);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(stamps[0].day(), 6);
        assert_eq!(stamps[13].day(), 12);
        // Two per day: 08:30 and 15:15.
        assert_eq!((stamps[1].hour(), stamps[1].minute()), (15, 15));
        assert!(stamps.iter().all(|t| t.hour() < 22));
    }

    #[test]
    fn busy_week_stays_inside_window() {
        let stamps = clock().timestamps(5, 40);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert!(stamps.iter().all(|t| t.hour() >= 8 && t.hour() < 22));
        let next_week = clock().timestamps(6, 1);
        assert!(stamps[39] < next_week[0]);
    }

    #[test]
    fn offset_is_kept() {
        let clock = SimClock::new(
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            FixedOffset::west_opt(5 * 3600).unwrap(),
        );
        assert_eq!(clock.timestamps(0, 1)[0].to_rfc3339(), "2025-03-03T08:30:00-05:00");
    }
}
