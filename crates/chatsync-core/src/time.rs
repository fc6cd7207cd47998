//! Clocks and the display format for message timestamps

use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Display offset for timestamps, in seconds east of UTC
pub const DISPLAY_OFFSET_SECS: i32 = 8 * 3600;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Render an instant as e.g. `March 5, 2025 at 2:07:09 PM UTC+8`
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    let offset = FixedOffset::east_opt(DISPLAY_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    instant
        .with_timezone(&offset)
        .format("%B %-d, %Y at %-I:%M:%S %p UTC+8")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_afternoon() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 5, 6, 7, 9).unwrap();
        assert_eq!(format_timestamp(instant), "March 5, 2025 at 2:07:09 PM UTC+8");
    }

    #[test]
    fn test_format_crosses_midnight() {
        let instant = Utc.with_ymd_and_hms(2024, 12, 31, 16, 0, 0).unwrap();
        assert_eq!(format_timestamp(instant), "January 1, 2025 at 12:00:00 AM UTC+8");
    }

    #[test]
    fn test_fixed_clock() {
        let instant = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!((&clock).now(), instant);
    }
}
