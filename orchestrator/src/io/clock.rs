//! Wall-clock access, behind a trait so runs can be replayed deterministically.

use chrono::{DateTime, Utc};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// `2024-01-31T12:00:00Z`, as stored in the state record.
    fn timestamp(&self) -> String {
        self.now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// `2024-01-31 12:00:00`, as shown in reports.
    fn report_date(&self) -> String {
        self.now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    struct At(DateTime<Utc>);

    impl Clock for At {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn formats_are_second_precision() {
        let clock = At(Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap());
        assert_eq!(clock.timestamp(), "2025-03-04T05:06:07Z");
        assert_eq!(clock.report_date(), "2025-03-04 05:06:07");
    }
}
