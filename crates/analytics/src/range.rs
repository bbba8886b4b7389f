use crate::error::AnalyticsError;
use chrono::{DateTime, Duration, Utc};

/// A validated, inclusive `[start, end]` analytics window.
///
/// The only way to obtain one is [`DateRange::new`], so anything holding a
/// `DateRange` is guaranteed to have passed range validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// The widest window allowed when nothing else is configured.
    pub const DEFAULT_MAX_SPAN_DAYS: i64 = 365;

    pub fn default_max_span() -> Duration {
        Duration::days(Self::DEFAULT_MAX_SPAN_DAYS)
    }

    /// Validates caller-supplied endpoints.
    ///
    /// Fails with `MissingParameter` when an endpoint is absent, `InvalidDateRange`
    /// when `from` is strictly after `to`, and `PeriodTooLarge` when the span is
    /// longer than `max_span`. A span exactly equal to `max_span` is accepted.
    pub fn new(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        max_span: Duration,
    ) -> Result<Self, AnalyticsError> {
        let (start, end) = match (from, to) {
            (Some(start), Some(end)) => (start, end),
            (None, Some(_)) => return Err(AnalyticsError::MissingParameter("from")),
            (Some(_), None) => return Err(AnalyticsError::MissingParameter("to")),
            (None, None) => return Err(AnalyticsError::MissingParameter("from, to")),
        };

        if start > end {
            return Err(AnalyticsError::InvalidDateRange {
                from: start,
                to: end,
            });
        }

        if end - start > max_span {
            return Err(AnalyticsError::PeriodTooLarge {
                max_days: max_span.num_days(),
            });
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Inclusive on both ends.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn validate(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<DateRange, AnalyticsError> {
        DateRange::new(from, to, DateRange::default_max_span())
    }

    #[test]
    fn missing_endpoints_are_reported() {
        let now = ts(2024, 1, 1);
        assert!(matches!(validate(None, Some(now)), Err(AnalyticsError::MissingParameter("from"))));
        assert!(matches!(validate(Some(now), None), Err(AnalyticsError::MissingParameter("to"))));
        assert!(matches!(validate(None, None), Err(AnalyticsError::MissingParameter(_))));
    }

    #[test]
    fn from_after_to_is_invalid() {
        let err = validate(Some(ts(2024, 2, 1)), Some(ts(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidDateRange { .. }));

        let one_second_late = ts(2024, 1, 1) + Duration::seconds(1);
        assert!(matches!(
            validate(Some(one_second_late), Some(ts(2024, 1, 1))),
            Err(AnalyticsError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn equal_endpoints_are_a_valid_instant() {
        let range = validate(Some(ts(2024, 1, 1)), Some(ts(2024, 1, 1))).unwrap();
        assert_eq!(range.span(), Duration::zero());
        assert!(range.contains(ts(2024, 1, 1)));
    }

    #[test]
    fn span_limit_is_inclusive() {
        let from = ts(2023, 1, 1);
        let exactly = from + Duration::days(365);
        assert!(validate(Some(from), Some(exactly)).is_ok());

        let too_far = exactly + Duration::seconds(1);
        assert!(matches!(
            validate(Some(from), Some(too_far)),
            Err(AnalyticsError::PeriodTooLarge { max_days: 365 })
        ));
    }

    #[test]
    fn custom_max_span_is_honoured() {
        let from = ts(2024, 1, 1);
        let result = DateRange::new(Some(from), Some(ts(2024, 1, 9)), Duration::days(7));
        assert!(matches!(result, Err(AnalyticsError::PeriodTooLarge { max_days: 7 })));
    }

    #[test]
    fn contains_is_inclusive_on_both_ends() {
        let range = validate(Some(ts(2024, 1, 1)), Some(ts(2024, 1, 31))).unwrap();
        assert!(range.contains(range.start()));
        assert!(range.contains(range.end()));
        assert!(!range.contains(range.start() - Duration::nanoseconds(1)));
        assert!(!range.contains(range.end() + Duration::nanoseconds(1)));
    }
}
