use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::config::MalformedPolicy;
use crate::error::MalformedEventError;
use crate::models::{ActivityEvent, EventKind, RawEvent};

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f UTC",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Event(ActivityEvent),
    UnrecognizedKind,
    OutsideWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub events: Vec<ActivityEvent>,
    pub malformed_skipped: usize,
    pub unrecognized_dropped: usize,
    pub outside_window_dropped: usize,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    run_date: NaiveDate,
    window_start: NaiveDate,
    timezone: FixedOffset,
}

impl Normalizer {
    pub fn new(run_date: NaiveDate, window_days: i64, timezone: FixedOffset) -> Self {
        Self {
            run_date,
            window_start: window_start(run_date, window_days),
            timezone,
        }
    }

    pub fn window_start(&self) -> NaiveDate {
        self.window_start
    }

    /// Classifies one raw row. `row` is only used for error reporting.
    pub fn normalize(
        &self,
        row: usize,
        raw: &RawEvent,
    ) -> Result<Normalized, MalformedEventError> {
        let event_type = raw.event_type.trim();
        if event_type.is_empty() {
            return Err(malformed(row, "missing event_type"));
        }
        let Some(event_kind) = EventKind::from_raw(event_type) else {
            return Ok(Normalized::UnrecognizedKind);
        };

        let repo_name = raw.repo_name.trim();
        if repo_name.is_empty() {
            return Err(malformed(row, "missing repo_name"));
        }

        let occurred_at = parse_timestamp(&raw.created_at).ok_or_else(|| {
            malformed(row, &format!("unparseable created_at {:?}", raw.created_at))
        })?;
        let activity_date = occurred_at.with_timezone(&self.timezone).date_naive();
        if activity_date < self.window_start || activity_date > self.run_date {
            return Ok(Normalized::OutsideWindow);
        }

        let contributor = raw
            .contributor
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(Normalized::Event(ActivityEvent::new(
            event_kind,
            repo_name.to_string(),
            contributor,
            occurred_at,
            activity_date,
        )))
    }

    /// Lazily yields retained events, surfacing malformed rows as errors and
    /// silently passing over dropped ones.
    pub fn events<'a, I>(
        &'a self,
        raw: I,
    ) -> impl Iterator<Item = Result<ActivityEvent, MalformedEventError>> + 'a
    where
        I: IntoIterator<Item = &'a RawEvent>,
        I::IntoIter: 'a,
    {
        raw.into_iter()
            .enumerate()
            .filter_map(move |(row, raw)| match self.normalize(row, raw) {
                Ok(Normalized::Event(event)) => Some(Ok(event)),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })
    }

    pub fn collect_events(
        &self,
        raw: &[RawEvent],
        policy: MalformedPolicy,
    ) -> Result<NormalizeOutcome, MalformedEventError> {
        let mut outcome = NormalizeOutcome::default();

        for (row, event) in raw.iter().enumerate() {
            match self.normalize(row, event) {
                Ok(Normalized::Event(event)) => outcome.events.push(event),
                Ok(Normalized::UnrecognizedKind) => outcome.unrecognized_dropped += 1,
                Ok(Normalized::OutsideWindow) => outcome.outside_window_dropped += 1,
                Err(err) => match policy {
                    MalformedPolicy::Abort => return Err(err),
                    MalformedPolicy::Skip => {
                        tracing::debug!(
                            row = err.row,
                            reason = %err.reason,
                            "skipping malformed event"
                        );
                        outcome.malformed_skipped += 1;
                    }
                },
            }
        }

        Ok(outcome)
    }
}

/// First day of a trailing window of `days` days ending at `run_date`,
/// clamped to the earliest representable date.
pub fn window_start(run_date: NaiveDate, days: i64) -> NaiveDate {
    run_date
        .checked_sub_days(Days::new(days.max(0).unsigned_abs()))
        .unwrap_or(NaiveDate::MIN)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

fn malformed(row: usize, reason: &str) -> MalformedEventError {
    MalformedEventError {
        row,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, TimeZone};

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()
    }

    fn raw(event_type: &str, created_at: &str) -> RawEvent {
        RawEvent {
            event_type: event_type.to_string(),
            repo_name: "alpha/repo".to_string(),
            contributor: Some("dev1".to_string()),
            created_at: created_at.to_string(),
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(run_date(), 30, Utc.fix())
    }

    #[test]
    fn keeps_recognized_kinds_and_derives_activity_date() {
        let result = normalizer()
            .normalize(0, &raw("PushEvent", "2026-03-30T23:59:59Z"))
            .unwrap();
        let Normalized::Event(event) = result else {
            panic!("expected an event");
        };
        assert_eq!(event.event_kind, EventKind::Push);
        assert_eq!(event.activity_date(), NaiveDate::from_ymd_opt(2026, 3, 30).unwrap());
        assert_eq!(
            event.occurred_at(),
            Utc.with_ymd_and_hms(2026, 3, 30, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn drops_unrecognized_kinds_silently() {
        let result = normalizer()
            .normalize(0, &raw("WatchEvent", "not a timestamp"))
            .unwrap();
        assert_eq!(result, Normalized::UnrecognizedKind);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let n = normalizer();
        let lower = n.normalize(0, &raw("IssuesEvent", "2026-03-01 00:00:00 UTC")).unwrap();
        assert!(matches!(lower, Normalized::Event(_)));
        let upper = n.normalize(0, &raw("IssuesEvent", "2026-03-31 12:00:00")).unwrap();
        assert!(matches!(upper, Normalized::Event(_)));
        let before = n.normalize(0, &raw("IssuesEvent", "2026-02-28T23:00:00Z")).unwrap();
        assert_eq!(before, Normalized::OutsideWindow);
        let future = n.normalize(0, &raw("IssuesEvent", "2026-04-01T00:00:00Z")).unwrap();
        assert_eq!(future, Normalized::OutsideWindow);
    }

    #[test]
    fn window_start_clamps_instead_of_overflowing() {
        assert_eq!(window_start(run_date(), 30), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(window_start(run_date(), -5), run_date());
        assert_eq!(window_start(run_date(), i64::MAX), NaiveDate::MIN);
    }

    #[test]
    fn malformed_rows_report_the_row_index() {
        let err = normalizer()
            .normalize(7, &raw("PullRequestEvent", "yesterday"))
            .unwrap_err();
        assert_eq!(err.row, 7);

        let mut missing_repo = raw("push", "2026-03-30T10:00:00Z");
        missing_repo.repo_name = "  ".to_string();
        assert!(normalizer().normalize(0, &missing_repo).is_err());
    }

    #[test]
    fn offset_shifts_the_activity_date() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let n = Normalizer::new(run_date(), 30, tokyo);
        let Normalized::Event(event) = n
            .normalize(0, &raw("push", "2026-03-29T20:00:00Z"))
            .unwrap()
        else {
            panic!("expected an event");
        };
        assert_eq!(event.activity_date(), NaiveDate::from_ymd_opt(2026, 3, 30).unwrap());
    }

    #[test]
    fn blank_contributors_become_none() {
        let mut event = raw("push", "2026-03-30T10:00:00Z");
        event.contributor = Some("   ".to_string());
        let Normalized::Event(event) = normalizer().normalize(0, &event).unwrap() else {
            panic!("expected an event");
        };
        assert_eq!(event.contributor, None);
    }

    #[test]
    fn skip_policy_counts_and_abort_policy_fails() {
        let rows = vec![
            raw("PushEvent", "2026-03-30T10:00:00Z"),
            raw("PushEvent", "garbage"),
            raw("ForkEvent", "2026-03-30T10:00:00Z"),
            raw("PushEvent", "2025-01-01T10:00:00Z"),
        ];
        let outcome = normalizer().collect_events(&rows, MalformedPolicy::Skip).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.malformed_skipped, 1);
        assert_eq!(outcome.unrecognized_dropped, 1);
        assert_eq!(outcome.outside_window_dropped, 1);

        let err = normalizer()
            .collect_events(&rows, MalformedPolicy::Abort)
            .unwrap_err();
        assert_eq!(err.row, 1);
    }

    #[test]
    fn lazy_iterator_yields_events_and_errors() {
        let rows = vec![
            raw("PushEvent", "2026-03-30T10:00:00Z"),
            raw("WatchEvent", "2026-03-30T10:00:00Z"),
            raw("PushEvent", "garbage"),
        ];
        let n = normalizer();
        let items: Vec<_> = n.events(&rows).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
