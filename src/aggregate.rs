use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{ActivityEvent, DailyActivity};

/// Rolls events into one row per (activity_date, repo_name), ordered by date
/// then repository.
pub fn daily_activity<'a, I>(events: I) -> Vec<DailyActivity>
where
    I: IntoIterator<Item = &'a ActivityEvent>,
{
    let mut counts: BTreeMap<(NaiveDate, &str), i64> = BTreeMap::new();

    for event in events {
        *counts
            .entry((event.activity_date(), event.repo_name.as_str()))
            .or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|((activity_date, repo_name), total_events)| DailyActivity {
            activity_date,
            repo_name: repo_name.to_string(),
            total_events,
        })
        .collect()
}
