use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::{ActivityEvent, DailyActivity, RepoSnapshot};
use crate::network::BotFilter;

/// Builds one snapshot row per qualifying repository over
/// `[window_start, run_date]`, ranked by event volume then contributor count.
pub fn summarize(
    qualifying_repos: &BTreeSet<String>,
    daily: &[DailyActivity],
    events: &[ActivityEvent],
    bot_filter: &BotFilter,
    window_start: NaiveDate,
    run_date: NaiveDate,
) -> Vec<RepoSnapshot> {
    let in_window = |date: NaiveDate| date >= window_start && date <= run_date;

    let mut event_totals: BTreeMap<&str, i64> = BTreeMap::new();
    for row in daily.iter().filter(|row| in_window(row.activity_date)) {
        *event_totals.entry(row.repo_name.as_str()).or_insert(0) += row.total_events;
    }

    let mut contributors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for event in events.iter().filter(|event| in_window(event.activity_date())) {
        let Some(contributor) = event.contributor.as_deref() else {
            continue;
        };
        if bot_filter.is_bot(contributor) {
            continue;
        }
        contributors
            .entry(event.repo_name.as_str())
            .or_default()
            .insert(contributor);
    }

    let mut snapshots: Vec<RepoSnapshot> = qualifying_repos
        .iter()
        .map(|repo_name| RepoSnapshot {
            snapshot_date: run_date,
            repo_name: repo_name.clone(),
            event_total_window: event_totals.get(repo_name.as_str()).copied().unwrap_or(0),
            active_contributor_count: contributors
                .get(repo_name.as_str())
                .map_or(0, |set| set.len() as i64),
        })
        .collect();

    snapshots.sort_by(|a, b| {
        b.event_total_window
            .cmp(&a.event_total_window)
            .then_with(|| b.active_contributor_count.cmp(&a.active_contributor_count))
            .then_with(|| a.repo_name.cmp(&b.repo_name))
    });
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;
    use chrono::{Duration, TimeZone, Utc};

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()
    }

    fn daily(repo: &str, days_ago: i64, total_events: i64) -> DailyActivity {
        DailyActivity {
            activity_date: run_date() - Duration::days(days_ago),
            repo_name: repo.to_string(),
            total_events,
        }
    }

    fn event(repo: &str, contributor: Option<&str>, days_ago: i64) -> ActivityEvent {
        let date = run_date() - Duration::days(days_ago);
        ActivityEvent::new(
            EventKind::Issue,
            repo.to_string(),
            contributor.map(str::to_string),
            Utc.from_utc_datetime(&date.and_hms_opt(8, 30, 0).unwrap()),
            date,
        )
    }

    fn repos(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn ranks_by_volume_then_contributors() {
        let rows = vec![
            daily("a/busy", 0, 20),
            daily("a/busy", 1, 10),
            daily("b/tie", 0, 15),
            daily("c/tie", 0, 15),
        ];
        let events = vec![
            event("c/tie", Some("dev1"), 0),
            event("c/tie", Some("dev2"), 0),
            event("b/tie", Some("dev1"), 0),
            event("b/tie", Some("dev1"), 1),
        ];
        let snapshots = summarize(
            &repos(&["a/busy", "b/tie", "c/tie"]),
            &rows,
            &events,
            &BotFilter::builtin().unwrap(),
            run_date() - Duration::days(30),
            run_date(),
        );
        let order: Vec<_> = snapshots.iter().map(|s| s.repo_name.as_str()).collect();
        assert_eq!(order, vec!["a/busy", "c/tie", "b/tie"]);
        assert_eq!(snapshots[0].event_total_window, 30);
        assert_eq!(snapshots[1].active_contributor_count, 2);
        assert_eq!(snapshots[2].active_contributor_count, 1);
    }

    #[test]
    fn missing_aggregates_default_to_zero() {
        let snapshots = summarize(
            &repos(&["quiet/repo"]),
            &[],
            &[],
            &BotFilter::builtin().unwrap(),
            run_date() - Duration::days(30),
            run_date(),
        );
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].event_total_window, 0);
        assert_eq!(snapshots[0].active_contributor_count, 0);
        assert_eq!(snapshots[0].snapshot_date, run_date());
    }

    #[test]
    fn only_qualifying_repos_and_window_rows_count() {
        let rows = vec![daily("a/1", 0, 5), daily("a/1", 45, 100), daily("z/other", 0, 50)];
        let events = vec![
            event("a/1", Some("dev1"), 0),
            event("a/1", Some("dev2"), 45),
            event("a/1", None, 0),
            event("a/1", Some("renovate[bot]"), 0),
        ];
        let snapshots = summarize(
            &repos(&["a/1"]),
            &rows,
            &events,
            &BotFilter::builtin().unwrap(),
            run_date() - Duration::days(30),
            run_date(),
        );
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].event_total_window, 5);
        assert_eq!(snapshots[0].active_contributor_count, 1);
    }
}
