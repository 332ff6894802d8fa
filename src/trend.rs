use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{DailyActivity, TrendRecord, TrendStatus};
use crate::normalize::window_start;

/// Number of preceding daily rows averaged into the baseline.
pub const BASELINE_ROWS: usize = 7;

pub const ACCELERATING_RATIO: f64 = 2.0;
pub const STABLE_GROWTH_RATIO: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendConfig {
    pub min_daily_events_for_trend: i64,
    pub trend_output_days: i64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_daily_events_for_trend: 5,
            trend_output_days: 30,
        }
    }
}

/// Computes baselines and classifications for every repository, emitting
/// rows whose date falls inside the trailing output window. Rows are ordered
/// by repository then date.
pub fn compute_trends(
    daily: &[DailyActivity],
    config: &TrendConfig,
    run_date: NaiveDate,
) -> Vec<TrendRecord> {
    let mut partitions: BTreeMap<&str, Vec<&DailyActivity>> = BTreeMap::new();
    for row in daily {
        partitions.entry(row.repo_name.as_str()).or_default().push(row);
    }

    let output_start = window_start(run_date, config.trend_output_days);
    let mut records = Vec::new();

    for (repo_name, mut rows) in partitions {
        rows.sort_by_key(|row| row.activity_date);

        for (idx, row) in rows.iter().enumerate() {
            if row.activity_date < output_start || row.activity_date > run_date {
                continue;
            }

            let preceding = &rows[idx.saturating_sub(BASELINE_ROWS)..idx];
            let rolling_baseline = rolling_mean(preceding);
            let trend_ratio = ratio(row.total_events, rolling_baseline);

            records.push(TrendRecord {
                activity_date: row.activity_date,
                repo_name: repo_name.to_string(),
                total_events: row.total_events,
                rolling_baseline,
                trend_ratio,
                trend_status: classify(
                    row.total_events,
                    trend_ratio,
                    config.min_daily_events_for_trend,
                ),
                snapshot_date: run_date,
            });
        }
    }

    tracing::debug!(rows = records.len(), %output_start, "computed trend records");
    records
}

fn rolling_mean(rows: &[&DailyActivity]) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let sum: i64 = rows.iter().map(|row| row.total_events).sum();
    Some(sum as f64 / rows.len() as f64)
}

/// `None` when the baseline is missing or zero.
pub fn ratio(total_events: i64, baseline: Option<f64>) -> Option<f64> {
    match baseline {
        Some(baseline) if baseline > 0.0 => Some(total_events as f64 / baseline),
        _ => None,
    }
}

pub fn classify(total_events: i64, trend_ratio: Option<f64>, min_daily_events: i64) -> TrendStatus {
    if total_events < min_daily_events {
        return TrendStatus::LowActivityExcluded;
    }
    match trend_ratio {
        Some(ratio) if ratio >= ACCELERATING_RATIO => TrendStatus::Accelerating,
        Some(ratio) if ratio >= STABLE_GROWTH_RATIO => TrendStatus::StableGrowth,
        _ => TrendStatus::DecliningOrFlat,
    }
}

/// Most recent activity date present in a trend output.
pub fn latest_activity_date(records: &[TrendRecord]) -> Option<NaiveDate> {
    records.iter().map(|record| record.activity_date).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()
    }

    fn series(repo: &str, counts: &[i64]) -> Vec<DailyActivity> {
        let start = run_date() - Duration::days(counts.len() as i64 - 1);
        counts
            .iter()
            .enumerate()
            .map(|(offset, total)| DailyActivity {
                activity_date: start + Duration::days(offset as i64),
                repo_name: repo.to_string(),
                total_events: *total,
            })
            .collect()
    }

    fn last_for<'a>(records: &'a [TrendRecord], repo: &str) -> &'a TrendRecord {
        records
            .iter()
            .filter(|r| r.repo_name == repo)
            .last()
            .unwrap()
    }

    #[test]
    fn spike_after_flat_week_is_accelerating() {
        let daily = series("alpha/repo", &[10, 10, 10, 10, 10, 10, 10, 30]);
        let records = compute_trends(&daily, &TrendConfig::default(), run_date());
        let last = last_for(&records, "alpha/repo");
        assert_eq!(last.rolling_baseline, Some(10.0));
        assert_eq!(last.trend_ratio, Some(3.0));
        assert_eq!(last.trend_status, TrendStatus::Accelerating);
        assert_eq!(last.snapshot_date, run_date());
    }

    #[test]
    fn first_row_has_no_baseline() {
        let daily = series("alpha/repo", &[12, 6]);
        let records = compute_trends(&daily, &TrendConfig::default(), run_date());
        assert_eq!(records[0].rolling_baseline, None);
        assert_eq!(records[0].trend_ratio, None);
        assert_eq!(records[0].trend_status, TrendStatus::DecliningOrFlat);
        assert_eq!(records[1].rolling_baseline, Some(12.0));
        assert_eq!(records[1].trend_ratio, Some(0.5));
    }

    #[test]
    fn short_history_averages_fewer_rows() {
        let daily = series("alpha/repo", &[4, 8, 9]);
        let records = compute_trends(&daily, &TrendConfig::default(), run_date());
        assert_eq!(records[2].rolling_baseline, Some(6.0));
        assert_eq!(records[2].trend_ratio, Some(1.5));
        assert_eq!(records[2].trend_status, TrendStatus::StableGrowth);
    }

    #[test]
    fn baseline_only_uses_seven_preceding_rows() {
        let daily = series("alpha/repo", &[1000, 5, 5, 5, 5, 5, 5, 5, 5]);
        let records = compute_trends(&daily, &TrendConfig::default(), run_date());
        let last = records.last().unwrap();
        assert_eq!(last.rolling_baseline, Some(5.0));
        assert_eq!(last.trend_status, TrendStatus::StableGrowth);
    }

    #[test]
    fn baseline_ignores_same_day_and_later_rows() {
        let daily = series("alpha/repo", &[6, 6, 6, 6, 9, 20]);
        let records = compute_trends(&daily, &TrendConfig::default(), run_date());
        let target = records[3].clone();

        let mut perturbed = daily.clone();
        perturbed[3].total_events = 600;
        perturbed[4].total_events = 1;
        perturbed[5].total_events = 0;
        let again = compute_trends(&perturbed, &TrendConfig::default(), run_date());
        assert_eq!(again[3].rolling_baseline, target.rolling_baseline);
        assert_eq!(again[2], records[2]);
    }

    #[test]
    fn boundaries_resolve_to_the_higher_bucket() {
        assert_eq!(classify(10, Some(2.0), 5), TrendStatus::Accelerating);
        assert_eq!(classify(10, Some(1.0), 5), TrendStatus::StableGrowth);
        assert_eq!(classify(10, Some(0.99), 5), TrendStatus::DecliningOrFlat);
        assert_eq!(classify(5, Some(3.0), 5), TrendStatus::Accelerating);
        assert_eq!(classify(4, Some(3.0), 5), TrendStatus::LowActivityExcluded);
        assert_eq!(classify(7, None, 5), TrendStatus::DecliningOrFlat);
    }

    #[test]
    fn zero_baseline_is_undefined_ratio() {
        assert_eq!(ratio(5, Some(0.0)), None);
        assert_eq!(ratio(5, None), None);
        assert_eq!(ratio(6, Some(3.0)), Some(2.0));
    }

    #[test]
    fn only_rows_inside_output_window_are_emitted() {
        let daily = series("alpha/repo", &[5; 40]);
        let config = TrendConfig {
            min_daily_events_for_trend: 5,
            trend_output_days: 10,
        };
        let records = compute_trends(&daily, &config, run_date());
        assert_eq!(records.len(), 11);
        assert_eq!(records[0].activity_date, run_date() - Duration::days(10));
        // Baselines still draw on rows before the output window.
        assert_eq!(records[0].rolling_baseline, Some(5.0));
    }

    #[test]
    fn partitions_do_not_mix() {
        let mut daily = series("alpha/repo", &[10, 10]);
        daily.extend(series("beta/repo", &[1, 40]));
        let records = compute_trends(&daily, &TrendConfig::default(), run_date());
        assert_eq!(last_for(&records, "alpha/repo").trend_ratio, Some(1.0));
        assert_eq!(last_for(&records, "beta/repo").trend_ratio, Some(40.0));
        assert_eq!(latest_activity_date(&records), Some(run_date()));
    }
}
