use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::models::{ContributorEdge, RepoSnapshot, TrendRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    RepoTrend,
    ContributorEdges,
    RepoPopularitySnapshots,
}

impl Dataset {
    pub fn table(self) -> &'static str {
        match self {
            Self::RepoTrend => "mart_repo_trend",
            Self::ContributorEdges => "mart_contributor_edges",
            Self::RepoPopularitySnapshots => "mart_repo_popularity_snapshots",
        }
    }

    /// Column summed for the value drop ratio.
    pub fn value_column(self) -> &'static str {
        match self {
            Self::RepoTrend => "total_events",
            Self::ContributorEdges => "shared_contributor_count",
            Self::RepoPopularitySnapshots => "event_total_window",
        }
    }
}

/// Column-level access used by the quality checks.
pub trait DatasetRow {
    const DATASET: Dataset;

    /// `None` when the column does not exist.
    fn is_null(&self, column: &str) -> Option<bool>;

    /// Numeric value of a column; `Some(None)` for a null value, `None` when
    /// the column does not exist or is not numeric.
    fn numeric(&self, column: &str) -> Option<Option<f64>>;
}

impl DatasetRow for TrendRecord {
    const DATASET: Dataset = Dataset::RepoTrend;

    fn is_null(&self, column: &str) -> Option<bool> {
        match column {
            "activity_date" | "repo_name" | "total_events" | "trend_status" | "snapshot_date" => {
                Some(false)
            }
            "rolling_baseline" => Some(self.rolling_baseline.is_none()),
            "trend_ratio" => Some(self.trend_ratio.is_none()),
            _ => None,
        }
    }

    fn numeric(&self, column: &str) -> Option<Option<f64>> {
        match column {
            "total_events" => Some(Some(self.total_events as f64)),
            "rolling_baseline" => Some(self.rolling_baseline),
            "trend_ratio" => Some(self.trend_ratio),
            _ => None,
        }
    }
}

impl DatasetRow for ContributorEdge {
    const DATASET: Dataset = Dataset::ContributorEdges;

    fn is_null(&self, column: &str) -> Option<bool> {
        match column {
            "source_repo" | "target_repo" | "shared_contributor_count" | "window_days"
            | "min_shared_repo_threshold" | "snapshot_date" => Some(false),
            _ => None,
        }
    }

    fn numeric(&self, column: &str) -> Option<Option<f64>> {
        match column {
            "shared_contributor_count" => Some(Some(self.shared_contributor_count as f64)),
            "window_days" => Some(Some(self.window_days as f64)),
            "min_shared_repo_threshold" => Some(Some(self.min_shared_repo_threshold as f64)),
            _ => None,
        }
    }
}

impl DatasetRow for RepoSnapshot {
    const DATASET: Dataset = Dataset::RepoPopularitySnapshots;

    fn is_null(&self, column: &str) -> Option<bool> {
        match column {
            "snapshot_date" | "repo_name" | "event_total_window" | "active_contributor_count" => {
                Some(false)
            }
            _ => None,
        }
    }

    fn numeric(&self, column: &str) -> Option<Option<f64>> {
        match column {
            "event_total_window" => Some(Some(self.event_total_window as f64)),
            "active_contributor_count" => Some(Some(self.active_contributor_count as f64)),
            _ => None,
        }
    }
}

fn unknown_column<R: DatasetRow>(column: &str) -> PipelineError {
    PipelineError::UnknownColumn {
        dataset: R::DATASET.table().to_string(),
        column: column.to_string(),
    }
}

/// An empty dataset has a null rate of zero.
pub fn null_rate<R: DatasetRow>(rows: &[R], column: &str) -> Result<f64> {
    let mut nulls = 0usize;
    for row in rows {
        match row.is_null(column) {
            Some(true) => nulls += 1,
            Some(false) => {}
            None => return Err(unknown_column::<R>(column)),
        }
    }
    if rows.is_empty() {
        return Ok(0.0);
    }
    Ok(nulls as f64 / rows.len() as f64)
}

pub fn column_sum<R: DatasetRow>(rows: &[R], column: &str) -> Result<f64> {
    rows.iter().try_fold(0.0, |acc, row| match row.numeric(column) {
        Some(value) => Ok(acc + value.unwrap_or(0.0)),
        None => Err(unknown_column::<R>(column)),
    })
}

/// Relative drop from `previous` to `current`, clamped at zero for growth.
/// `None` when there is no previous volume to compare against.
pub fn drop_ratio(previous: f64, current: f64) -> Option<f64> {
    if previous <= 0.0 {
        return None;
    }
    Some(((previous - current) / previous).max(0.0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub dataset: Dataset,
    pub snapshot_date: NaiveDate,
    pub previous_snapshot_date: Option<NaiveDate>,
    pub column: Option<String>,
    pub null_rate: Option<f64>,
    pub row_count: usize,
    pub previous_row_count: Option<usize>,
    pub row_count_drop_ratio: Option<f64>,
    pub value_column: &'static str,
    pub value_sum: f64,
    pub value_drop_ratio: Option<f64>,
}

pub fn assess<R: DatasetRow>(
    snapshot_date: NaiveDate,
    current: &[R],
    previous: Option<(NaiveDate, &[R])>,
    column: Option<&str>,
) -> Result<QualityReport> {
    let value_column = R::DATASET.value_column();
    let value_sum = column_sum(current, value_column)?;
    let null_rate = column.map(|column| null_rate(current, column)).transpose()?;

    let (previous_snapshot_date, previous_row_count, row_count_drop_ratio, value_drop_ratio) =
        match previous {
            Some((date, rows)) => (
                Some(date),
                Some(rows.len()),
                drop_ratio(rows.len() as f64, current.len() as f64),
                drop_ratio(column_sum(rows, value_column)?, value_sum),
            ),
            None => (None, None, None, None),
        };

    Ok(QualityReport {
        dataset: R::DATASET,
        snapshot_date,
        previous_snapshot_date,
        column: column.map(str::to_string),
        null_rate,
        row_count: current.len(),
        previous_row_count,
        row_count_drop_ratio,
        value_column,
        value_sum,
        value_drop_ratio,
    })
}
