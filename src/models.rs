use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event row as landed by the ingestion job, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_type: String,
    pub repo_name: String,
    pub contributor: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Issue,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Issue => "issue",
        }
    }

    /// Maps a raw archive event type onto a tracked kind. Kinds outside the
    /// tracked set return `None`.
    pub fn from_raw(value: &str) -> Option<Self> {
        match value.trim() {
            "PushEvent" | "push" => Some(Self::Push),
            "PullRequestEvent" | "pull_request" => Some(Self::PullRequest),
            "IssuesEvent" | "issue" => Some(Self::Issue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    pub event_kind: EventKind,
    pub repo_name: String,
    pub contributor: Option<String>,
    occurred_at: DateTime<Utc>,
    activity_date: NaiveDate,
}

impl ActivityEvent {
    pub fn new(
        event_kind: EventKind,
        repo_name: String,
        contributor: Option<String>,
        occurred_at: DateTime<Utc>,
        activity_date: NaiveDate,
    ) -> Self {
        Self {
            event_kind,
            repo_name,
            contributor,
            occurred_at,
            activity_date,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn activity_date(&self) -> NaiveDate {
        self.activity_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub activity_date: NaiveDate,
    pub repo_name: String,
    pub total_events: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    LowActivityExcluded,
    Accelerating,
    StableGrowth,
    DecliningOrFlat,
}

impl TrendStatus {
    pub const ALL: [TrendStatus; 4] = [
        Self::Accelerating,
        Self::StableGrowth,
        Self::DecliningOrFlat,
        Self::LowActivityExcluded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowActivityExcluded => "low_activity_excluded",
            Self::Accelerating => "accelerating",
            Self::StableGrowth => "stable_growth",
            Self::DecliningOrFlat => "declining_or_flat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "low_activity_excluded" => Some(Self::LowActivityExcluded),
            "accelerating" => Some(Self::Accelerating),
            "stable_growth" => Some(Self::StableGrowth),
            "declining_or_flat" => Some(Self::DecliningOrFlat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub activity_date: NaiveDate,
    pub repo_name: String,
    pub total_events: i64,
    pub rolling_baseline: Option<f64>,
    pub trend_ratio: Option<f64>,
    pub trend_status: TrendStatus,
    pub snapshot_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorEdge {
    pub source_repo: String,
    pub target_repo: String,
    pub shared_contributor_count: i64,
    pub window_days: i64,
    pub min_shared_repo_threshold: i64,
    pub snapshot_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub snapshot_date: NaiveDate,
    pub repo_name: String,
    pub event_total_window: i64,
    pub active_contributor_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDegree {
    pub repo_name: String,
    pub degree: i64,
}

/// Counters and row totals collected while a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub raw_events_rows: usize,
    pub malformed_skipped: usize,
    pub unrecognized_dropped: usize,
    pub outside_window_dropped: usize,
    pub empty_partitions: usize,
    pub truncated_contributors: usize,
    pub daily_rows: usize,
    pub trend_rows: usize,
    pub edge_rows: usize,
    pub snapshot_rows: usize,
}
