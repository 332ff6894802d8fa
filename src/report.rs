use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{ContributorEdge, RepoSnapshot, TrendRecord, TrendStatus};
use crate::network;
use crate::trend::latest_activity_date;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub status: TrendStatus,
    pub count: usize,
}

/// Status mix across the records on the most recent activity date.
pub fn summarize_by_status(trends: &[TrendRecord]) -> Vec<StatusSummary> {
    let Some(latest) = latest_activity_date(trends) else {
        return Vec::new();
    };

    TrendStatus::ALL
        .iter()
        .map(|status| StatusSummary {
            status: *status,
            count: trends
                .iter()
                .filter(|record| record.activity_date == latest && record.trend_status == *status)
                .count(),
        })
        .filter(|summary| summary.count > 0)
        .collect()
}

pub fn build_report(
    snapshot_date: NaiveDate,
    trends: &[TrendRecord],
    edges: &[ContributorEdge],
    snapshots: &[RepoSnapshot],
    limit: usize,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Repository Activity Report");
    let _ = writeln!(output, "Snapshot {snapshot_date}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend Mix");

    let summaries = summarize_by_status(trends);
    if summaries.is_empty() {
        let _ = writeln!(output, "No trend records for this snapshot.");
    } else {
        if let Some(latest) = latest_activity_date(trends) {
            let _ = writeln!(output, "Latest activity date {latest}");
        }
        for summary in &summaries {
            let _ = writeln!(output, "- {}: {} repositories", summary.status.as_str(), summary.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Accelerating Repositories");

    let mut accelerating: Vec<&TrendRecord> = match latest_activity_date(trends) {
        Some(latest) => trends
            .iter()
            .filter(|r| r.activity_date == latest && r.trend_status == TrendStatus::Accelerating)
            .collect(),
        None => Vec::new(),
    };
    accelerating.sort_by(|a, b| {
        b.trend_ratio
            .partial_cmp(&a.trend_ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.repo_name.cmp(&b.repo_name))
    });

    if accelerating.is_empty() {
        let _ = writeln!(output, "No accelerating repositories.");
    } else {
        for record in accelerating.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {}: {} events, {:.2}x baseline {:.1}",
                record.repo_name,
                record.total_events,
                record.trend_ratio.unwrap_or_default(),
                record.rolling_baseline.unwrap_or_default()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Strongest Contributor Overlaps");

    let mut strongest: Vec<&ContributorEdge> = edges.iter().collect();
    strongest.sort_by(|a, b| b.shared_contributor_count.cmp(&a.shared_contributor_count));
    if strongest.is_empty() {
        let _ = writeln!(output, "No shared-contributor edges.");
    } else {
        for edge in strongest.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {} <-> {}: {} shared contributors",
                edge.source_repo, edge.target_repo, edge.shared_contributor_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Connected Repositories");

    let degrees = network::repo_degrees(edges, limit);
    if degrees.is_empty() {
        let _ = writeln!(output, "No connected repositories.");
    } else {
        for degree in &degrees {
            let _ = writeln!(output, "- {}: degree {}", degree.repo_name, degree.degree);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Popularity Snapshot");

    if snapshots.is_empty() {
        let _ = writeln!(output, "No qualifying repositories.");
    } else {
        for (rank, snapshot) in snapshots.iter().take(limit).enumerate() {
            let _ = writeln!(
                output,
                "{}. {}: {} events, {} contributors",
                rank + 1,
                snapshot.repo_name,
                snapshot.event_total_window,
                snapshot.active_contributor_count
            );
        }
    }

    output
}
