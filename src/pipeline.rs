use chrono::NaiveDate;
use uuid::Uuid;

use crate::aggregate;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{
    ContributorEdge, DailyActivity, RawEvent, RepoSnapshot, RunMetadata, TrendRecord,
};
use crate::network;
use crate::normalize::{window_start, Normalizer};
use crate::snapshot;
use crate::trend;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub daily_activity: Vec<DailyActivity>,
    pub trends: Vec<TrendRecord>,
    pub edges: Vec<ContributorEdge>,
    pub snapshots: Vec<RepoSnapshot>,
    pub metadata: RunMetadata,
}

/// Runs every stage in order. Only `metadata.run_id` differs between reruns.
pub fn run(
    raw: &[RawEvent],
    config: &PipelineConfig,
    run_date: NaiveDate,
) -> Result<PipelineOutput> {
    let span = tracing::info_span!("pipeline", %run_date);
    let _guard = span.enter();

    let normalizer = Normalizer::new(run_date, config.retention_window_days(), config.timezone);
    let normalized = normalizer.collect_events(raw, config.malformed_policy)?;
    tracing::info!(
        raw_rows = raw.len(),
        retained = normalized.events.len(),
        malformed = normalized.malformed_skipped,
        unrecognized = normalized.unrecognized_dropped,
        outside_window = normalized.outside_window_dropped,
        "normalized raw events"
    );

    let analysis_start = window_start(run_date, config.analysis_window_days);
    let daily_activity = aggregate::daily_activity(
        normalized
            .events
            .iter()
            .filter(|event| event.activity_date() >= analysis_start),
    );
    tracing::info!(rows = daily_activity.len(), "aggregated daily activity");

    let trends = trend::compute_trends(&daily_activity, &config.trend, run_date);
    tracing::info!(rows = trends.len(), "classified repository trends");

    let candidates = network::candidate_repos(&trends, config.trend.min_daily_events_for_trend);
    let graph = network::build_edges(
        &normalized.events,
        candidates,
        &config.network,
        &config.bot_filter,
        run_date,
    )?;

    let snapshots = snapshot::summarize(
        &graph.candidate_repos,
        &daily_activity,
        &normalized.events,
        &config.bot_filter,
        analysis_start,
        run_date,
    );
    tracing::info!(rows = snapshots.len(), "summarized repository snapshots");

    let metadata = RunMetadata {
        run_id: Uuid::new_v4(),
        snapshot_date: run_date,
        raw_events_rows: raw.len(),
        malformed_skipped: normalized.malformed_skipped,
        unrecognized_dropped: normalized.unrecognized_dropped,
        outside_window_dropped: normalized.outside_window_dropped,
        empty_partitions: graph.empty_partitions,
        truncated_contributors: graph.truncated_contributors,
        daily_rows: daily_activity.len(),
        trend_rows: trends.len(),
        edge_rows: graph.edges.len(),
        snapshot_rows: snapshots.len(),
    };

    Ok(PipelineOutput {
        daily_activity,
        trends,
        edges: graph.edges,
        snapshots,
        metadata,
    })
}
