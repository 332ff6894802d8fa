use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{ContributorEdge, RawEvent, RepoSnapshot, TrendRecord, TrendStatus};
use crate::pipeline::PipelineOutput;
use crate::quality::Dataset;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts a small, deterministic event history ending at `run_date`.
pub async fn seed(pool: &PgPool, run_date: NaiveDate) -> anyhow::Result<usize> {
    // (repo, event_type, events per day before run_date, events on run_date, contributors)
    let repos: [(&str, &str, usize, usize, &[&str]); 4] = [
        ("alpha/repo", "PushEvent", 10, 30, &["ana", "kiran", "shared-dev", "renovate[bot]"]),
        ("beta/service", "PullRequestEvent", 6, 7, &["lee", "shared-dev", "kiran"]),
        ("gamma/docs", "IssuesEvent", 8, 4, &["mo", "octo-bot"]),
        ("b/low", "PushEvent", 3, 3, &["shared-dev", "lee"]),
    ];

    let mut inserted = 0usize;
    for days_ago in 0..14i64 {
        let date = run_date - Duration::days(days_ago);
        for (repo_name, event_type, daily, today, contributors) in repos {
            let count = if days_ago == 0 { today } else { daily };
            for n in 0..count {
                let contributor = contributors[n % contributors.len()];
                let source_key = format!("seed-{repo_name}-{date}-{n}");
                let created_at = format!("{date}T{:02}:15:00Z", n % 24);
                inserted += insert_raw_event(
                    pool,
                    event_type,
                    repo_name,
                    Some(contributor),
                    &created_at,
                    &source_key,
                )
                .await?;
            }
        }
        let source_key = format!("seed-watch-{date}");
        inserted += insert_raw_event(
            pool,
            "WatchEvent",
            "alpha/repo",
            Some("stargazer"),
            &format!("{date}T12:00:00Z"),
            &source_key,
        )
        .await?;
    }

    Ok(inserted)
}

async fn insert_raw_event(
    pool: &PgPool,
    event_type: &str,
    repo_name: &str,
    contributor: Option<&str>,
    created_at: &str,
    source_key: &str,
) -> anyhow::Result<usize> {
    let result = sqlx::query(
        r#"
        INSERT INTO oss_activity.raw_events
        (id, event_type, repo_name, contributor, created_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(event_type)
    .bind(repo_name)
    .bind(contributor)
    .bind(created_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        event_type: String,
        repo_name: String,
        contributor: Option<String>,
        created_at: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid csv record {}", line + 1))?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        inserted += insert_raw_event(
            pool,
            &row.event_type,
            &row.repo_name,
            row.contributor.as_deref(),
            &row.created_at,
            &source_key,
        )
        .await?;
    }

    Ok(inserted)
}

/// Reads raw events whose timestamp starts on or after `since`. Rows whose
/// timestamp does not start with a date are returned too so the normalizer
/// can count them as malformed.
pub async fn fetch_raw_events(pool: &PgPool, since: NaiveDate) -> anyhow::Result<Vec<RawEvent>> {
    let records = sqlx::query(
        r#"
        SELECT event_type, repo_name, contributor, created_at
        FROM oss_activity.raw_events
        WHERE LEFT(created_at, 10) >= $1
           OR LEFT(created_at, 10) !~ '^[0-9]{4}-[0-9]{2}-[0-9]{2}$'
        ORDER BY source_key
        "#,
    )
    .bind(since.to_string())
    .fetch_all(pool)
    .await
    .context("failed to read raw events")?;

    let mut events = Vec::with_capacity(records.len());
    for row in records {
        events.push(RawEvent {
            event_type: row.try_get("event_type")?,
            repo_name: row.try_get("repo_name")?,
            contributor: row.try_get("contributor")?,
            created_at: row.try_get("created_at")?,
        });
    }

    Ok(events)
}

/// Writes every dataset of a run in one transaction. Rows from an earlier run
/// for the same snapshot date are replaced.
pub async fn publish(
    pool: &PgPool,
    output: &PipelineOutput,
    started_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    let snapshot_date = output.metadata.snapshot_date;
    let mut tx = pool.begin().await?;

    for dataset in [
        Dataset::RepoTrend,
        Dataset::ContributorEdges,
        Dataset::RepoPopularitySnapshots,
    ] {
        sqlx::query(&format!(
            "DELETE FROM oss_activity.{} WHERE snapshot_date = $1",
            dataset.table()
        ))
        .bind(snapshot_date)
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query("DELETE FROM oss_activity.int_repo_daily_activity")
        .execute(&mut *tx)
        .await?;

    for row in &output.daily_activity {
        sqlx::query(
            r#"
            INSERT INTO oss_activity.int_repo_daily_activity
            (activity_date, repo_name, total_events)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(row.activity_date)
        .bind(&row.repo_name)
        .bind(row.total_events)
        .execute(&mut *tx)
        .await?;
    }

    for record in &output.trends {
        sqlx::query(
            r#"
            INSERT INTO oss_activity.mart_repo_trend
            (snapshot_date, repo_name, activity_date, total_events,
             rolling_baseline, trend_ratio, trend_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.snapshot_date)
        .bind(&record.repo_name)
        .bind(record.activity_date)
        .bind(record.total_events)
        .bind(record.rolling_baseline)
        .bind(record.trend_ratio)
        .bind(record.trend_status.as_str())
        .execute(&mut *tx)
        .await?;
    }

    for edge in &output.edges {
        sqlx::query(
            r#"
            INSERT INTO oss_activity.mart_contributor_edges
            (snapshot_date, source_repo, target_repo, shared_contributor_count,
             window_days, min_shared_repo_threshold)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(edge.snapshot_date)
        .bind(&edge.source_repo)
        .bind(&edge.target_repo)
        .bind(edge.shared_contributor_count)
        .bind(edge.window_days)
        .bind(edge.min_shared_repo_threshold)
        .execute(&mut *tx)
        .await?;
    }

    for (rank, snapshot) in output.snapshots.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO oss_activity.mart_repo_popularity_snapshots
            (snapshot_date, repo_name, rank, event_total_window, active_contributor_count)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(snapshot.snapshot_date)
        .bind(&snapshot.repo_name)
        .bind(rank as i64 + 1)
        .bind(snapshot.event_total_window)
        .bind(snapshot.active_contributor_count)
        .execute(&mut *tx)
        .await?;
    }

    let meta = &output.metadata;
    sqlx::query(
        r#"
        INSERT INTO oss_activity.pipeline_runs
        (run_id, snapshot_date, run_started_at, run_finished_at, status,
         raw_events_rows, malformed_skipped, unrecognized_dropped, outside_window_dropped,
         empty_partitions, truncated_contributors, daily_rows, trend_rows, edge_rows,
         snapshot_rows)
        VALUES ($1, $2, $3, $4, 'published', $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(meta.run_id)
    .bind(meta.snapshot_date)
    .bind(started_at)
    .bind(Utc::now())
    .bind(meta.raw_events_rows as i64)
    .bind(meta.malformed_skipped as i64)
    .bind(meta.unrecognized_dropped as i64)
    .bind(meta.outside_window_dropped as i64)
    .bind(meta.empty_partitions as i64)
    .bind(meta.truncated_contributors as i64)
    .bind(meta.daily_rows as i64)
    .bind(meta.trend_rows as i64)
    .bind(meta.edge_rows as i64)
    .bind(meta.snapshot_rows as i64)
    .execute(&mut *tx)
    .await?;

    tx.commit()
        .await
        .with_context(|| format!("failed to publish snapshot {snapshot_date}"))?;
    Ok(())
}

pub async fn latest_snapshot_date(
    pool: &PgPool,
    dataset: Dataset,
) -> anyhow::Result<Option<NaiveDate>> {
    let row = sqlx::query(&format!(
        "SELECT MAX(snapshot_date) AS snapshot_date FROM oss_activity.{}",
        dataset.table()
    ))
    .fetch_one(pool)
    .await?;
    Ok(row.try_get("snapshot_date")?)
}

pub async fn previous_snapshot_date(
    pool: &PgPool,
    dataset: Dataset,
    before: NaiveDate,
) -> anyhow::Result<Option<NaiveDate>> {
    let row = sqlx::query(&format!(
        "SELECT MAX(snapshot_date) AS snapshot_date FROM oss_activity.{} WHERE snapshot_date < $1",
        dataset.table()
    ))
    .bind(before)
    .fetch_one(pool)
    .await?;
    Ok(row.try_get("snapshot_date")?)
}

pub async fn fetch_trends(
    pool: &PgPool,
    snapshot_date: NaiveDate,
) -> anyhow::Result<Vec<TrendRecord>> {
    let records = sqlx::query(
        r#"
        SELECT snapshot_date, repo_name, activity_date, total_events,
               rolling_baseline, trend_ratio, trend_status
        FROM oss_activity.mart_repo_trend
        WHERE snapshot_date = $1
        ORDER BY repo_name, activity_date
        "#,
    )
    .bind(snapshot_date)
    .fetch_all(pool)
    .await?;

    records.iter().map(trend_from_row).collect()
}

fn trend_from_row(row: &PgRow) -> anyhow::Result<TrendRecord> {
    let status: String = row.try_get("trend_status")?;
    Ok(TrendRecord {
        activity_date: row.try_get("activity_date")?,
        repo_name: row.try_get("repo_name")?,
        total_events: row.try_get("total_events")?,
        rolling_baseline: row.try_get("rolling_baseline")?,
        trend_ratio: row.try_get("trend_ratio")?,
        trend_status: TrendStatus::parse(&status)
            .with_context(|| format!("unknown trend_status {status:?}"))?,
        snapshot_date: row.try_get("snapshot_date")?,
    })
}

pub async fn fetch_edges(
    pool: &PgPool,
    snapshot_date: NaiveDate,
) -> anyhow::Result<Vec<ContributorEdge>> {
    let records = sqlx::query(
        r#"
        SELECT snapshot_date, source_repo, target_repo, shared_contributor_count,
               window_days, min_shared_repo_threshold
        FROM oss_activity.mart_contributor_edges
        WHERE snapshot_date = $1
        ORDER BY source_repo, target_repo
        "#,
    )
    .bind(snapshot_date)
    .fetch_all(pool)
    .await?;

    let mut edges = Vec::with_capacity(records.len());
    for row in records {
        edges.push(ContributorEdge {
            source_repo: row.try_get("source_repo")?,
            target_repo: row.try_get("target_repo")?,
            shared_contributor_count: row.try_get("shared_contributor_count")?,
            window_days: row.try_get("window_days")?,
            min_shared_repo_threshold: row.try_get("min_shared_repo_threshold")?,
            snapshot_date: row.try_get("snapshot_date")?,
        });
    }
    Ok(edges)
}

pub async fn fetch_snapshots(
    pool: &PgPool,
    snapshot_date: NaiveDate,
) -> anyhow::Result<Vec<RepoSnapshot>> {
    let records = sqlx::query(
        r#"
        SELECT snapshot_date, repo_name, event_total_window, active_contributor_count
        FROM oss_activity.mart_repo_popularity_snapshots
        WHERE snapshot_date = $1
        ORDER BY rank
        "#,
    )
    .bind(snapshot_date)
    .fetch_all(pool)
    .await?;

    let mut snapshots = Vec::with_capacity(records.len());
    for row in records {
        snapshots.push(RepoSnapshot {
            snapshot_date: row.try_get("snapshot_date")?,
            repo_name: row.try_get("repo_name")?,
            event_total_window: row.try_get("event_total_window")?,
            active_contributor_count: row.try_get("active_contributor_count")?,
        });
    }
    Ok(snapshots)
}
