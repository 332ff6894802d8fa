use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};

use crate::config::{FanoutPolicy, DEFAULT_BOT_PATTERNS};
use crate::error::{PipelineError, Result};
use crate::models::{ActivityEvent, ContributorEdge, RepoDegree, TrendRecord};
use crate::normalize::window_start;
use crate::trend::latest_activity_date;

/// Network window above which the default edge threshold rises from 1 to 2.
pub const WIDE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub window_days: i64,
    pub min_shared_repo_count: Option<i64>,
    pub max_contributor_fanout: usize,
    pub fanout_policy: FanoutPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            min_shared_repo_count: None,
            max_contributor_fanout: 50,
            fanout_policy: FanoutPolicy::Truncate,
        }
    }
}

impl NetworkConfig {
    /// Explicit threshold if configured, otherwise one that depends on the
    /// window length.
    pub fn min_shared_threshold(&self) -> i64 {
        self.min_shared_repo_count.unwrap_or(if self.window_days <= WIDE_WINDOW_DAYS {
            1
        } else {
            2
        })
    }
}

/// Case-insensitive contributor name patterns for automation accounts.
#[derive(Debug, Clone)]
pub struct BotFilter {
    patterns: Vec<Regex>,
}

impl BotFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| {
                        PipelineError::Configuration(format!(
                            "invalid contributor pattern {:?}: {err}",
                            pattern.as_ref()
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Filter over [`DEFAULT_BOT_PATTERNS`].
    pub fn builtin() -> Result<Self> {
        Self::new(&DEFAULT_BOT_PATTERNS)
    }

    pub fn is_bot(&self, contributor: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(contributor))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkOutcome {
    pub edges: Vec<ContributorEdge>,
    pub candidate_repos: BTreeSet<String>,
    /// Candidates with no eligible contributor inside the window.
    pub empty_partitions: usize,
    pub truncated_contributors: usize,
}

/// Repositories with a record on the latest trend date that meet the
/// minimum daily activity.
pub fn candidate_repos(trends: &[TrendRecord], min_daily_events: i64) -> BTreeSet<String> {
    let Some(latest) = latest_activity_date(trends) else {
        return BTreeSet::new();
    };
    trends
        .iter()
        .filter(|record| record.activity_date == latest && record.total_events >= min_daily_events)
        .map(|record| record.repo_name.clone())
        .collect()
}

/// `candidates` is the output of [`candidate_repos`].
pub fn build_edges(
    events: &[ActivityEvent],
    candidates: BTreeSet<String>,
    config: &NetworkConfig,
    bot_filter: &BotFilter,
    run_date: NaiveDate,
) -> Result<NetworkOutcome> {
    let since = window_start(run_date, config.window_days);
    let threshold = config.min_shared_threshold();

    // contributor -> distinct candidate repos, both ordered by name
    let mut repos_by_contributor: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut repos_with_contributors: BTreeSet<&str> = BTreeSet::new();
    for event in events {
        let activity_date = event.activity_date();
        if activity_date < since || activity_date > run_date {
            continue;
        }
        if !candidates.contains(&event.repo_name) {
            continue;
        }
        let Some(contributor) = event.contributor.as_deref() else {
            continue;
        };
        if bot_filter.is_bot(contributor) {
            continue;
        }
        repos_by_contributor
            .entry(contributor)
            .or_default()
            .insert(event.repo_name.as_str());
        repos_with_contributors.insert(event.repo_name.as_str());
    }

    let empty_partitions = candidates.len() - repos_with_contributors.len();
    if empty_partitions > 0 {
        tracing::debug!(empty_partitions, "candidate repositories without contributors");
    }

    let mut truncated_contributors = 0usize;
    let mut pair_counts: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for (contributor, repos) in &repos_by_contributor {
        if repos.len() < 2 {
            continue;
        }
        let mut repos: Vec<&str> = repos.iter().copied().collect();
        if repos.len() > config.max_contributor_fanout {
            match config.fanout_policy {
                FanoutPolicy::Abort => {
                    return Err(PipelineError::FanoutCeilingExceeded {
                        contributor: contributor.to_string(),
                        repo_count: repos.len(),
                        ceiling: config.max_contributor_fanout,
                    });
                }
                FanoutPolicy::Truncate => {
                    tracing::warn!(
                        contributor,
                        repo_count = repos.len(),
                        ceiling = config.max_contributor_fanout,
                        "truncating contributor fanout"
                    );
                    repos.truncate(config.max_contributor_fanout);
                    truncated_contributors += 1;
                }
            }
        }

        for (i, source) in repos.iter().enumerate() {
            for target in &repos[i + 1..] {
                *pair_counts.entry((*source, *target)).or_insert(0) += 1;
            }
        }
    }

    let edges: Vec<ContributorEdge> = pair_counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|((source_repo, target_repo), shared_contributor_count)| ContributorEdge {
            source_repo: source_repo.to_string(),
            target_repo: target_repo.to_string(),
            shared_contributor_count,
            window_days: config.window_days,
            min_shared_repo_threshold: threshold,
            snapshot_date: run_date,
        })
        .collect();

    tracing::info!(
        candidates = candidates.len(),
        contributors = repos_by_contributor.len(),
        edges = edges.len(),
        threshold,
        "built contributor network"
    );

    Ok(NetworkOutcome {
        edges,
        candidate_repos: candidates,
        empty_partitions,
        truncated_contributors,
    })
}

/// Weighted degree per repository: the sum of shared contributor counts
/// across every edge touching it, highest first.
pub fn repo_degrees(edges: &[ContributorEdge], top_n: usize) -> Vec<RepoDegree> {
    let mut degrees: BTreeMap<&str, i64> = BTreeMap::new();
    for edge in edges {
        *degrees.entry(edge.source_repo.as_str()).or_insert(0) += edge.shared_contributor_count;
        *degrees.entry(edge.target_repo.as_str()).or_insert(0) += edge.shared_contributor_count;
    }

    let mut ranked: Vec<RepoDegree> = degrees
        .into_iter()
        .map(|(repo_name, degree)| RepoDegree {
            repo_name: repo_name.to_string(),
            degree,
        })
        .collect();
    ranked.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.repo_name.cmp(&b.repo_name)));
    ranked.truncate(top_n);
    ranked
}
