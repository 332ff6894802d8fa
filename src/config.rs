use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use clap::{Args, ValueEnum};

use crate::error::{PipelineError, Result};
use crate::network::{BotFilter, NetworkConfig};
use crate::normalize::window_start;
use crate::trend::TrendConfig;

/// Case-insensitive contributor patterns treated as automation accounts.
pub const DEFAULT_BOT_PATTERNS: [&str; 3] = [r"\[bot\]$", r"-bot$", r"^bot-"];

pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Source and pipeline offsets can each move a date by one day.
pub const RAW_FETCH_SLACK_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MalformedPolicy {
    /// Drop the row and count it in the run metadata.
    #[default]
    Skip,
    /// Fail the whole run on the first malformed row.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FanoutPolicy {
    /// Keep the first repositories in name order up to the ceiling.
    #[default]
    Truncate,
    /// Fail the whole run.
    Abort,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Trailing days of events kept for daily activity and trends
    #[arg(long, env = "ANALYSIS_WINDOW_DAYS", default_value_t = 30)]
    pub analysis_window_days: i64,

    /// Trailing days of events used to build contributor edges
    #[arg(long, env = "NETWORK_WINDOW_DAYS", default_value_t = 30)]
    pub network_window_days: i64,

    /// Daily events below which a repository is not classified
    #[arg(long, env = "MIN_DAILY_EVENTS_FOR_TREND", default_value_t = 5)]
    pub min_daily_events_for_trend: i64,

    /// Trailing days of trend rows emitted per run
    #[arg(long, env = "TREND_OUTPUT_DAYS", default_value_t = 30)]
    pub trend_output_days: i64,

    /// Minimum shared contributors for an edge (default: 1 when the network
    /// window is at most 30 days, otherwise 2)
    #[arg(long, env = "MIN_SHARED_REPO_COUNT")]
    pub min_shared_repo_count: Option<i64>,

    /// Distinct repositories a single contributor may link before the fanout guard applies
    #[arg(long, env = "MAX_CONTRIBUTOR_FANOUT", default_value_t = 50)]
    pub max_contributor_fanout: usize,

    #[arg(long, env = "FANOUT_POLICY", value_enum, default_value_t = FanoutPolicy::Truncate)]
    pub fanout_policy: FanoutPolicy,

    #[arg(long, env = "MALFORMED_POLICY", value_enum, default_value_t = MalformedPolicy::Skip)]
    pub malformed_policy: MalformedPolicy,

    /// Fixed UTC offset used to derive activity dates
    #[arg(long, env = "TIMEZONE_OFFSET_MINUTES", default_value_t = 0, allow_hyphen_values = true)]
    pub timezone_offset_minutes: i32,

    /// Bot contributor patterns; the built-in list is used when none are given
    #[arg(long = "bot-pattern", env = "BOT_PATTERNS", value_delimiter = ',')]
    pub bot_patterns: Vec<String>,

    /// Additional contributor patterns excluded from contributor counts and edges
    #[arg(
        long = "exclude-contributor-pattern",
        env = "EXCLUDE_CONTRIBUTOR_PATTERNS",
        value_delimiter = ','
    )]
    pub exclude_contributor_patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub analysis_window_days: i64,
    pub malformed_policy: MalformedPolicy,
    pub timezone: FixedOffset,
    pub trend: TrendConfig,
    pub network: NetworkConfig,
    pub bot_filter: BotFilter,
}

impl PipelineConfig {
    /// Default windows, thresholds and policies around `bot_filter`.
    pub fn with_bot_filter(bot_filter: BotFilter) -> Self {
        Self {
            analysis_window_days: 30,
            malformed_policy: MalformedPolicy::default(),
            timezone: Utc.fix(),
            trend: TrendConfig::default(),
            network: NetworkConfig::default(),
            bot_filter,
        }
    }

    /// Days of history the normalizer has to retain so that every stage
    /// sees its full window.
    pub fn retention_window_days(&self) -> i64 {
        self.analysis_window_days.max(self.network.window_days)
    }

    /// Earliest `created_at` date prefix that can still normalize into the
    /// retained window.
    pub fn raw_fetch_since(&self, run_date: NaiveDate) -> NaiveDate {
        window_start(
            window_start(run_date, self.retention_window_days()),
            RAW_FETCH_SLACK_DAYS,
        )
    }
}

impl PipelineArgs {
    pub fn into_config(self) -> Result<PipelineConfig> {
        window("analysis_window_days", self.analysis_window_days)?;
        window("network_window_days", self.network_window_days)?;
        window("trend_output_days", self.trend_output_days)?;
        if self.min_daily_events_for_trend < 0 {
            return Err(PipelineError::Configuration(format!(
                "min_daily_events_for_trend must be >= 0, got {}",
                self.min_daily_events_for_trend
            )));
        }
        if let Some(count) = self.min_shared_repo_count {
            positive("min_shared_repo_count", count)?;
        }
        if self.max_contributor_fanout < 2 {
            return Err(PipelineError::Configuration(format!(
                "max_contributor_fanout must be >= 2, got {}",
                self.max_contributor_fanout
            )));
        }

        let timezone = self
            .timezone_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "timezone_offset_minutes {} is outside +/-24h",
                    self.timezone_offset_minutes
                ))
            })?;

        let mut patterns: Vec<String> = if self.bot_patterns.is_empty() {
            DEFAULT_BOT_PATTERNS.iter().map(|p| p.to_string()).collect()
        } else {
            self.bot_patterns
        };
        patterns.extend(self.exclude_contributor_patterns);
        let bot_filter = BotFilter::new(&patterns)?;

        Ok(PipelineConfig {
            analysis_window_days: self.analysis_window_days,
            malformed_policy: self.malformed_policy,
            timezone,
            trend: TrendConfig {
                min_daily_events_for_trend: self.min_daily_events_for_trend,
                trend_output_days: self.trend_output_days,
            },
            network: NetworkConfig {
                window_days: self.network_window_days,
                min_shared_repo_count: self.min_shared_repo_count,
                max_contributor_fanout: self.max_contributor_fanout,
                fanout_policy: self.fanout_policy,
            },
            bot_filter,
        })
    }
}

fn window(name: &str, days: i64) -> Result<()> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(PipelineError::Configuration(format!(
            "{name} must be between 1 and {MAX_WINDOW_DAYS} days, got {days}"
        )));
    }
    Ok(())
}

fn positive(name: &str, value: i64) -> Result<()> {
    if value <= 0 {
        return Err(PipelineError::Configuration(format!(
            "{name} must be > 0, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> PipelineArgs {
        PipelineArgs {
            analysis_window_days: 30,
            network_window_days: 30,
            min_daily_events_for_trend: 5,
            trend_output_days: 30,
            min_shared_repo_count: None,
            max_contributor_fanout: 50,
            fanout_policy: FanoutPolicy::Truncate,
            malformed_policy: MalformedPolicy::Skip,
            timezone_offset_minutes: 0,
            bot_patterns: Vec::new(),
            exclude_contributor_patterns: Vec::new(),
        }
    }

    #[test]
    fn defaults_validate() {
        let config = args().into_config().unwrap();
        assert_eq!(config.analysis_window_days, 30);
        assert_eq!(config.network.min_shared_threshold(), 1);
        assert!(config.bot_filter.is_bot("renovate[bot]"));
    }

    #[test]
    fn rejects_non_positive_windows() {
        let mut bad = args();
        bad.network_window_days = 0;
        let err = bad.into_config().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn rejects_oversized_windows() {
        let mut analysis = args();
        analysis.analysis_window_days = i64::MAX;
        assert!(matches!(analysis.into_config(), Err(PipelineError::Configuration(_))));

        let mut network = args();
        network.network_window_days = MAX_WINDOW_DAYS + 1;
        assert!(matches!(network.into_config(), Err(PipelineError::Configuration(_))));

        let mut output = args();
        output.trend_output_days = i64::MAX;
        assert!(matches!(output.into_config(), Err(PipelineError::Configuration(_))));

        let mut widest = args();
        widest.analysis_window_days = MAX_WINDOW_DAYS;
        assert!(widest.into_config().is_ok());
    }

    #[test]
    fn raw_fetch_reaches_rows_stamped_in_a_trailing_offset() {
        use crate::models::RawEvent;
        use crate::normalize::{Normalized, Normalizer};

        let mut east = args();
        east.analysis_window_days = 29;
        east.network_window_days = 29;
        east.timezone_offset_minutes = 14 * 60;
        let config = east.into_config().unwrap();
        let run_date = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();

        let raw = RawEvent {
            event_type: "PushEvent".to_string(),
            repo_name: "alpha/repo".to_string(),
            contributor: Some("dev1".to_string()),
            created_at: "2026-02-28T23:00:00-12:00".to_string(),
        };
        let normalizer =
            Normalizer::new(run_date, config.retention_window_days(), config.timezone);
        assert_eq!(normalizer.window_start(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert!(matches!(normalizer.normalize(0, &raw).unwrap(), Normalized::Event(_)));

        let since = config.raw_fetch_since(run_date).to_string();
        assert!(&raw.created_at[..10] >= since.as_str());
    }

    #[test]
    fn rejects_invalid_patterns() {
        let mut bad = args();
        bad.exclude_contributor_patterns = vec!["(copilot".to_string()];
        assert!(matches!(
            bad.into_config(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_offsets() {
        let mut bad = args();
        bad.timezone_offset_minutes = 24 * 60;
        assert!(bad.into_config().is_err());
    }

    #[test]
    fn exclusion_patterns_extend_the_bot_list() {
        let mut custom = args();
        custom.exclude_contributor_patterns = vec!["copilot|claude|codex".to_string()];
        let config = custom.into_config().unwrap();
        assert!(config.bot_filter.is_bot("Copilot"));
        assert!(config.bot_filter.is_bot("octo-bot"));
        assert!(!config.bot_filter.is_bot("octocat"));
    }

    #[test]
    fn retention_covers_the_widest_window() {
        let mut wide = args();
        wide.network_window_days = 60;
        let config = wide.into_config().unwrap();
        assert_eq!(config.retention_window_days(), 60);
        assert_eq!(config.network.min_shared_threshold(), 2);
    }
}
