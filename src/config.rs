use anyhow::Context;
use clap::Args;

use crate::validation::{ScoreRange, ValidationError, DEFAULT_SCORE_MAX, DEFAULT_SCORE_MIN};

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
    #[arg(long, global = true, env = "GRADING_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
    /// Lowest score a submission may contain
    #[arg(long, global = true, env = "GRADING_SCORE_MIN", default_value_t = DEFAULT_SCORE_MIN)]
    pub score_min: f64,
    /// Highest score a submission may contain
    #[arg(long, global = true, env = "GRADING_SCORE_MAX", default_value_t = DEFAULT_SCORE_MAX)]
    pub score_max: f64,
    /// Conditional write attempts before giving up on a contended sheet
    #[arg(long, global = true, env = "GRADING_WRITE_ATTEMPTS", default_value_t = 5)]
    pub write_attempts: u32,
    #[arg(long, global = true, env = "GRADING_LIST_LIMIT", default_value_t = 100)]
    pub list_limit: i64,
    /// Email of the acting user
    #[arg(long = "as", global = true, env = "GRADING_OPERATOR")]
    pub operator: Option<String>,
}

impl Settings {
    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must point at the grading Postgres database")
    }

    pub fn policy(&self) -> Result<GradingPolicy, ValidationError> {
        Ok(GradingPolicy {
            score_range: ScoreRange::new(self.score_min, self.score_max)?,
            write_attempts: self.write_attempts.max(1),
            list_limit: self.list_limit.max(1),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradingPolicy {
    pub score_range: ScoreRange,
    pub write_attempts: u32,
    pub list_limit: i64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            score_range: ScoreRange::default(),
            write_attempts: 5,
            list_limit: 100,
        }
    }
}
