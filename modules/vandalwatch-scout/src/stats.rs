use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters from one monitoring cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub queries_run: u32,
    pub pages_fetched: u32,
    pub posts_seen: u32,
    pub posts_relevant: u32,
    pub new_cases: u32,
    pub updated_cases: u32,
    /// Posts already filed by an earlier cycle.
    pub already_recorded: u32,
    pub errors: u32,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            elapsed: Duration::ZERO,
            queries_run: 0,
            pages_fetched: 0,
            posts_seen: 0,
            posts_relevant: 0,
            new_cases: 0,
            updated_cases: 0,
            already_recorded: 0,
            errors: 0,
        }
    }

    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            new_cases: self.new_cases,
            updated_cases: self.updated_cases,
            processing_time_seconds: self.elapsed.as_secs_f64(),
            timestamp: self.started_at
                + chrono::Duration::from_std(self.elapsed).unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Monitor Cycle Complete ===")?;
        writeln!(f, "Started:        {}", self.started_at.to_rfc3339())?;
        writeln!(f, "Elapsed:        {:.1}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Queries run:    {}", self.queries_run)?;
        writeln!(f, "Pages fetched:  {}", self.pages_fetched)?;
        writeln!(f, "Posts seen:     {}", self.posts_seen)?;
        writeln!(f, "Posts relevant: {}", self.posts_relevant)?;
        writeln!(f, "New cases:      {}", self.new_cases)?;
        writeln!(f, "Updated cases:  {}", self.updated_cases)?;
        if self.already_recorded > 0 {
            writeln!(f, "Already filed:  {}", self.already_recorded)?;
        }
        write!(f, "Errors:         {}", self.errors)
    }
}

/// Response body of the manual trigger endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub new_cases: u32,
    pub updated_cases: u32,
    pub processing_time_seconds: f64,
    /// Cycle completion time.
    pub timestamp: DateTime<Utc>,
}
