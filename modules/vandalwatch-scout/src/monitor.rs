//! One monitoring cycle: search every keyword and account, analyze each post,
//! and file incidents through the dedup engine.
//!
//! Processing is strictly sequential with a fixed delay between search calls.
//! At most one cycle runs per `Monitor`; the dedup engine relies on that.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vandalwatch_common::{MonitorSettings, Platform, SocialPost};

use crate::dedup::{DedupEngine, Resolution};
use crate::stats::CycleReport;
use crate::traits::{CaseStore, ContentAnalyzer, PostSearcher};

/// How much of the cycle an error costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Skip this post, keep going.
    Post,
    /// Skip the rest of this query.
    Query,
    /// The cycle stops.
    Cycle,
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("search for {query:?} failed: {source:#}")]
    Ingest {
        query: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("analysis of post {platform_id} failed: {source:#}")]
    Analysis {
        platform_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("filing post {platform_id} failed: {source:#}")]
    Resolve {
        platform_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Monitor cycle cancelled")]
    Cancelled,

    #[error("Monitor cycle already running")]
    AlreadyRunning,
}

impl MonitorError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            MonitorError::Analysis { .. } | MonitorError::Resolve { .. } => ErrorScope::Post,
            MonitorError::Ingest { .. } => ErrorScope::Query,
            MonitorError::Cancelled | MonitorError::AlreadyRunning => ErrorScope::Cycle,
        }
    }
}

pub struct Monitor {
    searcher: Arc<dyn PostSearcher>,
    analyzer: Arc<dyn ContentAnalyzer>,
    engine: DedupEngine,
    settings: MonitorSettings,
    run_guard: Mutex<()>,
}

impl Monitor {
    pub fn new(
        searcher: Arc<dyn PostSearcher>,
        analyzer: Arc<dyn ContentAnalyzer>,
        store: Arc<dyn CaseStore>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            searcher,
            analyzer,
            engine: DedupEngine::new(store),
            settings,
            run_guard: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Keyword queries first, then one `from:<handle>` query per account.
    pub fn queries(&self) -> Vec<String> {
        let keywords = self
            .settings
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        let accounts = self
            .settings
            .accounts
            .iter()
            .map(|a| a.trim().trim_start_matches('@'))
            .filter(|a| !a.is_empty())
            .map(|a| format!("from:{a}"));
        keywords.chain(accounts).collect()
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, MonitorError> {
        self.run_cycle_with_cancel(&AtomicBool::new(false)).await
    }

    /// Run one cycle. `cancel` is checked before every search call and every
    /// post.
    pub async fn run_cycle_with_cancel(
        &self,
        cancel: &AtomicBool,
    ) -> Result<CycleReport, MonitorError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| MonitorError::AlreadyRunning)?;

        let clock = Instant::now();
        let mut report = CycleReport::new(Utc::now());
        let mut seen: HashSet<(Platform, String)> = HashSet::new();
        let queries = self.queries();
        info!(queries = queries.len(), "Monitor cycle started");

        let mut first_call = true;
        for query in &queries {
            report.queries_run += 1;
            let mut cursor: Option<String> = None;

            for _ in 0..self.settings.max_pages.max(1) {
                check_cancel(cancel)?;
                if !first_call {
                    tokio::time::sleep(self.settings.request_delay).await;
                    check_cancel(cancel)?;
                }
                first_call = false;

                let page = match self
                    .searcher
                    .search(query, self.settings.posts_per_query, cursor.as_deref())
                    .await
                {
                    Ok(page) => page,
                    Err(source) => {
                        let err = MonitorError::Ingest {
                            query: query.clone(),
                            source,
                        };
                        warn!(error = %err, "Skipping query");
                        report.errors += 1;
                        break;
                    }
                };
                report.pages_fetched += 1;
                debug!(query = %query, posts = page.posts.len(), "Search page fetched");

                for post in &page.posts {
                    check_cancel(cancel)?;
                    if !seen.insert((post.platform, post.platform_id.clone())) {
                        continue;
                    }
                    report.posts_seen += 1;

                    match self.process_post(post).await {
                        Ok(None) => {}
                        Ok(Some(resolution)) => {
                            report.posts_relevant += 1;
                            if resolution.already_recorded {
                                report.already_recorded += 1;
                            } else if resolution.is_new_case {
                                report.new_cases += 1;
                            } else {
                                report.updated_cases += 1;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "Skipping post");
                            report.errors += 1;
                        }
                    }
                }

                match page.next_cursor {
                    Some(next) if !next.is_empty() => cursor = Some(next),
                    _ => break,
                }
            }
        }

        report.elapsed = clock.elapsed();
        info!(
            new_cases = report.new_cases,
            updated_cases = report.updated_cases,
            posts_seen = report.posts_seen,
            errors = report.errors,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Monitor cycle complete"
        );
        Ok(report)
    }

    /// `None` when the post is not a vandalism report.
    async fn process_post(&self, post: &SocialPost) -> Result<Option<Resolution>, MonitorError> {
        let analysis = self
            .analyzer
            .analyze(&post.text)
            .await
            .map_err(|source| MonitorError::Analysis {
                platform_id: post.platform_id.clone(),
                source,
            })?;

        if !analysis.is_incident() {
            return Ok(None);
        }

        self.engine
            .resolve_incident(post, &analysis)
            .await
            .map(Some)
            .map_err(|source| MonitorError::Resolve {
                platform_id: post.platform_id.clone(),
                source,
            })
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), MonitorError> {
    if cancel.load(Ordering::Relaxed) {
        info!("Monitor cycle cancelled");
        return Err(MonitorError::Cancelled);
    }
    Ok(())
}
