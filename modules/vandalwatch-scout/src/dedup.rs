//! Case deduplication: scoring a new report against existing cases and
//! deciding merge vs. link vs. new case.
//!
//! Scoring and the verdict are pure; `DedupEngine` wires them to a `CaseStore`.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use vandalwatch_common::{
    normalize_damage, BuildingDetails, Case, DamageType, Location, NewCase, NewCaseUpdate,
    NewSource, PropertyDetails, RelationshipType, SocialPost, Source, TargetDetails, TargetType,
    UpdateType, VandalWatchError, VehicleDetails,
};

use crate::analyzer::Analysis;
use crate::classify;
use crate::synthesis;
use crate::traits::CaseStore;

/// Most recent cases considered per report.
pub const CANDIDATE_LIMIT: u32 = 10;
/// Above this the report is the same incident.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;
/// Above this (and not a duplicate) the cases get a possible_duplicate link.
pub const RELATED_THRESHOLD: f64 = 0.6;

const CITY_WEIGHT: f64 = 0.3;
const STATE_WEIGHT: f64 = 0.1;
const TARGET_TYPE_WEIGHT: f64 = 0.2;
const MODEL_WEIGHT: f64 = 0.2;
const DAMAGE_WEIGHT: f64 = 0.2;
const RECENCY_WEIGHT: f64 = 0.2;
const RECENCY_WINDOW_HOURS: f64 = 48.0;
/// Analyzer target verdicts below this are ignored.
const MIN_TARGET_CONFIDENCE: f32 = 0.5;

// ---------------------------------------------------------------------------
// Incident profile: the comparable shape of a report or a case
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentProfile {
    pub target: TargetDetails,
    pub location: Location,
    pub damage_types: BTreeSet<DamageType>,
    pub occurred_at: DateTime<Utc>,
}

impl IncidentProfile {
    /// Content keywords decide target and damage; the analyzer fills in what
    /// the content does not say, including the target type when no keyword
    /// names one.
    pub fn from_post(post: &SocialPost, analysis: &Analysis) -> Self {
        let mut target = classify::detect_target(&post.text)
            .unwrap_or_else(|| analyzer_target(analysis));
        if let TargetDetails::Vehicle(v) = &mut target {
            let hint = &analysis.target;
            v.make = v.make.take().or_else(|| hint.make.clone());
            v.model = v.model.take().or_else(|| hint.model.clone());
            v.color = v.color.take().or_else(|| hint.color.clone());
            v.year = v.year.or(hint.year);
        }

        let mut damage = classify::damage_types(&post.text);
        if damage.is_empty() {
            damage.extend(analysis.damage_types.iter().copied());
        }

        Self {
            target,
            location: analysis.location(),
            damage_types: normalize_damage(damage),
            occurred_at: post.posted_at,
        }
    }

    pub fn from_case(case: &Case) -> Self {
        Self {
            target: case.target.clone(),
            location: case.location.clone(),
            damage_types: case.damage_types.clone(),
            occurred_at: case.incident_at,
        }
    }
}

/// Target type from the analyzer alone. Low-confidence verdicts fall back to
/// a vehicle.
fn analyzer_target(analysis: &Analysis) -> TargetDetails {
    let hint = &analysis.target;
    if hint.confidence < MIN_TARGET_CONFIDENCE {
        return TargetDetails::Vehicle(VehicleDetails::default());
    }
    match hint.target_type {
        Some(TargetType::Building) => TargetDetails::Building(BuildingDetails::default()),
        Some(TargetType::Property) => TargetDetails::Property(PropertyDetails::default()),
        _ => TargetDetails::Vehicle(VehicleDetails::default()),
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Per-criterion contributions. `total` caps the sum at 1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub location: f64,
    pub target: f64,
    pub damage: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        (self.location + self.target + self.damage + self.recency).clamp(0.0, 1.0)
    }
}

pub fn score(new: &IncidentProfile, existing: &IncidentProfile) -> ScoreBreakdown {
    let mut location = 0.0;
    if new.location.is_known() && eq_ignore_case(&new.location.city, &existing.location.city) {
        location += CITY_WEIGHT;
        if let (Some(a), Some(b)) = (&new.location.state, &existing.location.state) {
            if eq_ignore_case(a, b) {
                location += STATE_WEIGHT;
            }
        }
    }

    let mut target = 0.0;
    if new.target.target_type() == existing.target.target_type() {
        target += TARGET_TYPE_WEIGHT;
        if let (Some(a), Some(b)) = (new.target.model(), existing.target.model()) {
            if eq_ignore_case(a, b) {
                target += MODEL_WEIGHT;
            }
        }
    }

    ScoreBreakdown {
        location,
        target,
        damage: DAMAGE_WEIGHT * damage_overlap(&new.damage_types, &existing.damage_types),
        recency: RECENCY_WEIGHT * recency_factor(new.occurred_at, existing.occurred_at),
    }
}

/// Shared tags over the larger tag count: {graffiti, keying} vs {keying} is 0.5.
pub fn damage_overlap(a: &BTreeSet<DamageType>, b: &BTreeSet<DamageType>) -> f64 {
    let denominator = a.len().max(b.len());
    if denominator == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / denominator as f64
}

/// 1.0 at zero difference, decaying linearly to 0.0 at 48 hours and beyond.
pub fn recency_factor(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let hours = (a - b).num_milliseconds().abs() as f64 / 3_600_000.0;
    if hours >= RECENCY_WINDOW_HOURS {
        0.0
    } else {
        1.0 - hours / RECENCY_WINDOW_HOURS
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim())
}

// ---------------------------------------------------------------------------
// DedupVerdict: pure decision over scored candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub case_id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DedupVerdict {
    /// Same incident as an existing case.
    Merge { case_id: Uuid, score: f64 },
    /// New incident; `related` are borderline matches to link.
    Create { related: Vec<ScoredCandidate> },
}

/// Score every candidate and sort by score, highest first.
pub fn rank_candidates(new: &IncidentProfile, candidates: &[Case]) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|c| ScoredCandidate {
            case_id: c.id,
            score: score(new, &IncidentProfile::from_case(c)).total(),
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored
}

/// Expects `ranked` sorted by score descending.
pub fn dedup_verdict(ranked: &[ScoredCandidate]) -> DedupVerdict {
    if let Some(top) = ranked.first() {
        if top.score > DUPLICATE_THRESHOLD {
            return DedupVerdict::Merge {
                case_id: top.case_id,
                score: top.score,
            };
        }
    }

    DedupVerdict::Create {
        related: ranked
            .iter()
            .filter(|c| c.score > RELATED_THRESHOLD && c.score <= DUPLICATE_THRESHOLD)
            .copied()
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// DedupEngine
// ---------------------------------------------------------------------------

/// Outcome of resolving one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub case_id: Uuid,
    pub is_new_case: bool,
    pub is_duplicate: bool,
    /// The post had already been filed; nothing was written.
    pub already_recorded: bool,
}

pub struct DedupEngine {
    store: Arc<dyn CaseStore>,
}

impl DedupEngine {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CaseStore> {
        &self.store
    }

    /// File one relevant report: merge into an existing case, or open a new
    /// case and link it to borderline matches.
    ///
    /// Store failures propagate. Writes are not transactional, so a failure
    /// part-way can leave e.g. a case without its source.
    pub async fn resolve_incident(&self, post: &SocialPost, analysis: &Analysis) -> Result<Resolution> {
        if post.text.trim().is_empty() {
            bail!(VandalWatchError::Validation(format!(
                "post {}:{} has no content",
                post.platform, post.platform_id
            )));
        }

        let existing = self.store.find_source(post.platform, &post.platform_id).await?;
        if let Some(case_id) = existing.as_ref().and_then(|s| s.case_id) {
            debug!(platform_id = %post.platform_id, %case_id, "Post already filed, skipping");
            return Ok(Resolution {
                case_id,
                is_new_case: false,
                is_duplicate: true,
                already_recorded: true,
            });
        }

        let profile = IncidentProfile::from_post(post, analysis);
        let candidates = if profile.location.is_known() {
            self.store
                .find_candidates(
                    &profile.location.city,
                    profile.target.target_type(),
                    CANDIDATE_LIMIT,
                )
                .await?
        } else {
            Vec::new()
        };
        let ranked = rank_candidates(&profile, &candidates);

        match dedup_verdict(&ranked) {
            DedupVerdict::Merge { case_id, score } => {
                let source = self.record_source(post, case_id).await?;
                self.store
                    .append_update(&NewCaseUpdate {
                        case_id,
                        update_type: UpdateType::NewInformation,
                        content: additional_report_note(post),
                        source_id: Some(source.id),
                    })
                    .await?;
                if !post.media.is_empty() {
                    self.store.attach_media(case_id, &post.media, false).await?;
                }

                info!(%case_id, score, platform_id = %post.platform_id, "Merged report into existing case");
                Ok(Resolution {
                    case_id,
                    is_new_case: false,
                    is_duplicate: true,
                    already_recorded: false,
                })
            }
            DedupVerdict::Create { related } => {
                let new_case = NewCase::builder()
                    .headline(synthesis::headline(
                        &profile.target,
                        &profile.damage_types,
                        &profile.location,
                    ))
                    .summary(synthesis::summary(
                        &profile.target,
                        &profile.damage_types,
                        &profile.location,
                        profile.occurred_at,
                    ))
                    .target(profile.target.clone())
                    .location(profile.location.clone())
                    .damage_types(profile.damage_types.clone())
                    .confidence(analysis.relevance_score.clamp(0.0, 1.0))
                    .incident_at(profile.occurred_at)
                    .build();
                let case = self.store.create_case(&new_case).await?;

                for candidate in &related {
                    self.store
                        .link_related(
                            case.id,
                            candidate.case_id,
                            RelationshipType::PossibleDuplicate,
                            candidate.score,
                        )
                        .await?;
                }

                self.record_source(post, case.id).await?;
                if !post.media.is_empty() {
                    self.store.attach_media(case.id, &post.media, true).await?;
                }

                info!(
                    case_id = %case.id,
                    headline = %case.headline,
                    related = related.len(),
                    "Opened new case"
                );
                Ok(Resolution {
                    case_id: case.id,
                    is_new_case: true,
                    is_duplicate: false,
                    already_recorded: false,
                })
            }
        }
    }

    /// Insert-if-absent, then file it under `case_id` if it has no case yet.
    async fn record_source(&self, post: &SocialPost, case_id: Uuid) -> Result<Source> {
        let source = self
            .store
            .insert_source_if_absent(&NewSource::from_post(post, Some(case_id)))
            .await?;
        if source.case_id.is_none() {
            self.store.claim_source(source.id, case_id).await?;
        }
        Ok(source)
    }
}

fn additional_report_note(post: &SocialPost) -> String {
    const MAX_EXCERPT: usize = 280;
    let excerpt: String = post.text.chars().take(MAX_EXCERPT).collect();
    if post.author.is_empty() {
        format!("Additional report via {}: {}", post.platform, excerpt)
    } else {
        format!("Additional report from @{} via {}: {}", post.author, post.platform, excerpt)
    }
}
