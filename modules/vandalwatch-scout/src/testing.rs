// Test mocks for the monitor pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockSearcher (PostSearcher): query→pages, records every call
// - FixedAnalyzer (ContentAnalyzer): keyword analyzer with per-text overrides
// - MockCaseStore (CaseStore): stateful in-memory repository
//
// Plus helpers for constructing posts and cases.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use vandalwatch_common::{
    Case, CaseFilter, CaseMedia, CaseStatus, CaseUpdate, DamageType, Location, MediaItem,
    MediaKind, NewCase, NewCaseUpdate, NewSource, Platform, RelatedCaseLink, RelationshipType,
    SocialPost, Source, TargetDetails, TargetType, VehicleDetails,
};

use crate::analyzer::{Analysis, KeywordAnalyzer};
use crate::traits::{CaseStore, ContentAnalyzer, PostSearcher, SearchPage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn x_post(id: &str, text: &str, posted_at: DateTime<Utc>) -> SocialPost {
    SocialPost {
        platform: Platform::X,
        platform_id: id.to_string(),
        author: "reporter".to_string(),
        text: text.to_string(),
        url: Some(format!("https://x.com/reporter/status/{id}")),
        posted_at,
        media: Vec::new(),
    }
}

pub fn photo(url: &str) -> MediaItem {
    MediaItem {
        url: url.to_string(),
        kind: MediaKind::Photo,
    }
}

/// A keyed Tesla Model 3 in `city`, TX.
pub fn sample_new_case(city: &str) -> NewCase {
    NewCase::builder()
        .headline(format!("Tesla Model 3 keyed in {city}, TX"))
        .summary("A Tesla Model 3 was reported keyed.")
        .target(TargetDetails::Vehicle(VehicleDetails {
            make: Some("Tesla".into()),
            model: Some("Model 3".into()),
            ..Default::default()
        }))
        .location(Location {
            city: city.to_string(),
            state: Some("TX".into()),
            country: Some("US".into()),
            coordinates: None,
        })
        .damage_types([DamageType::Keying].into())
        .incident_at(Utc::now())
        .build()
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// One recorded search call.
#[derive(Debug, Clone)]
pub struct SearchCall {
    pub query: String,
    pub cursor: Option<String>,
    pub at: tokio::time::Instant,
}

/// Query-keyed searcher. Pages are served in order, the cursor being the
/// index of the next page. Unregistered queries return an empty page.
#[derive(Default)]
pub struct MockSearcher {
    pages: HashMap<String, Vec<Vec<SocialPost>>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<SearchCall>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next page of results for `query`.
    pub fn on_query(mut self, query: &str, posts: Vec<SocialPost>) -> Self {
        self.pages.entry(query.to_string()).or_default().push(posts);
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostSearcher for MockSearcher {
    async fn search(&self, query: &str, count: u32, cursor: Option<&str>) -> Result<SearchPage> {
        self.calls.lock().unwrap().push(SearchCall {
            query: query.to_string(),
            cursor: cursor.map(str::to_string),
            at: tokio::time::Instant::now(),
        });

        if self.failing.contains(query) {
            bail!("MockSearcher: search for {query} failed");
        }

        let Some(pages) = self.pages.get(query) else {
            return Ok(SearchPage::default());
        };
        let index: usize = cursor.map(|c| c.parse()).transpose()?.unwrap_or(0);
        let posts = pages
            .get(index)
            .map(|p| p.iter().take(count as usize).cloned().collect())
            .unwrap_or_default();
        let next_cursor = (index + 1 < pages.len()).then(|| (index + 1).to_string());

        Ok(SearchPage { posts, next_cursor })
    }
}

// ---------------------------------------------------------------------------
// FixedAnalyzer
// ---------------------------------------------------------------------------

/// Keyword analysis unless a fixed result or failure is registered for the
/// exact text.
#[derive(Default)]
pub struct FixedAnalyzer {
    fixed: HashMap<String, Analysis>,
    failing: HashSet<String>,
}

impl FixedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_text(mut self, text: &str, analysis: Analysis) -> Self {
        self.fixed.insert(text.to_string(), analysis);
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }
}

#[async_trait]
impl ContentAnalyzer for FixedAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis> {
        if self.failing.contains(text) {
            bail!("FixedAnalyzer: analysis failed");
        }
        Ok(self
            .fixed
            .get(text)
            .cloned()
            .unwrap_or_else(|| KeywordAnalyzer::new().analyze_text(text)))
    }
}

// ---------------------------------------------------------------------------
// MockCaseStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    cases: Vec<Case>,
    sources: Vec<Source>,
    updates: Vec<CaseUpdate>,
    links: Vec<RelatedCaseLink>,
    media: Vec<CaseMedia>,
}

/// In-memory repository. Vectors keep insertion order, which stands in for
/// `created_at` ordering.
#[derive(Default)]
pub struct MockCaseStore {
    state: Mutex<StoreState>,
    failing_creates: bool,
}

impl MockCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create_case` call fails.
    pub fn failing_creates(mut self) -> Self {
        self.failing_creates = true;
        self
    }

    pub fn cases(&self) -> Vec<Case> {
        self.state.lock().unwrap().cases.clone()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.state.lock().unwrap().sources.clone()
    }

    pub fn links(&self) -> Vec<RelatedCaseLink> {
        self.state.lock().unwrap().links.clone()
    }

    pub fn media(&self) -> Vec<CaseMedia> {
        self.state.lock().unwrap().media.clone()
    }

    pub fn updates(&self) -> Vec<CaseUpdate> {
        self.state.lock().unwrap().updates.clone()
    }
}

fn matches_filter(case: &Case, filter: &CaseFilter) -> bool {
    filter.status.map_or(true, |s| case.status == s)
        && filter
            .city
            .as_deref()
            .map_or(true, |c| case.location.city.eq_ignore_ascii_case(c))
        && filter.target_type.map_or(true, |t| case.target_type() == t)
        && (filter.include_duplicates || case.duplicate_of.is_none())
}

#[async_trait]
impl CaseStore for MockCaseStore {
    async fn create_case(&self, case: &NewCase) -> Result<Case> {
        if self.failing_creates {
            bail!("MockCaseStore: create_case failed");
        }
        if case.damage_types.is_empty() {
            bail!("MockCaseStore: case needs at least one damage type");
        }
        let now = Utc::now();
        let created = Case {
            id: Uuid::new_v4(),
            headline: case.headline.clone(),
            summary: case.summary.clone(),
            target: case.target.clone(),
            location: case.location.clone(),
            status: CaseStatus::Reported,
            damage_types: case.damage_types.clone(),
            confidence: case.confidence,
            verified: false,
            incident_at: case.incident_at,
            duplicate_of: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().cases.push(created.clone());
        Ok(created)
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>> {
        Ok(self.state.lock().unwrap().cases.iter().find(|c| c.id == id).cloned())
    }

    async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
        let limit = if filter.limit == 0 { usize::MAX } else { filter.limit as usize };
        Ok(self
            .state
            .lock()
            .unwrap()
            .cases
            .iter()
            .rev()
            .filter(|c| matches_filter(c, filter))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_candidates(
        &self,
        city: &str,
        target_type: TargetType,
        limit: u32,
    ) -> Result<Vec<Case>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .cases
            .iter()
            .rev()
            .filter(|c| {
                c.location.city.eq_ignore_ascii_case(city)
                    && c.target_type() == target_type
                    && c.duplicate_of.is_none()
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: Uuid, status: CaseStatus, verified: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let case = state
            .cases
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("MockCaseStore: no case {id}"))?;
        case.status = status;
        case.verified |= verified;
        case.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_duplicate(&self, id: Uuid, duplicate_of: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let case = state
            .cases
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("MockCaseStore: no case {id}"))?;
        case.duplicate_of = Some(duplicate_of);
        case.updated_at = Utc::now();
        Ok(())
    }

    async fn find_source(&self, platform: Platform, platform_id: &str) -> Result<Option<Source>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sources
            .iter()
            .find(|s| s.platform == platform && s.platform_id == platform_id)
            .cloned())
    }

    async fn insert_source_if_absent(&self, source: &NewSource) -> Result<Source> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .sources
            .iter()
            .find(|s| s.platform == source.platform && s.platform_id == source.platform_id)
        {
            return Ok(existing.clone());
        }
        let stored = Source {
            id: Uuid::new_v4(),
            platform: source.platform,
            platform_id: source.platform_id.clone(),
            author: source.author.clone(),
            content: source.content.clone(),
            url: source.url.clone(),
            posted_at: source.posted_at,
            case_id: source.case_id,
            created_at: Utc::now(),
        };
        state.sources.push(stored.clone());
        Ok(stored)
    }

    async fn claim_source(&self, source_id: Uuid, case_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(source) = state
            .sources
            .iter_mut()
            .find(|s| s.id == source_id && s.case_id.is_none())
        {
            source.case_id = Some(case_id);
        }
        Ok(())
    }

    async fn sources_for_case(&self, case_id: Uuid) -> Result<Vec<Source>> {
        let state = self.state.lock().unwrap();
        let referenced: HashSet<Uuid> = state
            .updates
            .iter()
            .filter(|u| u.case_id == case_id)
            .filter_map(|u| u.source_id)
            .collect();
        Ok(state
            .sources
            .iter()
            .filter(|s| s.case_id == Some(case_id) || referenced.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn append_update(&self, update: &NewCaseUpdate) -> Result<CaseUpdate> {
        let stored = CaseUpdate {
            id: Uuid::new_v4(),
            case_id: update.case_id,
            update_type: update.update_type,
            content: update.content.clone(),
            source_id: update.source_id,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().updates.push(stored.clone());
        Ok(stored)
    }

    async fn updates_for_case(&self, case_id: Uuid) -> Result<Vec<CaseUpdate>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .updates
            .iter()
            .filter(|u| u.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn link_related(
        &self,
        case_id: Uuid,
        related_case_id: Uuid,
        relationship_type: RelationshipType,
        strength: f64,
    ) -> Result<()> {
        if case_id == related_case_id {
            bail!("MockCaseStore: self-link on {case_id}");
        }
        let strength = strength.clamp(0.0, 1.0);
        let mut state = self.state.lock().unwrap();
        for (from, to) in [(case_id, related_case_id), (related_case_id, case_id)] {
            let existing = state.links.iter().position(|l| {
                l.case_id == from && l.related_case_id == to && l.relationship_type == relationship_type
            });
            match existing {
                Some(i) => state.links[i].strength = strength,
                None => state.links.push(RelatedCaseLink {
                    case_id: from,
                    related_case_id: to,
                    relationship_type,
                    strength,
                    created_at: Utc::now(),
                }),
            }
        }
        Ok(())
    }

    async fn related_for_case(&self, case_id: Uuid) -> Result<Vec<RelatedCaseLink>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| l.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn attach_media(
        &self,
        case_id: Uuid,
        media: &[MediaItem],
        first_is_primary: bool,
    ) -> Result<Vec<CaseMedia>> {
        let attached: Vec<CaseMedia> = media
            .iter()
            .enumerate()
            .map(|(i, item)| CaseMedia {
                id: Uuid::new_v4(),
                case_id,
                url: item.url.clone(),
                kind: item.kind,
                is_primary: first_is_primary && i == 0,
                created_at: Utc::now(),
            })
            .collect();
        self.state.lock().unwrap().media.extend(attached.iter().cloned());
        Ok(attached)
    }

    async fn media_for_case(&self, case_id: Uuid) -> Result<Vec<CaseMedia>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .media
            .iter()
            .filter(|m| m.case_id == case_id)
            .cloned()
            .collect())
    }
}
