// Trait abstractions for the pipeline's external collaborators.
//
// PostSearcher is the source ingestor, ContentAnalyzer the relevance/
// classification step, CaseStore the case repository. Production wires in
// XClient, KeywordAnalyzer and PgCaseStore; tests use the mocks in testing.rs.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use vandalwatch_common::{
    Case, CaseFilter, CaseMedia, CaseStatus, CaseUpdate, MediaItem, MediaKind, NewCase,
    NewCaseUpdate, NewSource, Platform, RelatedCaseLink, RelationshipType, SocialPost, Source,
    TargetType,
};

use crate::analyzer::Analysis;

// ---------------------------------------------------------------------------
// PostSearcher: source ingestor
// ---------------------------------------------------------------------------

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub posts: Vec<SocialPost>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait PostSearcher: Send + Sync {
    /// Search recent posts for `query`, starting after `cursor` when given.
    async fn search(&self, query: &str, count: u32, cursor: Option<&str>) -> Result<SearchPage>;
}

#[async_trait]
impl PostSearcher for x_client::XClient {
    async fn search(&self, query: &str, count: u32, cursor: Option<&str>) -> Result<SearchPage> {
        let page = self.search_recent(query, count, cursor).await?;
        let posts = page
            .tweets
            .into_iter()
            .filter(|t| !t.text.trim().is_empty())
            .map(|t| {
                let url = Some(t.permalink());
                let media = t
                    .media
                    .iter()
                    .filter_map(|m| {
                        let kind = match m.media_type.as_str() {
                            "photo" => MediaKind::Photo,
                            "video" => MediaKind::Video,
                            "animated_gif" => MediaKind::AnimatedGif,
                            _ => return None,
                        };
                        Some(MediaItem {
                            url: m.best_url()?.to_string(),
                            kind,
                        })
                    })
                    .collect();
                SocialPost {
                    platform: Platform::X,
                    platform_id: t.id,
                    author: t.author_username.unwrap_or_default(),
                    text: t.text,
                    url,
                    // Missing timestamps are treated as "just seen".
                    posted_at: t.created_at.unwrap_or_else(chrono::Utc::now),
                    media,
                }
            })
            .collect();

        Ok(SearchPage {
            posts,
            next_cursor: page.next_token,
        })
    }
}

// ---------------------------------------------------------------------------
// ContentAnalyzer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Relevance and classification signals for raw post text.
    async fn analyze(&self, text: &str) -> Result<Analysis>;
}

// ---------------------------------------------------------------------------
// CaseStore: case repository
// ---------------------------------------------------------------------------

/// Persistence for cases and everything hanging off them.
///
/// Implementations are not expected to provide isolation between
/// `find_candidates` and `create_case`; callers assume a single writer.
#[async_trait]
pub trait CaseStore: Send + Sync {
    // --- Cases ---

    async fn create_case(&self, case: &NewCase) -> Result<Case>;

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>>;

    async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<Case>>;

    /// Open cases in `city` with `target_type`, most recent first. Cases marked
    /// as duplicates are excluded.
    async fn find_candidates(
        &self,
        city: &str,
        target_type: TargetType,
        limit: u32,
    ) -> Result<Vec<Case>>;

    async fn set_status(&self, id: Uuid, status: CaseStatus, verified: bool) -> Result<()>;

    async fn mark_duplicate(&self, id: Uuid, duplicate_of: Uuid) -> Result<()>;

    // --- Sources ---

    async fn find_source(&self, platform: Platform, platform_id: &str) -> Result<Option<Source>>;

    /// Insert keyed by (platform, platform_id). Returns the stored row, which is
    /// the pre-existing one when the post was already recorded.
    async fn insert_source_if_absent(&self, source: &NewSource) -> Result<Source>;

    /// Attach a source that has no case yet. No-op when it already has one.
    async fn claim_source(&self, source_id: Uuid, case_id: Uuid) -> Result<()>;

    /// Sources filed under the case or referenced from its timeline.
    async fn sources_for_case(&self, case_id: Uuid) -> Result<Vec<Source>>;

    // --- Timeline ---

    async fn append_update(&self, update: &NewCaseUpdate) -> Result<CaseUpdate>;

    async fn updates_for_case(&self, case_id: Uuid) -> Result<Vec<CaseUpdate>>;

    // --- Relationships ---

    /// Store the link in both directions with the same type and strength.
    async fn link_related(
        &self,
        case_id: Uuid,
        related_case_id: Uuid,
        relationship_type: RelationshipType,
        strength: f64,
    ) -> Result<()>;

    async fn related_for_case(&self, case_id: Uuid) -> Result<Vec<RelatedCaseLink>>;

    // --- Media ---

    /// Attach media in order. When `first_is_primary`, the first item is
    /// flagged primary.
    async fn attach_media(
        &self,
        case_id: Uuid,
        media: &[MediaItem],
        first_is_primary: bool,
    ) -> Result<Vec<CaseMedia>>;

    async fn media_for_case(&self, case_id: Uuid) -> Result<Vec<CaseMedia>>;
}
