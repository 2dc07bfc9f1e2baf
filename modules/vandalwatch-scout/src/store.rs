// Postgres-backed CaseStore.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vandalwatch_common::{
    Case, CaseFilter, CaseMedia, CaseStatus, CaseUpdate, GeoPoint, Location, MediaItem, NewCase,
    NewCaseUpdate, NewSource, Platform, RelatedCaseLink, RelationshipType, Source, TargetDetails,
    TargetType, VandalWatchError,
};

use crate::traits::CaseStore;

const CASE_COLUMNS: &str = "id, headline, summary, target_type, target_details, location_city, \
    location_state, location_country, latitude, longitude, status, damage_types, confidence, \
    verified, incident_at, duplicate_of, created_at, updated_at";

const SOURCE_COLUMNS: &str =
    "id, platform, platform_id, author, content, url, posted_at, case_id, created_at";

const MAX_LIST_LIMIT: u32 = 200;

pub struct PgCaseStore {
    pool: PgPool,
}

impl PgCaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("running migrations")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct CaseRow {
    id: Uuid,
    headline: String,
    summary: String,
    #[allow(dead_code)] // denormalized from target_details for indexing
    target_type: String,
    target_details: serde_json::Value,
    location_city: String,
    location_state: Option<String>,
    location_country: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    status: String,
    damage_types: Vec<String>,
    confidence: f32,
    verified: bool,
    incident_at: DateTime<Utc>,
    duplicate_of: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CaseRow> for Case {
    type Error = anyhow::Error;

    fn try_from(row: CaseRow) -> Result<Self> {
        let target: TargetDetails = serde_json::from_value(row.target_details)
            .with_context(|| format!("case {} has malformed target_details", row.id))?;
        let damage_types = row
            .damage_types
            .iter()
            .map(|d| d.parse())
            .collect::<Result<_, VandalWatchError>>()?;

        Ok(Case {
            id: row.id,
            headline: row.headline,
            summary: row.summary,
            target,
            location: Location {
                city: row.location_city,
                state: row.location_state,
                country: row.location_country,
                coordinates: match (row.latitude, row.longitude) {
                    (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
                    _ => None,
                },
            },
            status: row.status.parse()?,
            damage_types,
            confidence: row.confidence,
            verified: row.verified,
            incident_at: row.incident_at,
            duplicate_of: row.duplicate_of,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    id: Uuid,
    platform: String,
    platform_id: String,
    author: String,
    content: String,
    url: Option<String>,
    posted_at: DateTime<Utc>,
    case_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SourceRow> for Source {
    type Error = anyhow::Error;

    fn try_from(row: SourceRow) -> Result<Self> {
        Ok(Source {
            id: row.id,
            platform: row.platform.parse()?,
            platform_id: row.platform_id,
            author: row.author,
            content: row.content,
            url: row.url,
            posted_at: row.posted_at,
            case_id: row.case_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UpdateRow {
    id: Uuid,
    case_id: Uuid,
    update_type: String,
    content: String,
    source_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UpdateRow> for CaseUpdate {
    type Error = anyhow::Error;

    fn try_from(row: UpdateRow) -> Result<Self> {
        Ok(CaseUpdate {
            id: row.id,
            case_id: row.case_id,
            update_type: row.update_type.parse()?,
            content: row.content,
            source_id: row.source_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    case_id: Uuid,
    related_case_id: Uuid,
    relationship_type: String,
    strength: f64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct MediaRow {
    id: Uuid,
    case_id: Uuid,
    url: String,
    kind: String,
    is_primary: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for CaseMedia {
    type Error = anyhow::Error;

    fn try_from(row: MediaRow) -> Result<Self> {
        Ok(CaseMedia {
            id: row.id,
            case_id: row.case_id,
            url: row.url,
            kind: row.kind.parse()?,
            is_primary: row.is_primary,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// CaseStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl CaseStore for PgCaseStore {
    async fn create_case(&self, case: &NewCase) -> Result<Case> {
        let damage: Vec<&str> = case.damage_types.iter().map(|d| d.as_str()).collect();
        if damage.is_empty() {
            bail!(VandalWatchError::Validation("case needs at least one damage type".into()));
        }

        let sql = format!(
            r#"
            INSERT INTO cases
                (id, headline, summary, target_type, target_details,
                 location_city, location_state, location_country, latitude, longitude,
                 status, damage_types, confidence, verified, incident_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, FALSE, $14)
            RETURNING {CASE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, CaseRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&case.headline)
            .bind(&case.summary)
            .bind(case.target.target_type().as_str())
            .bind(serde_json::to_value(&case.target)?)
            .bind(&case.location.city)
            .bind(&case.location.state)
            .bind(&case.location.country)
            .bind(case.location.coordinates.map(|c| c.lat))
            .bind(case.location.coordinates.map(|c| c.lng))
            .bind(CaseStatus::Reported.as_str())
            .bind(&damage)
            .bind(case.confidence)
            .bind(case.incident_at)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>> {
        let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = $1");
        let row = sqlx::query_as::<_, CaseRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Case::try_from).transpose()
    }

    async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
        let limit = filter.limit.clamp(1, MAX_LIST_LIMIT) as i64;
        let sql = format!(
            r#"
            SELECT {CASE_COLUMNS}
            FROM cases
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR lower(location_city) = lower($2))
              AND ($3::text IS NULL OR target_type = $3)
              AND ($4 OR duplicate_of IS NULL)
            ORDER BY created_at DESC
            LIMIT $5
            "#
        );
        let rows = sqlx::query_as::<_, CaseRow>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.city.as_deref())
            .bind(filter.target_type.map(|t| t.as_str()))
            .bind(filter.include_duplicates)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    async fn find_candidates(
        &self,
        city: &str,
        target_type: TargetType,
        limit: u32,
    ) -> Result<Vec<Case>> {
        let sql = format!(
            r#"
            SELECT {CASE_COLUMNS}
            FROM cases
            WHERE lower(location_city) = lower($1)
              AND target_type = $2
              AND duplicate_of IS NULL
            ORDER BY created_at DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, CaseRow>(&sql)
            .bind(city)
            .bind(target_type.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    async fn set_status(&self, id: Uuid, status: CaseStatus, verified: bool) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cases
            SET status = $2, verified = verified OR $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(verified)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!(VandalWatchError::NotFound(format!("case {id}")));
        }
        Ok(())
    }

    async fn mark_duplicate(&self, id: Uuid, duplicate_of: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE cases SET duplicate_of = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(duplicate_of)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!(VandalWatchError::NotFound(format!("case {id}")));
        }
        Ok(())
    }

    async fn find_source(&self, platform: Platform, platform_id: &str) -> Result<Option<Source>> {
        let sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE platform = $1 AND platform_id = $2"
        );
        let row = sqlx::query_as::<_, SourceRow>(&sql)
            .bind(platform.as_str())
            .bind(platform_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Source::try_from).transpose()
    }

    async fn insert_source_if_absent(&self, source: &NewSource) -> Result<Source> {
        let sql = format!(
            r#"
            INSERT INTO sources
                (id, platform, platform_id, author, content, url, posted_at, case_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (platform, platform_id) DO NOTHING
            RETURNING {SOURCE_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, SourceRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(source.platform.as_str())
            .bind(&source.platform_id)
            .bind(&source.author)
            .bind(&source.content)
            .bind(&source.url)
            .bind(source.posted_at)
            .bind(source.case_id)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => row.try_into(),
            // Lost the race or already stored: return the existing row.
            None => self
                .find_source(source.platform, &source.platform_id)
                .await?
                .ok_or_else(|| {
                    anyhow!(
                        "source {}:{} conflicted but could not be read back",
                        source.platform,
                        source.platform_id
                    )
                }),
        }
    }

    async fn claim_source(&self, source_id: Uuid, case_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sources SET case_id = $2 WHERE id = $1 AND case_id IS NULL")
            .bind(source_id)
            .bind(case_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sources_for_case(&self, case_id: Uuid) -> Result<Vec<Source>> {
        let sql = format!(
            r#"
            SELECT {SOURCE_COLUMNS}
            FROM sources
            WHERE case_id = $1
               OR id IN (
                   SELECT source_id FROM case_updates
                   WHERE case_id = $1 AND source_id IS NOT NULL
               )
            ORDER BY posted_at
            "#
        );
        let rows = sqlx::query_as::<_, SourceRow>(&sql)
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    async fn append_update(&self, update: &NewCaseUpdate) -> Result<CaseUpdate> {
        let row = sqlx::query_as::<_, UpdateRow>(
            r#"
            INSERT INTO case_updates (id, case_id, update_type, content, source_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, case_id, update_type, content, source_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(update.case_id)
        .bind(update.update_type.as_str())
        .bind(&update.content)
        .bind(update.source_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn updates_for_case(&self, case_id: Uuid) -> Result<Vec<CaseUpdate>> {
        let rows = sqlx::query_as::<_, UpdateRow>(
            r#"
            SELECT id, case_id, update_type, content, source_id, created_at
            FROM case_updates
            WHERE case_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn link_related(
        &self,
        case_id: Uuid,
        related_case_id: Uuid,
        relationship_type: RelationshipType,
        strength: f64,
    ) -> Result<()> {
        if case_id == related_case_id {
            bail!(VandalWatchError::Validation("a case cannot be related to itself".into()));
        }

        // Both directions in one statement so the pair is never half-written.
        sqlx::query(
            r#"
            INSERT INTO related_cases (case_id, related_case_id, relationship_type, strength)
            VALUES ($1, $2, $3, $4), ($2, $1, $3, $4)
            ON CONFLICT (case_id, related_case_id, relationship_type)
            DO UPDATE SET strength = EXCLUDED.strength
            "#,
        )
        .bind(case_id)
        .bind(related_case_id)
        .bind(relationship_type.as_str())
        .bind(strength.clamp(0.0, 1.0))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn related_for_case(&self, case_id: Uuid) -> Result<Vec<RelatedCaseLink>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT case_id, related_case_id, relationship_type, strength, created_at
            FROM related_cases
            WHERE case_id = $1
            ORDER BY strength DESC
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RelatedCaseLink {
                    case_id: row.case_id,
                    related_case_id: row.related_case_id,
                    relationship_type: row.relationship_type.parse()?,
                    strength: row.strength,
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    async fn attach_media(
        &self,
        case_id: Uuid,
        media: &[MediaItem],
        first_is_primary: bool,
    ) -> Result<Vec<CaseMedia>> {
        let mut tx = self.pool.begin().await?;
        let mut attached = Vec::with_capacity(media.len());

        for (i, item) in media.iter().enumerate() {
            let row = sqlx::query_as::<_, MediaRow>(
                r#"
                INSERT INTO case_media (id, case_id, url, kind, is_primary)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, case_id, url, kind, is_primary, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(case_id)
            .bind(&item.url)
            .bind(item.kind.as_str())
            .bind(first_is_primary && i == 0)
            .fetch_one(&mut *tx)
            .await?;
            attached.push(row.try_into()?);
        }

        tx.commit().await?;
        Ok(attached)
    }

    async fn media_for_case(&self, case_id: Uuid) -> Result<Vec<CaseMedia>> {
        let rows = sqlx::query_as::<_, MediaRow>(
            r#"
            SELECT id, case_id, url, kind, is_primary, created_at
            FROM case_media
            WHERE case_id = $1
            ORDER BY is_primary DESC, created_at
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }
}
