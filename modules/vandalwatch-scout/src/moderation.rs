//! Moderator-facing case operations: listing, detail, status lifecycle and
//! manual duplicate marking.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use vandalwatch_common::{
    Case, CaseFilter, CaseMedia, CaseStatus, CaseUpdate, NewCaseUpdate, RelatedCaseLink,
    RelationshipType, Source, UpdateType, VandalWatchError,
};

use crate::traits::CaseStore;

pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Everything a moderator sees on one case page.
#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    pub case: Case,
    pub updates: Vec<CaseUpdate>,
    pub related: Vec<RelatedCaseLink>,
    pub sources: Vec<Source>,
    pub media: Vec<CaseMedia>,
}

pub struct CaseService {
    store: Arc<dyn CaseStore>,
}

impl CaseService {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, mut filter: CaseFilter) -> Result<Vec<Case>> {
        if filter.limit == 0 {
            filter.limit = DEFAULT_LIST_LIMIT;
        }
        self.store.list_cases(&filter).await
    }

    pub async fn detail(&self, id: Uuid) -> Result<CaseDetail> {
        let case = self.require(id).await?;
        Ok(CaseDetail {
            updates: self.store.updates_for_case(id).await?,
            related: self.store.related_for_case(id).await?,
            sources: self.store.sources_for_case(id).await?,
            media: self.store.media_for_case(id).await?,
            case,
        })
    }

    /// Move a case along its lifecycle and record the change on the timeline.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: CaseStatus,
        note: Option<&str>,
    ) -> Result<Case> {
        let case = self.require(id).await?;
        if !case.status.can_transition_to(status) {
            bail!(VandalWatchError::InvalidTransition {
                from: case.status.to_string(),
                to: status.to_string(),
            });
        }

        self.store
            .set_status(id, status, status.implies_verified())
            .await?;

        let mut content = format!("Status changed from {} to {}", case.status, status);
        if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
            content.push_str(": ");
            content.push_str(note);
        }
        self.store
            .append_update(&NewCaseUpdate {
                case_id: id,
                update_type: UpdateType::StatusChange,
                content,
                source_id: None,
            })
            .await?;

        info!(case_id = %id, from = %case.status, to = %status, "Case status updated");
        self.require(id).await
    }

    /// Flag `id` as a duplicate of `original` and link the two as confirmed
    /// duplicates. Both cases must be originals; repeating the same marking is
    /// a no-op.
    pub async fn mark_duplicate(&self, id: Uuid, original: Uuid) -> Result<Case> {
        if id == original {
            bail!(VandalWatchError::Validation(
                "a case cannot be a duplicate of itself".into()
            ));
        }
        let case = self.require(id).await?;
        let target = self.require(original).await?;
        match case.duplicate_of {
            Some(existing) if existing == original => return Ok(case),
            Some(existing) => bail!(VandalWatchError::Validation(format!(
                "case {id} is already marked as a duplicate of {existing}"
            ))),
            None => {}
        }
        if let Some(root) = target.duplicate_of {
            bail!(VandalWatchError::Validation(format!(
                "case {original} is itself a duplicate of {root}"
            )));
        }

        self.store.mark_duplicate(id, original).await?;
        self.store
            .link_related(id, original, RelationshipType::ConfirmedDuplicate, 1.0)
            .await?;
        self.store
            .append_update(&NewCaseUpdate {
                case_id: id,
                update_type: UpdateType::Other,
                content: format!("Marked as duplicate of case {original}"),
                source_id: None,
            })
            .await?;

        info!(case_id = %id, duplicate_of = %original, "Case marked as duplicate");
        self.require(id).await
    }

    async fn require(&self, id: Uuid) -> Result<Case> {
        match self.store.get_case(id).await? {
            Some(case) => Ok(case),
            None => bail!(VandalWatchError::NotFound(format!("case {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_new_case, MockCaseStore};

    async fn service_with_case() -> (CaseService, Arc<MockCaseStore>, Uuid) {
        let store = Arc::new(MockCaseStore::new());
        let case = store.create_case(&sample_new_case("Austin")).await.unwrap();
        (CaseService::new(store.clone()), store, case.id)
    }

    #[tokio::test]
    async fn status_change_sets_verified_and_appends_update() {
        let (service, store, id) = service_with_case().await;

        let case = service
            .update_status(id, CaseStatus::Identified, Some("plate matched"))
            .await
            .unwrap();

        assert_eq!(case.status, CaseStatus::Identified);
        assert!(case.verified);
        let updates = store.updates_for_case(id).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_type, UpdateType::StatusChange);
        assert_eq!(
            updates[0].content,
            "Status changed from reported to identified: plate matched"
        );
    }

    #[tokio::test]
    async fn backwards_transition_is_rejected() {
        let (service, store, id) = service_with_case().await;
        service.update_status(id, CaseStatus::Apprehended, None).await.unwrap();

        let err = service
            .update_status(id, CaseStatus::Verified, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VandalWatchError>(),
            Some(VandalWatchError::InvalidTransition { .. })
        ));
        assert_eq!(store.updates_for_case(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unresolved_does_not_mark_verified() {
        let (service, _, id) = service_with_case().await;
        let case = service
            .update_status(id, CaseStatus::Unresolved, None)
            .await
            .unwrap();
        assert_eq!(case.status, CaseStatus::Unresolved);
        assert!(!case.verified);
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let (service, _, _) = service_with_case().await;
        let err = service.detail(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VandalWatchError>(),
            Some(VandalWatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_duplicate_links_both_ways_at_full_strength() {
        let (service, store, id) = service_with_case().await;
        let original = store.create_case(&sample_new_case("Austin")).await.unwrap();

        let case = service.mark_duplicate(id, original.id).await.unwrap();
        assert_eq!(case.duplicate_of, Some(original.id));

        let forward = store.related_for_case(id).await.unwrap();
        let backward = store.related_for_case(original.id).await.unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(backward.len(), 1);
        assert_eq!(forward[0].relationship_type, RelationshipType::ConfirmedDuplicate);
        assert_eq!(forward[0].strength, 1.0);
        assert_eq!(backward[0].related_case_id, id);

        let detail = service.detail(id).await.unwrap();
        assert_eq!(detail.updates.len(), 1);
        assert_eq!(detail.updates[0].update_type, UpdateType::Other);
    }

    #[tokio::test]
    async fn mark_duplicate_rejects_self_and_missing_target() {
        let (service, _, id) = service_with_case().await;
        assert!(service.mark_duplicate(id, id).await.is_err());
        assert!(service.mark_duplicate(id, Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn remarking_a_duplicate_is_rejected_and_leaves_links_alone() {
        let (service, store, id) = service_with_case().await;
        let first = store.create_case(&sample_new_case("Austin")).await.unwrap();
        let second = store.create_case(&sample_new_case("Austin")).await.unwrap();
        service.mark_duplicate(id, first.id).await.unwrap();

        let err = service.mark_duplicate(id, second.id).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VandalWatchError>(),
            Some(VandalWatchError::Validation(_))
        ));
        let case = store.get_case(id).await.unwrap().unwrap();
        assert_eq!(case.duplicate_of, Some(first.id));
        assert_eq!(store.related_for_case(id).await.unwrap().len(), 1);
        assert!(store.related_for_case(second.id).await.unwrap().is_empty());

        service.mark_duplicate(id, first.id).await.unwrap();
        assert_eq!(store.related_for_case(id).await.unwrap().len(), 1);
        assert_eq!(store.updates_for_case(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_chains_and_cycles_are_rejected() {
        let (service, store, a) = service_with_case().await;
        let b = store.create_case(&sample_new_case("Austin")).await.unwrap();
        let c = store.create_case(&sample_new_case("Austin")).await.unwrap();
        service.mark_duplicate(b.id, c.id).await.unwrap();

        assert!(service.mark_duplicate(a, b.id).await.is_err());
        assert!(service.mark_duplicate(c.id, b.id).await.is_err());
        assert_eq!(store.get_case(a).await.unwrap().unwrap().duplicate_of, None);
        assert_eq!(store.get_case(c.id).await.unwrap().unwrap().duplicate_of, None);
    }

    #[tokio::test]
    async fn list_hides_duplicates_by_default() {
        let (service, store, id) = service_with_case().await;
        let original = store.create_case(&sample_new_case("Austin")).await.unwrap();
        service.mark_duplicate(id, original.id).await.unwrap();

        let listed = service.list(CaseFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, original.id);

        let all = service
            .list(CaseFilter {
                include_duplicates: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
