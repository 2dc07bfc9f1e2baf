//! DedupEngine against the in-memory store.
//!
//! POST + ANALYSIS → ENGINE.RESOLVE_INCIDENT → STORE STATE

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use vandalwatch_common::{
    DamageType, MediaKind, RelationshipType, SocialPost, TargetDetails, TargetType, UpdateType,
    VandalWatchError,
};

use crate::analyzer::{Analysis, KeywordAnalyzer};
use crate::dedup::DedupEngine;
use crate::testing::*;
use crate::traits::CaseStore;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn analyze(post: &SocialPost) -> Analysis {
    KeywordAnalyzer::new().analyze_text(&post.text)
}

fn engine() -> (DedupEngine, Arc<MockCaseStore>) {
    let store = Arc::new(MockCaseStore::new());
    (DedupEngine::new(store.clone()), store)
}

async fn resolve(engine: &DedupEngine, post: &SocialPost) -> crate::dedup::Resolution {
    engine.resolve_incident(post, &analyze(post)).await.unwrap()
}

// ---------------------------------------------------------------------------
// Merge vs. create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_austin_report_merges_into_first_case() {
    let (engine, store) = engine();

    let first = x_post("1001", "White Tesla Model 3 keyed in Austin, TX", t0());
    let created = resolve(&engine, &first).await;
    assert!(created.is_new_case);
    assert!(!created.is_duplicate);

    let second = x_post(
        "1002",
        "Tesla Model 3 vandalized in Austin, TX, scratched with key",
        t0() + Duration::hours(2),
    );
    let merged = resolve(&engine, &second).await;
    assert!(!merged.is_new_case);
    assert!(merged.is_duplicate);
    assert_eq!(merged.case_id, created.case_id);

    let cases = store.cases();
    assert_eq!(cases.len(), 1);
    let case = &cases[0];
    assert_eq!(case.target.target_type(), TargetType::Vehicle);
    assert_eq!(case.target.model(), Some("Model 3"));
    assert_eq!(case.damage_types.iter().copied().collect::<Vec<_>>(), vec![DamageType::Keying]);
    assert_eq!(case.location.city, "Austin");
    assert_eq!(case.incident_at, t0());
    assert_eq!(case.headline, "White Tesla Model 3 keyed in Austin, TX");

    let sources = store.sources_for_case(case.id).await.unwrap();
    assert_eq!(sources.len(), 2);

    let updates = store.updates_for_case(case.id).await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].update_type, UpdateType::NewInformation);
    let second_source = store.find_source(second.platform, "1002").await.unwrap().unwrap();
    assert_eq!(updates[0].source_id, Some(second_source.id));
    assert_eq!(second_source.case_id, Some(case.id));
}

#[tokio::test]
async fn vehicle_report_mentioning_a_building_merges_with_vehicle_case() {
    let (engine, store) = engine();

    let first = x_post("2001", "White Tesla Model 3 keyed in Austin, TX", t0());
    let created = resolve(&engine, &first).await;

    let second = x_post(
        "2002",
        "White Tesla Model 3 keyed outside my apartment building in Austin, TX",
        t0() + Duration::hours(1),
    );
    let merged = resolve(&engine, &second).await;

    assert!(!merged.is_new_case);
    assert_eq!(merged.case_id, created.case_id);
    let cases = store.cases();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].target.target_type(), TargetType::Vehicle);
    assert_eq!(cases[0].headline, "White Tesla Model 3 keyed in Austin, TX");
}

#[tokio::test]
async fn reports_in_different_cities_stay_separate() {
    let (engine, store) = engine();

    resolve(&engine, &x_post("1", "Tesla Model 3 keyed in Austin, TX", t0())).await;
    let other = resolve(&engine, &x_post("2", "Tesla Model 3 keyed in Dallas, TX", t0())).await;

    assert!(other.is_new_case);
    assert_eq!(store.cases().len(), 2);
    assert!(store.links().is_empty());
}

#[tokio::test]
async fn unknown_location_never_merges() {
    let (engine, store) = engine();

    let a = resolve(&engine, &x_post("1", "my tesla model 3 got keyed at work", t0())).await;
    let b = resolve(&engine, &x_post("2", "my tesla model 3 got keyed at work", t0())).await;

    assert!(a.is_new_case && b.is_new_case);
    assert_ne!(a.case_id, b.case_id);
    let cases = store.cases();
    assert!(cases.iter().all(|c| c.location.city.is_empty()));
    assert_eq!(cases[0].headline, "Tesla Model 3 keyed in an unknown location");
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_post_twice_is_a_no_op() {
    let (engine, store) = engine();
    let post = x_post("1001", "White Tesla Model 3 keyed in Austin, TX", t0());

    let first = resolve(&engine, &post).await;
    let again = resolve(&engine, &post).await;

    assert!(again.already_recorded);
    assert!(!again.is_new_case);
    assert_eq!(again.case_id, first.case_id);
    assert_eq!(store.cases().len(), 1);
    assert_eq!(store.sources().len(), 1);
    assert!(store.updates().is_empty());
}

#[tokio::test]
async fn failed_case_creation_leaves_post_unrecorded() {
    let store = Arc::new(MockCaseStore::new().failing_creates());
    let engine = DedupEngine::new(store.clone());
    let post = x_post("1001", "White Tesla Model 3 keyed in Austin, TX", t0());

    assert!(engine.resolve_incident(&post, &analyze(&post)).await.is_err());
    assert!(store.sources().is_empty());
}

#[tokio::test]
async fn empty_post_is_rejected() {
    let (engine, store) = engine();
    let post = x_post("1", "   ", t0());

    let err = engine
        .resolve_incident(&post, &Analysis::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VandalWatchError>(),
        Some(VandalWatchError::Validation(_))
    ));
    assert!(store.cases().is_empty());
}

// ---------------------------------------------------------------------------
// Related links
// ---------------------------------------------------------------------------

#[tokio::test]
async fn borderline_match_links_both_directions() {
    let (engine, store) = engine();

    let existing = resolve(&engine, &x_post("1", "Tesla Model 3 keyed in Austin, TX", t0())).await;
    // Same city and type, different model and damage: location 0.4 + type 0.2
    // + recency ~0.196 lands between the thresholds.
    let related = resolve(
        &engine,
        &x_post("2", "Tesla Model Y spray-painted in Austin, TX", t0() + Duration::hours(1)),
    )
    .await;

    assert!(related.is_new_case);
    assert_ne!(related.case_id, existing.case_id);

    let forward = store.related_for_case(related.case_id).await.unwrap();
    let backward = store.related_for_case(existing.case_id).await.unwrap();
    assert_eq!(forward.len(), 1);
    assert_eq!(backward.len(), 1);
    assert_eq!(forward[0].related_case_id, existing.case_id);
    assert_eq!(backward[0].related_case_id, related.case_id);
    assert_eq!(forward[0].relationship_type, RelationshipType::PossibleDuplicate);
    assert_eq!(forward[0].relationship_type, backward[0].relationship_type);
    assert_eq!(forward[0].strength, backward[0].strength);
    assert!(forward[0].strength > 0.6 && forward[0].strength <= 0.85);
}

// ---------------------------------------------------------------------------
// Classification through the engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn supercharger_post_opens_building_case() {
    let (engine, store) = engine();
    let post = x_post("1", "Tesla Supercharger station spray painted in Austin, TX", t0());

    resolve(&engine, &post).await;

    let case = &store.cases()[0];
    assert_eq!(
        case.target,
        TargetDetails::Building(vandalwatch_common::BuildingDetails {
            building_type: Some("supercharger".into())
        })
    );
    assert_eq!(case.damage_types.iter().copied().collect::<Vec<_>>(), vec![DamageType::Graffiti]);
    assert_eq!(case.headline, "Supercharger station spray-painted in Austin, TX");
}

#[tokio::test]
async fn analyzer_fills_gaps_the_content_leaves() {
    let (engine, store) = engine();
    let post = x_post("1", "Tesla trashed overnight in Austin, TX", t0());
    let mut analysis = analyze(&post);
    analysis.target.model = Some("Model S".into());
    analysis.damage_types = vec![DamageType::BodyDamage];

    engine.resolve_incident(&post, &analysis).await.unwrap();

    let case = &store.cases()[0];
    assert_eq!(case.target.model(), Some("Model S"));
    assert_eq!(case.damage_types.iter().copied().collect::<Vec<_>>(), vec![DamageType::BodyDamage]);
}

#[tokio::test]
async fn analyzer_names_the_target_when_the_content_does_not() {
    let (engine, store) = engine();
    let post = x_post("1", "Vandals hit the lot again in Austin, TX", t0());
    let mut analysis = analyze(&post);
    analysis.target.target_type = Some(TargetType::Property);
    analysis.target.confidence = 0.9;

    engine.resolve_incident(&post, &analysis).await.unwrap();
    assert_eq!(store.cases()[0].target.target_type(), TargetType::Property);
}

#[tokio::test]
async fn low_confidence_analyzer_target_is_ignored() {
    let (engine, store) = engine();
    let post = x_post("1", "Vandals struck overnight in Austin, TX", t0());
    let mut analysis = analyze(&post);
    analysis.target.target_type = Some(TargetType::Building);
    analysis.target.confidence = 0.2;

    engine.resolve_incident(&post, &analysis).await.unwrap();
    assert_eq!(store.cases()[0].target.target_type(), TargetType::Vehicle);
}

#[tokio::test]
async fn missing_damage_falls_back_to_other() {
    let (engine, store) = engine();
    let post = x_post("1", "Tesla trashed overnight in Austin, TX", t0());
    let mut analysis = analyze(&post);
    analysis.damage_types.clear();

    engine.resolve_incident(&post, &analysis).await.unwrap();

    let case = &store.cases()[0];
    assert_eq!(case.damage_types.iter().copied().collect::<Vec<_>>(), vec![DamageType::OtherDamage]);
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_media_of_new_case_is_primary_and_merged_media_is_not() {
    let (engine, store) = engine();

    let mut first = x_post("1", "White Tesla Model 3 keyed in Austin, TX", t0());
    first.media = vec![photo("https://img/a.jpg"), photo("https://img/b.jpg")];
    let created = resolve(&engine, &first).await;

    let mut second = x_post("2", "White Tesla Model 3 keyed in Austin, TX", t0() + Duration::hours(1));
    second.media = vec![photo("https://img/c.jpg")];
    resolve(&engine, &second).await;

    let media = store.media_for_case(created.case_id).await.unwrap();
    assert_eq!(media.len(), 3);
    let primary: Vec<&str> = media.iter().filter(|m| m.is_primary).map(|m| m.url.as_str()).collect();
    assert_eq!(primary, vec!["https://img/a.jpg"]);
    assert!(media.iter().all(|m| m.kind == MediaKind::Photo));
}
