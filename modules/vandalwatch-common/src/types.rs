use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::VandalWatchError;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// wire form is the snake_case name stored in Postgres.
macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = VandalWatchError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    other => Err(VandalWatchError::Validation(format!(
                        "unknown {}: {other}",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Empty when the analyzer could not place the report.
    pub city: String,
    pub state: Option<String>,
    pub country: Option<String>,
    pub coordinates: Option<GeoPoint>,
}

impl Location {
    pub fn is_known(&self) -> bool {
        !self.city.trim().is_empty()
    }

    /// "Austin, TX", "Austin", or "an unknown location".
    pub fn display_name(&self) -> String {
        match (self.is_known(), self.state.as_deref()) {
            (true, Some(state)) if !state.is_empty() => format!("{}, {}", self.city, state),
            (true, _) => self.city.clone(),
            (false, _) => "an unknown location".to_string(),
        }
    }
}

// --- Platform ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    X,
    Instagram,
    Facebook,
    Reddit,
}

string_enum!(Platform {
    X => "x",
    Instagram => "instagram",
    Facebook => "facebook",
    Reddit => "reddit",
});

// --- Targets ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Vehicle,
    Building,
    Property,
}

string_enum!(TargetType {
    Vehicle => "vehicle",
    Building => "building",
    Property => "property",
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDetails {
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub year: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingDetails {
    /// e.g. "supercharger", "dealership", "service_center".
    pub building_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDetails {
    /// e.g. "wall_charger", "sign", "residence".
    pub property_type: Option<String>,
}

/// What was damaged. The variant is the target type, so the two can never
/// disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetDetails {
    Vehicle(VehicleDetails),
    Building(BuildingDetails),
    Property(PropertyDetails),
}

impl TargetDetails {
    pub fn target_type(&self) -> TargetType {
        match self {
            TargetDetails::Vehicle(_) => TargetType::Vehicle,
            TargetDetails::Building(_) => TargetType::Building,
            TargetDetails::Property(_) => TargetType::Property,
        }
    }

    /// Vehicle model, if this is a vehicle and one is known.
    pub fn model(&self) -> Option<&str> {
        match self {
            TargetDetails::Vehicle(v) => v.model.as_deref().filter(|m| !m.is_empty()),
            _ => None,
        }
    }
}

impl Default for TargetDetails {
    fn default() -> Self {
        TargetDetails::Vehicle(VehicleDetails::default())
    }
}

// --- Damage ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Graffiti,
    Keying,
    BrokenGlass,
    TireDamage,
    Arson,
    BodyDamage,
    OtherDamage,
}

string_enum!(DamageType {
    Graffiti => "graffiti",
    Keying => "keying",
    BrokenGlass => "broken_glass",
    TireDamage => "tire_damage",
    Arson => "arson",
    BodyDamage => "body_damage",
    OtherDamage => "other_damage",
});

/// Non-empty set of damage tags. Empty input collapses to `other_damage`, and
/// `other_damage` is dropped once a specific tag is present.
pub fn normalize_damage(tags: impl IntoIterator<Item = DamageType>) -> BTreeSet<DamageType> {
    let mut set: BTreeSet<DamageType> = tags.into_iter().collect();
    if set.len() > 1 {
        set.remove(&DamageType::OtherDamage);
    }
    if set.is_empty() {
        set.insert(DamageType::OtherDamage);
    }
    set
}

// --- Case lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Reported,
    Verified,
    Identified,
    Apprehended,
    Prosecuted,
    Resolved,
    Unresolved,
}

string_enum!(CaseStatus {
    Reported => "reported",
    Verified => "verified",
    Identified => "identified",
    Apprehended => "apprehended",
    Prosecuted => "prosecuted",
    Resolved => "resolved",
    Unresolved => "unresolved",
});

impl CaseStatus {
    /// Position in the ordered lifecycle; `Unresolved` sits outside it.
    pub fn stage(&self) -> Option<u8> {
        match self {
            CaseStatus::Reported => Some(0),
            CaseStatus::Verified => Some(1),
            CaseStatus::Identified => Some(2),
            CaseStatus::Apprehended => Some(3),
            CaseStatus::Prosecuted => Some(4),
            CaseStatus::Resolved => Some(5),
            CaseStatus::Unresolved => None,
        }
    }

    /// Forward-only along the lifecycle (skipping allowed). Any open case may
    /// be parked as unresolved and an unresolved case may be reopened at any
    /// stage. Resolved is terminal.
    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        if *self == CaseStatus::Resolved || *self == next {
            return false;
        }
        match (self.stage(), next.stage()) {
            (Some(from), Some(to)) => to > from,
            (Some(_), None) => true,
            (None, Some(_)) => true,
            (None, None) => false,
        }
    }

    /// Statuses at or past `verified` imply a moderator confirmed the report.
    pub fn implies_verified(&self) -> bool {
        matches!(self.stage(), Some(stage) if stage >= 1)
    }
}

// --- Records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub headline: String,
    pub summary: String,
    pub target: TargetDetails,
    pub location: Location,
    pub status: CaseStatus,
    pub damage_types: BTreeSet<DamageType>,
    pub confidence: f32,
    pub verified: bool,
    /// Post time of the first sighting.
    pub incident_at: DateTime<Utc>,
    pub duplicate_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn target_type(&self) -> TargetType {
        self.target.target_type()
    }
}

/// Fields needed to open a case. Status, ids and timestamps are assigned by
/// the store.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewCase {
    #[builder(setter(into))]
    pub headline: String,
    #[builder(setter(into))]
    pub summary: String,
    pub target: TargetDetails,
    pub location: Location,
    pub damage_types: BTreeSet<DamageType>,
    #[builder(default = 0.5)]
    pub confidence: f32,
    pub incident_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

string_enum!(MediaKind {
    Photo => "photo",
    Video => "video",
    AnimatedGif => "animated_gif",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMedia {
    pub id: Uuid,
    pub case_id: Uuid,
    pub url: String,
    pub kind: MediaKind,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// A post as returned by a source ingestor, before anything is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialPost {
    pub platform: Platform,
    pub platform_id: String,
    pub author: String,
    pub text: String,
    pub url: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub media: Vec<MediaItem>,
}

/// A stored originating post. Unique per (platform, platform_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub platform: Platform,
    pub platform_id: String,
    pub author: String,
    pub content: String,
    pub url: Option<String>,
    pub posted_at: DateTime<Utc>,
    /// The case this post was first filed under.
    pub case_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSource {
    pub platform: Platform,
    pub platform_id: String,
    pub author: String,
    pub content: String,
    pub url: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub case_id: Option<Uuid>,
}

impl NewSource {
    pub fn from_post(post: &SocialPost, case_id: Option<Uuid>) -> Self {
        Self {
            platform: post.platform,
            platform_id: post.platform_id.clone(),
            author: post.author.clone(),
            content: post.text.clone(),
            url: post.url.clone(),
            posted_at: post.posted_at,
            case_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    StatusChange,
    NewInformation,
    SuspectIdentified,
    MediaAdded,
    LocationUpdate,
    Other,
}

string_enum!(UpdateType {
    StatusChange => "status_change",
    NewInformation => "new_information",
    SuspectIdentified => "suspect_identified",
    MediaAdded => "media_added",
    LocationUpdate => "location_update",
    Other => "other",
});

/// Append-only timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseUpdate {
    pub id: Uuid,
    pub case_id: Uuid,
    pub update_type: UpdateType,
    pub content: String,
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCaseUpdate {
    pub case_id: Uuid,
    pub update_type: UpdateType,
    pub content: String,
    pub source_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    PossibleDuplicate,
    ConfirmedDuplicate,
    SameSuspect,
    SameLocation,
}

string_enum!(RelationshipType {
    PossibleDuplicate => "possible_duplicate",
    ConfirmedDuplicate => "confirmed_duplicate",
    SameSuspect => "same_suspect",
    SameLocation => "same_location",
});

/// One direction of a symmetric case relationship. Links are always stored
/// in pairs with the same type and strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedCaseLink {
    pub case_id: Uuid,
    pub related_case_id: Uuid,
    pub relationship_type: RelationshipType,
    /// In [0, 1].
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

/// Moderator list filter.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub city: Option<String>,
    pub target_type: Option<TargetType>,
    pub include_duplicates: bool,
    pub limit: u32,
}
