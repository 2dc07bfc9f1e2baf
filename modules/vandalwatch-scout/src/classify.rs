//! Keyword classification of raw post text.
//!
//! Pure functions shared by the keyword analyzer and the dedup engine:
//! target detection (building / property / vehicle), damage tagging across six
//! categories, "in City, ST" location extraction, and topic/vandalism hits.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use vandalwatch_common::{
    BuildingDetails, DamageType, PropertyDetails, TargetDetails, VehicleDetails,
};

fn re(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).unwrap()
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Checked in order; the first hit names the subtype.
static BUILDING_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("supercharger", re(r"\bsuper\s?chargers?\b")),
        ("dealership", re(r"\b(dealerships?|showrooms?)\b")),
        ("service_center", re(r"\bservice\s+cent(er|re)s?\b")),
        ("factory", re(r"\b(giga\s?factory|gigafactory|factory)\b")),
        ("store", re(r"\btesla\s+(store|gallery)\b")),
    ]
});

static PROPERTY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("wall_charger", re(r"\b(wall\s+connectors?|wall\s+chargers?|home\s+chargers?)\b")),
        ("charging_station", re(r"\bcharging\s+stations?\b")),
    ]
});

/// Generic nouns that only name the target when no vehicle model is mentioned.
static GENERIC_BUILDING_RE: LazyLock<Regex> = LazyLock::new(|| re(r"\bbuildings?\b"));

static GENERIC_PROPERTY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("signage", re(r"\b(signs?|signage|billboards?)\b")),
        ("property", re(r"\bproperty\b")),
    ]
});

/// Damage only a vehicle takes.
static VEHICLE_DAMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"\b(key(ed|ing)|tires?)\b"));

static MAKE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("Tesla", re(r"\b(teslas?|cyber\s?trucks?)\b")),
        ("Rivian", re(r"\brivians?\b")),
        ("Ford", re(r"\bford\b")),
    ]
});

static MODEL_LETTER_RE: LazyLock<Regex> = LazyLock::new(|| re(r"\bmodel\s+([3sxy])\b"));

static NAMED_MODELS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("Cybertruck", re(r"\bcyber\s?trucks?\b")),
        ("Roadster", re(r"\broadster\b")),
        ("Semi", re(r"\btesla\s+semi\b")),
    ]
});

const COLORS: &str = "white|black|red|blue|silver|gray|grey|green|yellow|orange|brown|gold|pearl";
const YEARS: &str = r"19[89]\d|20[0-4]\d";

/// Color and year words directly in front of a make or model: "white 2021 Tesla".
static DESCRIPTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(
        r"\b((?:(?:{COLORS}|{YEARS})\s+){{1,3}})(?:teslas?|cyber\s?trucks?|model\s+[3sxy]|rivians?|ford|roadster)\b"
    ))
});

static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| re(&format!(r"\b({COLORS})\b")));

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| re(&format!(r"\b({YEARS})\b")));

/// Derive what was targeted. A named vehicle with keying or tire damage is a
/// vehicle. Otherwise buildings win over property, property over vehicles,
/// and a post naming none of them is about a vehicle.
pub fn classify_target(text: &str) -> TargetDetails {
    detect_target(text).unwrap_or_else(|| TargetDetails::Vehicle(VehicleDetails::default()))
}

/// Like [`classify_target`], but `None` when the text names no building,
/// property, make or model.
pub fn detect_target(text: &str) -> Option<TargetDetails> {
    let vehicle = vehicle_details(text);
    let names_model = vehicle.model.is_some();
    let names_vehicle = names_model || vehicle.make.is_some();

    if names_vehicle && VEHICLE_DAMAGE_RE.is_match(text) {
        return Some(TargetDetails::Vehicle(vehicle));
    }

    let building = first_match(&BUILDING_PATTERNS, text)
        .or_else(|| (!names_model && GENERIC_BUILDING_RE.is_match(text)).then_some("building"));
    if let Some(subtype) = building {
        return Some(TargetDetails::Building(BuildingDetails {
            building_type: Some(subtype.to_string()),
        }));
    }

    let property = first_match(&PROPERTY_PATTERNS, text).or_else(|| {
        (!names_model)
            .then(|| first_match(&GENERIC_PROPERTY_PATTERNS, text))
            .flatten()
    });
    if let Some(subtype) = property {
        return Some(TargetDetails::Property(PropertyDetails {
            property_type: Some(subtype.to_string()),
        }));
    }

    names_vehicle.then_some(TargetDetails::Vehicle(vehicle))
}

/// Make, model, color and year mentioned in the text. Color and year only
/// count when they describe the vehicle.
pub fn vehicle_details(text: &str) -> VehicleDetails {
    let model = MODEL_LETTER_RE
        .captures(text)
        .map(|c| format!("Model {}", c[1].to_uppercase()))
        .or_else(|| first_match(&NAMED_MODELS, text).map(str::to_string));

    let descriptors = DESCRIPTOR_RE
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    VehicleDetails {
        make: first_match(&MAKE_PATTERNS, text).map(str::to_string),
        model,
        color: COLOR_RE
            .captures(&descriptors)
            .map(|c| match c[1].to_lowercase().as_str() {
                "grey" => "gray".to_string(),
                other => other.to_string(),
            }),
        year: YEAR_RE.captures(&descriptors).and_then(|c| c[1].parse().ok()),
    }
}

fn first_match(patterns: &[(&'static str, Regex)], text: &str) -> Option<&'static str> {
    patterns
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(name, _)| *name)
}

// ---------------------------------------------------------------------------
// Damage
// ---------------------------------------------------------------------------

static DAMAGE_PATTERNS: LazyLock<Vec<(DamageType, Regex)>> = LazyLock::new(|| {
    vec![
        (
            DamageType::Graffiti,
            re(r"\b(graffiti|spray[\s-]?paint\w*|tagged|swastikas?|defaced)\b"),
        ),
        (
            DamageType::Keying,
            re(r"\b(key(ed|ing)|scratch(ed|es|ing)?|with\s+(a\s+)?keys?)\b"),
        ),
        (
            DamageType::BrokenGlass,
            re(r"\b(smash\w*|shatter\w*|broken|broke|bricks?|rocks?)\b[^.!?]{0,40}?\b(windows?|windshields?|glass|mirrors?)\b|\b(windows?|windshields?)\s+(were\s+|was\s+)?(smashed|broken|shattered)\b"),
        ),
        (
            DamageType::TireDamage,
            re(r"\b(slash\w*|punctur\w*|flat|stabbed|deflated)\b[^.!?]{0,30}?\btires?\b|\btires?\s+(were\s+|was\s+)?(slashed|punctured|flattened|deflated)\b"),
        ),
        (
            DamageType::Arson,
            re(r"\b(arson|fire|firebomb\w*|burn(ed|t|ing)?|torch(ed)?|molotovs?|ablaze|incendiar\w*)\b"),
        ),
        (
            DamageType::BodyDamage,
            re(r"\b(dent(ed|s)?|kicked|hammer(ed)?|egg(ed|s)?|crowbar|smeared)\b"),
        ),
    ]
});

/// Independent checks across the six damage categories. May be empty; the
/// caller decides the fallback.
pub fn damage_types(text: &str) -> BTreeSet<DamageType> {
    DAMAGE_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(damage, _)| *damage)
        .collect()
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// "in Austin, TX" / "near San Jose, CA". Case-sensitive so proper nouns anchor it.
static CITY_STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:in|at|near|from|outside)\s+([A-Z][A-Za-z.'-]+(?:\s+[A-Z][A-Za-z.'-]+){0,2}),\s*([A-Z]{2})\b")
        .unwrap()
});

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LocationMatch {
    pub city: String,
    pub state: Option<String>,
    pub country: Option<String>,
    pub confidence: f32,
}

pub fn extract_location(text: &str) -> Option<LocationMatch> {
    let caps = CITY_STATE_RE.captures(text)?;
    let city = caps[1].trim_end_matches('.').to_string();
    let code = &caps[2];

    if US_STATES.contains(&code) {
        Some(LocationMatch {
            city,
            state: Some(code.to_string()),
            country: Some("US".to_string()),
            confidence: 0.8,
        })
    } else {
        Some(LocationMatch {
            city,
            state: None,
            country: None,
            confidence: 0.4,
        })
    }
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

static TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"\b(teslas?|cyber\s?trucks?|super\s?chargers?|model\s+[3sxy])\b")
});

static VANDALISM_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"\b(vandal\w*|key(ed|ing)|graffiti|spray[\s-]?paint\w*|smash\w*|slash\w*|arson|torch(ed)?|molotovs?|damag\w*|destroy\w*|scratch\w*|defac\w*|shatter\w*|firebomb\w*)\b")
});

/// Number of topic keyword hits.
pub fn topic_hits(text: &str) -> usize {
    TOPIC_RE.find_iter(text).count()
}

/// Number of vandalism keyword hits.
pub fn vandalism_hits(text: &str) -> usize {
    VANDALISM_RE.find_iter(text).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vandalwatch_common::TargetType;

    #[test]
    fn supercharger_is_a_building() {
        let target = classify_target("Tesla Supercharger station spray painted");
        assert_eq!(target.target_type(), TargetType::Building);
        assert_eq!(
            target,
            TargetDetails::Building(BuildingDetails {
                building_type: Some("supercharger".into())
            })
        );
    }

    #[test]
    fn vehicle_is_the_default_target() {
        let target = classify_target("White Tesla Model 3 keyed in Austin, TX");
        let TargetDetails::Vehicle(v) = target else {
            panic!("expected vehicle, got {target:?}");
        };
        assert_eq!(v.make.as_deref(), Some("Tesla"));
        assert_eq!(v.model.as_deref(), Some("Model 3"));
        assert_eq!(v.color.as_deref(), Some("white"));
        assert_eq!(v.year, None);
    }

    #[test]
    fn cybertruck_implies_tesla() {
        let v = vehicle_details("grey 2024 cybertruck egged overnight");
        assert_eq!(v.make.as_deref(), Some("Tesla"));
        assert_eq!(v.model.as_deref(), Some("Cybertruck"));
        assert_eq!(v.color.as_deref(), Some("gray"));
        assert_eq!(v.year, Some(2024));
    }

    #[test]
    fn wall_connector_is_property() {
        let target = classify_target("someone ripped the wall connector off my garage");
        assert_eq!(target.target_type(), TargetType::Property);
    }

    #[test]
    fn named_vehicle_with_keying_beats_generic_nouns() {
        let target = classify_target("White Tesla Model 3 keyed outside my apartment building in Austin, TX");
        assert_eq!(target.target_type(), TargetType::Vehicle);
        assert_eq!(target.model(), Some("Model 3"));

        let target = classify_target("Tesla Model Y keyed, no signs of forced entry");
        assert_eq!(target.target_type(), TargetType::Vehicle);
    }

    #[test]
    fn generic_nouns_still_name_the_target_without_a_model() {
        assert_eq!(
            classify_target("Tesla sign spray painted outside the building").target_type(),
            TargetType::Building
        );
        assert_eq!(
            classify_target("anti-Tesla graffiti on a billboard").target_type(),
            TargetType::Property
        );
    }

    #[test]
    fn detect_target_is_none_without_any_target_words() {
        assert_eq!(detect_target("vandals struck again last night"), None);
        assert!(detect_target("Cybertruck egged").is_some());
    }

    #[test]
    fn color_and_year_must_describe_the_vehicle() {
        let v = vehicle_details("Tesla Model 3 keyed in Orange, CA");
        assert_eq!(v.color, None);

        let v = vehicle_details("Model Y keyed, $2000 in damage");
        assert_eq!(v.year, None);

        let v = vehicle_details("my red 2021 Tesla got keyed");
        assert_eq!(v.color.as_deref(), Some("red"));
        assert_eq!(v.year, Some(2021));
    }

    #[test]
    fn bare_key_is_not_keying() {
        assert!(damage_types("Lost my Tesla key card at the mall in Austin, TX").is_empty());
        assert!(damage_types("Tesla Model 3 scratched with a key").contains(&DamageType::Keying));
    }

    #[test]
    fn keying_from_key_and_scratch() {
        assert_eq!(
            damage_types("Tesla Model 3 vandalized in Austin, TX, scratched with key"),
            BTreeSet::from([DamageType::Keying])
        );
        assert_eq!(
            damage_types("White Tesla Model 3 keyed in Austin, TX"),
            BTreeSet::from([DamageType::Keying])
        );
    }

    #[test]
    fn spray_paint_is_graffiti_only() {
        assert_eq!(
            damage_types("Tesla Supercharger station spray painted"),
            BTreeSet::from([DamageType::Graffiti])
        );
    }

    #[test]
    fn multiple_categories_are_independent() {
        let tags = damage_types("Model Y had its tires slashed and the rear window smashed");
        assert_eq!(
            tags,
            BTreeSet::from([DamageType::BrokenGlass, DamageType::TireDamage])
        );
    }

    #[test]
    fn arson_matches_fire_but_not_supercharger() {
        assert!(damage_types("Cybertruck set on fire outside the mall").contains(&DamageType::Arson));
        assert!(damage_types("new supercharger opened today").is_empty());
    }

    #[test]
    fn extracts_city_and_state() {
        let loc = extract_location("White Tesla Model 3 keyed in Austin, TX").unwrap();
        assert_eq!(loc.city, "Austin");
        assert_eq!(loc.state.as_deref(), Some("TX"));
        assert_eq!(loc.country.as_deref(), Some("US"));
    }

    #[test]
    fn multi_word_city() {
        let loc = extract_location("Supercharger vandalized near San Luis Obispo, CA last night").unwrap();
        assert_eq!(loc.city, "San Luis Obispo");
        assert_eq!(loc.state.as_deref(), Some("CA"));
    }

    #[test]
    fn no_location_without_state_suffix() {
        assert_eq!(extract_location("my tesla got keyed at work"), None);
    }

    #[test]
    fn relevance_hits() {
        let text = "Tesla Model 3 vandalized in Austin, TX, scratched with key";
        assert!(topic_hits(text) >= 2);
        assert!(vandalism_hits(text) >= 2);
        assert_eq!(vandalism_hits("Tesla earnings call tomorrow"), 0);
    }
}
