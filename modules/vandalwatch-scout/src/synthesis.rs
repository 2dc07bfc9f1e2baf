//! Headline and summary templates for new cases.
//!
//! Pure string construction from structured fields. No clock, no I/O: the same
//! inputs always give the same text.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use vandalwatch_common::{DamageType, Location, TargetDetails};

/// "White Tesla Model 3", "Supercharger station", "Wall charger".
pub fn describe_target(target: &TargetDetails) -> String {
    match target {
        TargetDetails::Vehicle(v) => {
            let words: Vec<String> = [
                v.year.map(|y| y.to_string()),
                v.color.as_deref().map(capitalize),
                v.make.clone(),
                v.model.clone(),
            ]
            .into_iter()
            .flatten()
            .filter(|w| !w.is_empty())
            .collect();

            match (words.is_empty(), v.model.is_some()) {
                (true, _) => "Vehicle".to_string(),
                (false, true) => words.join(" "),
                (false, false) => format!("{} vehicle", words.join(" ")),
            }
        }
        TargetDetails::Building(b) => match b.building_type.as_deref() {
            Some("supercharger") => "Supercharger station".to_string(),
            Some("dealership") => "Dealership".to_string(),
            Some("service_center") => "Service center".to_string(),
            Some("factory") => "Factory".to_string(),
            Some("store") => "Store".to_string(),
            Some(other) if other != "building" => capitalize(&other.replace('_', " ")),
            _ => "Building".to_string(),
        },
        TargetDetails::Property(p) => match p.property_type.as_deref() {
            Some("wall_charger") => "Wall charger".to_string(),
            Some("charging_station") => "Charging station".to_string(),
            Some("signage") => "Signage".to_string(),
            Some(other) if other != "property" => capitalize(&other.replace('_', " ")),
            _ => "Property".to_string(),
        },
    }
}

/// Past-tense phrase for one damage tag.
pub fn damage_phrase(damage: DamageType) -> &'static str {
    match damage {
        DamageType::Graffiti => "spray-painted",
        DamageType::Keying => "keyed",
        DamageType::BrokenGlass => "had windows smashed",
        DamageType::TireDamage => "had tires slashed",
        DamageType::Arson => "set on fire",
        DamageType::BodyDamage => "had body damage",
        DamageType::OtherDamage => "vandalized",
    }
}

/// "keyed", "keyed and spray-painted", "keyed, spray-painted and set on fire".
pub fn describe_damage(damage: &BTreeSet<DamageType>) -> String {
    let phrases: Vec<&str> = damage.iter().map(|d| damage_phrase(*d)).collect();
    match phrases.as_slice() {
        [] => damage_phrase(DamageType::OtherDamage).to_string(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// "White Tesla Model 3 keyed in Austin, TX".
pub fn headline(target: &TargetDetails, damage: &BTreeSet<DamageType>, location: &Location) -> String {
    format!(
        "{} {} in {}",
        describe_target(target),
        describe_damage(damage),
        location.display_name()
    )
}

/// Two-sentence description of the incident.
pub fn summary(
    target: &TargetDetails,
    damage: &BTreeSet<DamageType>,
    location: &Location,
    incident_at: DateTime<Utc>,
) -> String {
    let tags: Vec<&str> = damage.iter().map(|d| d.as_str()).collect();
    format!(
        "A {} was reported {} in {} on {}. Damage reported: {}.",
        lowercase_first(&describe_target(target)),
        describe_damage(damage),
        location.display_name(),
        incident_at.format("%B %-d, %Y"),
        tags.join(", ")
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercases the first word unless it is a proper noun we emit ("Tesla").
fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if !s.starts_with("Tesla") && !s.starts_with("Rivian") && !s.starts_with("Ford") => {
            first.to_lowercase().chain(chars).collect()
        }
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vandalwatch_common::{BuildingDetails, VehicleDetails};

    fn austin() -> Location {
        Location {
            city: "Austin".into(),
            state: Some("TX".into()),
            country: Some("US".into()),
            coordinates: None,
        }
    }

    fn white_model_3() -> TargetDetails {
        TargetDetails::Vehicle(VehicleDetails {
            make: Some("Tesla".into()),
            model: Some("Model 3".into()),
            color: Some("white".into()),
            year: None,
        })
    }

    #[test]
    fn vehicle_headline() {
        let damage = BTreeSet::from([DamageType::Keying]);
        assert_eq!(
            headline(&white_model_3(), &damage, &austin()),
            "White Tesla Model 3 keyed in Austin, TX"
        );
    }

    #[test]
    fn building_headline_with_unknown_location() {
        let target = TargetDetails::Building(BuildingDetails {
            building_type: Some("supercharger".into()),
        });
        let damage = BTreeSet::from([DamageType::Graffiti]);
        assert_eq!(
            headline(&target, &damage, &Location::default()),
            "Supercharger station spray-painted in an unknown location"
        );
    }

    #[test]
    fn damage_list_joins_with_and() {
        let damage = BTreeSet::from([DamageType::Graffiti, DamageType::Keying, DamageType::Arson]);
        assert_eq!(describe_damage(&damage), "spray-painted, keyed and set on fire");
    }

    #[test]
    fn bare_vehicle_description() {
        assert_eq!(describe_target(&TargetDetails::default()), "Vehicle");
        let make_only = TargetDetails::Vehicle(VehicleDetails {
            make: Some("Tesla".into()),
            ..Default::default()
        });
        assert_eq!(describe_target(&make_only), "Tesla vehicle");
    }

    #[test]
    fn summary_mentions_date_and_tags() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 14, 30, 0).unwrap();
        let damage = BTreeSet::from([DamageType::Keying]);
        assert_eq!(
            summary(&white_model_3(), &damage, &austin(), at),
            "A white Tesla Model 3 was reported keyed in Austin, TX on March 1, 2025. Damage reported: keying."
        );
    }

    #[test]
    fn synthesis_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 14, 30, 0).unwrap();
        let damage = BTreeSet::from([DamageType::TireDamage, DamageType::BrokenGlass]);
        let first = (
            headline(&white_model_3(), &damage, &austin()),
            summary(&white_model_3(), &damage, &austin(), at),
        );
        for _ in 0..5 {
            let again = (
                headline(&white_model_3(), &damage, &austin()),
                summary(&white_model_3(), &damage, &austin(), at),
            );
            assert_eq!(first, again);
        }
    }
}
