//! Analyzer output types and the keyword-list analyzer.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vandalwatch_common::{DamageType, Location, TargetDetails, TargetType};

use crate::classify;
use crate::traits::ContentAnalyzer;

/// Where the analyzer thinks the incident happened. Missing fields default to
/// empty rather than failing the post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationInfo {
    pub city: String,
    pub state: Option<String>,
    pub country: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetInfo {
    pub target_type: Option<TargetType>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub year: Option<u16>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    pub is_relevant: bool,
    pub is_vandalism: bool,
    /// In [0, 1].
    pub relevance_score: f32,
    pub location: LocationInfo,
    pub target: TargetInfo,
    pub damage_types: Vec<DamageType>,
    pub summary: String,
}

impl Analysis {
    /// Only relevant vandalism reports go to the dedup engine.
    pub fn is_incident(&self) -> bool {
        self.is_relevant && self.is_vandalism
    }

    pub fn location(&self) -> Location {
        Location {
            city: self.location.city.trim().to_string(),
            state: self.location.state.clone().filter(|s| !s.is_empty()),
            country: self.location.country.clone().filter(|s| !s.is_empty()),
            coordinates: None,
        }
    }
}

/// Keyword-list analyzer. Deterministic and offline.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_text(&self, text: &str) -> Analysis {
        let topic = classify::topic_hits(text);
        let damage = classify::damage_types(text);
        let vandalism = classify::vandalism_hits(text) + damage.len();

        let relevance_score = (0.5 * (topic.min(2) as f32 / 2.0)
            + 0.5 * (vandalism.min(2) as f32 / 2.0))
            .clamp(0.0, 1.0);

        let location = classify::extract_location(text)
            .map(|m| LocationInfo {
                city: m.city,
                state: m.state,
                country: m.country,
                confidence: m.confidence,
            })
            .unwrap_or_default();

        let target = match classify::detect_target(text) {
            None => TargetInfo::default(),
            Some(TargetDetails::Vehicle(v)) => TargetInfo {
                target_type: Some(TargetType::Vehicle),
                confidence: if v.model.is_some() { 0.8 } else { 0.5 },
                make: v.make,
                model: v.model,
                color: v.color,
                year: v.year,
            },
            Some(other) => TargetInfo {
                target_type: Some(other.target_type()),
                confidence: 0.7,
                ..Default::default()
            },
        };

        let summary = if topic > 0 && vandalism > 0 {
            format!(
                "Possible vandalism report ({} damage signal(s))",
                damage.len().max(1)
            )
        } else {
            "Not a vandalism report".to_string()
        };

        Analysis {
            is_relevant: topic > 0,
            is_vandalism: vandalism > 0,
            relevance_score,
            location,
            target,
            damage_types: damage.into_iter().collect(),
            summary,
        }
    }
}

#[async_trait]
impl ContentAnalyzer for KeywordAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Analysis> {
        Ok(self.analyze_text(text))
    }
}
