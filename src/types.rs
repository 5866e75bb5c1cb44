//! Core data types: mentions, place categories, linking results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The fixed set of place-name categories this crate links against.
///
/// Each category is backed by its own corpus, vocabulary, and model; the
/// linker holds one of each and disambiguates across them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    /// A municipality name.
    City,
    /// A transit (metro) station name.
    Station,
    /// A neighborhood name.
    District,
}

impl PlaceKind {
    /// All categories, in a stable order.
    pub const ALL: [PlaceKind; 3] = [PlaceKind::City, PlaceKind::Station, PlaceKind::District];

    /// Stable lowercase identifier, used for artifact file names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceKind::City => "city",
            PlaceKind::Station => "station",
            PlaceKind::District => "district",
        }
    }

    /// Keywords that, appearing before a mention, indicate this category.
    ///
    /// Used by the cross-category disambiguation pass. The corpora are
    /// Quebec French, so both French and English indicators are listed.
    #[must_use]
    pub fn indicator_keywords(&self) -> &'static [&'static str] {
        match self {
            PlaceKind::City => &["ville", "city", "municipalite", "municipality"],
            PlaceKind::Station => &["metro", "station", "subway"],
            PlaceKind::District => &["quartier", "neighborhood", "district", "arrondissement"],
        }
    }

    /// Parse from a lowercase identifier.
    #[must_use]
    pub fn parse(s: &str) -> Option<PlaceKind> {
        match s {
            "city" | "cities" => Some(PlaceKind::City),
            "station" | "metro" => Some(PlaceKind::Station),
            "district" | "quartier" => Some(PlaceKind::District),
            _ => None,
        }
    }
}

impl fmt::Display for PlaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A place-name mention extracted upstream from user input.
///
/// The extractor's category guess (`kind_hint`) can be wrong; the linker's
/// disambiguation pass may override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    /// Raw text of the span, as extracted.
    pub text: String,
    /// Byte offset of the span start in the source message.
    pub start: usize,
    /// Byte offset of the span end in the source message.
    pub end: usize,
    /// The extractor's category guess.
    pub kind_hint: PlaceKind,
    /// The extractor's confidence in the span.
    pub extractor_confidence: f64,
}

impl Mention {
    /// Create a mention covering `start..end` of a source message.
    #[must_use]
    pub fn new(text: impl Into<String>, start: usize, end: usize, kind_hint: PlaceKind) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            kind_hint,
            extractor_confidence: 1.0,
        }
    }

    /// Set the extractor confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.extractor_confidence = confidence;
        self
    }
}

/// How a linked value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    /// Exact match in the normalized canonical-label dictionary.
    Dictionary,
    /// Classifier prediction.
    Model,
}

/// A canonical value proposed for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedPlace {
    /// The canonical label the mention resolved to.
    pub value: String,
    /// Confidence in `[0, 1]`; 1.0 for dictionary hits.
    pub confidence: f64,
    /// The normalized form of the input that was looked up.
    pub normalized: String,
    /// Dictionary short-circuit or model inference.
    pub source: LinkSource,
    /// Runner-up candidates `(label, confidence)` kept for diagnostics.
    /// Empty for dictionary hits.
    pub top_k: Vec<(String, f64)>,
}

/// The result of linking one mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingResult {
    /// The category finally selected (after disambiguation).
    pub kind: PlaceKind,
    /// The extractor's original category guess.
    pub hinted_kind: PlaceKind,
    /// Candidate values per category the linker evaluated.
    pub candidates: HashMap<PlaceKind, LinkedPlace>,
}

impl LinkingResult {
    /// The linked value for the selected category, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&LinkedPlace> {
        self.candidates.get(&self.kind)
    }

    /// Whether the disambiguation pass overrode the extractor's guess.
    #[must_use]
    pub fn was_overridden(&self) -> bool {
        self.kind != self.hinted_kind
    }
}

/// A normalized mention paired with its label index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Normalized mention text.
    pub mention: String,
    /// Index into the sorted canonical-label list.
    pub label: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        for kind in PlaceKind::ALL {
            assert_eq!(PlaceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(PlaceKind::parse("metro"), Some(PlaceKind::Station));
        assert_eq!(PlaceKind::parse("street"), None);
    }

    #[test]
    fn result_selected_follows_override() {
        let mut candidates = HashMap::new();
        candidates.insert(
            PlaceKind::Station,
            LinkedPlace {
                value: "Pie-IX".into(),
                confidence: 0.9,
                normalized: "pie ix".into(),
                source: LinkSource::Model,
                top_k: vec![],
            },
        );
        let result = LinkingResult {
            kind: PlaceKind::Station,
            hinted_kind: PlaceKind::City,
            candidates,
        };
        assert!(result.was_overridden());
        assert_eq!(result.selected().unwrap().value, "Pie-IX");
    }
}
