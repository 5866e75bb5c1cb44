//! Mention linking and cross-category disambiguation.
//!
//! A [`CategoryLinker`] resolves one mention against one place category:
//! exact dictionary lookup on the normalized form first (confidence 1.0, no
//! model involved), classifier inference otherwise. The [`Linker`] holds one
//! per category and runs a deterministic disambiguation pass across them,
//! because the upstream extractor's category guess is sometimes wrong:
//! "charging stations near metro jarry" tagged as a city mention should
//! still resolve as a station.
//!
//! Everything here is read-only after construction; `link()` takes `&self`,
//! is synchronous, and is safe to call concurrently.

use crate::embedding::{EmbeddingTable, Vectorizer};
use crate::error::{Error, Result};
use crate::fofe::Fofe;
use crate::model::MentionClassifier;
use crate::normalize::normalize;
use crate::types::{LinkSource, LinkedPlace, LinkingResult, Mention, PlaceKind};
use crate::dataset::LabelBundle;
use crate::vocab::NgramVocab;
use std::collections::HashMap;

/// Linker thresholds and encoding parameters.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    /// FOFE forgetting factor (must match training).
    pub forgetting_factor: f32,
    /// Maximum n-gram tokens per mention (must match training).
    pub max_tokens: usize,
    /// Number of runner-up candidates kept for diagnostics.
    pub top_k: usize,
    /// Another category's confidence must exceed this, with a keyword in the
    /// preceding text, to override the extractor's guess.
    pub keyword_override_threshold: f64,
    /// Another category's confidence must exceed this, and beat the hinted
    /// category's, to override without keyword evidence.
    pub absolute_override_threshold: f64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            forgetting_factor: 0.95,
            max_tokens: 50,
            top_k: 5,
            keyword_override_threshold: 0.80,
            absolute_override_threshold: 0.95,
        }
    }
}

/// Artifacts for one place category, loaded once and immutable afterwards.
pub struct CategoryLinker {
    kind: PlaceKind,
    exact: HashMap<String, String>,
    vocab: NgramVocab,
    embedding: Option<EmbeddingTable>,
    model: MentionClassifier,
    bundle: LabelBundle,
    fofe: Fofe,
    top_k: usize,
}

impl CategoryLinker {
    /// Assemble a category from its artifacts, validating dimensions.
    pub fn new(
        kind: PlaceKind,
        vocab: NgramVocab,
        embedding: Option<EmbeddingTable>,
        model: MentionClassifier,
        bundle: LabelBundle,
        config: &LinkerConfig,
    ) -> Result<Self> {
        if let Some(table) = &embedding {
            if table.vocab_size() != vocab.len() {
                return Err(Error::config(format!(
                    "{kind}: embedding table has {} rows but vocabulary has {} tokens",
                    table.vocab_size(),
                    vocab.len()
                )));
            }
        }
        let input_dim = embedding
            .as_ref()
            .map(EmbeddingTable::dim)
            .unwrap_or_else(|| vocab.len());
        if input_dim != model.input_dim() {
            return Err(Error::config(format!(
                "{kind}: encoder produces dimension {input_dim} but classifier expects {}",
                model.input_dim()
            )));
        }
        if bundle.labels.len() != model.n_classes() {
            return Err(Error::config(format!(
                "{kind}: {} labels but classifier has {} outputs",
                bundle.labels.len(),
                model.n_classes()
            )));
        }

        let exact = bundle
            .labels
            .iter()
            .map(|label| (normalize(label), label.trim().to_string()))
            .collect();

        Ok(Self {
            kind,
            exact,
            vocab,
            embedding,
            model,
            bundle,
            fofe: Fofe::with_max_order(config.forgetting_factor, config.max_tokens)?,
            top_k: config.top_k,
        })
    }

    /// The category this linker serves.
    #[must_use]
    pub fn kind(&self) -> PlaceKind {
        self.kind
    }

    /// Resolve a mention within this category.
    ///
    /// Empty input yields a zero-confidence result rather than an error; an
    /// all-OOV input still produces a valid, low-confidence classification.
    pub fn resolve(&self, text: &str) -> Result<LinkedPlace> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Ok(LinkedPlace {
                value: String::new(),
                confidence: 0.0,
                normalized,
                source: LinkSource::Model,
                top_k: Vec::new(),
            });
        }

        if let Some(canonical) = self.exact.get(&normalized) {
            log::info!(
                "{}: linked {:?} via dictionary to {:?}",
                self.kind,
                normalized,
                canonical
            );
            return Ok(LinkedPlace {
                value: canonical.clone(),
                confidence: 1.0,
                normalized,
                source: LinkSource::Dictionary,
                top_k: Vec::new(),
            });
        }

        let ranked = self.classify(&normalized)?;
        let (best_label, best_prob) = ranked
            .first()
            .cloned()
            .ok_or_else(|| Error::inference("classifier returned no candidates"))?;
        log::info!(
            "{}: linked {:?} via model to {:?} ({:.4})",
            self.kind,
            normalized,
            best_label,
            best_prob
        );
        Ok(LinkedPlace {
            value: best_label,
            confidence: best_prob,
            normalized,
            source: LinkSource::Model,
            top_k: ranked,
        })
    }

    /// Run the encoder and classifier, returning the top-k `(label, prob)`.
    fn classify(&self, normalized: &str) -> Result<Vec<(String, f64)>> {
        let vectorizer = match &self.embedding {
            Some(table) => Vectorizer::Table(table),
            None => Vectorizer::OneHot(self.vocab.len()),
        };
        let indexes = self.vocab.ngram_indexes(normalized);
        let vectors = vectorizer.vectors(&indexes);
        let encoding = self.fofe.encode(&vectors, vectorizer.dim())?;

        let device = candle_core::Device::Cpu;
        let xs = candle_core::Tensor::from_vec(encoding, (1, vectorizer.dim()), &device)?;
        let log_probs = self.model.forward(&xs, false)?;
        let row = log_probs.squeeze(0)?.to_vec1::<f32>()?;

        let mut ranked: Vec<(String, f64)> = row
            .iter()
            .enumerate()
            .map(|(i, &lp)| (self.bundle.labels[i].clone(), (lp as f64).exp()))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.top_k);
        Ok(ranked)
    }
}

/// The serving-time entry point: one [`CategoryLinker`] per place category
/// plus the cross-category disambiguation policy.
pub struct Linker {
    categories: HashMap<PlaceKind, CategoryLinker>,
    config: LinkerConfig,
}

impl Linker {
    /// Build a linker from per-category artifacts.
    pub fn new(categories: Vec<CategoryLinker>, config: LinkerConfig) -> Result<Self> {
        if categories.is_empty() {
            return Err(Error::config("linker needs at least one category"));
        }
        let mut map = HashMap::new();
        for category in categories {
            if map.insert(category.kind(), category).is_some() {
                return Err(Error::config("duplicate category linker"));
            }
        }
        Ok(Self {
            categories: map,
            config,
        })
    }

    /// The categories this linker can resolve.
    #[must_use]
    pub fn kinds(&self) -> Vec<PlaceKind> {
        let mut kinds: Vec<PlaceKind> = PlaceKind::ALL
            .into_iter()
            .filter(|k| self.categories.contains_key(k))
            .collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Link a mention extracted from `source_text`.
    ///
    /// Evaluates the mention against every loaded category, picks the
    /// extractor's hinted category, then applies the deterministic override
    /// rules. Reentrant and safe to call concurrently; always returns
    /// synchronously.
    pub fn link(&self, source_text: &str, mention: &Mention) -> Result<LinkingResult> {
        if !self.categories.contains_key(&mention.kind_hint) {
            return Err(Error::invalid_input(format!(
                "no artifacts loaded for hinted category {}",
                mention.kind_hint
            )));
        }

        let mut candidates = HashMap::new();
        for kind in PlaceKind::ALL {
            if let Some(category) = self.categories.get(&kind) {
                candidates.insert(kind, category.resolve(&mention.text)?);
            }
        }

        let hinted = mention.kind_hint;
        let preceding_end = mention.start.min(source_text.len());
        let preceding = source_text.get(..preceding_end).unwrap_or(source_text);
        let selected = disambiguate(&self.config, hinted, &candidates, preceding);

        if selected != hinted {
            let from = &candidates[&hinted];
            let to = &candidates[&selected];
            log::info!(
                "override: {:?} tagged {} ({:.4}) reassigned to {} ({:.4})",
                mention.text,
                hinted,
                from.confidence,
                selected,
                to.confidence
            );
        }

        Ok(LinkingResult {
            kind: selected,
            hinted_kind: hinted,
            candidates,
        })
    }

}

/// Pick the final category for a mention.
///
/// Two override rules, checked against every other category in the fixed
/// [`PlaceKind::ALL`] order (first match wins):
/// 1. candidate confidence above the keyword threshold AND an indicator
///    keyword for that category in `preceding`, the text before the mention;
/// 2. candidate confidence above the absolute threshold AND above the hinted
///    category's confidence, keyword or not.
#[must_use]
pub fn disambiguate(
    config: &LinkerConfig,
    hinted: PlaceKind,
    candidates: &HashMap<PlaceKind, LinkedPlace>,
    preceding: &str,
) -> PlaceKind {
    let hinted_confidence = candidates
        .get(&hinted)
        .map(|c| c.confidence)
        .unwrap_or(0.0);
    let preceding = normalize(preceding);

    for kind in PlaceKind::ALL {
        if kind == hinted {
            continue;
        }
        let Some(candidate) = candidates.get(&kind) else {
            continue;
        };

        let keyword_present = kind
            .indicator_keywords()
            .iter()
            .any(|kw| preceding.split(' ').any(|w| w == *kw));
        if candidate.confidence > config.keyword_override_threshold && keyword_present {
            return kind;
        }
        if candidate.confidence > config.absolute_override_threshold
            && candidate.confidence > hinted_confidence
        {
            return kind;
        }
    }
    hinted
}
