//! Synthetic training-set generation from a canonical label corpus.
//!
//! The generator expands every canonical label into surface-form variants
//! through the rule registries in [`crate::augment`], drops variants that
//! collide with a canonical label, removes contradictory supervision (one
//! mention string pointing at two different labels), and computes
//! inverse-frequency class weights.
//!
//! Labels are sorted ascending by length before indices are assigned, so
//! "saint philippe" is processed before "chute saint philippe" and wins any
//! substring contention deterministically.

use crate::augment::{RuleCtx, ABBREV_RULES, SURFACE_RULES, WORD_RULES};
use crate::error::{Error, Result};
use crate::normalize::normalize;
use crate::types::TrainingSample;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Variants shorter than this many characters are discarded; they carry too
/// little signal to be distinguishable.
const MIN_VARIANT_CHARS: usize = 3;

/// Generator settings.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Cap on variants per randomized rule and label.
    pub max_variants_per_rule: usize,
    /// Seed for the randomized rules.
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_variants_per_rule: 10,
            seed: 999,
        }
    }
}

/// The canonical label universe with its stable indices and class weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelBundle {
    /// Canonical labels, sorted ascending by length; position is the index.
    pub labels: Vec<String>,
    /// Label string to index.
    pub label_index: HashMap<String, usize>,
    /// Inverse-frequency class weights in `(0, 1]`, smallest class at 1.0.
    pub class_weights: Vec<f32>,
}

impl LabelBundle {
    /// Persist as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::artifact(format!("serialize label bundle: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a bundle saved by [`LabelBundle::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::artifact(format!("read label bundle {}: {e}", path.display())))?;
        let bundle: LabelBundle = serde_json::from_str(&json)
            .map_err(|e| Error::artifact(format!("parse label bundle {}: {e}", path.display())))?;
        if bundle.labels.len() != bundle.class_weights.len() {
            return Err(Error::config(format!(
                "{}: {} labels but {} class weights",
                path.display(),
                bundle.labels.len(),
                bundle.class_weights.len()
            )));
        }
        Ok(bundle)
    }
}

/// Output of the generator.
#[derive(Debug, Clone)]
pub struct GeneratedDataset {
    /// Deduplicated, conflict-free training rows.
    pub samples: Vec<TrainingSample>,
    /// Label universe and class weights.
    pub bundle: LabelBundle,
    /// Number of distinct mention strings removed as conflicts.
    pub conflicts_removed: usize,
}

/// Read a canonical label corpus: one label per row, first column of a
/// headerless tabular file.
pub fn read_label_corpus(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::artifact(format!("read corpus {}: {e}", path.display())))?;

    let mut labels = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::dataset(format!("corpus row: {e}")))?;
        if let Some(field) = record.get(0) {
            let field = field.trim();
            if !field.is_empty() {
                labels.push(field.to_string());
            }
        }
    }
    if labels.is_empty() {
        return Err(Error::dataset(format!(
            "corpus {} contains no labels",
            path.display()
        )));
    }
    Ok(labels)
}

/// Expand a canonical label list into a conflict-free training set.
pub fn generate(labels: Vec<String>, config: &GeneratorConfig) -> Result<GeneratedDataset> {
    let mut labels: Vec<String> = labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if labels.is_empty() {
        return Err(Error::dataset("no canonical labels to expand"));
    }
    // Shorter labels first; ties keep corpus order (stable sort).
    labels.sort_by_key(|l| l.chars().count());

    let label_index: HashMap<String, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.clone(), i))
        .collect();

    let normalized: Vec<String> = labels.iter().map(|l| normalize(l)).collect();
    let canonical_forms: HashSet<&str> = normalized.iter().map(String::as_str).collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut rows: Vec<TrainingSample> = Vec::new();

    for (idx, base) in normalized.iter().enumerate() {
        let mut mentions: Vec<String> = vec![base.clone()];
        let mut seen: HashSet<String> = mentions.iter().cloned().collect();

        {
            let mut ctx = RuleCtx {
                rng: &mut rng,
                max_variants: config.max_variants_per_rule,
            };

            let admit = |variant: String, mentions: &mut Vec<String>, seen: &mut HashSet<String>| {
                if variant.chars().count() < MIN_VARIANT_CHARS {
                    return;
                }
                if canonical_forms.contains(variant.as_str()) || seen.contains(&variant) {
                    return;
                }
                seen.insert(variant.clone());
                mentions.push(variant);
            };

            for rule in SURFACE_RULES {
                for variant in (rule.apply)(base, &mut ctx) {
                    admit(variant, &mut mentions, &mut seen);
                }
            }

            // Abbreviation and word variants are themselves re-expanded
            // through the surface rules, so "st henri" also yields its own
            // typo and mask forms.
            for rule in ABBREV_RULES.iter().chain(WORD_RULES) {
                for variant in (rule.apply)(base, &mut ctx) {
                    if canonical_forms.contains(variant.as_str()) {
                        continue;
                    }
                    for surface in SURFACE_RULES {
                        for expanded in (surface.apply)(&variant, &mut ctx) {
                            admit(expanded, &mut mentions, &mut seen);
                        }
                    }
                    admit(variant, &mut mentions, &mut seen);
                }
            }
        }

        rows.extend(mentions.into_iter().map(|mention| TrainingSample {
            mention,
            label: idx,
        }));
    }

    let (samples, conflicts_removed) = remove_conflicts(rows);
    let class_weights = compute_class_weights(&samples, labels.len());

    log::info!(
        "generated {} samples for {} labels ({} conflicting mentions dropped)",
        samples.len(),
        labels.len(),
        conflicts_removed
    );

    Ok(GeneratedDataset {
        samples,
        bundle: LabelBundle {
            labels,
            label_index,
            class_weights,
        },
        conflicts_removed,
    })
}

/// Drop every row whose mention string maps to more than one label index.
///
/// Such a mention provides contradictory supervision and cannot be learned;
/// all of its rows go, not just the later ones.
fn remove_conflicts(rows: Vec<TrainingSample>) -> (Vec<TrainingSample>, usize) {
    let mut label_of: HashMap<&str, usize> = HashMap::new();
    let mut conflicting: HashSet<String> = HashSet::new();

    for row in &rows {
        match label_of.get(row.mention.as_str()) {
            Some(&prev) if prev != row.label => {
                conflicting.insert(row.mention.clone());
            }
            Some(_) => {}
            None => {
                label_of.insert(&row.mention, row.label);
            }
        }
    }

    for mention in &conflicting {
        log::warn!("conflicting mention dropped: {mention:?}");
    }

    let kept = rows
        .into_iter()
        .filter(|row| !conflicting.contains(&row.mention))
        .collect();
    (kept, conflicting.len())
}

/// Inverse-frequency class weights, normalized so the least-frequent class
/// gets 1.0. A class that lost all its rows to conflict removal keeps weight
/// 1.0 and is reported.
fn compute_class_weights(samples: &[TrainingSample], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for sample in samples {
        counts[sample.label] += 1;
    }

    let smallest = counts.iter().copied().filter(|&c| c > 0).min().unwrap_or(1);
    counts
        .iter()
        .enumerate()
        .map(|(idx, &count)| {
            if count == 0 {
                log::warn!("class {idx} has no training samples left");
                1.0
            } else {
                smallest as f32 / count as f32
            }
        })
        .collect()
}

/// Write the generated rows as a `mention,label` CSV with header.
pub fn save_training_set(samples: &[TrainingSample], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .map_err(|e| Error::artifact(format!("write training set: {e}")))?;
    writer
        .write_record(["mention", "label"])
        .map_err(|e| Error::artifact(format!("training set header: {e}")))?;
    for sample in samples {
        writer
            .write_record([sample.mention.as_str(), &sample.label.to_string()])
            .map_err(|e| Error::artifact(format!("training set row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| Error::artifact(format!("flush training set: {e}")))?;
    Ok(())
}

/// Load a training set saved by [`save_training_set`].
pub fn load_training_set(path: impl AsRef<Path>) -> Result<Vec<TrainingSample>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::artifact(format!("read training set {}: {e}", path.display())))?;

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::dataset(format!("training row: {e}")))?;
        let mention = record
            .get(0)
            .ok_or_else(|| Error::dataset("training row missing mention column"))?;
        let label: usize = record
            .get(1)
            .ok_or_else(|| Error::dataset("training row missing label column"))?
            .parse()
            .map_err(|e| Error::dataset(format!("bad label index: {e}")))?;
        samples.push(TrainingSample {
            mention: mention.to_string(),
            label,
        });
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station_labels() -> Vec<String> {
        vec![
            "Saint-Laurent".to_string(),
            "Place-Saint-Henri".to_string(),
            "Pie-IX".to_string(),
            "Jarry".to_string(),
        ]
    }

    #[test]
    fn labels_sorted_by_length_before_indexing() {
        let dataset = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        let lengths: Vec<usize> = dataset
            .bundle
            .labels
            .iter()
            .map(|l| l.chars().count())
            .collect();
        let mut sorted = lengths.clone();
        sorted.sort_unstable();
        assert_eq!(lengths, sorted);
        assert_eq!(dataset.bundle.label_index["Pie-IX"], 0);
    }

    #[test]
    fn every_label_contributes_its_normalized_form() {
        let dataset = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        for (label, &idx) in &dataset.bundle.label_index {
            let norm = normalize(label);
            assert!(
                dataset
                    .samples
                    .iter()
                    .any(|s| s.mention == norm && s.label == idx),
                "missing base sample for {label}"
            );
        }
    }

    #[test]
    fn no_conflicting_mentions_survive() {
        let dataset = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        let mut label_of: HashMap<&str, usize> = HashMap::new();
        for sample in &dataset.samples {
            if let Some(&prev) = label_of.get(sample.mention.as_str()) {
                assert_eq!(prev, sample.label, "conflict kept: {}", sample.mention);
            }
            label_of.insert(&sample.mention, sample.label);
        }
    }

    #[test]
    fn variants_never_equal_other_canonical_labels() {
        let dataset = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        let canonical: HashSet<String> = dataset
            .bundle
            .labels
            .iter()
            .map(|l| normalize(l))
            .collect();
        for sample in &dataset.samples {
            if canonical.contains(&sample.mention) {
                // Only allowed as the label's own base form.
                let norm = normalize(&dataset.bundle.labels[sample.label]);
                assert_eq!(sample.mention, norm);
            }
        }
    }

    #[test]
    fn class_weights_bounded_with_smallest_class_at_one() {
        let dataset = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        let weights = &dataset.bundle.class_weights;
        assert_eq!(weights.len(), dataset.bundle.labels.len());
        assert!(weights.iter().all(|&w| w > 0.0 && w <= 1.0));
        assert!(weights.iter().any(|&w| (w - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn generation_is_reproducible_for_fixed_seed() {
        let a = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        let b = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn conflict_removal_drops_both_rows() {
        let rows = vec![
            TrainingSample { mention: "place".into(), label: 0 },
            TrainingSample { mention: "place".into(), label: 1 },
            TrainingSample { mention: "jarry".into(), label: 2 },
        ];
        let (kept, dropped) = remove_conflicts(rows);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].mention, "jarry");
    }

    #[test]
    fn training_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training_set.csv");
        let dataset = generate(station_labels(), &GeneratorConfig::default()).unwrap();
        save_training_set(&dataset.samples, &path).unwrap();
        let loaded = load_training_set(&path).unwrap();
        assert_eq!(loaded, dataset.samples);
    }
}
