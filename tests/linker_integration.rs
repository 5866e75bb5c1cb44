//! End-to-end tests: corpus -> generated dataset -> (embedding) -> trained
//! classifier -> serving linker, exercising the exact-dictionary invariant,
//! OOV degradation, and cross-category disambiguation.

use placelink::artifacts::{self, ArtifactPaths};
use placelink::{
    dataset, embedding, train, ClassifierConfig, EmbeddingConfig, GeneratorConfig, LinkSource,
    LinkerConfig, Mention, NgramVocab, PlaceKind, TrainConfig,
};
use std::path::Path;

fn small_train_config() -> TrainConfig {
    TrainConfig {
        epochs: 2,
        batch_size: 32,
        quality_floor: 0.97,
        patience: 0,
        classifier: ClassifierConfig {
            hidden_size: 32,
            dropout_rate: 0.1,
        },
        ..Default::default()
    }
}

/// Run the full offline pipeline for one category into `dir`.
fn build_category(dir: &Path, kind: PlaceKind, labels: &[&str], with_embedding: bool) {
    let paths = ArtifactPaths::new(dir, kind);

    let generated = dataset::generate(
        labels.iter().map(|l| l.to_string()).collect(),
        &GeneratorConfig::default(),
    )
    .unwrap();
    dataset::save_training_set(&generated.samples, paths.training_set()).unwrap();
    generated.bundle.save(paths.labels()).unwrap();

    let mentions: Vec<String> = generated.samples.iter().map(|s| s.mention.clone()).collect();
    let vocab = NgramVocab::build(2, &mentions).unwrap();
    vocab.save(paths.vocab()).unwrap();

    let table = if with_embedding {
        let config = EmbeddingConfig {
            dim: 8,
            hidden_size: 16,
            epochs: 1,
            ..Default::default()
        };
        let table = embedding::pretrain(&vocab, &mentions, &config).unwrap();
        table.save(paths.embedding()).unwrap();
        Some(table)
    } else {
        None
    };

    train::train(
        &generated.samples,
        &generated.bundle,
        &vocab,
        table.as_ref(),
        &small_train_config(),
        paths.model(),
    )
    .unwrap();
}

fn build_all(dir: &Path) {
    build_category(
        dir,
        PlaceKind::City,
        &["Laval", "Roberval", "Saint-Jérôme"],
        false,
    );
    build_category(
        dir,
        PlaceKind::Station,
        &["Jarry", "Saint-Laurent", "Pie-IX"],
        false,
    );
    build_category(
        dir,
        PlaceKind::District,
        &["Rosemont", "Le Plateau-Mont-Royal"],
        false,
    );
}

#[test]
fn exact_dictionary_match_returns_canonical_with_full_confidence() {
    let dir = tempfile::tempdir().unwrap();
    build_all(dir.path());
    let linker = artifacts::load_linker(dir.path(), LinkerConfig::default()).unwrap();

    let text = "charging near st-laurent";
    let mention = Mention::new("st-laurent", 14, 24, PlaceKind::Station);
    let result = linker.link(text, &mention).unwrap();

    let selected = result.selected().unwrap();
    assert_eq!(selected.value, "Saint-Laurent");
    assert_eq!(selected.confidence, 1.0);
    assert_eq!(selected.source, LinkSource::Dictionary);
}

#[test]
fn all_oov_mention_degrades_to_low_confidence_not_error() {
    let dir = tempfile::tempdir().unwrap();
    build_all(dir.path());
    let linker = artifacts::load_linker(dir.path(), LinkerConfig::default()).unwrap();

    // Characters absent from every training corpus.
    let text = "ψψψ ωωω";
    let mention = Mention::new("ψψψ ωωω", 0, text.len(), PlaceKind::City);
    let result = linker.link(text, &mention).unwrap();

    let selected = result.selected().unwrap();
    assert_eq!(selected.source, LinkSource::Model);
    assert!(selected.confidence.is_finite());
    assert!(!selected.top_k.is_empty());
}

#[test]
fn station_keyword_overrides_wrong_city_hint() {
    let dir = tempfile::tempdir().unwrap();
    build_all(dir.path());
    let linker = artifacts::load_linker(dir.path(), LinkerConfig::default()).unwrap();

    // "jarry" is a station; the extractor tagged it as a city, but the
    // preceding text says métro. The station dictionary hit (1.0) plus the
    // keyword flips the category.
    let text = "il y a des bornes pres du métro jarry";
    let start = text.find("jarry").unwrap();
    let mention = Mention::new("jarry", start, start + 5, PlaceKind::City);
    let result = linker.link(text, &mention).unwrap();

    assert_eq!(result.kind, PlaceKind::Station);
    assert!(result.was_overridden());
    assert_eq!(result.selected().unwrap().value, "Jarry");
}

#[test]
fn empty_mention_returns_zero_confidence() {
    let dir = tempfile::tempdir().unwrap();
    build_all(dir.path());
    let linker = artifacts::load_linker(dir.path(), LinkerConfig::default()).unwrap();

    let mention = Mention::new("", 0, 0, PlaceKind::District);
    let result = linker.link("", &mention).unwrap();
    assert_eq!(result.selected().unwrap().confidence, 0.0);
}

#[test]
fn missing_artifacts_are_fatal_at_load() {
    let dir = tempfile::tempdir().unwrap();
    // Only one category trained; the full linker must refuse to start.
    build_category(dir.path(), PlaceKind::City, &["Laval", "Roberval"], false);
    assert!(artifacts::load_linker(dir.path(), LinkerConfig::default()).is_err());

    // The trained category alone still loads.
    let category =
        artifacts::load_category(dir.path(), PlaceKind::City, &LinkerConfig::default());
    assert!(category.is_ok());
}

#[test]
fn pipeline_with_pretrained_embedding_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    build_category(
        dir.path(),
        PlaceKind::Station,
        &["Jarry", "Verdun"],
        true,
    );

    let category =
        artifacts::load_category(dir.path(), PlaceKind::Station, &LinkerConfig::default())
            .unwrap();
    let place = category.resolve("verdun").unwrap();
    assert_eq!(place.value, "Verdun");
    assert_eq!(place.confidence, 1.0);

    // Model path works against the embedding-backed encoder too.
    let fuzzy = category.resolve("verdn").unwrap();
    assert_eq!(fuzzy.source, LinkSource::Model);
    assert!(fuzzy.confidence > 0.0);
}

#[test]
fn dimension_mismatch_between_artifacts_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    build_category(dir.path(), PlaceKind::City, &["Laval", "Roberval"], false);

    // Drop in an embedding table whose width cannot match the trained
    // classifier (which was trained one-hot).
    let paths = ArtifactPaths::new(dir.path(), PlaceKind::City);
    let vocab = NgramVocab::load(paths.vocab()).unwrap();
    let rows: Vec<Vec<f32>> = (0..vocab.len()).map(|_| vec![0.0f32; 3]).collect();
    rows_to_table(rows).save(paths.embedding()).unwrap();

    let err = artifacts::load_category(dir.path(), PlaceKind::City, &LinkerConfig::default());
    assert!(err.is_err());
}

fn rows_to_table(rows: Vec<Vec<f32>>) -> placelink::EmbeddingTable {
    // EmbeddingTable has no public from_rows; go through safetensors.
    use candle_core::{Device, Tensor};
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.safetensors");
    let (n, d) = (rows.len(), rows[0].len());
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    let tensor = Tensor::from_vec(flat, (n, d), &Device::Cpu).unwrap();
    let mut map = std::collections::HashMap::new();
    map.insert("embedding.weight".to_string(), tensor);
    candle_core::safetensors::save(&map, &path).unwrap();
    placelink::EmbeddingTable::load(&path).unwrap()
}
