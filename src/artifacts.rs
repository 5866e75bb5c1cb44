//! Artifact layout, corpus digests, and retrain gating.
//!
//! Every category owns five files under one artifact directory, named by the
//! category identifier:
//!
//! ```text
//! {kind}_vocab.json            ordered n-gram token list
//! {kind}_embedding.safetensors frozen embedding table (optional)
//! {kind}_model.safetensors     classifier weights
//! {kind}_labels.json           labels, label->index, class weights
//! {kind}_training_set.csv      generated (mention, label) rows
//! ```
//!
//! Retraining is gated by a SHA-256 digest of the corpus file cached next to
//! it: the training command runs only when the digest differs, and the
//! digest is updated only on a zero exit status, so a failed retrain leaves
//! both the digest and the served artifacts untouched.

use crate::dataset::LabelBundle;
use crate::embedding::EmbeddingTable;
use crate::error::{Error, Result};
use crate::link::{CategoryLinker, Linker, LinkerConfig};
use crate::model::MentionClassifier;
use crate::types::PlaceKind;
use crate::vocab::NgramVocab;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;

/// File locations for one category's artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    dir: PathBuf,
    kind: PlaceKind,
}

impl ArtifactPaths {
    /// Artifact paths for `kind` under `dir`.
    pub fn new(dir: impl Into<PathBuf>, kind: PlaceKind) -> Self {
        Self {
            dir: dir.into(),
            kind,
        }
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{suffix}", self.kind.as_str()))
    }

    /// Serialized vocabulary.
    #[must_use]
    pub fn vocab(&self) -> PathBuf {
        self.file("vocab.json")
    }

    /// Frozen embedding table.
    #[must_use]
    pub fn embedding(&self) -> PathBuf {
        self.file("embedding.safetensors")
    }

    /// Classifier weights.
    #[must_use]
    pub fn model(&self) -> PathBuf {
        self.file("model.safetensors")
    }

    /// Label bundle.
    #[must_use]
    pub fn labels(&self) -> PathBuf {
        self.file("labels.json")
    }

    /// Generated training set.
    #[must_use]
    pub fn training_set(&self) -> PathBuf {
        self.file("training_set.csv")
    }
}

/// Load one category's artifacts into a [`CategoryLinker`].
///
/// The vocabulary, classifier, and label bundle are required: serving
/// cannot start without them. The embedding table is optional; without it
/// the category runs in one-hot mode.
pub fn load_category(
    dir: impl AsRef<Path>,
    kind: PlaceKind,
    config: &LinkerConfig,
) -> Result<CategoryLinker> {
    let paths = ArtifactPaths::new(dir.as_ref(), kind);

    let vocab = NgramVocab::load(paths.vocab())?;
    let bundle = LabelBundle::load(paths.labels())?;
    let model = MentionClassifier::load(paths.model(), &candle_core::Device::Cpu)?;
    let embedding = if paths.embedding().exists() {
        Some(EmbeddingTable::load(paths.embedding())?)
    } else {
        log::info!("{kind}: no embedding table, running one-hot");
        None
    };

    CategoryLinker::new(kind, vocab, embedding, model, bundle, config)
}

/// Load every category under `dir` into a serving [`Linker`].
///
/// All three categories must be present; a missing artifact is fatal.
pub fn load_linker(dir: impl AsRef<Path>, config: LinkerConfig) -> Result<Linker> {
    let mut categories = Vec::new();
    for kind in PlaceKind::ALL {
        categories.push(load_category(dir.as_ref(), kind, &config)?);
    }
    Linker::new(categories, config)
}

// =============================================================================
// Corpus digest
// =============================================================================

/// Hex SHA-256 of a file's contents.
pub fn file_digest(path: impl AsRef<Path>) -> Result<String> {
    let bytes = std::fs::read(path.as_ref())?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Where a corpus file's cached digest lives.
#[must_use]
pub fn digest_path(corpus: &Path) -> PathBuf {
    let mut name = corpus.as_os_str().to_os_string();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Whether a corpus changed since the digest was last saved.
///
/// A missing corpus is reported and treated as unchanged (nothing to train
/// on); a missing digest means the corpus was never trained.
pub fn corpus_changed(corpus: impl AsRef<Path>) -> Result<bool> {
    let corpus = corpus.as_ref();
    if !corpus.exists() {
        log::error!("corpus {} does not exist", corpus.display());
        return Ok(false);
    }
    let cached = digest_path(corpus);
    if !cached.exists() {
        return Ok(true);
    }
    let saved = std::fs::read_to_string(&cached)?;
    Ok(file_digest(corpus)? != saved.trim())
}

/// Cache the corpus digest after a successful retrain.
pub fn save_digest(corpus: impl AsRef<Path>) -> Result<()> {
    let corpus = corpus.as_ref();
    std::fs::write(digest_path(corpus), file_digest(corpus)?)?;
    Ok(())
}

// =============================================================================
// Retraining
// =============================================================================

/// Outcome of a retrain invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrainOutcome {
    /// The corpus digest matched; nothing to do.
    Unchanged,
    /// The training command exited zero; the digest was updated.
    Retrained,
}

/// One category's retraining job: the corpus that gates it and the command
/// that rebuilds its artifacts.
#[derive(Debug, Clone)]
pub struct RetrainJob {
    /// Category being retrained.
    pub kind: PlaceKind,
    /// Corpus file whose digest gates the run.
    pub corpus: PathBuf,
    /// Program and arguments to execute.
    pub command: Vec<String>,
}

/// Run a retraining job as a subprocess, gated by the corpus digest.
///
/// Exit status zero updates the digest; anything else surfaces as
/// [`Error::Retrain`] with the digest left unchanged, so serving continues
/// on the previous artifacts.
pub fn retrain(job: &RetrainJob) -> Result<RetrainOutcome> {
    if !corpus_changed(&job.corpus)? {
        log::info!(
            "{}: corpus {} unchanged, no retrain needed",
            job.kind,
            job.corpus.display()
        );
        return Ok(RetrainOutcome::Unchanged);
    }

    let (program, args) = job
        .command
        .split_first()
        .ok_or_else(|| Error::invalid_input("empty retrain command"))?;
    log::info!("{}: retraining via {:?}", job.kind, job.command);

    let status = Command::new(program).args(args).status()?;
    if status.success() {
        save_digest(&job.corpus)?;
        Ok(RetrainOutcome::Retrained)
    } else {
        log::error!(
            "{}: retrain command exited with {:?}",
            job.kind,
            status.code()
        );
        Err(Error::retrain(format!(
            "{} training command exited with {:?}",
            job.kind,
            status.code()
        )))
    }
}
