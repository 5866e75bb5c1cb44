//! # placelink
//!
//! Entity linking for short, noisy place-name mentions.
//!
//! Given a mention extracted from user input ("st-laurent", "jary",
//! "ville de lavale"), placelink resolves it to a canonical name known to a
//! downstream knowledge base (a city, a transit station, or a district),
//! together with a confidence score.
//!
//! ## Pipeline
//!
//! ```text
//! mention ──► normalize ──► exact dictionary ──► hit: confidence 1.0
//!                               │
//!                               ▼ miss
//!                 n-gram hashing ──► FOFE encoding ──► classifier
//!                               │
//!                               ▼
//!                 cross-category disambiguation ──► LinkingResult
//! ```
//!
//! - **Normalizer**: one deterministic canonicalization path (case,
//!   diacritics, punctuation, `st`/`ste` expansion) shared by every
//!   component.
//! - **Vocabulary**: character n-grams hashed to indices, with an
//!   out-of-vocabulary sentinel at index 0.
//! - **FOFE**: fixed-size ordinally-forgetting encoding collapses any
//!   token sequence into one vector, order-sensitively.
//! - **Embedding**: per-n-gram dense vectors pretrained by a small
//!   next-token language model, frozen for downstream use (one-hot fallback
//!   available).
//! - **Classifier**: a single-hidden-layer network over the encoding,
//!   trained on a synthetic dataset expanded from the canonical label list.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use placelink::{artifacts, LinkerConfig, Mention, PlaceKind};
//!
//! let linker = artifacts::load_linker("./artifacts", LinkerConfig::default())?;
//! let mention = Mention::new("st-laurent", 26, 36, PlaceKind::Station);
//! let result = linker.link("charging points near metro st-laurent", &mention)?;
//! println!("{:?}", result.selected());
//! ```
//!
//! ## Offline training
//!
//! Artifacts are rebuilt per category from a one-label-per-row corpus file,
//! gated by a content digest so unchanged corpora never retrain:
//!
//! ```text
//! placelink gen      --kind station --corpus stations.csv --artifacts ./artifacts
//! placelink pretrain --kind station --artifacts ./artifacts
//! placelink train    --kind station --artifacts ./artifacts
//! placelink link     --artifacts ./artifacts --kind station "st laurent"
//! ```
//!
//! Serving is read-only: artifacts load once, `link()` is reentrant and
//! safely concurrent, and a failed retrain never disturbs what is being
//! served.

#![warn(missing_docs)]

pub mod artifacts;
pub mod augment;
pub mod dataset;
pub mod embedding;
mod error;
pub mod fofe;
pub mod link;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod train;
mod types;
pub mod vocab;

pub use dataset::{GeneratedDataset, GeneratorConfig, LabelBundle};
pub use embedding::{EmbeddingConfig, EmbeddingTable, Vectorizer};
pub use error::{Error, Result};
pub use fofe::Fofe;
pub use link::{disambiguate, CategoryLinker, Linker, LinkerConfig};
pub use model::{ClassifierConfig, MentionClassifier};
pub use normalize::normalize;
pub use train::{TrainConfig, TrainReport};
pub use types::{LinkSource, LinkedPlace, LinkingResult, Mention, PlaceKind, TrainingSample};
pub use vocab::NgramVocab;
