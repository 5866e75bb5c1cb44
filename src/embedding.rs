//! N-gram embedding pretraining.
//!
//! A small feed-forward next-token language model is trained over the n-gram
//! stream of the generated mention corpus: the two preceding tokens predict
//! the next one through an embedding layer, a hidden ReLU layer, and a
//! log-softmax output over the vocabulary, minimizing negative log
//! likelihood with AdamW for a fixed number of epochs.
//!
//! Only the embedding layer survives training: its weight table is extracted
//! into an immutable [`EmbeddingTable`] and never updated again; classifier
//! training sees it as frozen input features. When no table is supplied
//! downstream, a one-hot [`Vectorizer`] stands in.

use crate::error::{Error, Result};
use crate::model::seeded_var;
use crate::vocab::{NgramVocab, MASK_CHAR};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{embedding, linear, Embedding, Linear, Module, Optimizer, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::Path;

/// Hyperparameters for embedding pretraining.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Dimension of each n-gram vector.
    pub dim: usize,
    /// Hidden layer width of the language model.
    pub hidden_size: usize,
    /// Number of preceding tokens used as context.
    pub context_size: usize,
    /// AdamW learning rate.
    pub learning_rate: f64,
    /// Number of passes over the token stream.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// RNG seed for parameter initialization.
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: 32,
            hidden_size: 128,
            context_size: 2,
            learning_rate: 1e-4,
            epochs: 15,
            batch_size: 64,
            seed: 999,
        }
    }
}

/// A frozen per-n-gram dense vector table.
///
/// Produced once by [`pretrain`] (or loaded from disk) and injected into the
/// dataset pipeline and the linker; immutable after creation.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    vocab_size: usize,
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingTable {
    fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let vocab_size = rows.len();
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        if vocab_size == 0 || dim == 0 {
            return Err(Error::artifact("embedding table is empty"));
        }
        let mut data = Vec::with_capacity(vocab_size * dim);
        for row in rows {
            if row.len() != dim {
                return Err(Error::artifact("embedding table rows differ in width"));
            }
            data.extend(row);
        }
        Ok(Self {
            vocab_size,
            dim,
            data,
        })
    }

    /// Number of rows (one per vocabulary index).
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Vector dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The vector for a vocabulary index. Out-of-range indices fall back to
    /// the OOV row, mirroring the tokenizer's OOV behavior.
    #[must_use]
    pub fn row(&self, index: usize) -> &[f32] {
        let index = if index < self.vocab_size { index } else { 0 };
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// Persist as a safetensors file with a single `embedding.weight` tensor.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let tensor = Tensor::from_vec(
            self.data.clone(),
            (self.vocab_size, self.dim),
            &Device::Cpu,
        )?;
        let mut tensors = HashMap::new();
        tensors.insert("embedding.weight".to_string(), tensor);
        candle_core::safetensors::save(&tensors, path.as_ref())
            .map_err(|e| Error::artifact(format!("save embedding table: {e}")))?;
        Ok(())
    }

    /// Load a table saved by [`EmbeddingTable::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)
            .map_err(|e| Error::artifact(format!("read embedding {}: {e}", path.display())))?;
        let tensor = tensors
            .get("embedding.weight")
            .ok_or_else(|| Error::artifact(format!("{}: missing embedding.weight", path.display())))?;
        let rows = tensor.to_vec2::<f32>()?;
        Self::from_rows(rows)
    }
}

/// Maps vocabulary index sequences to dense token vectors.
///
/// Either the pretrained embedding table, or a one-hot fallback over the
/// full vocabulary when no table is supplied.
#[derive(Debug, Clone)]
pub enum Vectorizer<'a> {
    /// One-hot vectors of width `vocab_size`.
    OneHot(usize),
    /// Rows of a frozen embedding table.
    Table(&'a EmbeddingTable),
}

impl Vectorizer<'_> {
    /// The produced vector dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            Vectorizer::OneHot(size) => *size,
            Vectorizer::Table(table) => table.dim(),
        }
    }

    /// Convert a vocabulary index sequence into token vectors.
    #[must_use]
    pub fn vectors(&self, indexes: &[usize]) -> Vec<Vec<f32>> {
        match self {
            Vectorizer::OneHot(size) => indexes
                .iter()
                .map(|&i| {
                    let mut v = vec![0.0f32; *size];
                    v[if i < *size { i } else { 0 }] = 1.0;
                    v
                })
                .collect(),
            Vectorizer::Table(table) => {
                indexes.iter().map(|&i| table.row(i).to_vec()).collect()
            }
        }
    }
}

/// The next-token language model used only during pretraining.
struct NextTokenLm {
    embedding: Embedding,
    hidden: Linear,
    out: Linear,
    context_size: usize,
    dim: usize,
}

impl NextTokenLm {
    /// Build the language model, seeding every parameter into `varmap` from
    /// the configured RNG seed so pretraining is reproducible.
    fn new(
        varmap: &VarMap,
        device: &Device,
        vocab_size: usize,
        config: &EmbeddingConfig,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let context_dim = config.context_size * config.dim;

        seeded_var(varmap, "embedding.weight", &[vocab_size, config.dim], 1.0, &mut rng, device)?;
        let bound_h = 1.0 / (context_dim as f64).sqrt();
        seeded_var(varmap, "hidden.weight", &[config.hidden_size, context_dim], bound_h, &mut rng, device)?;
        seeded_var(varmap, "hidden.bias", &[config.hidden_size], bound_h, &mut rng, device)?;
        let bound_o = 1.0 / (config.hidden_size as f64).sqrt();
        seeded_var(varmap, "out.weight", &[vocab_size, config.hidden_size], bound_o, &mut rng, device)?;
        seeded_var(varmap, "out.bias", &[vocab_size], bound_o, &mut rng, device)?;

        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let embedding = embedding(vocab_size, config.dim, vb.pp("embedding"))?;
        let hidden = linear(context_dim, config.hidden_size, vb.pp("hidden"))?;
        let out = linear(config.hidden_size, vocab_size, vb.pp("out"))?;
        Ok(Self {
            embedding,
            hidden,
            out,
            context_size: config.context_size,
            dim: config.dim,
        })
    }

    /// `contexts` is `[batch, context_size]` of token indices; returns log
    /// probabilities over the vocabulary, `[batch, vocab_size]`.
    fn forward(&self, contexts: &Tensor) -> candle_core::Result<Tensor> {
        let embeds = self.embedding.forward(contexts)?;
        let batch = embeds.dim(0)?;
        let flat = embeds.reshape((batch, self.context_size * self.dim))?;
        let h = self.hidden.forward(&flat)?.relu()?;
        let logits = self.out.forward(&h)?;
        candle_nn::ops::log_softmax(&logits, D::Minus1)
    }
}

/// Train the next-token language model and extract the embedding table.
///
/// The token stream is the concatenated n-gram tokenization of every mention
/// in `mentions`, skipping mentions that contain the masking character:
/// masked variants exist to teach the classifier OOV tolerance, not to shape
/// the embedding space. Deterministic for a fixed corpus, vocabulary,
/// configuration, and seed.
pub fn pretrain(
    vocab: &NgramVocab,
    mentions: &[String],
    config: &EmbeddingConfig,
) -> Result<EmbeddingTable> {
    let stream: Vec<u32> = mentions
        .iter()
        .filter(|m| !m.contains(MASK_CHAR))
        .flat_map(|m| vocab.ngram_indexes(m))
        .map(|i| i as u32)
        .collect();

    let window = config.context_size + 1;
    if stream.len() < window {
        return Err(Error::training(format!(
            "token stream too short for context size {}: {} tokens",
            config.context_size,
            stream.len()
        )));
    }

    let device = Device::Cpu;
    let varmap = VarMap::new();
    let model = NextTokenLm::new(&varmap, &device, vocab.len(), config)?;
    let mut optimizer = candle_nn::AdamW::new(
        varmap.all_vars(),
        candle_nn::ParamsAdamW {
            lr: config.learning_rate,
            ..Default::default()
        },
    )?;

    // (context window, target) pairs over the full stream, including windows
    // crossing mention boundaries.
    let examples: Vec<(&[u32], u32)> = stream
        .windows(window)
        .map(|w| (&w[..config.context_size], w[config.context_size]))
        .collect();

    log::info!(
        "pretraining embedding: {} tokens, {} examples, {} epochs",
        stream.len(),
        examples.len(),
        config.epochs
    );

    for epoch in 0..config.epochs {
        let mut total_loss = 0.0f64;
        for chunk in examples.chunks(config.batch_size) {
            let batch = chunk.len();
            let contexts: Vec<u32> = chunk.iter().flat_map(|(c, _)| c.iter().copied()).collect();
            let targets: Vec<u32> = chunk.iter().map(|(_, t)| *t).collect();

            let contexts = Tensor::from_vec(contexts, (batch, config.context_size), &device)?;
            let targets = Tensor::from_vec(targets, batch, &device)?;

            let log_probs = model.forward(&contexts)?;
            let loss = candle_nn::loss::nll(&log_probs, &targets)?;
            optimizer.backward_step(&loss)?;
            total_loss += loss.to_scalar::<f32>()? as f64 * batch as f64;
        }
        log::info!(
            "embedding epoch {}/{}: loss {:.4}",
            epoch + 1,
            config.epochs,
            total_loss / examples.len() as f64
        );
    }

    let weights = model.embedding.embeddings().detach().to_vec2::<f32>()?;
    EmbeddingTable::from_rows(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_vectorizer_dimensions() {
        let v = Vectorizer::OneHot(4);
        assert_eq!(v.dim(), 4);
        let rows = v.vectors(&[0, 2]);
        assert_eq!(rows, vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 1.0, 0.0]]);
    }

    #[test]
    fn out_of_range_index_falls_back_to_oov_row() {
        let table = EmbeddingTable::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(table.row(7), table.row(0));
    }

    #[test]
    fn table_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embedding.safetensors");
        let table =
            EmbeddingTable::from_rows(vec![vec![0.5, -1.0, 2.0], vec![1.5, 0.0, -0.25]]).unwrap();
        table.save(&path).unwrap();
        let loaded = EmbeddingTable::load(&path).unwrap();
        assert_eq!(loaded.vocab_size(), 2);
        assert_eq!(loaded.dim(), 3);
        assert_eq!(loaded.row(1), table.row(1));
    }

    #[test]
    fn pretrain_produces_table_of_vocab_size() {
        let corpus = vec!["verdun".to_string(), "pie ix".to_string()];
        let vocab = NgramVocab::build(2, &corpus).unwrap();
        let config = EmbeddingConfig {
            epochs: 1,
            dim: 4,
            hidden_size: 8,
            ..Default::default()
        };
        let table = pretrain(&vocab, &corpus, &config).unwrap();
        assert_eq!(table.vocab_size(), vocab.len());
        assert_eq!(table.dim(), 4);
    }

    #[test]
    fn pretrain_is_deterministic_for_fixed_seed() {
        let corpus = vec!["verdun".to_string(), "jarry".to_string()];
        let vocab = NgramVocab::build(2, &corpus).unwrap();
        let config = EmbeddingConfig {
            epochs: 2,
            dim: 4,
            hidden_size: 8,
            ..Default::default()
        };
        let a = pretrain(&vocab, &corpus, &config).unwrap();
        let b = pretrain(&vocab, &corpus, &config).unwrap();
        assert_eq!(a.row(1), b.row(1));
    }
}
