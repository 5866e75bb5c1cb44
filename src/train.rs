//! Classifier training and evaluation loop.
//!
//! Mini-batch optimization of the mention classifier with class-weighted
//! negative log likelihood, per-epoch validation (loss, accuracy, macro-F1),
//! step learning-rate decay, early stopping, and a checkpoint policy that
//! only persists weights beating both the best validation loss and a quality
//! floor, so a weak model never replaces a good one. If no epoch clears the
//! floor, the final weights are persisted so an artifact always exists.
//!
//! Batches are FOFE-encoded on the fly rather than materialized up front;
//! with the one-hot fallback the feature width is the whole vocabulary, and
//! a fully expanded corpus would not fit in memory otherwise.

use crate::dataset::LabelBundle;
use crate::embedding::{EmbeddingTable, Vectorizer};
use crate::error::{Error, Result};
use crate::fofe::Fofe;
use crate::metrics::{accuracy, macro_f1, misclassifications, EvalMetrics};
use crate::model::{nll_loss, ClassifierConfig, MentionClassifier};
use crate::types::TrainingSample;
use crate::vocab::NgramVocab;
use candle_core::{Device, Tensor, D};
use candle_nn::{Optimizer, VarMap};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;

/// Training-loop settings.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Initial AdamW learning rate.
    pub learning_rate: f64,
    /// Fraction of samples used for training; the rest validate.
    pub train_fraction: f64,
    /// Multiplicative learning-rate decay factor.
    pub lr_decay: f64,
    /// Apply the decay every this many epochs (0 disables), after warm-up.
    pub lr_decay_every: usize,
    /// Stop after this many epochs without validation-loss improvement
    /// (0 disables early stopping).
    pub patience: usize,
    /// Validation accuracy a checkpoint must exceed to be persisted.
    pub quality_floor: f64,
    /// Seed for the split, batch shuffling, and parameter initialization.
    pub seed: u64,
    /// FOFE forgetting factor.
    pub forgetting_factor: f32,
    /// Maximum n-gram tokens per mention; longer sequences are truncated.
    pub max_tokens: usize,
    /// Classifier shape.
    pub classifier: ClassifierConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 64,
            learning_rate: 5e-4,
            train_fraction: 0.95,
            lr_decay: 0.20,
            lr_decay_every: 10,
            patience: 50,
            quality_floor: 0.97,
            seed: 999,
            forgetting_factor: 0.95,
            max_tokens: 50,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// A validation mention the model got wrong, resolved to label strings.
#[derive(Debug, Clone)]
pub struct MisclassifiedMention {
    /// The mention text.
    pub mention: String,
    /// The label it should have received.
    pub truth: String,
    /// The label it received instead.
    pub predicted: String,
}

/// Summary of a training run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// Epochs actually run (early stopping may cut the schedule short).
    pub epochs_run: usize,
    /// Epoch with the best validation loss.
    pub best_epoch: usize,
    /// Best validation loss observed.
    pub best_val_loss: f64,
    /// Validation metrics of the final epoch.
    pub final_metrics: EvalMetrics,
    /// Whether any checkpoint cleared the quality floor.
    pub checkpointed: bool,
    /// Misclassified validation mentions from the last collection pass.
    pub misclassified: Vec<MisclassifiedMention>,
}

/// Encodes sample batches on demand: n-gram indices, token vectors, FOFE.
struct BatchEncoder<'a> {
    samples: &'a [TrainingSample],
    vocab: &'a NgramVocab,
    vectorizer: Vectorizer<'a>,
    fofe: Fofe,
    device: Device,
}

impl BatchEncoder<'_> {
    fn dim(&self) -> usize {
        self.vectorizer.dim()
    }

    /// FOFE-encoded features for the samples at `idx`, `[len, dim]`.
    fn features(&self, idx: &[usize]) -> Result<Tensor> {
        let dim = self.dim();
        let mut flat = Vec::with_capacity(idx.len() * dim);
        for &i in idx {
            let indexes = self.vocab.ngram_indexes(&self.samples[i].mention);
            let vectors = self.vectorizer.vectors(&indexes);
            flat.extend(self.fofe.encode(&vectors, dim)?);
        }
        Ok(Tensor::from_vec(flat, (idx.len(), dim), &self.device)?)
    }

    /// Label indices for the samples at `idx`, `[len]`.
    fn targets(&self, idx: &[usize]) -> Result<Tensor> {
        let picked: Vec<u32> = idx.iter().map(|&i| self.samples[i].label as u32).collect();
        Ok(Tensor::from_vec(picked, idx.len(), &self.device)?)
    }
}

/// Train the classifier on a generated dataset and persist its weights to
/// `model_out`.
pub fn train(
    samples: &[TrainingSample],
    bundle: &LabelBundle,
    vocab: &NgramVocab,
    embedding: Option<&EmbeddingTable>,
    config: &TrainConfig,
    model_out: impl AsRef<Path>,
) -> Result<TrainReport> {
    if samples.is_empty() {
        return Err(Error::training("no training samples"));
    }
    let n_classes = bundle.labels.len();

    let device = Device::Cpu;
    let encoder = BatchEncoder {
        samples,
        vocab,
        vectorizer: match embedding {
            Some(table) => Vectorizer::Table(table),
            None => Vectorizer::OneHot(vocab.len()),
        },
        fofe: Fofe::with_max_order(config.forgetting_factor, config.max_tokens)?,
        device: device.clone(),
    };
    let input_dim = encoder.dim();

    // Seeded split; validation gets whatever the train fraction leaves.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.shuffle(&mut rng);
    let train_size = ((samples.len() as f64) * config.train_fraction).round() as usize;
    let train_size = train_size.clamp(1, samples.len());
    let (train_idx, val_idx) = order.split_at(train_size);
    let val_idx: Vec<usize> = if val_idx.is_empty() {
        log::warn!("validation split is empty, validating on the training set");
        train_idx.to_vec()
    } else {
        val_idx.to_vec()
    };
    let mut train_idx = train_idx.to_vec();

    let varmap = VarMap::new();
    let model = MentionClassifier::new(
        &varmap,
        &device,
        input_dim,
        n_classes,
        &config.classifier,
        config.seed,
    )?;

    let class_weights = Tensor::from_vec(bundle.class_weights.clone(), n_classes, &device)?;
    let mut learning_rate = config.learning_rate;
    let mut optimizer = candle_nn::AdamW::new(
        varmap.all_vars(),
        candle_nn::ParamsAdamW {
            lr: learning_rate,
            ..Default::default()
        },
    )?;

    log::info!(
        "training classifier: {} samples ({} train / {} val), {} classes, input dim {}",
        samples.len(),
        train_idx.len(),
        val_idx.len(),
        n_classes,
        input_dim
    );

    let mut best_val_loss = f64::INFINITY;
    let mut best_epoch = 0usize;
    let mut checkpointed = false;
    let mut misclassified = Vec::new();
    let mut epochs_run = 0usize;
    let mut final_metrics = EvalMetrics {
        loss: f64::INFINITY,
        accuracy: 0.0,
        macro_f1: 0.0,
    };

    for epoch in 0..config.epochs {
        epochs_run = epoch + 1;
        train_idx.shuffle(&mut rng);

        let mut train_loss = 0.0f64;
        for chunk in train_idx.chunks(config.batch_size) {
            let xs = encoder.features(chunk)?;
            let ys = encoder.targets(chunk)?;
            let log_probs = model.forward(&xs, true)?;
            let loss = nll_loss(&log_probs, &ys, Some(&class_weights))?;
            optimizer.backward_step(&loss)?;
            train_loss += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
        }
        train_loss /= train_idx.len() as f64;

        let (metrics, val_predictions) = evaluate_subset(
            &model,
            &encoder,
            &val_idx,
            Some(&class_weights),
            config.batch_size,
            n_classes,
        )?;
        final_metrics = metrics;

        log::info!(
            "epoch {}/{}: train_loss {:.4}, val_loss {:.4}, val_acc {:.4}, val_f1 {:.4}",
            epoch + 1,
            config.epochs,
            train_loss,
            metrics.loss,
            metrics.accuracy,
            metrics.macro_f1
        );

        // Step decay after the warm-up epoch.
        if config.lr_decay_every > 0 && epoch > 0 && epoch % config.lr_decay_every == 0 {
            learning_rate *= config.lr_decay;
            optimizer.set_learning_rate(learning_rate);
            log::info!("learning rate decayed to {learning_rate:.6}");
        }

        let improved = metrics.loss < best_val_loss;
        let last_epoch = epoch + 1 == config.epochs;
        if improved {
            best_val_loss = metrics.loss;
            best_epoch = epoch;
            if metrics.accuracy > config.quality_floor {
                varmap.save(model_out.as_ref())?;
                checkpointed = true;
                misclassified = resolve_misclassified(samples, bundle, &val_idx, &val_predictions);
                log::info!(
                    "checkpoint saved at epoch {} (val_acc {:.4})",
                    epoch + 1,
                    metrics.accuracy
                );
            }
        }
        if last_epoch {
            misclassified = resolve_misclassified(samples, bundle, &val_idx, &val_predictions);
        }

        if config.patience > 0 && epoch.saturating_sub(best_epoch) > config.patience {
            log::info!(
                "early stop at epoch {}: best val_loss {:.4} from epoch {}",
                epoch + 1,
                best_val_loss,
                best_epoch + 1
            );
            break;
        }
    }

    if !checkpointed {
        // Nothing cleared the quality floor; ship the final weights anyway.
        varmap.save(model_out.as_ref())?;
        log::warn!(
            "no epoch passed the quality floor {:.2}; persisted final weights",
            config.quality_floor
        );
    }

    for bad in &misclassified {
        log::info!(
            "misclassified: {:?} ({}) -> {}",
            bad.mention,
            bad.truth,
            bad.predicted
        );
    }

    Ok(TrainReport {
        epochs_run,
        best_epoch,
        best_val_loss,
        final_metrics,
        checkpointed,
        misclassified,
    })
}

/// Evaluate a trained classifier on a held-out sample set.
pub fn evaluate(
    model: &MentionClassifier,
    samples: &[TrainingSample],
    bundle: &LabelBundle,
    vocab: &NgramVocab,
    embedding: Option<&EmbeddingTable>,
    config: &TrainConfig,
) -> Result<(EvalMetrics, Vec<MisclassifiedMention>)> {
    if samples.is_empty() {
        return Err(Error::invalid_input("no samples to evaluate"));
    }
    let encoder = BatchEncoder {
        samples,
        vocab,
        vectorizer: match embedding {
            Some(table) => Vectorizer::Table(table),
            None => Vectorizer::OneHot(vocab.len()),
        },
        fofe: Fofe::with_max_order(config.forgetting_factor, config.max_tokens)?,
        device: Device::Cpu,
    };
    let idx: Vec<usize> = (0..samples.len()).collect();

    let (metrics, predictions) = evaluate_subset(
        model,
        &encoder,
        &idx,
        None,
        config.batch_size,
        bundle.labels.len(),
    )?;
    let bad = resolve_misclassified(samples, bundle, &idx, &predictions);
    Ok((metrics, bad))
}

fn evaluate_subset(
    model: &MentionClassifier,
    encoder: &BatchEncoder<'_>,
    idx: &[usize],
    class_weights: Option<&Tensor>,
    batch_size: usize,
    n_classes: usize,
) -> Result<(EvalMetrics, Vec<u32>)> {
    let mut loss_sum = 0.0f64;
    let mut truth = Vec::with_capacity(idx.len());
    let mut predictions = Vec::with_capacity(idx.len());

    for chunk in idx.chunks(batch_size) {
        let xs = encoder.features(chunk)?;
        let ys = encoder.targets(chunk)?;
        let log_probs = model.forward(&xs, false)?;
        let loss = nll_loss(&log_probs, &ys, class_weights)?;
        loss_sum += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;

        let batch_pred = log_probs.argmax(D::Minus1)?.to_vec1::<u32>()?;
        predictions.extend(batch_pred);
        truth.extend(chunk.iter().map(|&i| encoder.samples[i].label as u32));
    }

    let metrics = EvalMetrics {
        loss: loss_sum / idx.len() as f64,
        accuracy: accuracy(&truth, &predictions),
        macro_f1: macro_f1(&truth, &predictions, n_classes),
    };
    Ok((metrics, predictions))
}

fn resolve_misclassified(
    samples: &[TrainingSample],
    bundle: &LabelBundle,
    idx: &[usize],
    predictions: &[u32],
) -> Vec<MisclassifiedMention> {
    let truth: Vec<u32> = idx.iter().map(|&i| samples[i].label as u32).collect();
    misclassifications(&truth, predictions)
        .into_iter()
        .map(|m| {
            let sample = &samples[idx[m.index]];
            MisclassifiedMention {
                mention: sample.mention.clone(),
                truth: bundle.labels[m.truth].clone(),
                predicted: bundle.labels[m.predicted].clone(),
            }
        })
        .collect()
}
