//! The mention classifier.
//!
//! A single-hidden-layer feed-forward network: FOFE encoding in, ReLU hidden
//! layer with dropout, log-softmax over the canonical labels out. Trained
//! with (optionally class-weighted) negative log likelihood.
//!
//! Parameters are initialized from a seeded RNG rather than the device RNG:
//! the CPU backend cannot be seeded through candle, and training must be
//! reproducible for a fixed seed.

use crate::error::{Error, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{linear, Dropout, Linear, Module, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Classifier hyperparameters.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Hidden layer width.
    pub hidden_size: usize,
    /// Dropout rate applied after the hidden layer during training.
    pub dropout_rate: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            hidden_size: 1536,
            dropout_rate: 0.5,
        }
    }
}

/// Insert a uniformly initialized variable into `map`, drawn from the
/// caller's seeded RNG. `VarBuilder` lookups then return it instead of
/// running the device-RNG default init.
pub(crate) fn seeded_var(
    map: &VarMap,
    name: &str,
    shape: &[usize],
    bound: f64,
    rng: &mut StdRng,
    device: &Device,
) -> Result<()> {
    let count: usize = shape.iter().product();
    let data: Vec<f32> = (0..count)
        .map(|_| rng.gen_range(-bound..bound) as f32)
        .collect();
    let tensor = Tensor::from_vec(data, shape, device)?;
    map.data()
        .lock()
        .expect("varmap lock poisoned")
        .insert(name.to_string(), Var::from_tensor(&tensor)?);
    Ok(())
}

/// Feed-forward classifier over FOFE-encoded mentions.
pub struct MentionClassifier {
    fc1: Linear,
    fc2: Linear,
    dropout: Dropout,
    input_dim: usize,
    hidden_size: usize,
    n_classes: usize,
}

impl MentionClassifier {
    /// Build a fresh classifier, seeding its parameters into `varmap`
    /// (variables `fc1.*` / `fc2.*`).
    pub fn new(
        varmap: &VarMap,
        device: &Device,
        input_dim: usize,
        n_classes: usize,
        config: &ClassifierConfig,
        seed: u64,
    ) -> Result<Self> {
        let hidden = config.hidden_size;
        let mut rng = StdRng::seed_from_u64(seed);

        let bound1 = 1.0 / (input_dim as f64).sqrt();
        seeded_var(varmap, "fc1.weight", &[hidden, input_dim], bound1, &mut rng, device)?;
        seeded_var(varmap, "fc1.bias", &[hidden], bound1, &mut rng, device)?;
        let bound2 = 1.0 / (hidden as f64).sqrt();
        seeded_var(varmap, "fc2.weight", &[n_classes, hidden], bound2, &mut rng, device)?;
        seeded_var(varmap, "fc2.bias", &[n_classes], bound2, &mut rng, device)?;

        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        let fc1 = linear(input_dim, hidden, vb.pp("fc1"))?;
        let fc2 = linear(hidden, n_classes, vb.pp("fc2"))?;
        Ok(Self {
            fc1,
            fc2,
            dropout: Dropout::new(config.dropout_rate),
            input_dim,
            hidden_size: hidden,
            n_classes,
        })
    }

    /// Load trained weights, inferring layer sizes from the tensor shapes.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        let tensors = candle_core::safetensors::load(path, device)
            .map_err(|e| Error::artifact(format!("read model {}: {e}", path.display())))?;
        let get = |name: &str| {
            tensors
                .get(name)
                .cloned()
                .ok_or_else(|| Error::artifact(format!("{}: missing tensor {name}", path.display())))
        };

        let fc1_weight = get("fc1.weight")?;
        let fc1_bias = get("fc1.bias")?;
        let fc2_weight = get("fc2.weight")?;
        let fc2_bias = get("fc2.bias")?;

        let (hidden_size, input_dim) = fc1_weight.dims2()?;
        let n_classes = fc2_bias.dims1()?;
        let (fc2_out, fc2_in) = fc2_weight.dims2()?;
        if fc2_in != hidden_size || fc2_out != n_classes || fc1_bias.dims1()? != hidden_size {
            return Err(Error::config(format!(
                "{}: inconsistent layer shapes (fc1 {hidden_size}x{input_dim}, fc2 {fc2_out}x{fc2_in})",
                path.display()
            )));
        }

        Ok(Self {
            fc1: Linear::new(fc1_weight, Some(fc1_bias)),
            fc2: Linear::new(fc2_weight, Some(fc2_bias)),
            // Dropout is inert at inference; the rate only matters in train mode.
            dropout: Dropout::new(0.25),
            input_dim,
            hidden_size,
            n_classes,
        })
    }

    /// Expected input dimension (the FOFE encoding width).
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Hidden layer width.
    #[must_use]
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Number of output classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Forward pass. `xs` is `[batch, input_dim]`; returns per-class log
    /// probabilities `[batch, n_classes]`. Dropout is active only when
    /// `train` is set.
    pub fn forward(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.fc1.forward(xs)?.relu()?;
        let h = self.dropout.forward(&h, train)?;
        let logits = self.fc2.forward(&h)?;
        Ok(candle_nn::ops::log_softmax(&logits, D::Minus1)?)
    }
}

/// Negative log likelihood over log probabilities, optionally weighted per
/// class to counter class imbalance.
///
/// With weights, the loss is `Σ w[y_i] · (-log p_i) / Σ w[y_i]`, matching
/// the weighted-mean semantics the class-weight array is computed for.
pub fn nll_loss(log_probs: &Tensor, targets: &Tensor, class_weights: Option<&Tensor>) -> Result<Tensor> {
    let batch = targets.dims1()?;
    let picked = log_probs
        .gather(&targets.unsqueeze(1)?, 1)?
        .squeeze(1)?;
    match class_weights {
        None => Ok((picked.sum_all()? / -(batch as f64))?),
        Some(weights) => {
            let w = weights.index_select(targets, 0)?;
            let weighted = (&picked * &w)?.sum_all()?;
            let total = w.sum_all()?;
            Ok((weighted.neg()? / &total)?)
        }
    }
}
