//! Classification metrics for the training loop.

/// Loss and quality figures for one evaluation pass.
#[derive(Debug, Clone, Copy)]
pub struct EvalMetrics {
    /// Mean (weighted) negative log likelihood.
    pub loss: f64,
    /// Fraction of correctly classified samples.
    pub accuracy: f64,
    /// Unweighted mean of per-class F1 scores.
    pub macro_f1: f64,
}

/// A validation sample the model got wrong.
#[derive(Debug, Clone, Copy)]
pub struct Misclassification {
    /// Index of the sample within the evaluated subset.
    pub index: usize,
    /// True label index.
    pub truth: usize,
    /// Predicted label index.
    pub predicted: usize,
}

/// Fraction of positions where `predicted` matches `truth`.
#[must_use]
pub fn accuracy(truth: &[u32], predicted: &[u32]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / truth.len() as f64
}

/// Macro-averaged F1 over the classes present in either `truth` or
/// `predicted`, which keeps the score meaningful when only a subset of the
/// label universe appears in a validation split.
#[must_use]
pub fn macro_f1(truth: &[u32], predicted: &[u32], n_classes: usize) -> f64 {
    let mut tp = vec![0usize; n_classes];
    let mut fp = vec![0usize; n_classes];
    let mut fn_ = vec![0usize; n_classes];

    for (&t, &p) in truth.iter().zip(predicted) {
        let (t, p) = (t as usize, p as usize);
        if t == p {
            tp[t] += 1;
        } else {
            fp[p] += 1;
            fn_[t] += 1;
        }
    }

    let mut f1_sum = 0.0;
    let mut present = 0usize;
    for c in 0..n_classes {
        if tp[c] + fp[c] + fn_[c] == 0 {
            continue;
        }
        present += 1;
        let denominator = 2 * tp[c] + fp[c] + fn_[c];
        if denominator > 0 {
            f1_sum += (2 * tp[c]) as f64 / denominator as f64;
        }
    }

    if present == 0 {
        0.0
    } else {
        f1_sum / present as f64
    }
}

/// Indexes where truth and prediction disagree, with both labels.
#[must_use]
pub fn misclassifications(truth: &[u32], predicted: &[u32]) -> Vec<Misclassification> {
    truth
        .iter()
        .zip(predicted)
        .enumerate()
        .filter(|(_, (t, p))| t != p)
        .map(|(index, (&t, &p))| Misclassification {
            index,
            truth: t as usize,
            predicted: p as usize,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_counts_matches() {
        assert_eq!(accuracy(&[0, 1, 2, 1], &[0, 1, 1, 1]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn perfect_predictions_score_one() {
        let truth = [0u32, 1, 2, 2];
        assert!((macro_f1(&truth, &truth, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn macro_f1_averages_over_present_classes_only() {
        // Class 2 of 4 never appears; it must not drag the mean down.
        let truth = [0u32, 0, 1, 1];
        let predicted = [0u32, 1, 1, 1];
        let score = macro_f1(&truth, &predicted, 4);
        // class 0: p=1, r=0.5, f1=2/3; class 1: p=2/3, r=1, f1=0.8
        assert!((score - (2.0 / 3.0 + 0.8) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn misclassifications_carry_both_labels() {
        let bad = misclassifications(&[0, 1, 2], &[0, 2, 2]);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].index, 1);
        assert_eq!(bad[0].truth, 1);
        assert_eq!(bad[0].predicted, 2);
    }
}
