//! Character-n-gram vocabulary and hashing.
//!
//! The vocabulary is built once from a corpus of normalized canonical labels:
//! each line is wrapped with the boundary sentinel `#`, a window of `n`
//! characters slides across it, and every distinct window that does not
//! contain the masking character `_` is collected in first-seen order. Index
//! 0 is always reserved for the out-of-vocabulary token, the n-gram made
//! entirely of boundary characters.
//!
//! Tokenization is total: any window absent from the vocabulary maps to the
//! OOV index rather than failing, so arbitrary input degrades to an
//! OOV-dominated sequence.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Character marking a token boundary when windows are extracted.
pub const BOUNDARY_CHAR: char = '#';

/// Character used by the masking augmentation rule; n-grams containing it
/// are never admitted to the vocabulary.
pub const MASK_CHAR: char = '_';

/// A fixed bijection between character n-grams and integer indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgramVocab {
    n: usize,
    tokens: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl NgramVocab {
    /// Build a vocabulary of `n`-grams from normalized corpus lines.
    ///
    /// The first token is the OOV sentinel (`#` repeated `n` times); the
    /// rest follow in first-seen corpus order, which makes construction
    /// exactly reproducible for a fixed corpus and `n`.
    pub fn build<S: AsRef<str>>(n: usize, corpus: &[S]) -> Result<Self> {
        if n == 0 {
            return Err(Error::invalid_input("n-gram size must be at least 1"));
        }

        let oov: String = std::iter::repeat(BOUNDARY_CHAR).take(n).collect();
        let mut tokens = vec![oov];
        let mut seen: HashMap<String, usize> = HashMap::new();
        seen.insert(tokens[0].clone(), 0);

        for line in corpus {
            for gram in windows(line.as_ref(), n) {
                if gram.contains(MASK_CHAR) {
                    continue;
                }
                if !seen.contains_key(&gram) {
                    seen.insert(gram.clone(), tokens.len());
                    tokens.push(gram);
                }
            }
        }

        Ok(Self {
            n,
            index: seen,
            tokens,
        })
    }

    /// The n-gram window size.
    #[must_use]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of tokens, OOV sentinel included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when only the OOV sentinel is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= 1
    }

    /// The ordered token list.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Tokenize `text` into vocabulary n-grams, substituting the OOV token
    /// for unknown windows.
    #[must_use]
    pub fn ngram_tokens(&self, text: &str) -> Vec<String> {
        windows(text, self.n)
            .map(|gram| {
                if self.index.contains_key(&gram) {
                    gram
                } else {
                    self.tokens[0].clone()
                }
            })
            .collect()
    }

    /// Map `text` to vocabulary indices, substituting the OOV index for
    /// unknown windows.
    #[must_use]
    pub fn ngram_indexes(&self, text: &str) -> Vec<usize> {
        windows(text, self.n)
            .map(|gram| self.index.get(&gram).copied().unwrap_or(0))
            .collect()
    }

    /// Persist the ordered token list as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| Error::artifact(format!("serialize vocabulary: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a vocabulary saved by [`NgramVocab::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::artifact(format!("read vocabulary {}: {e}", path.display())))?;
        let mut vocab: NgramVocab = serde_json::from_str(&json)
            .map_err(|e| Error::artifact(format!("parse vocabulary {}: {e}", path.display())))?;
        vocab.rebuild_index();
        if vocab.tokens.is_empty() || vocab.tokens[0].chars().any(|c| c != BOUNDARY_CHAR) {
            return Err(Error::artifact(format!(
                "vocabulary {} does not start with the OOV sentinel",
                path.display()
            )));
        }
        Ok(vocab)
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
    }
}

/// Slide a window of `n` characters over `text` wrapped in boundary chars.
fn windows(text: &str, n: usize) -> impl Iterator<Item = String> + '_ {
    let chars: Vec<char> = std::iter::once(BOUNDARY_CHAR)
        .chain(text.chars())
        .chain(std::iter::once(BOUNDARY_CHAR))
        .collect();
    let count = chars.len().saturating_sub(n - 1);
    (0..count).map(move |i| chars[i..i + n].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vocab() -> NgramVocab {
        NgramVocab::build(2, &["verdun", "pie ix"]).unwrap()
    }

    #[test]
    fn oov_sentinel_is_index_zero() {
        let vocab = sample_vocab();
        assert_eq!(vocab.tokens()[0], "##");
    }

    #[test]
    fn build_is_reproducible() {
        let a = NgramVocab::build(2, &["verdun", "pie ix"]).unwrap();
        let b = NgramVocab::build(2, &["verdun", "pie ix"]).unwrap();
        assert_eq!(a.tokens(), b.tokens());
    }

    #[test]
    fn tokenizes_with_boundaries() {
        let vocab = sample_vocab();
        let grams = vocab.ngram_tokens("verdun");
        assert_eq!(grams.first().unwrap(), "#v");
        assert_eq!(grams.last().unwrap(), "n#");
        assert_eq!(grams.len(), "verdun".chars().count() + 1);
    }

    #[test]
    fn unknown_windows_map_to_oov() {
        let vocab = sample_vocab();
        let idx = vocab.ngram_indexes("zzz");
        // "zz" never occurs in the corpus.
        assert!(idx.iter().any(|&i| i == 0));
    }

    #[test]
    fn all_oov_input_still_tokenizes() {
        let vocab = sample_vocab();
        let idx = vocab.ngram_indexes("ωωω");
        assert!(!idx.is_empty());
        assert!(idx.iter().all(|&i| i == 0));
    }

    #[test]
    fn masked_ngrams_are_excluded_from_vocab() {
        let vocab = NgramVocab::build(2, &["ver_un"]).unwrap();
        assert!(vocab.tokens().iter().all(|t| !t.contains(MASK_CHAR)));
        // Tokenizing the masked form degrades to OOV where the mask sits.
        let idx = vocab.ngram_indexes("ver_un");
        assert!(idx.contains(&0));
    }

    #[test]
    fn save_load_roundtrip_preserves_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        let vocab = sample_vocab();
        vocab.save(&path).unwrap();
        let loaded = NgramVocab::load(&path).unwrap();

        assert_eq!(vocab.tokens(), loaded.tokens());
        assert_eq!(
            vocab.ngram_indexes("pie ix"),
            loaded.ngram_indexes("pie ix")
        );
    }
}
