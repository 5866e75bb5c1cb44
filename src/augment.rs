//! Surface-form transformation rules for the dataset generator.
//!
//! Rules live in explicit ordered registries rather than being resolved by
//! name at runtime: each rule is a named pure function from one normalized
//! label to a list of variant strings. Three groups exist, applied by the
//! generator in registry order:
//!
//! - **surface rules**: character-level substitutions and randomized
//!   perturbations (deletion, adjacent-key insertion, transposition,
//!   masking);
//! - **abbreviation rules**: saint/sainte/st/ste equivalence and `de`
//!   elision;
//! - **word rules**: word-boundary splits (drop/keep first/last words,
//!   `saint` plus its follower).
//!
//! Randomized rules draw from the caller's seeded RNG and are capped at
//! `max_variants` outputs each, so generation is reproducible for a fixed
//! seed and corpus order.

use crate::vocab::MASK_CHAR;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Shared state handed to every rule invocation.
pub struct RuleCtx<'a> {
    /// Seeded RNG driving the randomized rules.
    pub rng: &'a mut StdRng,
    /// Cap on the number of variants a randomized rule may emit.
    pub max_variants: usize,
}

/// A named, pure transformation rule.
pub struct Rule {
    /// Stable rule identifier, used in logs.
    pub name: &'static str,
    /// Produce variants of a normalized label. May return duplicates or the
    /// input itself; the generator filters both.
    pub apply: fn(&str, &mut RuleCtx<'_>) -> Vec<String>,
}

/// Character-level rules, in application order.
pub const SURFACE_RULES: &[Rule] = &[
    Rule { name: "hyphen-to-space", apply: hyphen_to_space },
    Rule { name: "apostrophe-to-space", apply: apostrophe_to_space },
    Rule { name: "space-to-hyphen", apply: space_to_hyphen },
    Rule { name: "drop-double-letter", apply: drop_double_letter },
    Rule { name: "drop-random-char", apply: drop_random_char },
    Rule { name: "insert-adjacent-key", apply: insert_adjacent_key },
    Rule { name: "swap-adjacent-chars", apply: swap_adjacent_chars },
    Rule { name: "mask-random-char", apply: mask_random_char },
];

/// Abbreviation-equivalence rules.
pub const ABBREV_RULES: &[Rule] = &[
    Rule { name: "saint-equivalents", apply: saint_equivalents },
    Rule { name: "drop-de", apply: drop_de },
];

/// Word-boundary rules. Their outputs are re-expanded through
/// [`SURFACE_RULES`] by the generator.
pub const WORD_RULES: &[Rule] = &[
    Rule { name: "saint-with-next-word", apply: saint_with_next_word },
    Rule { name: "drop-first-word", apply: drop_first_word },
    Rule { name: "drop-last-word", apply: drop_last_word },
    Rule { name: "keep-first-word", apply: keep_first_word },
    Rule { name: "keep-last-word", apply: keep_last_word },
    Rule { name: "keep-first-and-last-word", apply: keep_first_and_last_word },
];

// =============================================================================
// Surface rules
// =============================================================================

fn hyphen_to_space(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    vec![s.replace('-', " ")]
}

fn apostrophe_to_space(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    vec![s.replace('\'', " ")]
}

fn space_to_hyphen(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    vec![s.replace(' ', "-")]
}

/// Collapse the first doubled letter: "pointe-calliere" keeps users who type
/// a single `l` covered.
fn drop_double_letter(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    for i in 0..chars.len().saturating_sub(1) {
        if chars[i].is_ascii_lowercase() && chars[i] == chars[i + 1] {
            let mut out: String = chars[..=i].iter().collect();
            out.extend(&chars[i + 2..]);
            return vec![out];
        }
    }
    vec![]
}

/// Delete one character, at up to `max_variants` random positions.
fn drop_random_char(s: &str, ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    shuffled_positions(chars.len(), ctx)
        .into_iter()
        .map(|r| {
            let mut out: String = chars[..r].iter().collect();
            out.extend(&chars[r + 1..]);
            out
        })
        .collect()
}

/// Insert a keyboard-adjacent character before a random position, simulating
/// a stray keystroke ("peel" -> "peekl").
fn insert_adjacent_key(s: &str, ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    shuffled_positions(chars.len(), ctx)
        .into_iter()
        .map(|r| {
            let stray = adjacent_key(chars[r], ctx.rng);
            let mut out: String = chars[..r].iter().collect();
            out.push(stray);
            out.extend(&chars[r..]);
            out
        })
        .collect()
}

/// Transpose two adjacent characters at up to `max_variants` positions.
fn swap_adjacent_chars(s: &str, ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    shuffled_positions(chars.len().saturating_sub(1), ctx)
        .into_iter()
        .map(|r| {
            let mut swapped = chars.clone();
            swapped.swap(r, r + 1);
            swapped.into_iter().collect()
        })
        .collect()
}

/// Replace one character with the masking character ("jarry" -> "jar_y").
///
/// These variants teach the classifier that an OOV window must not prevent
/// correct classification; they are excluded from embedding pretraining.
fn mask_random_char(s: &str, ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    shuffled_positions(chars.len(), ctx)
        .into_iter()
        .map(|r| {
            let mut masked = chars.clone();
            masked[r] = MASK_CHAR;
            masked.into_iter().collect()
        })
        .collect()
}

// =============================================================================
// Abbreviation rules
// =============================================================================

/// Substitute the saint/sainte/st/ste family, first occurrence only.
fn saint_equivalents(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    if s.contains("sainte ") {
        ["saint ", "ste ", "st "]
            .iter()
            .map(|r| s.replacen("sainte ", r, 1))
            .collect()
    } else if s.contains("saint ") {
        ["sainte ", "ste ", "st "]
            .iter()
            .map(|r| s.replacen("saint ", r, 1))
            .collect()
    } else {
        vec![]
    }
}

/// Elide an internal "de" ("universite de montreal" -> "universite montreal").
fn drop_de(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    if s.contains(" de ") {
        vec![s.replace(" de ", " ")]
    } else {
        vec![]
    }
}

// =============================================================================
// Word rules
// =============================================================================

/// Split on spaces, falling back to hyphens for strings that survived
/// normalization with hyphens intact.
fn split_words(s: &str) -> (Vec<&str>, char) {
    let by_space: Vec<&str> = s.split(' ').filter(|w| !w.is_empty()).collect();
    if by_space.len() > 1 {
        (by_space, ' ')
    } else {
        (s.split('-').filter(|w| !w.is_empty()).collect(), '-')
    }
}

fn join(words: &[&str], sep: char) -> String {
    words.join(&sep.to_string())
}

/// Keep an internal "saint…" word plus its immediate follower
/// ("place saint henri" -> "saint henri").
fn saint_with_next_word(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let (words, sep) = split_words(s);
    if words.len() > 2 {
        for (i, w) in words.iter().enumerate() {
            if w.starts_with("saint") && i + 1 < words.len() {
                return vec![join(&[words[i], words[i + 1]], sep)];
            }
        }
    }
    vec![]
}

fn drop_first_word(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let (words, sep) = split_words(s);
    if words.len() > 1 {
        vec![join(&words[1..], sep)]
    } else {
        vec![]
    }
}

fn drop_last_word(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let (words, sep) = split_words(s);
    if words.len() > 1 {
        vec![join(&words[..words.len() - 1], sep)]
    } else {
        vec![]
    }
}

fn keep_first_word(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let (words, sep) = split_words(s);
    if words.len() > 1 {
        vec![join(&words[..1], sep)]
    } else {
        vec![]
    }
}

fn keep_last_word(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let (words, sep) = split_words(s);
    if words.len() > 1 {
        vec![join(&words[words.len() - 1..], sep)]
    } else {
        vec![]
    }
}

fn keep_first_and_last_word(s: &str, _ctx: &mut RuleCtx<'_>) -> Vec<String> {
    let (words, sep) = split_words(s);
    if words.len() > 2 {
        vec![join(&[words[0], words[words.len() - 1]], sep)]
    } else {
        vec![]
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Up to `max_variants` distinct positions in `0..len`, in seeded-shuffle order.
fn shuffled_positions(len: usize, ctx: &mut RuleCtx<'_>) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..len).collect();
    positions.shuffle(ctx.rng);
    positions.truncate(ctx.max_variants);
    positions
}

/// A QWERTY-adjacent character for `c`, for confusable-key insertions.
fn adjacent_key(c: char, rng: &mut StdRng) -> char {
    const KEYBOARD: &[(char, &[char])] = &[
        ('q', &['w', 'a']),
        ('w', &['q', 'e', 's']),
        ('e', &['w', 'r', 'd']),
        ('r', &['e', 't', 'f']),
        ('t', &['r', 'y', 'g']),
        ('y', &['t', 'u', 'h']),
        ('u', &['y', 'i', 'j']),
        ('i', &['u', 'o', 'k']),
        ('o', &['i', 'p', 'l']),
        ('p', &['o', 'l']),
        ('a', &['q', 's', 'z']),
        ('s', &['a', 'd', 'w', 'x']),
        ('d', &['s', 'f', 'e', 'c']),
        ('f', &['d', 'g', 'r', 'v']),
        ('g', &['f', 'h', 't', 'b']),
        ('h', &['g', 'j', 'y', 'n']),
        ('j', &['h', 'k', 'u', 'm']),
        ('k', &['j', 'l', 'i']),
        ('l', &['k', 'o', 'p']),
        ('z', &['a', 'x']),
        ('x', &['z', 's', 'c']),
        ('c', &['x', 'd', 'v']),
        ('v', &['c', 'f', 'b']),
        ('b', &['v', 'g', 'n']),
        ('n', &['b', 'h', 'm']),
        ('m', &['n', 'j']),
    ];

    for (key, neighbors) in KEYBOARD {
        if *key == c {
            return neighbors.choose(rng).copied().unwrap_or('z');
        }
    }
    'z'
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ctx(rng: &mut StdRng) -> RuleCtx<'_> {
        RuleCtx {
            rng,
            max_variants: 10,
        }
    }

    fn apply(name: &str, input: &str) -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(42);
        let mut ctx = ctx(&mut rng);
        let rule = SURFACE_RULES
            .iter()
            .chain(ABBREV_RULES)
            .chain(WORD_RULES)
            .find(|r| r.name == name)
            .unwrap();
        (rule.apply)(input, &mut ctx)
    }

    #[test]
    fn word_rules_cover_all_splits() {
        assert_eq!(apply("drop-first-word", "square victoria oaci"), vec!["victoria oaci"]);
        assert_eq!(apply("drop-last-word", "square victoria oaci"), vec!["square victoria"]);
        assert_eq!(apply("keep-first-word", "square victoria oaci"), vec!["square"]);
        assert_eq!(apply("keep-last-word", "square victoria oaci"), vec!["oaci"]);
        assert_eq!(
            apply("keep-first-and-last-word", "square victoria oaci"),
            vec!["square oaci"]
        );
    }

    #[test]
    fn saint_with_next_word_extracts_pair() {
        assert_eq!(apply("saint-with-next-word", "place saint henri"), vec!["saint henri"]);
        assert!(apply("saint-with-next-word", "saint henri").is_empty());
    }

    #[test]
    fn saint_equivalents_substitutes_family() {
        let variants = apply("saint-equivalents", "saint laurent");
        assert!(variants.contains(&"sainte laurent".to_string()));
        assert!(variants.contains(&"ste laurent".to_string()));
        assert!(variants.contains(&"st laurent".to_string()));
    }

    #[test]
    fn drop_de_elides_internal_particle() {
        assert_eq!(apply("drop-de", "universite de montreal"), vec!["universite montreal"]);
        assert!(apply("drop-de", "montreal").is_empty());
    }

    #[test]
    fn masked_variants_contain_mask_char() {
        let variants = apply("mask-random-char", "jarry");
        assert!(!variants.is_empty());
        for v in &variants {
            assert_eq!(v.chars().filter(|&c| c == MASK_CHAR).count(), 1);
            assert_eq!(v.chars().count(), 5);
        }
    }

    #[test]
    fn randomized_rules_respect_cap_and_seed() {
        let long = "notre dame de grace";
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = drop_random_char(long, &mut RuleCtx { rng: &mut rng_a, max_variants: 3 });
        let b = drop_random_char(long, &mut RuleCtx { rng: &mut rng_b, max_variants: 3 });
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn double_letter_collapses_once() {
        assert_eq!(apply("drop-double-letter", "olliver"), vec!["oliver"]);
        assert!(apply("drop-double-letter", "verdun").is_empty());
    }
}
