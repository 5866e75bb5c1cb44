//! Property tests for the dataset generator: conflict-freedom, label
//! ordering, class-weight bounds, and normalization totality.

use placelink::{dataset, normalize, GeneratorConfig};
use proptest::prelude::*;
use std::collections::HashMap;

fn label_strategy() -> impl Strategy<Value = Vec<String>> {
    // Accented characters restricted to ones that NFD-fold to ASCII.
    proptest::collection::vec(
        "[A-Z][a-zàâäçéèêëîïôöùûü]{2,8}(-[A-Z][a-zàâäçéèêëîïôöùûü]{2,8}){0,2}",
        2..8,
    )
    .prop_map(|mut labels| {
        labels.sort();
        labels.dedup();
        labels
    })
    .prop_filter("need at least two labels", |l| l.len() >= 2)
}

proptest! {
    // Generation is comparatively expensive; keep the case count modest.
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn no_mention_maps_to_two_labels(labels in label_strategy()) {
        let generated = dataset::generate(labels, &GeneratorConfig::default()).unwrap();

        let mut label_of: HashMap<&str, usize> = HashMap::new();
        for sample in &generated.samples {
            if let Some(&previous) = label_of.get(sample.mention.as_str()) {
                prop_assert_eq!(
                    previous,
                    sample.label,
                    "mention {:?} maps to two labels",
                    &sample.mention
                );
            }
            label_of.insert(&sample.mention, sample.label);
        }
    }

    #[test]
    fn labels_are_sorted_and_weights_bounded(labels in label_strategy()) {
        let generated = dataset::generate(labels, &GeneratorConfig::default()).unwrap();
        let bundle = &generated.bundle;

        let lengths: Vec<usize> = bundle.labels.iter().map(|l| l.chars().count()).collect();
        prop_assert!(lengths.windows(2).all(|w| w[0] <= w[1]));

        prop_assert_eq!(bundle.class_weights.len(), bundle.labels.len());
        for &w in &bundle.class_weights {
            prop_assert!(w > 0.0 && w <= 1.0);
        }
        prop_assert!(bundle.class_weights.iter().any(|&w| (w - 1.0).abs() < 1e-6));
    }

    #[test]
    fn normalization_is_total_and_canonical(text in ".*") {
        let out = normalize(&text);
        // Never panics; output is trimmed, single-spaced, caseless ASCII
        // letters wherever the input had ASCII letters.
        prop_assert!(!out.starts_with(' ') && !out.ends_with(' '));
        prop_assert!(!out.contains("  "));
        prop_assert!(!out.contains('-') && !out.contains('\''));
        prop_assert!(out.chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn mentions_are_all_normalized_or_masked_variants(labels in label_strategy()) {
        let generated = dataset::generate(labels, &GeneratorConfig::default()).unwrap();
        for sample in &generated.samples {
            // Every stored mention is already lowercase and diacritic-free;
            // the only characters outside the normalized alphabet are the
            // mask and the hyphen surface variants.
            for c in sample.mention.chars() {
                prop_assert!(
                    c.is_ascii_lowercase()
                        || c.is_ascii_digit()
                        || c == ' '
                        || c == '-'
                        || c == '_',
                    "unexpected char {:?} in {:?}",
                    c,
                    &sample.mention
                );
            }
        }
    }
}
