// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic pre-pass evidence for summary grading.
//!
//! Copy detection and word counts are computed locally, never by the
//! model, and fed into the grading prompt as evidence.

use std::collections::HashSet;

/// Minimum verbatim run length, in words, that counts as copying.
const MIN_RUN_WORDS: usize = 4;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Number of words in `text`.
pub fn word_count(text: &str) -> usize {
    tokenize(text).len()
}

/// Find maximal runs of at least [`MIN_RUN_WORDS`] consecutive words in
/// `answer` whose every `MIN_RUN_WORDS`-word window appears verbatim in
/// `source` (case-insensitive, punctuation ignored). Overlapping matches
/// are merged into one phrase.
pub fn detect_copied_phrases(source: &str, answer: &str) -> Vec<String> {
    let source_words = tokenize(source);
    let answer_words = tokenize(answer);
    if source_words.len() < MIN_RUN_WORDS || answer_words.len() < MIN_RUN_WORDS {
        return Vec::new();
    }

    let source_grams: HashSet<&[String]> = source_words.windows(MIN_RUN_WORDS).collect();

    let mut phrases = Vec::new();
    let mut i = 0;
    while i + MIN_RUN_WORDS <= answer_words.len() {
        if source_grams.contains(&answer_words[i..i + MIN_RUN_WORDS]) {
            let mut end = i + MIN_RUN_WORDS;
            while end < answer_words.len()
                && source_grams.contains(&answer_words[end + 1 - MIN_RUN_WORDS..end + 1])
            {
                end += 1;
            }
            phrases.push(answer_words[i..end].join(" "));
            i = end;
        } else {
            i += 1;
        }
    }
    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "The quick brown fox jumps over the lazy dog near the river bank.";

    #[test]
    fn test_word_count_ignores_punctuation() {
        assert_eq!(word_count("Hello, world! One-two."), 4);
        assert_eq!(word_count("   "), 0);
    }

    #[test]
    fn test_exact_four_word_run_detected() {
        let phrases = detect_copied_phrases(SOURCE, "I think the quick brown fox is clever.");
        assert_eq!(phrases, vec!["the quick brown fox".to_string()]);
    }

    #[test]
    fn test_three_word_overlap_not_flagged() {
        let phrases = detect_copied_phrases(SOURCE, "A quick brown fox appeared in my garden.");
        assert!(phrases.is_empty());
    }

    #[test]
    fn test_longer_run_merged_into_one_phrase() {
        let phrases =
            detect_copied_phrases(SOURCE, "the quick brown fox jumps over the lazy dog, indeed");
        assert_eq!(
            phrases,
            vec!["the quick brown fox jumps over the lazy dog".to_string()]
        );
    }

    #[test]
    fn test_multiple_distinct_runs() {
        let phrases = detect_copied_phrases(
            SOURCE,
            "the quick brown fox was seen near near the river bank today wait jumps over the lazy dog",
        );
        assert_eq!(phrases.len(), 3);
        assert_eq!(phrases[0], "the quick brown fox");
        assert_eq!(phrases[1], "near the river bank");
        assert_eq!(phrases[2], "jumps over the lazy dog");
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let phrases = detect_copied_phrases(SOURCE, "THE QUICK, BROWN... FOX!");
        assert_eq!(phrases, vec!["the quick brown fox".to_string()]);
    }

    #[test]
    fn test_short_answer_never_flagged() {
        assert!(detect_copied_phrases(SOURCE, "quick fox").is_empty());
    }

    #[test]
    fn test_original_answer_not_flagged() {
        let phrases = detect_copied_phrases(
            SOURCE,
            "A speedy animal leapt across a sleeping canine by the water.",
        );
        assert!(phrases.is_empty());
    }
}
