/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

//! Pure Singlish post-processing: a configured multi-word -> single-word
//! substitution table applied in one left-to-right token scan, followed by
//! whole-word case-insensitive target-vocabulary counting. No regex —
//! plain token comparison, in the same style as the assistant's
//! `ai.rs::quick_classify_content` lowercase-and-scan idiom.

use crate::types::WordCounts;
use std::collections::HashSet;

/// A correction table ready to apply. Built once from `Config` and reused
/// across every call; phrases are matched case-insensitively but the
/// table itself is stored lowercased.
#[derive(Debug, Clone)]
pub struct Corrector {
    /// (lowercased phrase tokens, canonical replacement) pairs, longest
    /// phrase (by token count) first so a longer match is preferred over
    /// a shorter prefix during the scan.
    table: Vec<(Vec<String>, String)>,
    target_words: HashSet<String>,
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|s| !s.is_empty())
        .collect()
}

impl Corrector {
    pub fn new(corrections: &[(String, String)], target_words: &[String]) -> Self {
        let mut table: Vec<(Vec<String>, String)> = corrections
            .iter()
            .map(|(phrase, canonical)| {
                let tokens = tokenize(&phrase.to_lowercase())
                    .into_iter()
                    .map(|t| t.to_string())
                    .collect();
                (tokens, canonical.to_lowercase())
            })
            .collect();
        // Longest phrase first so e.g. "wa lao eh" (if it were configured)
        // would win over "wa lao" — the spec requires ordering to matter
        // only when outputs could collide, so ties keep the configured
        // order via a stable sort.
        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            table,
            target_words: target_words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    /// Apply the substitution table in a single left-to-right token scan.
    /// Idempotent: re-applying to already-corrected text is a no-op,
    /// because the canonical replacement never itself matches a phrase's
    /// token sequence in this table (corrections reduce token count,
    /// they don't introduce new multi-token phrases).
    pub fn apply_corrections(&self, raw: &str) -> String {
        let tokens: Vec<&str> = tokenize(raw);
        let lower: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        'scan: while i < tokens.len() {
            for (phrase, canonical) in &self.table {
                let n = phrase.len();
                if n == 0 || i + n > lower.len() {
                    continue;
                }
                if lower[i..i + n] == phrase[..] {
                    out.push(canonical.clone());
                    i += n;
                    continue 'scan;
                }
            }
            out.push(lower[i].clone());
            i += 1;
        }
        out.join(" ")
    }

    /// Count whole-word, case-insensitive occurrences of each configured
    /// target word. Input is assumed already tokenized-compatible (either
    /// raw or corrected text); punctuation is stripped by `tokenize`.
    pub fn count_target_words(&self, text: &str) -> WordCounts {
        let mut counts = WordCounts::new();
        for token in tokenize(text) {
            let lower = token.to_lowercase();
            if self.target_words.contains(&lower) {
                *counts.entry(lower).or_insert(0) += 1;
            }
        }
        counts
    }

    /// `process(raw) = count(apply_corrections(raw))`, the combined
    /// function spec.md §4.3 requires to be idempotent end-to-end.
    pub fn process(&self, raw: &str) -> (String, WordCounts) {
        let corrected = self.apply_corrections(raw);
        let counts = self.count_target_words(&corrected);
        (corrected, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_CORRECTIONS, DEFAULT_TARGET_WORDS};

    fn default_corrector() -> Corrector {
        let corrections: Vec<(String, String)> = DEFAULT_CORRECTIONS
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let words: Vec<String> = DEFAULT_TARGET_WORDS.iter().map(|s| s.to_string()).collect();
        Corrector::new(&corrections, &words)
    }

    #[test]
    fn corrections_are_idempotent() {
        let c = default_corrector();
        let once = c.apply_corrections("wa lao eh cheap buy lah");
        let twice = c.apply_corrections(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn scenario_four_correction_and_counts() {
        let c = default_corrector();
        let corrected = c.apply_corrections("wa lao eh cheap buy lah");
        assert_eq!(corrected, "walao eh cheebai lah");
        let again = c.apply_corrections(&corrected);
        assert_eq!(corrected, again);

        let counts = c.count_target_words(&corrected);
        assert_eq!(counts.get("walao"), Some(&1));
        assert_eq!(counts.get("cheebai"), Some(&1));
        assert_eq!(counts.get("lah"), Some(&1));
    }

    #[test]
    fn counts_only_contain_target_words() {
        let c = default_corrector();
        let counts = c.count_target_words("this food is shiok lah walao lah paiseh");
        for key in counts.keys() {
            assert!(DEFAULT_TARGET_WORDS.contains(&key.as_str()));
        }
        assert_eq!(counts.get("lah"), Some(&2));
        assert_eq!(counts.get("shiok"), Some(&1));
        assert_eq!(counts.get("paiseh"), Some(&1));
    }

    #[test]
    fn punctuation_is_not_part_of_a_token() {
        let c = default_corrector();
        let counts = c.count_target_words("shiok! lah, lah... can?");
        assert_eq!(counts.get("shiok"), Some(&1));
        assert_eq!(counts.get("lah"), Some(&2));
        assert_eq!(counts.get("can"), Some(&1));
    }

    #[test]
    fn process_is_stable_under_reapplication() {
        let c = default_corrector();
        let (corrected, counts) = c.process("pai seh lah");
        let (corrected2, counts2) = c.process(&corrected);
        assert_eq!(corrected, corrected2);
        assert_eq!(counts, counts2);
    }
}
