//! Post-processing of generated text.

use std::collections::HashSet;

/// Non-blank lines of `text`, first occurrence of each kept in order.
pub fn dedupe_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}
