// src/normalize.rs
//! Tagging, prioritization, and categorization of scraped text.
//!
//! Everything here is a pure function of the input text, so re-ingesting an
//! unchanged source derives identical items. Matching is case-insensitive
//! substring containment over the combined title + description.

use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::model::{MAX_TAGS, PRIORITY_MAX};

/// Any of these in the text forces maximum priority.
const URGENT_KEYWORDS: [&str; 5] = ["breaking", "urgent", "crisis", "emergency", "alert"];

/// Filler words never worth a tag.
const STOPWORDS: [&str; 14] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Category table, scanned first-match-wins. Order is part of the contract.
const CATEGORY_TABLE: [(&str, &[&str]); 6] = [
    (
        "politics",
        &["government", "election", "president", "minister", "parliament"],
    ),
    (
        "technology",
        &["tech", "software", "ai", "artificial intelligence", "computer"],
    ),
    (
        "business",
        &["economy", "market", "stock", "company", "business"],
    ),
    (
        "sports",
        &["football", "soccer", "basketball", "tennis", "olympics"],
    ),
    (
        "health",
        &["health", "medical", "doctor", "hospital", "disease"],
    ),
    (
        "entertainment",
        &["movie", "music", "celebrity", "entertainment", "show"],
    ),
];

fn punctuation_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").unwrap())
}

/// Derive up to [`MAX_TAGS`] tags: lowercase, strip punctuation, split on
/// whitespace, drop stopwords and tokens of length <= 3, dedupe keeping
/// first occurrence.
pub fn extract_tags(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = punctuation_re().replace_all(&lowered, "");
    let mut tags: Vec<String> = Vec::new();
    for word in cleaned.split_whitespace() {
        if word.len() <= 3 || STOPWORDS.contains(&word) {
            continue;
        }
        if tags.iter().any(|t| t == word) {
            continue;
        }
        tags.push(word.to_string());
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

/// Urgent keyword anywhere in the text -> maximum priority; otherwise a
/// deterministic 1..=5 baseline derived from a digest of the text, keeping
/// the spread of the legacy random assignment without the nondeterminism.
pub fn calculate_priority(title: &str, description: &str) -> u8 {
    let text = format!("{} {}", title, description).to_lowercase();
    if URGENT_KEYWORDS.iter().any(|k| text.contains(k)) {
        return PRIORITY_MAX;
    }
    baseline_priority(&text)
}

fn baseline_priority(lowercased: &str) -> u8 {
    let digest = Sha256::digest(lowercased.as_bytes());
    1 + (digest[0] % 5)
}

/// First category whose keyword set hits the text; "general" when none do.
pub fn categorize(title: &str, description: &str) -> &'static str {
    let text = format!("{} {}", title, description).to_lowercase();
    for (category, keywords) in CATEGORY_TABLE {
        if keywords.iter().any(|k| text.contains(k)) {
            return category;
        }
    }
    "general"
}
