//! Review text cleaning.
//!
//! Lower-cases, strips punctuation and symbols (word characters of any
//! script survive, so Amharic passes through), removes English stop words.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::models::{CleanedReview, RawReview, ReviewText};

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

// NLTK english list
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    vec![
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're",
        "you've", "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him",
        "his", "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its",
        "itself", "they", "them", "their", "theirs", "themselves", "what", "which", "who",
        "whom", "this", "that", "that'll", "these", "those", "am", "is", "are", "was",
        "were", "be", "been", "being", "have", "has", "had", "having", "do", "does", "did",
        "doing", "a", "an", "the", "and", "but", "if", "or", "because", "as", "until",
        "while", "of", "at", "by", "for", "with", "about", "against", "between", "into",
        "through", "during", "before", "after", "above", "below", "to", "from", "up", "down",
        "in", "out", "on", "off", "over", "under", "again", "further", "then", "once", "here",
        "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
        "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so",
        "than", "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should",
        "should've", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't",
        "couldn", "couldn't", "didn", "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn",
        "hasn't", "haven", "haven't", "isn", "isn't", "ma", "mightn", "mightn't", "mustn",
        "mustn't", "needn", "needn't", "shan", "shan't", "shouldn", "shouldn't", "wasn",
        "wasn't", "weren", "weren't", "won", "won't", "wouldn", "wouldn't",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Normalize one review body. Idempotent.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");

    stripped
        .split_whitespace()
        .filter(|t| !is_stop_word(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-text bodies clean to the empty string.
pub fn normalize_review_text(text: &ReviewText) -> String {
    match text {
        ReviewText::Text(s) => normalize_text(s),
        ReviewText::Other(_) => String::new(),
    }
}

/// Drop missing bodies, dedupe on exact body (first wins), normalize the rest.
pub fn clean(raw: Vec<RawReview>) -> Vec<CleanedReview> {
    let initial = raw.len();
    let mut seen: HashSet<(bool, String)> = HashSet::new();
    let mut missing = 0usize;
    let mut duplicates = 0usize;

    let cleaned: Vec<CleanedReview> = raw
        .into_iter()
        .filter_map(|review| {
            let key = match &review.content {
                None => {
                    missing += 1;
                    return None;
                }
                Some(ReviewText::Text(s)) => (true, s.clone()),
                Some(ReviewText::Other(v)) => (false, v.to_string()),
            };
            if !seen.insert(key) {
                duplicates += 1;
                return None;
            }

            let cleaned_content = review
                .content
                .as_ref()
                .map(normalize_review_text)
                .unwrap_or_default();
            Some(CleanedReview {
                raw: review,
                cleaned_content,
            })
        })
        .collect();

    debug!("Cleaning dropped missing={} duplicates={}", missing, duplicates);
    info!(
        "After cleaning: {} reviews (removed {})",
        cleaned.len(),
        initial - cleaned.len()
    );
    cleaned
}
