//! TF-IDF keyword extraction over a small corpus.
//!
//! Terms are unigrams and bigrams over `\w+` tokens, case preserved.
//!
//! ```text
//! idf(t)     = ln((1 + N) / (1 + df(t))) + 1
//! w(t, d)    = tf(t, d) * idf(t), each document L2-normalised
//! score(t)   = sum over d of w(t, d)
//! ```
//!
//! Ranking is by score descending, ties broken by the term's byte order,
//! so the same corpus always yields the same list.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTerm {
    pub term: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    ngram_range: (usize, usize),
    max_features: Option<usize>,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self {
            ngram_range: (1, 2),
            max_features: None,
        }
    }
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ngram_range(mut self, min_n: usize, max_n: usize) -> Self {
        let min_n = min_n.max(1);
        self.ngram_range = (min_n, max_n.max(min_n));
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    fn terms(&self, document: &str) -> Vec<String> {
        let tokens: Vec<&str> = TOKEN.find_iter(document).map(|m| m.as_str()).collect();
        let mut out = Vec::new();
        for n in self.ngram_range.0..=self.ngram_range.1 {
            for gram in tokens.windows(n) {
                out.push(gram.join(" "));
            }
        }
        out
    }

    /// Score every term of the corpus and return them ranked.
    pub fn rank<S: AsRef<str>>(&self, documents: &[S]) -> Vec<ScoredTerm> {
        if documents.is_empty() {
            return Vec::new();
        }

        let n_docs = documents.len() as f64;
        let per_doc: Vec<BTreeMap<String, usize>> = documents
            .iter()
            .map(|d| {
                let mut counts = BTreeMap::new();
                for term in self.terms(d.as_ref()) {
                    *counts.entry(term).or_insert(0usize) += 1;
                }
                counts
            })
            .collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for counts in &per_doc {
            for term in counts.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let idf = |term: &str| -> f64 {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
        };

        let mut scores: BTreeMap<&str, f64> = BTreeMap::new();
        for counts in &per_doc {
            let weights: Vec<(&str, f64)> = counts
                .iter()
                .map(|(term, &tf)| (term.as_str(), tf as f64 * idf(term)))
                .collect();
            let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm == 0.0 {
                continue;
            }
            for (term, w) in weights {
                *scores.entry(term).or_insert(0.0) += w / norm;
            }
        }

        let mut ranked: Vec<ScoredTerm> = scores
            .into_iter()
            .map(|(term, score)| ScoredTerm {
                term: term.to_string(),
                score,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.term.cmp(&b.term))
        });

        if let Some(max) = self.max_features {
            ranked.truncate(max);
        }
        ranked
    }
}

/// Top `top_n` unigram/bigram terms by summed TF-IDF weight.
/// Empty corpus (or empty texts only) gives an empty list.
pub fn extract_keywords<S: AsRef<str>>(texts: &[S], top_n: usize) -> Vec<String> {
    TfidfVectorizer::new()
        .with_ngram_range(1, 2)
        .with_max_features(top_n)
        .rank(texts)
        .into_iter()
        .map(|t| t.term)
        .collect()
}
