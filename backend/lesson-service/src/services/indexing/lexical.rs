//! BM25 term weighting over a corpus statistics snapshot
//!
//! Chunk vectors hold the full BM25 contribution of each term, so a lexical
//! query reduces to a dot product between the query term counts and the
//! chunk's weights.

use crate::models::TermWeights;
use std::collections::{HashMap, HashSet};

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercase, split on non-alphanumerics, drop tokens shorter than 2 chars
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .map(String::from)
        .collect()
}

/// Tokenize and deduplicate, keeping first-seen order
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Query-side lexical vector: term -> occurrences in the query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalQuery {
    pub terms: HashMap<String, f32>,
}

impl LexicalQuery {
    pub fn from_text(text: &str) -> Self {
        let mut terms = HashMap::new();
        for token in tokenize(text) {
            *terms.entry(token).or_insert(0.0) += 1.0;
        }
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Dot product against a chunk's BM25 weights
    pub fn score(&self, weights: &TermWeights) -> f32 {
        self.terms
            .iter()
            .filter_map(|(term, qtf)| weights.get(term).map(|w| w * qtf))
            .sum()
    }
}

/// Corpus-level statistics for IDF and length normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusStats {
    pub total_docs: usize,
    pub doc_freqs: HashMap<String, usize>,
    pub avg_doc_len: f32,
}

impl CorpusStats {
    /// Build a snapshot from tokenized documents
    pub fn from_documents<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut total_docs = 0usize;
        let mut total_len = 0usize;
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for tokens in docs {
            total_docs += 1;
            total_len += tokens.len();
            let unique: HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let avg_doc_len = if total_docs == 0 {
            0.0
        } else {
            total_len as f32 / total_docs as f32
        };

        Self {
            total_docs,
            doc_freqs,
            avg_doc_len,
        }
    }

    /// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
    pub fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f32;
        let n = self.total_docs as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Query-independent BM25 weight of every term in a document
    pub fn bm25_weights(&self, tokens: &[String]) -> TermWeights {
        let mut tf: HashMap<&str, f32> = HashMap::new();
        for token in tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let doc_len = tokens.len() as f32;
        let len_norm = if self.avg_doc_len > 0.0 {
            1.0 - B + B * doc_len / self.avg_doc_len
        } else {
            1.0
        };

        tf.into_iter()
            .map(|(term, tf)| {
                let weight = self.idf(term) * (tf * (K1 + 1.0)) / (tf + K1 * len_norm);
                (term.to_string(), weight)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t)).collect()
    }

    #[test]
    fn test_tokenize_basic() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
        assert_eq!(tokenize("I am a test"), vec!["am", "test"]);
        assert!(tokenize("...---...").is_empty());
    }

    #[test]
    fn test_tokenize_unique_preserves_order() {
        assert_eq!(
            tokenize_unique("calm breath calm prayer"),
            vec!["calm", "breath", "prayer"]
        );
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let corpus = docs(&[
            "anxiety relief through prayer",
            "gratitude through prayer",
            "mindfulness through prayer",
        ]);
        let stats = CorpusStats::from_documents(corpus.iter().map(|d| d.as_slice()));

        assert_eq!(stats.total_docs, 3);
        assert!(stats.idf("anxiety") > stats.idf("prayer"));

        let weights = stats.bm25_weights(&corpus[0]);
        assert!(weights["anxiety"] > weights["prayer"]);
    }

    #[test]
    fn test_query_scores_only_shared_terms() {
        let corpus = docs(&["anxiety relief", "gratitude journal"]);
        let stats = CorpusStats::from_documents(corpus.iter().map(|d| d.as_slice()));
        let query = LexicalQuery::from_text("Anxiety relief!");

        let hit = query.score(&stats.bm25_weights(&corpus[0]));
        let miss = query.score(&stats.bm25_weights(&corpus[1]));

        assert!(hit > 0.0);
        assert_eq!(miss, 0.0);
    }

    #[test]
    fn test_empty_corpus() {
        let stats = CorpusStats::from_documents(std::iter::empty::<&[String]>());
        assert_eq!(stats.avg_doc_len, 0.0);
        assert!(stats.bm25_weights(&[]).is_empty());
    }
}
