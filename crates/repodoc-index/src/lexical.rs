//! BM25 (Okapi) lexical index.
//!
//! Tokenization is plain whitespace splitting: no lowercasing, stemming or
//! stopword removal. "Parser" and "parser," are different terms. This keeps the
//! index predictable; semantic search covers morphological variants.

use std::collections::HashMap;

use crate::chunk::Chunk;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
    /// Fraction of the average idf substituted for negative idf values.
    pub epsilon: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// Split text into index terms.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    params: Bm25Params,
    built: bool,
    ids: Vec<String>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_len: Vec<u32>,
    avgdl: f32,
    idf: HashMap<String, f32>,
}

impl LexicalIndex {
    #[must_use]
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Rebuild over `chunks`, replacing any previous corpus. Score positions
    /// follow the iteration order.
    #[allow(clippy::cast_precision_loss)]
    pub fn build<'a>(&mut self, chunks: impl IntoIterator<Item = &'a Chunk>) {
        self.ids.clear();
        self.term_freqs.clear();
        self.doc_len.clear();
        self.idf.clear();

        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len: u64 = 0;

        for chunk in chunks {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            let mut len = 0u32;
            for term in tokenize(&chunk.content) {
                *freqs.entry(term.to_owned()).or_insert(0) += 1;
                len += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += u64::from(len);
            self.ids.push(chunk.id.clone());
            self.term_freqs.push(freqs);
            self.doc_len.push(len);
        }

        let n = self.ids.len() as f32;
        self.avgdl = if self.ids.is_empty() {
            0.0
        } else {
            total_len as f32 / n
        };

        let mut idf_sum = 0.0f32;
        let mut negative = Vec::new();
        for (term, df) in doc_freq {
            let df = df as f32;
            let idf = ((n - df + 0.5) / (df + 0.5)).ln();
            if idf < 0.0 {
                negative.push(term.clone());
            }
            idf_sum += idf;
            self.idf.insert(term, idf);
        }
        if !self.idf.is_empty() {
            let floor = self.params.epsilon * idf_sum / self.idf.len() as f32;
            for term in negative {
                self.idf.insert(term, floor);
            }
        }

        self.built = true;
        tracing::debug!(
            documents = self.ids.len(),
            terms = self.idf.len(),
            avgdl = self.avgdl,
            "lexical index built"
        );
    }

    /// Raw BM25 scores, one per indexed chunk in build order.
    ///
    /// Repeated query terms contribute repeatedly; unknown terms contribute nothing.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn score(&self, query: &str) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.ids.len()];
        let Bm25Params { k1, b, .. } = self.params;

        for term in tokenize(query) {
            let Some(&idf) = self.idf.get(term) else {
                continue;
            };
            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let tf = tf as f32;
                let len_ratio = self.doc_len[i] as f32 / self.avgdl;
                scores[i] += idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * len_ratio));
            }
        }
        scores
    }

    /// Scores scaled into [0, 1] by the maximum.
    ///
    /// Negative raw scores (possible on tiny corpora where every term is common)
    /// count as no relevance. When nothing scores above zero all results are 0.
    #[must_use]
    pub fn normalized_scores(&self, query: &str) -> Vec<f32> {
        let mut scores = self.score(query);
        for s in &mut scores {
            *s = s.max(0.0);
        }
        let max = scores.iter().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            for s in &mut scores {
                *s /= max;
            }
        }
        scores
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Chunk ids in score order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Drop the corpus and return to the never-built state.
    pub fn reset(&mut self) {
        *self = Self::new(self.params);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn corpus(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new((i + 1).to_string(), *t))
            .collect()
    }

    fn built(texts: &[&str]) -> LexicalIndex {
        let mut index = LexicalIndex::default();
        index.build(&corpus(texts));
        index
    }

    #[test]
    fn default_is_not_built() {
        let index = LexicalIndex::default();
        assert!(!index.is_built());
        assert!(index.score("anything").is_empty());
    }

    #[test]
    fn empty_build_is_built_but_empty() {
        let index = built(&[]);
        assert!(index.is_built());
        assert!(index.is_empty());
        assert!(index.normalized_scores("cat").is_empty());
    }

    #[test]
    fn scores_align_with_build_order() {
        let index = built(&[
            "the cat sat on the mat",
            "dogs bark loudly at night",
            "parsers build syntax trees",
            "the compiler lowers syntax",
        ]);
        assert_eq!(index.ids(), ["1", "2", "3", "4"]);
        let scores = index.score("cat");
        assert!(scores[0] > 0.0);
        assert_eq!(&scores[1..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let index = built(&[
            "syntax tree",
            "syntax node",
            "syntax visitor",
            "macro expansion",
            "borrow checker",
        ]);
        let scores = index.score("syntax macro");
        // "macro" appears in one document, "syntax" in three.
        assert!(scores[3] > scores[0]);
    }

    #[test]
    fn repeated_query_terms_count_twice() {
        let index = built(&["alpha beta", "gamma delta", "epsilon zeta"]);
        let once = index.score("alpha")[0];
        let twice = index.score("alpha alpha")[0];
        assert!((twice - 2.0 * once).abs() < 1e-5);
    }

    #[test]
    fn no_overlap_normalizes_to_zero() {
        let index = built(&["alpha beta", "gamma delta"]);
        assert_eq!(index.normalized_scores("omega"), vec![0.0, 0.0]);
        assert_eq!(index.normalized_scores(""), vec![0.0, 0.0]);
    }

    #[test]
    fn common_terms_get_epsilon_floor() {
        // "shared" is in 3 of 4 documents: raw idf is negative and gets floored.
        let index = built(&["shared one", "shared two", "shared three", "unique four"]);
        let floor = index.idf["shared"];
        assert!(floor > 0.0);
        assert!(index.idf["unique"] > floor);
    }

    #[test]
    fn tokenization_is_case_sensitive() {
        let index = built(&["Parser module", "lexer module", "other words"]);
        assert_eq!(index.score("parser")[0], 0.0);
        assert!(index.score("Parser")[0] > 0.0);
    }

    #[test]
    fn reset_returns_to_unbuilt() {
        let mut index = built(&["a b"]);
        index.reset();
        assert!(!index.is_built());
        assert!(index.is_empty());
    }

    proptest! {
        #[test]
        fn normalized_scores_stay_in_unit_range(
            docs in prop::collection::vec("[a-e]{1,3}( [a-e]{1,3}){0,6}", 1..12),
            query in "[a-e]{1,3}( [a-e]{1,3}){0,3}",
        ) {
            let chunks: Vec<Chunk> = docs
                .iter()
                .enumerate()
                .map(|(i, d)| Chunk::new(i.to_string(), d.clone()))
                .collect();
            let mut index = LexicalIndex::default();
            index.build(&chunks);
            let scores = index.normalized_scores(&query);
            prop_assert_eq!(scores.len(), chunks.len());
            for s in &scores {
                prop_assert!((0.0..=1.0).contains(s));
            }
            let max = scores.iter().copied().fold(0.0f32, f32::max);
            prop_assert!(max == 0.0 || (max - 1.0).abs() < 1e-6);
        }
    }
}
