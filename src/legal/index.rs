//! TF-IDF vectorization and exact cosine nearest-neighbour search.
//!
//! The index is built once over the Matter Description column and is
//! immutable afterwards; any dataset change requires a full rebuild.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

static TOKEN_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?u)\b\w\w+\b"));

/// English stop words removed before weighting.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "becoming",
    "been", "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "done", "down",
    "due", "during", "each", "eg", "either", "else", "elsewhere", "enough", "etc", "even",
    "ever", "every", "everyone", "everything", "everywhere", "except", "few", "find", "for",
    "former", "formerly", "from", "further", "get", "give", "go", "had", "has", "hasnt", "have",
    "he", "hence", "her", "here", "hereafter", "hereby", "herein", "hereupon", "hers", "herself",
    "him", "himself", "his", "how", "however", "i", "ie", "if", "in", "inc", "indeed", "into",
    "is", "it", "its", "itself", "just", "keep", "last", "latter", "latterly", "least", "less",
    "ltd", "made", "many", "may", "me", "meanwhile", "might", "mine", "more", "moreover", "most",
    "mostly", "much", "must", "my", "myself", "namely", "neither", "never", "nevertheless",
    "next", "no", "nobody", "none", "noone", "nor", "not", "nothing", "now", "nowhere", "of",
    "off", "often", "on", "once", "one", "only", "onto", "or", "other", "others", "otherwise",
    "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps", "please", "put",
    "rather", "re", "same", "see", "seem", "seemed", "seeming", "seems", "several", "she",
    "should", "show", "since", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "take", "than", "that", "the", "their", "them",
    "themselves", "then", "thence", "there", "thereafter", "thereby", "therefore", "therein",
    "thereupon", "these", "they", "this", "those", "though", "through", "throughout", "thru",
    "thus", "to", "together", "too", "toward", "towards", "under", "until", "up", "upon", "us",
    "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence", "whenever",
    "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever", "whether",
    "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why", "will",
    "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Lowercased word tokens of two or more characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let Ok(re) = TOKEN_RE.as_ref() else {
        tracing::error!("Token pattern failed to compile; indexing without tokens");
        return Vec::new();
    };
    let lower = text.to_lowercase();
    re.find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|token| !is_stop_word(token))
        .map(str::to_string)
        .collect()
}

/// Sparse vector as `(term index, weight)` pairs sorted by term index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f32)>,
}

impl SparseVector {
    fn from_unsorted(mut entries: Vec<(usize, f32)>) -> Self {
        entries.sort_by_key(|(term, _)| *term);
        Self { entries }
    }

    pub fn entries(&self) -> &[(usize, f32)] {
        &self.entries
    }

    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(|(_, w)| *w == 0.0)
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt()
    }

    /// Unit-length copy; the zero vector stays zero.
    pub fn normalized(&self) -> Self {
        let norm = self.norm();
        if norm == 0.0 {
            return self.clone();
        }
        Self {
            entries: self.entries.iter().map(|(t, w)| (*t, w / norm)).collect(),
        }
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0);
        while i < self.entries.len() && j < other.entries.len() {
            let (ta, wa) = self.entries[i];
            let (tb, wb) = other.entries[j];
            match ta.cmp(&tb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Fitted term vocabulary with smoothed inverse document frequencies.
#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl TfIdfVectorizer {
    /// Fit on `docs` and return the vectorizer plus one normalized vector per doc.
    pub fn fit_transform<'a, I>(docs: I) -> (Self, Vec<SparseVector>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let tokenized: Vec<Vec<String>> = docs.into_iter().map(tokenize).collect();

        let terms: BTreeSet<&str> = tokenized.iter().flatten().map(String::as_str).collect();
        let vocabulary: HashMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();

        let mut df = vec![0usize; vocabulary.len()];
        for tokens in &tokenized {
            let unique: BTreeSet<usize> = tokens
                .iter()
                .filter_map(|t| vocabulary.get(t))
                .copied()
                .collect();
            for idx in unique {
                df[idx] += 1;
            }
        }

        let n = tokenized.len() as f32;
        let idf = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f32)).ln() + 1.0)
            .collect();

        let vectorizer = Self { vocabulary, idf };
        let vectors = tokenized
            .iter()
            .map(|tokens| vectorizer.weigh(tokens))
            .collect();
        (vectorizer, vectors)
    }

    /// Vectorize new text with the fitted vocabulary. Unknown terms are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&tokenize(text))
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    fn weigh(&self, tokens: &[String]) -> SparseVector {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }
        let entries = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        SparseVector::from_unsorted(entries).normalized()
    }
}

/// A search result: dataset row and cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub score: f32,
}

/// Exact k-nearest-neighbour index over TF-IDF vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectorizer: TfIdfVectorizer,
    vectors: Vec<SparseVector>,
}

impl VectorIndex {
    pub fn build<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let (vectorizer, vectors) = TfIdfVectorizer::fit_transform(texts);
        tracing::debug!(
            rows = vectors.len(),
            vocabulary = vectorizer.vocabulary_len(),
            "Built TF-IDF index"
        );
        Self {
            vectorizer,
            vectors,
        }
    }

    pub fn vectorizer(&self) -> &TfIdfVectorizer {
        &self.vectorizer
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The `k` nearest rows, best first, ties by row order. Every row is a
    /// candidate, so a zero query yields the first `k` rows with score 0.
    pub fn search(&self, query: &SparseVector, k: usize) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }
        let query = query.normalized();
        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(row, vector)| SearchHit {
                row,
                score: vector.dot(&query),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.row.cmp(&b.row)));
        hits.truncate(k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::{STOP_WORDS, SparseVector, TfIdfVectorizer, VectorIndex, tokenize};

    #[test]
    fn stop_word_list_is_sorted_for_binary_search() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn tokenize_lowercases_and_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("Find me a TAX lawyer for the I-9 audit"),
            vec!["tax", "lawyer", "audit"]
        );
    }

    #[test]
    fn vectors_are_unit_length() {
        let (_, vectors) =
            TfIdfVectorizer::fit_transform(["tax audit appeal", "merger agreement", ""]);
        assert!((vectors[0].norm() - 1.0).abs() < 1e-5);
        assert!((vectors[1].norm() - 1.0).abs() < 1e-5);
        assert!(vectors[2].is_zero());
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let (vectorizer, _) = TfIdfVectorizer::fit_transform([
            "tax dispute",
            "tax planning",
            "tax audit",
            "patent dispute",
        ]);
        let v = vectorizer.transform("tax patent");
        let weights: Vec<f32> = v.entries().iter().map(|(_, w)| *w).collect();
        assert_eq!(weights.len(), 2);
        // vocabulary is sorted: audit, dispute, patent, planning, tax
        let patent = v.entries().iter().find(|(t, _)| *t == 2).map(|(_, w)| *w);
        let tax = v.entries().iter().find(|(t, _)| *t == 4).map(|(_, w)| *w);
        assert!(patent.unwrap_or_default() > tax.unwrap_or_default());
    }

    #[test]
    fn search_ranks_by_similarity_then_row_order() {
        let index = VectorIndex::build([
            "merger and acquisition advisory",
            "federal tax controversy",
            "tax planning for estates",
            "employment discrimination claim",
        ]);
        let query = index.vectorizer().transform("tax controversy");
        let hits = index.search(&query, 10);

        let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![1, 2, 0, 3]);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[2].score, 0.0);
        assert_eq!(hits[3].score, 0.0);
    }

    #[test]
    fn search_respects_k_and_zero_query() {
        let index = VectorIndex::build(["tax one", "tax two", "tax three"]);
        let query = index.vectorizer().transform("tax");
        assert_eq!(index.search(&query, 2).len(), 2);
        assert!(index.search(&query, 0).is_empty());

        let unknown = index.vectorizer().transform("zoning");
        assert!(unknown.is_zero());
        let rows: Vec<usize> = index.search(&unknown, 2).iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![0, 1]);
    }

    #[test]
    fn dot_product_merges_sorted_entries() {
        let a = SparseVector::from_unsorted(vec![(3, 1.0), (1, 2.0)]);
        let b = SparseVector::from_unsorted(vec![(1, 0.5), (2, 4.0), (3, 1.0)]);
        assert!((a.dot(&b) - 2.0).abs() < 1e-6);
    }
}
