//! # Text Preprocessor
//!
//! Tokenizes documents on word-character runs and filters stopwords.
//!
//! One corpus is exposed through three views that always hold the same number
//! of documents, in the same order:
//!
//! - `joined` - lower-cased tokens joined by spaces, fed to the vectorizer.
//!   Stopwords are matched *case-sensitively* against the lower-cased tokens,
//!   so an exclude word spelled with capitals never matches here.
//! - `tokens` - tokens in their original case, dropped when their lower-cased
//!   form matches a lower-cased stop-list entry. Used by the embedding path.
//! - `reference` - lower-cased tokens with no filtering at all. The coherence
//!   reference corpus is built from this view.
//!
//! Documents that lose every token stay in place as empty entries.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w+\b").expect("Failed to compile token pattern"));

/// Classic English stopword list.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

/// Split text into word-character runs.
pub fn tokenize(text: &str) -> Vec<&str> {
    TOKEN_PATTERN.find_iter(text).map(|m| m.as_str()).collect()
}

/// The three token views of one corpus.
///
/// # Fields
/// * `joined`: Filtered, lower-cased text for the vectorizer
/// * `tokens`: Filtered tokens in original case
/// * `reference`: Unfiltered lower-cased tokens for coherence scoring
#[derive(Debug, Clone)]
pub struct ProcessedCorpus {
    pub joined: Vec<String>,
    pub tokens: Vec<Vec<String>>,
    pub reference: Vec<Vec<String>>,
}

impl ProcessedCorpus {
    pub fn len(&self) -> usize {
        self.joined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joined.is_empty()
    }
}

/// A preprocessor for text
///
/// # Fields
/// * `stopwords`: Built-in list plus caller exclusions as supplied; empty when filtering is off
/// * `folded`: The same list lower-cased
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    stopwords: HashSet<String>,
    folded: HashSet<String>,
}

impl Preprocessor {
    /// Create a new preprocessor
    ///
    /// # Arguments
    /// * `remove_stopwords`: Whether any filtering happens at all
    /// * `exclude`: Extra words filtered alongside the built-in list
    ///
    /// # Examples
    /// ```
    /// use topic_lens::preprocess::Preprocessor;
    /// let processor = Preprocessor::new(true, &["rust".to_string()]);
    /// assert!(processor.is_stopword("the"));
    /// ```
    pub fn new(remove_stopwords: bool, exclude: &[String]) -> Self {
        if !remove_stopwords {
            return Self::default();
        }
        let stopwords: HashSet<String> = ENGLISH_STOPWORDS
            .iter()
            .map(|w| w.to_string())
            .chain(exclude.iter().cloned())
            .collect();
        let folded = stopwords.iter().map(|w| w.to_lowercase()).collect();
        Self { stopwords, folded }
    }

    /// Exact, case-sensitive stop-list membership.
    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Lower-case the text, tokenize, drop exact stop-list matches.
    pub fn vectorizer_tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        tokenize(&lowered)
            .into_iter()
            .filter(|token| !self.is_stopword(token))
            .map(str::to_string)
            .collect()
    }

    /// Tokenize in original case, drop tokens whose lower-cased form is listed
    /// in lower case.
    pub fn filtered_tokens(&self, text: &str) -> Vec<String> {
        tokenize(text)
            .into_iter()
            .filter(|token| !self.folded.contains(&token.to_lowercase()))
            .map(str::to_string)
            .collect()
    }

    /// Lower-cased tokens with no filtering.
    pub fn reference_tokens(text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        tokenize(&lowered).into_iter().map(str::to_string).collect()
    }

    /// Build all three views for a corpus.
    pub fn process(&self, documents: &[String]) -> ProcessedCorpus {
        let mut joined = Vec::with_capacity(documents.len());
        let mut tokens = Vec::with_capacity(documents.len());
        let mut reference = Vec::with_capacity(documents.len());

        for doc in documents {
            joined.push(self.vectorizer_tokens(doc).join(" "));
            tokens.push(self.filtered_tokens(doc));
            reference.push(Self::reference_tokens(doc));
        }

        ProcessedCorpus { joined, tokens, reference }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn tokenizes_on_word_runs() {
        assert_eq!(tokenize("Rust's borrow-checker, v2!"), vec!["Rust", "s", "borrow", "checker", "v2"]);
    }

    #[test]
    fn no_filtering_when_flag_is_off() {
        let processor = Preprocessor::new(false, &["rust".to_string()]);
        assert_eq!(processor.vectorizer_tokens("The Rust book"), vec!["the", "rust", "book"]);
    }

    #[test]
    fn exclude_list_joins_builtin_list() {
        let processor = Preprocessor::new(true, &["rust".to_string()]);
        assert_eq!(processor.vectorizer_tokens("The Rust book"), vec!["book"]);
    }

    #[test]
    fn preserves_document_count_and_order() {
        let processor = Preprocessor::new(true, &[]);
        let corpus = processor.process(&docs(&["the and of", "ocean waves", "the"]));
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.joined, vec!["", "ocean waves", ""]);
        assert!(corpus.tokens[0].is_empty());
        assert_eq!(corpus.tokens[1], vec!["ocean", "waves"]);
        // Reference view is never filtered.
        assert_eq!(corpus.reference[0], vec!["the", "and", "of"]);
    }

    // Known inconsistency kept on purpose: the vectorizer view compares the
    // lower-cased token to the stop list as-is, the token view lower-cases first.
    #[test]
    fn capitalised_exclude_word_only_filters_token_view() {
        let processor = Preprocessor::new(true, &["Rust".to_string()]);
        assert_eq!(processor.vectorizer_tokens("Rust rocks"), vec!["rust", "rocks"]);
        assert_eq!(processor.filtered_tokens("Rust rocks"), vec!["rocks"]);

        let lower = Preprocessor::new(true, &["rust".to_string()]);
        assert_eq!(lower.vectorizer_tokens("Rust rocks"), vec!["rocks"]);
        assert_eq!(lower.filtered_tokens("Rust rocks"), vec!["rocks"]);
    }

    #[test]
    fn token_view_keeps_original_case() {
        let processor = Preprocessor::new(true, &[]);
        assert_eq!(processor.filtered_tokens("The Pacific Ocean"), vec!["Pacific", "Ocean"]);
    }
}
