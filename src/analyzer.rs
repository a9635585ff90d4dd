use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;

/// English stop words removed before stemming.
/// From https://www.textfixer.com/tutorials/common-english-words.txt
const STOP_WORDS: &[&str] = &[
    "a", "able", "about", "across", "after", "all", "almost", "also", "am", "among", "an", "and",
    "any", "are", "as", "at", "be", "because", "been", "but", "by", "can", "cannot", "could",
    "dear", "did", "do", "does", "either", "else", "ever", "every", "for", "from", "get", "got",
    "had", "has", "have", "he", "her", "hers", "him", "his", "how", "however", "i", "if", "in",
    "into", "is", "it", "its", "just", "least", "let", "like", "likely", "may", "me", "might",
    "most", "must", "my", "neither", "no", "nor", "not", "of", "off", "often", "on", "only", "or",
    "other", "our", "own", "rather", "said", "say", "says", "she", "should", "since", "so",
    "some", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "tis", "to", "too", "twas", "us", "wants", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "yet", "you", "your",
];

/// Word -> word transformation applied when the `lemmatiser` stage is
/// enabled. Lemmatisation itself is an external collaborator; the
/// analyzer only fixes where it runs in the pipeline.
pub type LemmaFn = Box<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub case_folding: bool,
    pub remove_stop_words: bool,
    pub stemmer: bool,
    pub lemmatiser: bool,
    pub min_length: usize,
    pub strip_html_tags: bool,
    pub strip_html_entities: bool,
    pub strip_square_bracket_tags: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            case_folding: true,
            remove_stop_words: true,
            stemmer: true,
            lemmatiser: false,
            min_length: 2,
            strip_html_tags: true,
            strip_html_entities: true,
            strip_square_bracket_tags: true,
        }
    }
}

/// Turns raw text regions into normalised terms: tag stripping, word
/// splitting, case folding, stop-word removal, stemming, optional
/// lemmatisation and a minimum-length filter, in that fixed order.
/// Disabled stages are skipped; the remaining order is preserved.
pub struct TextAnalyzer {
    config: AnalyzerConfig,
    stop_words: HashSet<&'static str>,
    stemmer: Stemmer,
    lemmatizer: Option<LemmaFn>,
    tag_pattern: Regex,
    entity_pattern: Regex,
    bracket_pattern: Regex,
    split_pattern: Regex,
}

impl TextAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        TextAnalyzer {
            config,
            stop_words: STOP_WORDS.iter().copied().collect(),
            stemmer: Stemmer::create(Algorithm::English),
            lemmatizer: None,
            tag_pattern: Regex::new(r"<.*?>").unwrap(),
            entity_pattern: Regex::new("&[a-zA-Z][-.a-zA-Z0-9]*[^a-zA-Z0-9]").unwrap(),
            bracket_pattern: Regex::new(r"\[.*?\]").unwrap(),
            split_pattern: Regex::new(r#"[\s.:?()\[\]{}<>'!"\-,;$*%#]"#).unwrap(),
        }
    }

    /// Installs the lemmatisation function used when the `lemmatiser`
    /// option is on. Without one, the identity mapping is applied.
    pub fn with_lemmatizer(mut self, lemmatizer: LemmaFn) -> Self {
        self.lemmatizer = Some(lemmatizer);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Splits a raw text region into words. Tag-like regions are
    /// removed first (when enabled); empty tokens are dropped.
    pub fn split_words(&self, text: &str) -> Vec<String> {
        let mut stripped = text.to_string();
        if self.config.strip_html_tags {
            stripped = self.tag_pattern.replace_all(&stripped, "").into_owned();
        }
        if self.config.strip_html_entities {
            stripped = self.entity_pattern.replace_all(&stripped, "").into_owned();
        }
        if self.config.strip_square_bracket_tags {
            stripped = self.bracket_pattern.replace_all(&stripped, "").into_owned();
        }

        self.split_pattern
            .split(&stripped)
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Applies the enabled normalisation stages to already-split words.
    pub fn preprocess(&self, words: Vec<String>) -> Vec<String> {
        let mut words = words;

        if self.config.case_folding {
            words = words.iter().map(|word| word.to_lowercase()).collect();
        }
        if self.config.remove_stop_words {
            words.retain(|word| !self.stop_words.contains(word.as_str()));
        }
        if self.config.stemmer {
            words = words
                .iter()
                .map(|word| self.stemmer.stem(word).into_owned())
                .collect();
        }
        if self.config.lemmatiser {
            if let Some(lemmatize) = &self.lemmatizer {
                words = words.iter().map(|word| lemmatize(word)).collect();
            }
        }
        if self.config.min_length > 0 {
            words.retain(|word| word.chars().count() >= self.config.min_length);
        }

        words
    }

    /// Full pipeline: split then preprocess.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.preprocess(self.split_words(text))
    }
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        TextAnalyzer::new(AnalyzerConfig::default())
    }
}
