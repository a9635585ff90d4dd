use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::analyzer::TextAnalyzer;
use crate::error::Result;
use crate::parser::TrecParser;

/// One normalised term occurrence, together with the running number of
/// documents pulled from the collection so far.
#[derive(Debug, Clone)]
pub struct Token {
    pub doc_id: String,
    pub term: String,
    pub documents_processed: u64,
}

/// Lazy `(doc_id, term)` stream over a list of collection files,
/// composing the document reader with the text analyzer. A fatal parse
/// error is yielded once, after which the stream is exhausted.
pub struct TokenStream<'a> {
    analyzer: &'a TextAnalyzer,
    parser: TrecParser,
    files: std::vec::IntoIter<PathBuf>,
    documents: std::vec::IntoIter<(String, String)>,
    terms: std::vec::IntoIter<String>,
    current_doc: String,
    documents_processed: u64,
    progress: Option<ProgressBar>,
    failed: bool,
}

impl<'a> TokenStream<'a> {
    pub fn new(files: Vec<PathBuf>, analyzer: &'a TextAnalyzer) -> Self {
        TokenStream {
            analyzer,
            parser: TrecParser::new(),
            files: files.into_iter(),
            documents: Vec::new().into_iter(),
            terms: Vec::new().into_iter(),
            current_doc: String::new(),
            documents_processed: 0,
            progress: None,
            failed: false,
        }
    }

    /// Attaches a progress bar that advances once per input file.
    pub fn with_progress(mut self) -> Self {
        let pb = ProgressBar::new(self.files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                .unwrap(),
        );
        self.progress = Some(pb);
        self
    }

    /// Number of documents pulled so far; final once the stream is
    /// exhausted. Documents whose every token was filtered away still
    /// count.
    pub fn documents_processed(&self) -> u64 {
        self.documents_processed
    }
}

impl Iterator for TokenStream<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(term) = self.terms.next() {
                return Some(Ok(Token {
                    doc_id: self.current_doc.clone(),
                    term,
                    documents_processed: self.documents_processed,
                }));
            }

            if let Some((doc_id, text)) = self.documents.next() {
                self.documents_processed += 1;
                self.terms = self.analyzer.analyze(&text).into_iter();
                self.current_doc = doc_id;
                continue;
            }

            match self.files.next() {
                Some(path) => {
                    if let Some(pb) = &self.progress {
                        pb.set_message(format!("{}", path.display()));
                        pb.inc(1);
                    }
                    match self.parser.parse_file(&path) {
                        Ok(docs) => self.documents = docs.into_iter(),
                        Err(e) => {
                            self.failed = true;
                            return Some(Err(e));
                        }
                    }
                }
                None => {
                    if let Some(pb) = self.progress.take() {
                        pb.finish_and_clear();
                    }
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TextAnalyzer;
    use std::fs;
    use tempfile::TempDir;

    fn write_collection(dir: &TempDir, name: &str, docs: &[(&str, &str)]) -> PathBuf {
        let mut content = String::new();
        for (doc_id, text) in docs {
            content.push_str(&format!(
                "<DOC>\n<DOCNO>{}</DOCNO>\n<TEXT>{}</TEXT>\n</DOC>\n",
                doc_id, text
            ));
        }
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_stream_yields_terms_with_running_doc_count() {
        let dir = TempDir::new().unwrap();
        let file = write_collection(
            &dir,
            "docs",
            &[("d1", "glasnost policy"), ("d2", "policy reform")],
        );

        let analyzer = TextAnalyzer::default();
        let mut stream = TokenStream::new(vec![file], &analyzer);
        let tokens: Vec<Token> = (&mut stream).map(|t| t.unwrap()).collect();

        let pairs: Vec<(&str, &str, u64)> = tokens
            .iter()
            .map(|t| (t.doc_id.as_str(), t.term.as_str(), t.documents_processed))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("d1", "glasnost", 1),
                ("d1", "polici", 1),
                ("d2", "polici", 2),
                ("d2", "reform", 2),
            ]
        );
        assert_eq!(stream.documents_processed(), 2);
    }

    #[test]
    fn test_documents_without_surviving_terms_still_count() {
        let dir = TempDir::new().unwrap();
        // "of the" is removed entirely by stop-word filtering
        let file = write_collection(&dir, "docs", &[("d1", "of the"), ("d2", "glasnost")]);

        let analyzer = TextAnalyzer::default();
        let mut stream = TokenStream::new(vec![file], &analyzer);
        let tokens: Vec<Token> = (&mut stream).map(|t| t.unwrap()).collect();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].documents_processed, 2);
        assert_eq!(stream.documents_processed(), 2);
    }

    #[test]
    fn test_parse_error_ends_the_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken");
        fs::write(&path, "<DOC><TEXT>no docno</TEXT></DOC>").unwrap();

        let analyzer = TextAnalyzer::default();
        let mut stream = TokenStream::new(vec![path], &analyzer);
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }
}
