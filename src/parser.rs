use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{IndexError, Result};

/// Reads a Latin-1 file into a `String`, mapping each byte to the
/// Unicode scalar with the same value.
pub fn read_latin1(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}

/// Non-validating reader for TREC-style SGML collection files. Each
/// `<DOC>` record yields `(doc_id, text)` from its `<DOCNO>` and
/// `<TEXT>` regions; tags nested inside `<TEXT>` survive as literal
/// text for the analyzer to strip.
pub struct TrecParser {
    doc_pattern: Regex,
    docno_pattern: Regex,
    text_pattern: Regex,
}

impl TrecParser {
    pub fn new() -> Self {
        TrecParser {
            doc_pattern: Regex::new(r"(?s)<DOC>(.*?)</DOC>").unwrap(),
            docno_pattern: Regex::new(r"(?s)<DOCNO>(.*?)</DOCNO>").unwrap(),
            text_pattern: Regex::new(r"(?s)<TEXT>(.*?)</TEXT>").unwrap(),
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<Vec<(String, String)>> {
        let content = read_latin1(path)?;
        self.parse(&content, path)
    }

    /// Extracts all documents from one file's content. A record
    /// without `<DOCNO>` is fatal; a record without `<TEXT>` is
    /// skipped.
    pub fn parse(&self, content: &str, origin: &Path) -> Result<Vec<(String, String)>> {
        let mut documents = Vec::new();

        for record in self.doc_pattern.captures_iter(content) {
            let record = &record[1];

            let doc_id = match self.docno_pattern.captures(record) {
                Some(caps) => caps[1].trim().to_string(),
                None => {
                    return Err(IndexError::MissingDocno {
                        file: origin.to_path_buf(),
                    })
                }
            };

            let text = match self.text_pattern.captures(record) {
                Some(caps) => caps[1].trim().to_string(),
                None => continue,
            };

            documents.push((doc_id, text));
        }

        Ok(documents)
    }
}

impl Default for TrecParser {
    fn default() -> Self {
        TrecParser::new()
    }
}
