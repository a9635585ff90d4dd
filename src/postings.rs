use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::Path;

use crate::error::{IndexError, Result};

/// One document's occurrence count for a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: String,
    pub tf: u32,
}

/// One line of the on-disk index: a term, its document frequency and
/// the coalesced posting list. Document ids within an entry are
/// distinct and `document_frequency == postings.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub term: String,
    pub document_frequency: u32,
    pub postings: Vec<Posting>,
}

impl IndexEntry {
    pub fn new(term: String, postings: Vec<Posting>) -> Self {
        IndexEntry {
            term,
            document_frequency: postings.len() as u32,
            postings,
        }
    }

    /// Parses one `<term>\t<df>\t<doc>|<tf>,<doc>|<tf>,...` line.
    pub fn parse(line: &str) -> Result<IndexEntry> {
        let malformed = || IndexError::MalformedEntry(line.to_string());

        let mut parts = line.splitn(3, '\t');
        let term = parts.next().filter(|t| !t.is_empty()).ok_or_else(malformed)?;
        let document_frequency: u32 = parts
            .next()
            .and_then(|df| df.parse().ok())
            .ok_or_else(malformed)?;
        let postings_part = parts.next().ok_or_else(malformed)?;

        let mut postings = Vec::new();
        for posting in postings_part.split(',') {
            let (doc_id, tf) = posting.split_once('|').ok_or_else(malformed)?;
            let tf: u32 = tf.parse().map_err(|_| malformed())?;
            if doc_id.is_empty() || tf == 0 {
                return Err(malformed());
            }
            postings.push(Posting {
                doc_id: doc_id.to_string(),
                tf,
            });
        }
        if document_frequency as usize != postings.len() {
            return Err(malformed());
        }

        Ok(IndexEntry {
            term: term.to_string(),
            document_frequency,
            postings,
        })
    }

    /// Serialises the entry as one index line.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "{}\t{}\t", self.term, self.postings.len())?;
        for (i, posting) in self.postings.iter().enumerate() {
            if i > 0 {
                out.write_all(b",")?;
            }
            write!(out, "{}|{}", posting.doc_id, posting.tf)?;
        }
        out.write_all(b"\n")
    }
}

/// Accumulates postings, summing term frequencies for repeated
/// documents while preserving first-appearance order.
#[derive(Debug, Default)]
pub struct PostingAccumulator {
    postings: Vec<Posting>,
    slots: HashMap<String, usize>,
}

impl PostingAccumulator {
    pub fn new() -> Self {
        PostingAccumulator::default()
    }

    pub fn add(&mut self, doc_id: String, tf: u32) {
        if let Some(&slot) = self.slots.get(&doc_id) {
            self.postings[slot].tf += tf;
        } else {
            self.slots.insert(doc_id.clone(), self.postings.len());
            self.postings.push(Posting { doc_id, tf });
        }
    }

    pub fn into_postings(self) -> Vec<Posting> {
        self.postings
    }
}

/// Folds raw document-id occurrences into `(doc_id, tf)` postings,
/// keeping the order in which documents first appeared.
pub fn coalesce_postings<I>(doc_ids: I) -> Vec<Posting>
where
    I: IntoIterator<Item = String>,
{
    let mut acc = PostingAccumulator::new();
    for doc_id in doc_ids {
        acc.add(doc_id, 1);
    }
    acc.into_postings()
}

/// Streaming, forward-only reader over an on-disk index: the header
/// line is the collection's document count, every further line is one
/// `IndexEntry`. Restart by re-opening.
pub struct IndexReader {
    lines: Lines<BufReader<File>>,
    num_documents: u64,
}

impl IndexReader {
    pub fn open(path: &Path) -> Result<IndexReader> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .transpose()?
            .ok_or_else(|| IndexError::BadHeader(String::new()))?;
        let num_documents = header
            .parse()
            .map_err(|_| IndexError::BadHeader(header.clone()))?;

        Ok(IndexReader {
            lines,
            num_documents,
        })
    }

    pub fn num_documents(&self) -> u64 {
        self.num_documents
    }
}

impl Iterator for IndexReader {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lines.next()? {
            Ok(line) => Some(IndexEntry::parse(&line)),
            Err(e) => Some(Err(e.into())),
        }
    }
}
