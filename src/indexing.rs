use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::analyzer::TextAnalyzer;
use crate::error::Result;
use crate::postings::{coalesce_postings, IndexEntry};
use crate::stats::DocumentStats;
use crate::tokens::TokenStream;

/// Writes one final index entry and accounts it in the document stats.
/// Every index-producing path funnels its entries through here so the
/// stats never need a second pass over the collection.
pub fn flush_index_entry<W: Write>(
    out: &mut W,
    entry: &IndexEntry,
    stats: &mut DocumentStats,
) -> io::Result<()> {
    stats.record(&entry.postings);
    entry.write_to(out)
}

/// Builds the index by materialising the whole token stream in memory:
/// stable-sort by term (which keeps each term's postings in document
/// first-appearance order), then sweep runs of equal terms into
/// coalesced entries. Only viable when the collection fits in memory;
/// SPIMI and map/reduce cover the rest.
pub fn build_simple_index(
    files: Vec<PathBuf>,
    analyzer: &TextAnalyzer,
    index_path: &Path,
    stats_path: &Path,
    show_progress: bool,
) -> Result<()> {
    let mut stream = TokenStream::new(files, analyzer);
    if show_progress {
        stream = stream.with_progress();
    }

    let mut tokens: Vec<(String, String)> = Vec::new();
    for token in &mut stream {
        let token = token?;
        tokens.push((token.doc_id, token.term));
    }
    let num_documents = stream.documents_processed();

    tokens.sort_by(|a, b| a.1.cmp(&b.1));

    let mut out = BufWriter::new(File::create(index_path)?);
    writeln!(out, "{}", num_documents)?;

    let mut stats = DocumentStats::new();
    let mut i = 0;
    while i < tokens.len() {
        let term = tokens[i].1.clone();
        let mut doc_ids = Vec::new();
        while i < tokens.len() && tokens[i].1 == term {
            doc_ids.push(std::mem::take(&mut tokens[i].0));
            i += 1;
        }
        let entry = IndexEntry::new(term, coalesce_postings(doc_ids));
        flush_index_entry(&mut out, &entry, &mut stats)?;
    }
    out.flush()?;
    stats.save(stats_path)?;

    Ok(())
}
