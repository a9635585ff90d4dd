use log::{debug, info};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use crate::analyzer::TextAnalyzer;
use crate::error::{IndexError, Result};
use crate::indexing::flush_index_entry;
use crate::postings::{coalesce_postings, IndexEntry, PostingAccumulator};
use crate::stats::DocumentStats;
use crate::tokens::TokenStream;

/// Single-Pass In-Memory block builder. Buffers a `term -> doc ids`
/// map until `max_tokens_per_block` postings have been accepted, then
/// flushes one term-sorted block file into the scratch directory.
/// The token budget counts every accepted posting, not distinct
/// terms; it is the only knob bounding peak memory.
pub struct SpimiIndexer {
    max_tokens_per_block: usize,
    scratch_dir: PathBuf,
    dict: HashMap<String, Vec<String>>,
    tokens_in_block: usize,
    blocks: Vec<PathBuf>,
}

impl SpimiIndexer {
    pub fn new(max_tokens_per_block: usize, scratch_dir: impl Into<PathBuf>) -> Self {
        SpimiIndexer {
            max_tokens_per_block,
            scratch_dir: scratch_dir.into(),
            dict: HashMap::new(),
            tokens_in_block: 0,
            blocks: Vec::new(),
        }
    }

    /// Buffers one token occurrence, flushing when the block is full.
    pub fn accept(&mut self, doc_id: &str, term: &str) -> Result<()> {
        self.dict
            .entry(term.to_string())
            .or_default()
            .push(doc_id.to_string());
        self.tokens_in_block += 1;

        if self.tokens_in_block == self.max_tokens_per_block {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the buffered block as a term-sorted file and clears the
    /// in-memory state. An empty block produces no file.
    pub fn flush(&mut self) -> Result<()> {
        if self.dict.is_empty() {
            self.tokens_in_block = 0;
            return Ok(());
        }

        let mut terms: Vec<(String, Vec<String>)> = self.dict.drain().collect();
        terms.sort_by(|a, b| a.0.cmp(&b.0));

        let block = tempfile::Builder::new()
            .prefix("concordance-block-")
            .suffix(".blk")
            .tempfile_in(&self.scratch_dir)?;
        let (file, path) = block.keep().map_err(|e| IndexError::Io(e.error))?;

        let mut out = BufWriter::new(file);
        for (term, doc_ids) in terms {
            let entry = IndexEntry::new(term, coalesce_postings(doc_ids));
            entry.write_to(&mut out)?;
        }
        out.flush()?;

        debug!(
            "flushed block {} ({} tokens)",
            path.display(),
            self.tokens_in_block
        );
        self.blocks.push(path);
        self.tokens_in_block = 0;
        Ok(())
    }

    pub fn buffered_tokens(&self) -> usize {
        self.tokens_in_block
    }

    pub fn block_files(&self) -> &[PathBuf] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<PathBuf> {
        self.blocks
    }
}

/// Builds the on-disk index with SPIMI block construction followed by
/// a k-way merge. Blocks are deleted after a successful merge and
/// retained on failure; a failed merge also removes the partial
/// output.
pub fn build_spimi_index(
    files: Vec<PathBuf>,
    analyzer: &TextAnalyzer,
    index_path: &Path,
    stats_path: &Path,
    max_tokens_per_block: usize,
    show_progress: bool,
) -> Result<()> {
    build_spimi_index_in(
        &crate::scratch_dir(),
        files,
        analyzer,
        index_path,
        stats_path,
        max_tokens_per_block,
        show_progress,
    )
}

/// As [`build_spimi_index`], with an explicit scratch directory for
/// the block files.
#[allow(clippy::too_many_arguments)]
pub fn build_spimi_index_in(
    scratch: &Path,
    files: Vec<PathBuf>,
    analyzer: &TextAnalyzer,
    index_path: &Path,
    stats_path: &Path,
    max_tokens_per_block: usize,
    show_progress: bool,
) -> Result<()> {
    let mut indexer = SpimiIndexer::new(max_tokens_per_block, scratch);

    let mut stream = TokenStream::new(files, analyzer);
    if show_progress {
        stream = stream.with_progress();
    }
    for token in &mut stream {
        let token = token?;
        indexer.accept(&token.doc_id, &token.term)?;
    }
    indexer.flush()?;
    let num_documents = stream.documents_processed();
    let blocks = indexer.into_blocks();

    info!("merging {} block(s)", blocks.len());

    match write_merged_index(index_path, stats_path, num_documents, &blocks) {
        Ok(()) => {
            for block in &blocks {
                let _ = fs::remove_file(block);
            }
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(index_path);
            let _ = fs::remove_file(stats_path);
            Err(e)
        }
    }
}

fn write_merged_index(
    index_path: &Path,
    stats_path: &Path,
    num_documents: u64,
    blocks: &[PathBuf],
) -> Result<()> {
    let mut out = BufWriter::new(File::create(index_path)?);
    writeln!(out, "{}", num_documents)?;

    let mut stats = DocumentStats::new();
    merge_blocks(&mut out, blocks, &mut stats)?;
    out.flush()?;
    stats.save(stats_path)?;
    Ok(())
}

struct BlockSource {
    lines: Lines<BufReader<File>>,
}

impl BlockSource {
    fn open(path: &Path) -> Result<BlockSource> {
        Ok(BlockSource {
            lines: BufReader::new(File::open(path)?).lines(),
        })
    }

    fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        match self.lines.next() {
            None => Ok(None),
            Some(line) => Ok(Some(IndexEntry::parse(&line?)?)),
        }
    }
}

/// Heap key for the k-way merge: smallest term first, sources in
/// creation order on ties so the fold sees blocks in flush order.
struct HeadEntry {
    term: String,
    source: usize,
    entry: IndexEntry,
}

impl PartialEq for HeadEntry {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.source == other.source
    }
}

impl Eq for HeadEntry {}

impl PartialOrd for HeadEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeadEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.term
            .cmp(&other.term)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges term-sorted block files into `out`. All heads tied on the
/// lexicographically smallest term are fused into a single entry,
/// summing term frequencies for documents shared between blocks, and
/// every merged entry is accounted in `stats`.
pub fn merge_blocks<W: Write>(
    out: &mut W,
    blocks: &[PathBuf],
    stats: &mut DocumentStats,
) -> Result<()> {
    let mut sources = Vec::with_capacity(blocks.len());
    let mut heap: BinaryHeap<Reverse<HeadEntry>> = BinaryHeap::new();

    for (source, path) in blocks.iter().enumerate() {
        let mut block = BlockSource::open(path)?;
        if let Some(entry) = block.next_entry()? {
            heap.push(Reverse(HeadEntry {
                term: entry.term.clone(),
                source,
                entry,
            }));
        }
        sources.push(block);
    }

    let mut merged_terms = 0u64;
    while let Some(Reverse(head)) = heap.pop() {
        let term = head.term;
        let mut acc = PostingAccumulator::new();
        for posting in head.entry.postings {
            acc.add(posting.doc_id, posting.tf);
        }
        let mut contributors = vec![head.source];

        while heap.peek().map_or(false, |next| next.0.term == term) {
            let Reverse(tied) = heap.pop().unwrap();
            for posting in tied.entry.postings {
                acc.add(posting.doc_id, posting.tf);
            }
            contributors.push(tied.source);
        }

        for source in contributors {
            if let Some(entry) = sources[source].next_entry()? {
                heap.push(Reverse(HeadEntry {
                    term: entry.term.clone(),
                    source,
                    entry,
                }));
            }
        }

        let entry = IndexEntry::new(term, acc.into_postings());
        flush_index_entry(out, &entry, stats)?;

        merged_terms += 1;
        if merged_terms % 10_000 == 0 {
            debug!("merged {} terms", merged_terms);
        }
    }

    Ok(())
}
