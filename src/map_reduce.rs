use log::{debug, info};
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::analyzer::TextAnalyzer;
use crate::error::{IndexError, Result};
use crate::indexing::flush_index_entry;
use crate::postings::{coalesce_postings, IndexEntry};
use crate::stats::DocumentStats;
use crate::tokens::TokenStream;

/// Alphabetic buckets sharding the postings by first character. A
/// bucket labelled `xy` owns every first character up to and
/// including `y`; the final bucket catches everything above `u`,
/// non-ASCII included. The assembly step concatenates results in
/// exactly this order.
pub const PARTITIONS: [&str; 10] = [
    "aa", "bc", "de", "fh", "ij", "km", "nq", "rs", "tu", "vz",
];

/// Lines held in memory per sorted run during the external sort.
const SORT_RUN_LINES: usize = 500_000;

#[derive(Debug, Clone)]
pub struct MapReduceConfig {
    /// Work-unit size in MiB for the split phase.
    pub blocksize_mib: u64,
    /// Worker-pool size; `None` uses the available CPU count.
    pub num_workers: Option<usize>,
}

impl Default for MapReduceConfig {
    fn default() -> Self {
        MapReduceConfig {
            blocksize_mib: 16,
            num_workers: None,
        }
    }
}

/// Maps a term to its partition by first character.
pub fn partition_for(term: &str) -> usize {
    let first = term.chars().next().unwrap_or('a');
    for (index, partition) in PARTITIONS.iter().enumerate() {
        if index == PARTITIONS.len() - 1 {
            break;
        }
        let high = partition.chars().nth(1).unwrap();
        if first <= high {
            return index;
        }
    }
    PARTITIONS.len() - 1
}

/// Greedily packs whole files into work units whose total size stays
/// within `blocksize_mib` MiB; a single oversized file forms its own
/// unit and no trailing unit is dropped.
pub fn split_work_units(files: &[PathBuf], blocksize_mib: u64) -> io::Result<Vec<Vec<PathBuf>>> {
    let limit = blocksize_mib * 1024 * 1024;
    let mut units = Vec::new();
    let mut unit: Vec<PathBuf> = Vec::new();
    let mut unit_size = 0u64;

    for file in files {
        let size = fs::metadata(file)?.len();
        if !unit.is_empty() && unit_size + size > limit {
            units.push(std::mem::take(&mut unit));
            unit_size = 0;
        }
        unit.push(file.clone());
        unit_size += size;
    }
    if !unit.is_empty() {
        units.push(unit);
    }
    Ok(units)
}

/// Builds the index with the map/partition/reduce pipeline: tokenise
/// work units in parallel into per-partition segment files, reduce
/// each partition independently, then assemble the results in fixed
/// partition order. Produces the same index as SPIMI up to
/// within-term posting order.
pub fn build_map_reduce_index(
    files: Vec<PathBuf>,
    analyzer: &TextAnalyzer,
    index_path: &Path,
    stats_path: &Path,
    config: &MapReduceConfig,
) -> Result<()> {
    let scratch = crate::scratch_dir();
    let segment_dir = tempfile::Builder::new()
        .prefix("concordance-segments-")
        .tempdir_in(&scratch)?;
    let posting_dir = tempfile::Builder::new()
        .prefix("concordance-postings-")
        .tempdir_in(&scratch)?;

    let result = run_pipeline(
        &files,
        analyzer,
        index_path,
        stats_path,
        config,
        segment_dir.path(),
        posting_dir.path(),
    );

    // both temp dirs are removed on drop, success or failure
    if result.is_err() {
        let _ = fs::remove_file(index_path);
        let _ = fs::remove_file(stats_path);
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn run_pipeline(
    files: &[PathBuf],
    analyzer: &TextAnalyzer,
    index_path: &Path,
    stats_path: &Path,
    config: &MapReduceConfig,
    segment_dir: &Path,
    posting_dir: &Path,
) -> Result<()> {
    let units = split_work_units(files, config.blocksize_mib)?;
    info!(
        "map/reduce build: {} file(s) in {} work unit(s)",
        files.len(),
        units.len()
    );

    match config.num_workers {
        Some(workers) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| IndexError::Pool(e.to_string()))?;
            pool.install(|| run_parallel_phases(&units, analyzer, segment_dir, posting_dir))?;
        }
        None => run_parallel_phases(&units, analyzer, segment_dir, posting_dir)?,
    }

    assemble(index_path, stats_path, segment_dir, posting_dir)
}

fn run_parallel_phases(
    units: &[Vec<PathBuf>],
    analyzer: &TextAnalyzer,
    segment_dir: &Path,
    posting_dir: &Path,
) -> Result<()> {
    info!("map phase: {} unit(s)", units.len());
    units
        .par_iter()
        .enumerate()
        .map(|(unit_id, unit)| map_unit(unit_id, unit.clone(), analyzer, segment_dir))
        .collect::<Result<Vec<()>>>()
        .map_err(|e| IndexError::worker_failed("map", e))?;

    info!("reduce phase: {} partition(s)", PARTITIONS.len());
    PARTITIONS
        .par_iter()
        .map(|partition| reduce_partition(partition, segment_dir, posting_dir))
        .collect::<Result<Vec<()>>>()
        .map_err(|e| IndexError::worker_failed("reduce", e))?;

    Ok(())
}

/// Map phase worker: tokenises one work unit and appends every
/// `(term, doc_id)` pair to the unit's per-partition segment file,
/// one pair per occurrence. The unit's document count goes to a
/// `meta_` file for the assembly step.
fn map_unit(
    unit_id: usize,
    unit: Vec<PathBuf>,
    analyzer: &TextAnalyzer,
    segment_dir: &Path,
) -> Result<()> {
    let mut segments: Vec<Vec<(String, String)>> = vec![Vec::new(); PARTITIONS.len()];

    let mut stream = TokenStream::new(unit, analyzer);
    for token in &mut stream {
        let token = token?;
        segments[partition_for(&token.term)].push((token.term, token.doc_id));
    }
    let documents_processed = stream.documents_processed();

    for (index, segment) in segments.into_iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        let path = segment_dir.join(format!("{}_{}", PARTITIONS[index], unit_id));
        let mut out = BufWriter::new(File::create(&path)?);
        for (term, doc_id) in &segment {
            writeln!(out, "{}\t{}", term, doc_id)?;
        }
        out.flush()?;
    }

    fs::write(
        segment_dir.join(format!("meta_{}", unit_id)),
        format!("{}\n", documents_processed),
    )?;
    debug!("map unit {} done ({} documents)", unit_id, documents_processed);
    Ok(())
}

/// Reduce phase worker: external-sorts one partition's segment lines
/// (which orders them by term, then doc id) and sweeps equal-term
/// runs into coalesced index entries, collecting partition stats.
fn reduce_partition(partition: &str, segment_dir: &Path, posting_dir: &Path) -> Result<()> {
    let prefix = format!("{}_", partition);
    let mut inputs: Vec<PathBuf> = fs::read_dir(segment_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
        .collect();
    inputs.sort();

    let sorted_path = posting_dir.join(partition);
    external_sort_lines(&inputs, &sorted_path, SORT_RUN_LINES, posting_dir)?;

    let result_path = posting_dir.join(format!("res_{}", partition));
    let mut out = BufWriter::new(File::create(&result_path)?);
    let mut stats = DocumentStats::new();

    let mut current_term: Option<String> = None;
    let mut doc_ids: Vec<String> = Vec::new();
    for line in BufReader::new(File::open(&sorted_path)?).lines() {
        let line = line?;
        let (term, doc_id) = line
            .split_once('\t')
            .ok_or_else(|| IndexError::MalformedEntry(line.clone()))?;

        if current_term.as_deref() != Some(term) {
            if let Some(done) = current_term.take() {
                let entry = IndexEntry::new(done, coalesce_postings(doc_ids.drain(..)));
                flush_index_entry(&mut out, &entry, &mut stats)?;
            }
            current_term = Some(term.to_string());
        }
        doc_ids.push(doc_id.to_string());
    }
    if let Some(done) = current_term.take() {
        let entry = IndexEntry::new(done, coalesce_postings(doc_ids.drain(..)));
        flush_index_entry(&mut out, &entry, &mut stats)?;
    }
    out.flush()?;

    stats.save(&posting_dir.join(format!("stats_{}", partition)))?;
    fs::remove_file(&sorted_path)?;
    debug!("partition {} reduced", partition);
    Ok(())
}

/// Bounded-memory line sort: accumulate up to `run_lines` lines, sort
/// and spill each run, then merge the runs with a heap keyed by
/// `(line, run)`.
fn external_sort_lines(
    inputs: &[PathBuf],
    output: &Path,
    run_lines: usize,
    scratch: &Path,
) -> Result<()> {
    let mut runs: Vec<PathBuf> = Vec::new();
    let mut buffer: Vec<String> = Vec::new();

    for input in inputs {
        for line in BufReader::new(File::open(input)?).lines() {
            buffer.push(line?);
            if buffer.len() >= run_lines {
                runs.push(write_sorted_run(&mut buffer, scratch)?);
            }
        }
    }

    if runs.is_empty() {
        buffer.sort();
        let mut out = BufWriter::new(File::create(output)?);
        for line in &buffer {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        return Ok(());
    }

    if !buffer.is_empty() {
        runs.push(write_sorted_run(&mut buffer, scratch)?);
    }
    merge_sorted_runs(&runs, output)?;
    for run in &runs {
        let _ = fs::remove_file(run);
    }
    Ok(())
}

fn write_sorted_run(buffer: &mut Vec<String>, scratch: &Path) -> Result<PathBuf> {
    buffer.sort();
    let run = tempfile::Builder::new()
        .prefix("concordance-run-")
        .tempfile_in(scratch)?;
    let (file, path) = run.keep().map_err(|e| IndexError::Io(e.error))?;

    let mut out = BufWriter::new(file);
    for line in buffer.drain(..) {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(path)
}

fn merge_sorted_runs(runs: &[PathBuf], output: &Path) -> Result<()> {
    let mut sources = Vec::with_capacity(runs.len());
    let mut heap: BinaryHeap<Reverse<(String, usize)>> = BinaryHeap::new();

    for (source, run) in runs.iter().enumerate() {
        let mut lines = BufReader::new(File::open(run)?).lines();
        if let Some(line) = lines.next() {
            heap.push(Reverse((line?, source)));
        }
        sources.push(lines);
    }

    let mut out = BufWriter::new(File::create(output)?);
    while let Some(Reverse((line, source))) = heap.pop() {
        writeln!(out, "{}", line)?;
        if let Some(next) = sources[source].next() {
            heap.push(Reverse((next?, source)));
        }
    }
    out.flush()?;
    Ok(())
}

/// Assembly: the header is the sum of all `meta_` counts, followed by
/// the partition results in fixed partition order; partition stats
/// are summed into the final stats file.
fn assemble(
    index_path: &Path,
    stats_path: &Path,
    segment_dir: &Path,
    posting_dir: &Path,
) -> Result<()> {
    let num_documents = sum_meta_counts(segment_dir)?;

    let mut out = BufWriter::new(File::create(index_path)?);
    writeln!(out, "{}", num_documents)?;
    for partition in &PARTITIONS {
        let path = posting_dir.join(format!("res_{}", partition));
        if path.exists() {
            io::copy(&mut File::open(&path)?, &mut out)?;
        }
    }
    out.flush()?;

    let mut stats = DocumentStats::new();
    for partition in &PARTITIONS {
        let path = posting_dir.join(format!("stats_{}", partition));
        if path.exists() {
            stats.merge(DocumentStats::load(&path)?);
        }
    }
    stats.save(stats_path)?;

    info!("assembled index for {} document(s)", num_documents);
    Ok(())
}

fn sum_meta_counts(segment_dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in fs::read_dir(segment_dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with("meta_") {
            continue;
        }
        let content = fs::read_to_string(entry.path())?;
        for line in content.lines() {
            total += line
                .trim()
                .parse::<u64>()
                .map_err(|_| IndexError::MalformedEntry(line.to_string()))?;
        }
    }
    Ok(total)
}
