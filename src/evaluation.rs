use log::info;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analyzer::TextAnalyzer;
use crate::error::Result;
use crate::parser::read_latin1;
use crate::postings::IndexEntry;
use crate::search::{rank, Bm25Params, RankingMethod};
use crate::stats::DocumentStats;

/// Results kept per topic in the aggregate run file.
pub const QREL_TOP_K: usize = 60;
/// Results printed by the interactive search command.
pub const SEARCH_TOP_K: usize = 50;

/// One `<top>` block, each field reduced to its normalised term set.
#[derive(Debug, Clone)]
pub struct Topic {
    pub id: String,
    pub title: HashSet<String>,
    pub desc: HashSet<String>,
    pub narr: HashSet<String>,
}

impl Topic {
    /// Query terms used for scoring: `title ∪ desc`, in sorted order
    /// for reproducible output.
    pub fn query_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = self.title.union(&self.desc).cloned().collect();
        terms.sort();
        terms
    }
}

/// Loads a TREC topic file, running every field through the analyzer.
pub fn load_topics(path: &Path, analyzer: &TextAnalyzer) -> Result<Vec<Topic>> {
    let content = read_latin1(path)?;
    Ok(parse_raw_topics(&content)
        .into_iter()
        .map(|raw| Topic {
            id: raw.id,
            title: analyzer.analyze(&raw.title).into_iter().collect(),
            desc: analyzer.analyze(&raw.desc).into_iter().collect(),
            narr: analyzer.analyze(&raw.narr).into_iter().collect(),
        })
        .collect())
}

struct RawTopic {
    id: String,
    title: String,
    desc: String,
    narr: String,
}

/// Line-oriented scanner over `<top>` blocks. `<num> Number: NNN`
/// carries the id; the `<title>` line carries inline content; every
/// further line up to the next tag accumulates to the current tag.
fn parse_raw_topics(content: &str) -> Vec<RawTopic> {
    let top_pattern = Regex::new(r"(?s)<top>(.*?)</top>").unwrap();
    let tag_pattern = Regex::new(r"^<(.*?)>").unwrap();

    let mut topics = Vec::new();
    for block in top_pattern.captures_iter(content) {
        let mut topic = RawTopic {
            id: String::new(),
            title: String::new(),
            desc: String::new(),
            narr: String::new(),
        };
        let mut current_tag: Option<String> = None;
        let mut current_lines: Vec<String> = Vec::new();

        for line in block[1].lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(tag_caps) = tag_pattern.captures(line) {
                let tag = tag_caps[1].to_string();

                if tag == "num" {
                    topic.id = line.replace("<num> Number: ", "").trim().to_string();
                    continue;
                }

                if let Some(done) = current_tag.take() {
                    assign_field(&mut topic, &done, current_lines.join(" "));
                }
                current_lines = Vec::new();
                if tag == "title" {
                    current_lines.push(line.replace("<title> ", "").trim().to_string());
                }
                current_tag = Some(tag);
                continue;
            }

            current_lines.push(line.to_string());
        }

        if let Some(done) = current_tag.take() {
            assign_field(&mut topic, &done, current_lines.join(" "));
        }
        topics.push(topic);
    }
    topics
}

fn assign_field(topic: &mut RawTopic, tag: &str, content: String) {
    match tag {
        "title" => topic.title = content,
        "desc" => topic.desc = content,
        "narr" => topic.narr = content,
        _ => {}
    }
}

/// Ranks every topic against the index and writes a TREC run file:
/// one `<topic> Q0 <doc> <rank> <score> <run_name>` line per result,
/// at most `top_k` per topic, ranks restarting at 1 for each topic.
#[allow(clippy::too_many_arguments)]
pub fn generate_run_file(
    method: RankingMethod,
    num_documents: u64,
    index: &[IndexEntry],
    stats: &DocumentStats,
    topics: &[Topic],
    output_path: &Path,
    run_name: &str,
    params: &Bm25Params,
    top_k: usize,
) -> Result<()> {
    info!("ranking {} topic(s) with {:?}", topics.len(), method);

    let mut out = BufWriter::new(File::create(output_path)?);
    for topic in topics {
        let query_terms = topic.query_terms();
        let scores = rank(
            method,
            num_documents,
            index.iter().cloned().map(Ok),
            &query_terms,
            stats,
            params,
        )?;
        for (position, (doc_id, score)) in scores.into_iter().take(top_k).enumerate() {
            writeln!(
                out,
                "{} Q0 {} {} {:.6} {}",
                topic.id,
                doc_id,
                position + 1,
                score,
                run_name
            )?;
        }
    }
    out.flush()?;
    Ok(())
}
