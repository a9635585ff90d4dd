use log::debug;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::postings::IndexEntry;
use crate::stats::DocumentStats;

/// Ranking functions available over a built index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMethod {
    Tfidf,
    CosineTfidf,
    Bm25,
    Bm25Va,
}

/// Okapi weighting constants shared by BM25 and BM25-VA.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub k3: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params {
            k1: 1.2,
            b: 0.75,
            k3: 8.0,
        }
    }
}

/// A document touched by at least one query term, in the order the
/// index scan first reached it. `terms` maps query terms to their
/// frequency in this document.
struct MatchedDocument {
    doc_id: String,
    terms: HashMap<String, u32>,
}

/// Runs one ranking method over the index. `query_terms` is a
/// multiset: repeated terms raise `tfq` for the Okapi scorers. The
/// result is sorted by descending score; the sort is stable, so ties
/// keep first-seen order. Only documents matching at least one query
/// term appear; an empty query yields an empty list.
pub fn rank<I>(
    method: RankingMethod,
    num_documents: u64,
    index: I,
    query_terms: &[String],
    stats: &DocumentStats,
    params: &Bm25Params,
) -> Result<Vec<(String, f64)>>
where
    I: IntoIterator<Item = Result<IndexEntry>>,
{
    if query_terms.is_empty() {
        return Ok(Vec::new());
    }

    let (tokens, documents) = collect_matches(index, query_terms)?;
    debug!(
        "query matched {} term(s) across {} document(s)",
        tokens.len(),
        documents.len()
    );

    let query_tf = query_term_frequencies(query_terms);
    let mut scores = match method {
        RankingMethod::Tfidf => tfidf_scores(num_documents, &tokens, &documents),
        RankingMethod::CosineTfidf => {
            cosine_tfidf_scores(num_documents, &tokens, &documents, &query_tf)
        }
        RankingMethod::Bm25 => {
            bm25_scores(num_documents, &tokens, &documents, &query_tf, stats, params)?
        }
        RankingMethod::Bm25Va => {
            bm25va_scores(num_documents, &tokens, &documents, &query_tf, stats, params)?
        }
    };

    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scores)
}

/// The single pass over the index: retains the entries whose term is
/// in the query set, stopping early once every query term was seen
/// (index terms are unique and strictly increasing), and gathers the
/// matched documents in first-appearance order.
fn collect_matches<I>(
    index: I,
    query_terms: &[String],
) -> Result<(Vec<IndexEntry>, Vec<MatchedDocument>)>
where
    I: IntoIterator<Item = Result<IndexEntry>>,
{
    let mut needles: HashSet<&str> = query_terms.iter().map(String::as_str).collect();
    let mut tokens = Vec::new();

    for entry in index {
        if needles.is_empty() {
            break;
        }
        let entry = entry?;
        if needles.remove(entry.term.as_str()) {
            tokens.push(entry);
        }
    }

    let mut documents: Vec<MatchedDocument> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for token in &tokens {
        for posting in &token.postings {
            let slot = match slots.get(posting.doc_id.as_str()) {
                Some(&slot) => slot,
                None => {
                    slots.insert(posting.doc_id.clone(), documents.len());
                    documents.push(MatchedDocument {
                        doc_id: posting.doc_id.clone(),
                        terms: HashMap::new(),
                    });
                    documents.len() - 1
                }
            };
            documents[slot].terms.insert(token.term.clone(), posting.tf);
        }
    }

    Ok((tokens, documents))
}

fn query_term_frequencies(query_terms: &[String]) -> HashMap<&str, u32> {
    let mut tfq = HashMap::new();
    for term in query_terms {
        *tfq.entry(term.as_str()).or_insert(0) += 1;
    }
    tfq
}

/// Sublinear tf-idf weight `ln(1 + tf) * idf` with `idf = ln(N/df)`.
fn tfidf_weight(tf: f64, idf: f64) -> f64 {
    (1.0 + tf).ln() * idf
}

fn tfidf_scores(
    num_documents: u64,
    tokens: &[IndexEntry],
    documents: &[MatchedDocument],
) -> Vec<(String, f64)> {
    let idfs: Vec<f64> = tokens
        .iter()
        .map(|t| (num_documents as f64 / f64::from(t.document_frequency)).ln())
        .collect();

    documents
        .iter()
        .map(|doc| {
            let mut score = 0.0;
            for (token, idf) in tokens.iter().zip(&idfs) {
                if let Some(&tf) = doc.terms.get(&token.term) {
                    score += tfidf_weight(f64::from(tf), *idf);
                }
            }
            (doc.doc_id.clone(), score)
        })
        .collect()
}

/// Cosine similarity between the tf-idf weighted query and document
/// vectors. The document norm is restricted to the query terms, which
/// is the approximation this engine commits to; a zero denominator
/// scores zero.
fn cosine_tfidf_scores(
    num_documents: u64,
    tokens: &[IndexEntry],
    documents: &[MatchedDocument],
    query_tf: &HashMap<&str, u32>,
) -> Vec<(String, f64)> {
    let idfs: Vec<f64> = tokens
        .iter()
        .map(|t| (num_documents as f64 / f64::from(t.document_frequency)).ln())
        .collect();
    let query_weights: Vec<f64> = tokens
        .iter()
        .zip(&idfs)
        .map(|(token, idf)| {
            let tfq = query_tf.get(token.term.as_str()).copied().unwrap_or(0);
            tfidf_weight(f64::from(tfq), *idf)
        })
        .collect();
    let query_norm_squared: f64 = query_weights.iter().map(|w| w * w).sum();

    documents
        .iter()
        .map(|doc| {
            let mut dot = 0.0;
            let mut doc_norm_squared = 0.0;
            for ((token, idf), query_weight) in tokens.iter().zip(&idfs).zip(&query_weights) {
                if let Some(&tf) = doc.terms.get(&token.term) {
                    let doc_weight = tfidf_weight(f64::from(tf), *idf);
                    dot += query_weight * doc_weight;
                    doc_norm_squared += doc_weight * doc_weight;
                }
            }
            let denominator = query_norm_squared.sqrt() * doc_norm_squared.sqrt();
            let score = if denominator > 0.0 {
                dot / denominator
            } else {
                0.0
            };
            (doc.doc_id.clone(), score)
        })
        .collect()
}

/// Robertson/Sparck-Jones idf; negative once `df > N/2`, which is
/// intentional.
fn bm25_idf(num_documents: u64, document_frequency: u32) -> f64 {
    let n = num_documents as f64;
    let df = f64::from(document_frequency);
    ((n - df + 0.5) / (df + 0.5)).ln()
}

fn bm25_scores(
    num_documents: u64,
    tokens: &[IndexEntry],
    documents: &[MatchedDocument],
    query_tf: &HashMap<&str, u32>,
    stats: &DocumentStats,
    params: &Bm25Params,
) -> Result<Vec<(String, f64)>> {
    let avg_dl = stats.average_document_length();
    let idfs: Vec<f64> = tokens
        .iter()
        .map(|t| bm25_idf(num_documents, t.document_frequency))
        .collect();

    let mut scores = Vec::with_capacity(documents.len());
    for doc in documents {
        let dl = stats.document_length(&doc.doc_id)? as f64;
        let b_length = (1.0 - params.b) + params.b * dl / avg_dl;
        let k = params.k1 * b_length;
        scores.push((
            doc.doc_id.clone(),
            okapi_sum(doc, tokens, &idfs, query_tf, k, params),
        ));
    }
    Ok(scores)
}

/// BM25-VA replaces the length normalisation `B` with a
/// verbosity-adjusted mixture of the document's average term
/// frequency and its relative length.
fn bm25va_scores(
    num_documents: u64,
    tokens: &[IndexEntry],
    documents: &[MatchedDocument],
    query_tf: &HashMap<&str, u32>,
    stats: &DocumentStats,
    params: &Bm25Params,
) -> Result<Vec<(String, f64)>> {
    let avg_dl = stats.average_document_length();
    let mavg_tf = stats.mean_average_term_frequency();
    let idfs: Vec<f64> = tokens
        .iter()
        .map(|t| bm25_idf(num_documents, t.document_frequency))
        .collect();

    let mut scores = Vec::with_capacity(documents.len());
    for doc in documents {
        let dl = stats.document_length(&doc.doc_id)? as f64;
        let nt = stats.distinct_terms(&doc.doc_id)? as f64;
        let b_verbosity = (1.0 / (mavg_tf * mavg_tf)) * (dl / nt)
            + (1.0 - 1.0 / mavg_tf) * (dl / avg_dl);
        let k = params.k1 * b_verbosity;
        scores.push((
            doc.doc_id.clone(),
            okapi_sum(doc, tokens, &idfs, query_tf, k, params),
        ));
    }
    Ok(scores)
}

fn okapi_sum(
    doc: &MatchedDocument,
    tokens: &[IndexEntry],
    idfs: &[f64],
    query_tf: &HashMap<&str, u32>,
    k: f64,
    params: &Bm25Params,
) -> f64 {
    let mut score = 0.0;
    for (token, idf) in tokens.iter().zip(idfs) {
        if let Some(&tf) = doc.terms.get(&token.term) {
            let tfd = f64::from(tf);
            let tfq = f64::from(query_tf.get(token.term.as_str()).copied().unwrap_or(0));
            let query_part = ((params.k3 + 1.0) * tfq) / (params.k3 + tfq);
            let doc_part = ((params.k1 + 1.0) * tfd) / (k + tfd);
            score += query_part * doc_part * idf;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::Posting;

    fn entry(term: &str, postings: &[(&str, u32)]) -> IndexEntry {
        IndexEntry::new(
            term.to_string(),
            postings
                .iter()
                .map(|(doc_id, tf)| Posting {
                    doc_id: doc_id.to_string(),
                    tf: *tf,
                })
                .collect(),
        )
    }

    fn stats_for(entries: &[IndexEntry]) -> DocumentStats {
        let mut stats = DocumentStats::new();
        for e in entries {
            stats.record(&e.postings);
        }
        stats
    }

    fn run(
        method: RankingMethod,
        num_documents: u64,
        entries: &[IndexEntry],
        query: &[&str],
    ) -> Vec<(String, f64)> {
        let stats = stats_for(entries);
        let query: Vec<String> = query.iter().map(|q| q.to_string()).collect();
        rank(
            method,
            num_documents,
            entries.iter().cloned().map(Ok),
            &query,
            &stats,
            &Bm25Params::default(),
        )
        .unwrap()
    }

    // four documents with unique terms: d1 "cat dog", d2 "cat",
    // d3 "bird", d4 "fish"
    fn small_index() -> Vec<IndexEntry> {
        vec![
            entry("bird", &[("d3", 1)]),
            entry("cat", &[("d1", 1), ("d2", 1)]),
            entry("dog", &[("d1", 1)]),
            entry("fish", &[("d4", 1)]),
        ]
    }

    #[test]
    fn test_empty_query_returns_empty_list() {
        let entries = small_index();
        assert!(run(RankingMethod::Tfidf, 4, &entries, &[]).is_empty());
    }

    #[test]
    fn test_only_touched_documents_are_returned() {
        let entries = small_index();
        for method in [
            RankingMethod::Tfidf,
            RankingMethod::CosineTfidf,
            RankingMethod::Bm25,
            RankingMethod::Bm25Va,
        ] {
            let scores = run(method, 4, &entries, &["dog", "bird"]);
            let mut docs: Vec<&str> = scores.iter().map(|(d, _)| d.as_str()).collect();
            docs.sort_unstable();
            assert_eq!(docs, vec!["d1", "d3"]);
        }
    }

    #[test]
    fn test_tfidf_prefers_rarer_terms() {
        // d1 matches the rare term and the common one, d2 only the
        // common one
        let entries = vec![
            entry("apple", &[("d1", 1), ("d2", 1)]),
            entry("banana", &[("d1", 1)]),
        ];
        let scores = run(RankingMethod::Tfidf, 2, &entries, &["apple", "banana"]);
        assert_eq!(scores[0].0, "d1");

        // w(banana) = ln(1+1) * ln(2/1), w(apple) = ln(2) * ln(1) = 0
        let expected = 2.0_f64.ln() * 2.0_f64.ln();
        assert!((scores[0].1 - expected).abs() < 1e-9);
        assert!(scores[1].1.abs() < 1e-9);
    }

    #[test]
    fn test_tfidf_is_monotone_in_term_frequency() {
        let lower = vec![entry("cat", &[("d1", 3), ("d2", 1)])];
        let higher = vec![entry("cat", &[("d1", 4), ("d2", 1)])];
        let low = run(RankingMethod::Tfidf, 10, &lower, &["cat"]);
        let high = run(RankingMethod::Tfidf, 10, &higher, &["cat"]);
        assert!(high[0].1 >= low[0].1);
    }

    #[test]
    fn test_cosine_is_bounded_and_exact_for_identical_vectors() {
        let entries = vec![
            entry("apple", &[("d1", 1), ("d2", 1)]),
            entry("banana", &[("d1", 1)]),
        ];
        let scores = run(
            RankingMethod::CosineTfidf,
            2,
            &entries,
            &["apple", "banana"],
        );
        for (_, score) in &scores {
            assert!(*score >= 0.0 && *score <= 1.0 + 1e-9);
        }
        // d1's restricted vector is parallel to the query vector
        // (the apple component has zero idf), so the cosine is 1
        let d1 = scores.iter().find(|(d, _)| d == "d1").unwrap();
        assert!((d1.1 - 1.0).abs() < 1e-9);
        // d2 only matches the zero-idf term
        let d2 = scores.iter().find(|(d, _)| d == "d2").unwrap();
        assert!(d2.1.abs() < 1e-12);
    }

    #[test]
    fn test_bm25_reference_value() {
        let entries = small_index();
        let scores = run(RankingMethod::Bm25, 4, &entries, &["dog"]);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].0, "d1");

        // dl(d1) = 2, avg_dl = 1.25, B = 0.25 + 0.75 * 2/1.25 = 1.45,
        // K = 1.74, tf part = 2.2/2.74, idf = ln(3.5/1.5)
        let expected = 2.2 / 2.74 * (3.5_f64 / 1.5).ln();
        assert!((scores[0].1 - expected).abs() < 1e-9);
    }

    #[test]
    fn test_bm25_idf_goes_negative_for_frequent_terms() {
        // df = 3 of N = 4 documents
        let entries = vec![entry("cat", &[("d1", 1), ("d2", 1), ("d3", 1)]), ];
        let mut stats = stats_for(&entries);
        stats.record(&[Posting {
            doc_id: "d4".to_string(),
            tf: 1,
        }]);

        let query = vec!["cat".to_string()];
        let scores = rank(
            RankingMethod::Bm25,
            4,
            entries.iter().cloned().map(Ok),
            &query,
            &stats,
            &Bm25Params::default(),
        )
        .unwrap();
        assert!(scores.iter().all(|(_, s)| *s < 0.0));
    }

    #[test]
    fn test_bm25va_equals_plain_okapi_when_verbosity_is_uniform() {
        // every document has tf = 1 everywhere, so mavg_tf = 1 and
        // B_va collapses to dl/nt = 1, giving K = k1
        let entries = small_index();
        let scores = run(RankingMethod::Bm25Va, 4, &entries, &["dog"]);
        let expected = 2.2 / 2.2 * (3.5_f64 / 1.5).ln();
        assert!((scores[0].1 - expected).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_query_terms_raise_tfq() {
        let entries = small_index();
        let once = run(RankingMethod::Bm25, 4, &entries, &["dog"]);
        let twice = run(RankingMethod::Bm25, 4, &entries, &["dog", "dog"]);
        // tfq = 2: query part grows from 1 to (9*2)/(8+2) = 1.8
        assert!((twice[0].1 / once[0].1 - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_missing_stats_document_is_fatal() {
        let entries = vec![entry("cat", &[("d1", 1)])];
        let stats = DocumentStats::new();
        let query = vec!["cat".to_string()];
        let result = rank(
            RankingMethod::Bm25,
            1,
            entries.iter().cloned().map(Ok),
            &query,
            &stats,
            &Bm25Params::default(),
        );
        assert!(matches!(
            result,
            Err(crate::error::IndexError::MissingStats(_))
        ));
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        // identical documents score identically; the index scan sees
        // d2 before d1 within the first entry
        let entries = vec![entry("cat", &[("d2", 1), ("d1", 1)])];
        for method in [
            RankingMethod::Tfidf,
            RankingMethod::CosineTfidf,
            RankingMethod::Bm25,
            RankingMethod::Bm25Va,
        ] {
            let scores = run(method, 2, &entries, &["cat"]);
            assert_eq!(scores[0].0, "d2");
            assert_eq!(scores[1].0, "d1");
            assert!((scores[0].1 - scores[1].1).abs() < 1e-12);
        }
    }
}
