use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::postings::Posting;

/// Per-document counters collected while final index entries are
/// flushed: `terms` counts distinct surviving terms, `length` sums
/// their frequencies. `terms[d] <= length[d]` for every document.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub terms: HashMap<String, u64>,
    pub length: HashMap<String, u64>,
}

impl DocumentStats {
    pub fn new() -> Self {
        DocumentStats::default()
    }

    /// Accounts one flushed posting list.
    pub fn record(&mut self, postings: &[Posting]) {
        for posting in postings {
            *self.terms.entry(posting.doc_id.clone()).or_insert(0) += 1;
            *self.length.entry(posting.doc_id.clone()).or_insert(0) += u64::from(posting.tf);
        }
    }

    /// Sums another stats set into this one.
    pub fn merge(&mut self, other: DocumentStats) {
        for (doc_id, count) in other.terms {
            *self.terms.entry(doc_id).or_insert(0) += count;
        }
        for (doc_id, count) in other.length {
            *self.length.entry(doc_id).or_insert(0) += count;
        }
    }

    /// Persists the stats as a single JSON line.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<DocumentStats> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Total surviving tokens of a document. Missing documents are a
    /// fatal scoring error, not an empty default.
    pub fn document_length(&self, doc_id: &str) -> Result<u64> {
        self.length
            .get(doc_id)
            .copied()
            .ok_or_else(|| IndexError::MissingStats(doc_id.to_string()))
    }

    /// Distinct surviving terms of a document.
    pub fn distinct_terms(&self, doc_id: &str) -> Result<u64> {
        self.terms
            .get(doc_id)
            .copied()
            .ok_or_else(|| IndexError::MissingStats(doc_id.to_string()))
    }

    /// Mean document length over the collection (`avg_dl`).
    pub fn average_document_length(&self) -> f64 {
        if self.length.is_empty() {
            return 0.0;
        }
        let total: u64 = self.length.values().sum();
        total as f64 / self.length.len() as f64
    }

    /// Mean over documents of `length / terms`, the average term
    /// frequency used as the verbosity proxy by BM25-VA (`mavg_tf`).
    pub fn mean_average_term_frequency(&self) -> f64 {
        if self.length.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0;
        for (doc_id, &length) in &self.length {
            if let Some(&terms) = self.terms.get(doc_id) {
                if terms > 0 {
                    sum += length as f64 / terms as f64;
                }
            }
        }
        sum / self.length.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn posting(doc_id: &str, tf: u32) -> Posting {
        Posting {
            doc_id: doc_id.to_string(),
            tf,
        }
    }

    #[test]
    fn test_record_counts_terms_and_length() {
        let mut stats = DocumentStats::new();
        stats.record(&[posting("d1", 2), posting("d2", 1)]);
        stats.record(&[posting("d1", 3)]);

        assert_eq!(stats.terms["d1"], 2);
        assert_eq!(stats.terms["d2"], 1);
        assert_eq!(stats.length["d1"], 5);
        assert_eq!(stats.length["d2"], 1);
    }

    #[test]
    fn test_terms_never_exceed_length() {
        let mut stats = DocumentStats::new();
        stats.record(&[posting("d1", 2), posting("d2", 1)]);
        stats.record(&[posting("d1", 1), posting("d2", 4)]);
        for (doc_id, terms) in &stats.terms {
            assert!(*terms <= stats.length[doc_id]);
        }
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.stats");

        let mut stats = DocumentStats::new();
        stats.record(&[posting("d1", 2), posting("d2", 1)]);
        stats.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains('\n'));
        assert!(raw.contains("\"terms\""));
        assert!(raw.contains("\"length\""));

        assert_eq!(DocumentStats::load(&path).unwrap(), stats);
    }

    #[test]
    fn test_merge_sums_counters() {
        let mut a = DocumentStats::new();
        a.record(&[posting("d1", 2)]);
        let mut b = DocumentStats::new();
        b.record(&[posting("d1", 1), posting("d2", 4)]);

        a.merge(b);
        assert_eq!(a.terms["d1"], 2);
        assert_eq!(a.length["d1"], 3);
        assert_eq!(a.length["d2"], 4);
    }

    #[test]
    fn test_missing_document_is_fatal() {
        let stats = DocumentStats::new();
        assert!(matches!(
            stats.document_length("ghost"),
            Err(IndexError::MissingStats(_))
        ));
        assert!(matches!(
            stats.distinct_terms("ghost"),
            Err(IndexError::MissingStats(_))
        ));
    }

    #[test]
    fn test_derived_means() {
        let mut stats = DocumentStats::new();
        // d1: two distinct terms, length 4; d2: one term, length 2
        stats.record(&[posting("d1", 3), posting("d2", 2)]);
        stats.record(&[posting("d1", 1)]);

        assert!((stats.average_document_length() - 3.0).abs() < 1e-12);
        // mavg_tf = mean(4/2, 2/1) = 2.0
        assert!((stats.mean_average_term_frequency() - 2.0).abs() < 1e-12);
    }
}
