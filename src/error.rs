use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised while building or querying an index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}: <DOC> record without <DOCNO>", .file.display())]
    MissingDocno { file: PathBuf },

    #[error("malformed index line: {0:?}")]
    MalformedEntry(String),

    #[error("index header is not a document count: {0:?}")]
    BadHeader(String),

    #[error("document {0:?} missing from stats")]
    MissingStats(String),

    #[error("failed to start worker pool: {0}")]
    Pool(String),

    #[error("{phase} worker failed: {source}")]
    WorkerFailed {
        phase: &'static str,
        source: Box<IndexError>,
    },
}

impl IndexError {
    pub(crate) fn worker_failed(phase: &'static str, source: IndexError) -> IndexError {
        IndexError::WorkerFailed {
            phase,
            source: Box::new(source),
        }
    }
}
