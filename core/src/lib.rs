//! Character-level BM25 retrieval over a fixed corpus, plus the line protocol
//! used to expose it as tools.

pub mod channel;
pub mod dataset;
pub mod index;
pub mod metrics;
pub mod persist;
pub mod protocol;
pub mod rank;
pub mod tokenizer;

pub type DocId = i64;
pub type QueryId = i64;

pub use dataset::{Document, Query};
pub use index::{Index, IndexError};
pub use metrics::{compute_scores, Qrels, Scores};
pub use rank::{Bm25, Bm25Params, Hit};
