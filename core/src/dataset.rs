use crate::{DocId, QueryId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A corpus record as it appears in `corpus.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub text: String,
}

/// Standard layout of a dataset directory: `<root>/format/{corpus,queries,qrels}.json`.
pub struct DatasetPaths {
    pub root: PathBuf,
}

impl DatasetPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn format_dir(&self) -> PathBuf { self.root.join("format") }
    pub fn corpus(&self) -> PathBuf { self.format_dir().join("corpus.json") }
    pub fn queries(&self) -> PathBuf { self.format_dir().join("queries.json") }
    pub fn qrels(&self) -> PathBuf { self.format_dir().join("qrels.json") }
}

pub(crate) fn read_json<T, P>(path: P) -> Result<T, DatasetError>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let f = File::open(path).map_err(|source| DatasetError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_reader(BufReader::new(f))
        .map_err(|source| DatasetError::Parse { path: path.to_path_buf(), source })
}

pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<Document>, DatasetError> {
    read_json(path)
}

pub fn load_queries<P: AsRef<Path>>(path: P) -> Result<Vec<Query>, DatasetError> {
    read_json(path)
}

/// Read one record per line; blank lines are skipped.
pub fn read_records_jsonl<T, P>(path: P) -> Result<Vec<T>, DatasetError>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let io_err = |source| DatasetError::Io { path: path.to_path_buf(), source };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() { continue; }
        let rec = serde_json::from_str(&line)
            .map_err(|source| DatasetError::Parse { path: path.to_path_buf(), source })?;
        out.push(rec);
    }
    Ok(out)
}

/// Document text keyed by id. Later duplicates overwrite earlier ones.
pub fn text_lookup(corpus: &[Document]) -> HashMap<DocId, String> {
    corpus.iter().map(|d| (d.id, d.text.clone())).collect()
}

/// Slice `records` for paginated reads.
///
/// A negative `offset` is treated as 0; a missing or non-positive `limit`
/// means "to the end".
pub fn page<T>(records: &[T], offset: i64, limit: Option<i64>) -> &[T] {
    let start = usize::try_from(offset.max(0)).unwrap_or(usize::MAX).min(records.len());
    let rest = &records[start..];
    match limit {
        Some(n) if n > 0 => {
            let n = usize::try_from(n).unwrap_or(usize::MAX);
            &rest[..n.min(rest.len())]
        }
        _ => rest,
    }
}
