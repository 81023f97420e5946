use crate::index::{Index, IndexError};
use crate::DocId;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// On-disk shape, read loosely so numbers stored as integers or strings still load.
#[derive(Deserialize)]
struct RawIndex {
    doc_ids: Vec<DocId>,
    docs: Vec<Vec<String>>,
    idf: BTreeMap<String, Value>,
    avgdl: Value,
}

pub fn to_json(index: &Index) -> Result<Vec<u8>, IndexError> {
    serde_json::to_vec(index).map_err(|e| IndexError::CorruptIndex(e.to_string()))
}

pub fn from_json(bytes: &[u8]) -> Result<Index, IndexError> {
    let raw: RawIndex = serde_json::from_slice(bytes).map_err(|e| IndexError::CorruptIndex(e.to_string()))?;

    if raw.docs.is_empty() {
        return Err(IndexError::CorruptIndex("index has no documents".into()));
    }
    if raw.doc_ids.len() != raw.docs.len() {
        return Err(IndexError::CorruptIndex(format!(
            "doc_ids has {} entries but docs has {}",
            raw.doc_ids.len(),
            raw.docs.len()
        )));
    }
    let avgdl = coerce_f64(&raw.avgdl).ok_or_else(|| IndexError::CorruptIndex(format!("avgdl is not a number: {}", raw.avgdl)))?;
    if !(avgdl.is_finite() && avgdl > 0.0) {
        return Err(IndexError::CorruptIndex(format!("avgdl must be positive, got {avgdl}")));
    }

    let mut idf = BTreeMap::new();
    for (term, v) in raw.idf {
        let w = coerce_f64(&v)
            .filter(|w| w.is_finite() && *w >= 0.0)
            .ok_or_else(|| IndexError::CorruptIndex(format!("idf for {term:?} is invalid: {v}")))?;
        idf.insert(term, w);
    }

    Ok(Index { doc_ids: raw.doc_ids, docs: raw.docs, idf, avgdl })
}

fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn save_index<P: AsRef<Path>>(path: P, index: &Index) -> Result<(), IndexError> {
    let path = path.as_ref();
    let bytes = to_json(index)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| IndexError::Io { path: dir.to_path_buf(), source })?;
    }
    fs::write(path, bytes).map_err(|source| IndexError::Io { path: path.to_path_buf(), source })
}

pub fn load_index<P: AsRef<Path>>(path: P) -> Result<Index, IndexError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| IndexError::Io { path: path.to_path_buf(), source })?;
    let index = from_json(&bytes)?;
    tracing::debug!(path = %path.display(), num_docs = index.num_docs(), "loaded index");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Document;

    fn sample() -> Index {
        Index::build(&[
            Document { id: 3, text: "詐欺集團".into() },
            Document { id: 1, text: "正常交易 集".into() },
        ])
        .unwrap()
    }

    #[test]
    fn round_trips_exactly() {
        let idx = sample();
        let back = from_json(&to_json(&idx).unwrap()).unwrap();
        assert_eq!(back, idx);
        assert_eq!(back.doc_ids, vec![3, 1]);
    }

    #[test]
    fn writes_symbols_unescaped() {
        let s = String::from_utf8(to_json(&sample()).unwrap()).unwrap();
        assert!(s.contains("詐"));
    }

    #[test]
    fn coerces_integer_and_string_weights() {
        let blob = br#"{"doc_ids":[1],"docs":[["a","b"]],"idf":{"a":1,"b":"0.25"},"avgdl":2}"#;
        let idx = from_json(blob).unwrap();
        assert_eq!(idx.idf["a"], 1.0);
        assert_eq!(idx.idf["b"], 0.25);
        assert_eq!(idx.avgdl, 2.0);
    }

    #[test]
    fn rejects_malformed_blobs() {
        let cases: &[&[u8]] = &[
            b"not json",
            br#"{"docs":[["a"]],"idf":{},"avgdl":1}"#,
            br#"{"doc_ids":[1,2],"docs":[["a"]],"idf":{},"avgdl":1}"#,
            br#"{"doc_ids":[],"docs":[],"idf":{},"avgdl":1}"#,
            br#"{"doc_ids":[1],"docs":[["a"]],"idf":{"a":[1]},"avgdl":1}"#,
            br#"{"doc_ids":[1],"docs":[["a"]],"idf":{"a":"x"},"avgdl":1}"#,
            br#"{"doc_ids":[1],"docs":[["a"]],"idf":{"a":1},"avgdl":0}"#,
            br#"{"doc_ids":[1],"docs":"a","idf":{"a":1},"avgdl":1}"#,
        ];
        for blob in cases {
            assert!(
                matches!(from_json(blob), Err(IndexError::CorruptIndex(_))),
                "accepted {}",
                String::from_utf8_lossy(blob)
            );
        }
    }

    #[test]
    fn saves_and_loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fraud_index.json");
        let idx = sample();
        save_index(&path, &idx).unwrap();
        assert_eq!(load_index(&path).unwrap(), idx);
        assert!(matches!(load_index(dir.path().join("missing.json")), Err(IndexError::Io { .. })));
    }
}
