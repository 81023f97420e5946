use q2d_core::persist::{load_index, save_index};
use q2d_core::{compute_scores, Bm25, Document, Index, Qrels};
use std::collections::HashMap;

fn fraud_corpus() -> Vec<Document> {
    vec![
        Document { id: 1, text: "詐欺集團".into() },
        Document { id: 2, text: "正常交易".into() },
    ]
}

#[test]
fn finds_the_fraud_document() {
    let ranker = Bm25::new(Index::build(&fraud_corpus()).unwrap());
    let hits = ranker.query("詐欺", 1);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, 1);
    assert!(hits[0].score > 0.0);
}

#[test]
fn ranking_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fraud_index.json");
    let mut corpus = fraud_corpus();
    corpus.push(Document { id: 3, text: "詐騙 交易 紀錄".into() });

    let built = Index::build(&corpus).unwrap();
    save_index(&path, &built).unwrap();
    let loaded = load_index(&path).unwrap();
    assert_eq!(loaded, built);

    let a = Bm25::new(built).query("交易詐欺", 3);
    let b = Bm25::new(loaded).query("交易詐欺", 3);
    assert_eq!(a, b);
}

#[test]
fn evaluation_over_ranked_results() {
    let ranker = Bm25::new(Index::build(&fraud_corpus()).unwrap());
    let queries = [(10, "詐欺"), (11, "交易")];
    let preds: HashMap<i64, Vec<i64>> = queries
        .iter()
        .map(|(qid, text)| (*qid, ranker.query(text, 2).into_iter().map(|h| h.doc_id).collect()))
        .collect();
    let scores = compute_scores(&Qrels::from_pairs([(10, 1), (11, 2)]), &preds);
    assert_eq!(scores.accuracy, 1.0);
    assert_eq!(scores.mrr, 1.0);
}
