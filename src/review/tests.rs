use super::*;
use crate::config::EmbeddingProvider;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HELPERS: &str = "def load_config(path):\n    with open(path) as handle:\n        return handle.read()\n\n\ndef parse_line(line):\n    return line.strip()\n";
const CANDIDATE: &str = "def read_settings(path):\n    with open(path) as handle:\n        return handle.read()\n";

fn offline_config(base: &Path, dimension: u32) -> Config {
    let mut config = Config::with_base_dir(base);
    config.embedding.provider = EmbeddingProvider::Hashing;
    config.embedding.dimension = dimension;
    config.llm.enabled = false;
    config
}

fn repository() -> TempDir {
    let repo = TempDir::new().expect("repo dir");
    fs::write(repo.path().join("helpers.py"), HELPERS).expect("write");
    fs::write(repo.path().join("broken.py"), [0xff, 0xfe, 0x00]).expect("write");
    repo
}

fn learn_request(repo: &TempDir, name: &str) -> LearnRequest {
    LearnRequest {
        source: repo.path().display().to_string(),
        extensions: vec!["py".to_string()],
        index_name: name.to_string(),
    }
}

fn review_request(name: &str) -> ReviewRequest {
    ReviewRequest {
        index_name: name.to_string(),
        candidates: vec![Candidate::inline("new/settings.py", CANDIDATE, None)],
        extensions: Vec::new(),
    }
}

#[tokio::test]
async fn unknown_index_fails_fast() {
    let base = TempDir::new().expect("base dir");
    let engine = ReviewEngine::open(offline_config(base.path(), 64))
        .await
        .expect("engine");

    let result = engine
        .review(&review_request("never-learned"), CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ReviewError::IndexNotFound(name)) if name == "never-learned"));
}

#[tokio::test]
async fn learned_index_is_loaded_by_a_fresh_engine() {
    let base = TempDir::new().expect("base dir");
    let repo = repository();

    let learned = {
        let engine = ReviewEngine::open(offline_config(base.path(), 64))
            .await
            .expect("engine");
        engine.learn(&learn_request(&repo, "helpers")).await.expect("learn");
        engine.index("helpers").await.expect("bound index")
    };

    let engine = ReviewEngine::open(offline_config(base.path(), 64))
        .await
        .expect("engine");
    assert!(engine.registry().get("helpers").await.is_none());

    let loaded = engine.index("helpers").await.expect("index should load");
    assert_eq!(loaded.units(), learned.units());
    assert_eq!(loaded.statistics(), learned.statistics());
    assert!(engine.registry().get("helpers").await.is_some());

    let report = engine
        .review(&review_request("helpers"), CancellationToken::new())
        .await
        .expect("review");
    assert_eq!(report.index_name, "helpers");
    assert!(report.findings.iter().all(Finding::has_evidence));
}

#[tokio::test]
async fn candidate_problems_become_notes() {
    let base = TempDir::new().expect("base dir");
    let repo = repository();
    let engine = ReviewEngine::open(offline_config(base.path(), 64))
        .await
        .expect("engine");
    engine.learn(&learn_request(&repo, "helpers")).await.expect("learn");

    let request = ReviewRequest {
        index_name: "helpers".to_string(),
        candidates: vec![
            Candidate::file(repo.path().join("missing.py").display().to_string()),
            Candidate::inline("notes.txt", "plain text", None),
            Candidate::inline("new/settings.py", CANDIDATE, None),
        ],
        extensions: Vec::new(),
    };
    let report = engine
        .review(&request, CancellationToken::new())
        .await
        .expect("review should still succeed");

    assert!(report.summary.degraded);
    assert!(report.summary.notes.iter().any(|n| n.contains("missing.py")));
    assert!(report.summary.notes.iter().any(|n| n.contains("notes.txt")));
    assert!(
        report
            .summary
            .notes
            .iter()
            .any(|n| n.contains("no model backend configured"))
    );
}

#[tokio::test]
async fn describe_and_delete_index() {
    let base = TempDir::new().expect("base dir");
    let repo = repository();
    let engine = ReviewEngine::open(offline_config(base.path(), 64))
        .await
        .expect("engine");
    let summary = engine.learn(&learn_request(&repo, "helpers")).await.expect("learn");

    let (record, warnings) = engine.describe_index("helpers").await.expect("describe");
    assert_eq!(record.table_name, summary.table_name);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].file_path, "broken.py");
    assert_eq!(engine.list_indexes().await.expect("list").len(), 1);

    assert!(engine.delete_index("helpers").await.expect("delete"));
    assert!(!engine.delete_index("helpers").await.expect("second delete"));
    assert!(engine.list_indexes().await.expect("list").is_empty());
    assert!(matches!(
        engine.index("helpers").await,
        Err(ReviewError::IndexNotFound(_))
    ));
}

#[tokio::test]
async fn index_from_another_embedding_model_is_unusable() {
    let base = TempDir::new().expect("base dir");
    let repo = repository();
    {
        let engine = ReviewEngine::open(offline_config(base.path(), 64))
            .await
            .expect("engine");
        engine.learn(&learn_request(&repo, "helpers")).await.expect("learn");
    }

    let engine = ReviewEngine::open(offline_config(base.path(), 128))
        .await
        .expect("engine");
    let result = engine
        .review(&review_request("helpers"), CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(ReviewError::RetrievalBackendUnavailable(_))
    ));
}

#[tokio::test]
async fn relearning_rebinds_the_registry() {
    let base = TempDir::new().expect("base dir");
    let repo = repository();
    let engine = ReviewEngine::open(offline_config(base.path(), 64))
        .await
        .expect("engine");

    engine.learn(&learn_request(&repo, "helpers")).await.expect("learn");
    let first = engine.index("helpers").await.expect("first snapshot");

    fs::write(repo.path().join("extra.py"), "def extra_step():\n    return 2\n").expect("write");
    engine.learn(&learn_request(&repo, "helpers")).await.expect("relearn");
    let second = engine.index("helpers").await.expect("second snapshot");

    // the old snapshot stays usable by whoever still holds it
    assert_eq!(first.len() + 1, second.len());
    assert_ne!(first.metadata().table_name, second.metadata().table_name);
}

#[tokio::test]
async fn unreadable_snapshot_makes_the_backend_unavailable() {
    let base = TempDir::new().expect("base dir");
    let repo = repository();
    let summary = {
        let engine = ReviewEngine::open(offline_config(base.path(), 64))
            .await
            .expect("engine");
        engine.learn(&learn_request(&repo, "helpers")).await.expect("learn")
    };

    let mut config = offline_config(base.path(), 64);
    config.retry.max_attempts = 2;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 1;
    let engine = ReviewEngine::open(config).await.expect("engine");
    assert!(
        engine
            .vector_store
            .drop_table(&summary.table_name)
            .await
            .expect("drop")
    );

    let result = engine.index("helpers").await;
    assert!(matches!(
        result,
        Err(ReviewError::RetrievalBackendUnavailable(_))
    ));
}

#[test]
fn store_failures_become_backend_unavailable() {
    let error = backend_unavailable(ReviewError::Database("load units_x timed out after 30s".to_string()));
    assert!(matches!(error, ReviewError::RetrievalBackendUnavailable(ref m) if m.contains("timed out")));

    let error = backend_unavailable(ReviewError::RetrievalBackendUnavailable("model".to_string()));
    assert!(matches!(error, ReviewError::RetrievalBackendUnavailable(ref m) if m == "model"));
}
