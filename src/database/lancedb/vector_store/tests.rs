use super::*;
use crate::database::lancedb::snapshot_table_name;
use crate::parser::ParserRegistry;
use crate::patterns::extract;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::with_base_dir(temp_dir.path());
    (config, temp_dir)
}

fn indexed_units(dimension: usize) -> Vec<IndexedUnit> {
    let source = "import os\n\n\ndef load_user(user_id):\n    return os.getenv(user_id)\n\n\nclass UserStore:\n    def fetch_all(self):\n        return []\n";
    ParserRegistry::new()
        .parse("users.py", source, None)
        .expect("python should parse")
        .into_iter()
        .enumerate()
        .map(|(ordinal, unit)| {
            let mut embedding = vec![0.0; dimension];
            embedding[ordinal % dimension] = 1.0;
            IndexedUnit {
                ordinal,
                fingerprint: extract(&unit),
                unit,
                embedding,
            }
        })
        .collect()
}

#[tokio::test]
async fn vector_store_initialization() {
    let (config, temp_dir) = create_test_config();

    let store = VectorStore::new(&config)
        .await
        .expect("vector store should open");
    assert_eq!(store.path(), temp_dir.path().join("vectors"));
    assert!(
        store
            .table_names()
            .await
            .expect("tables should list")
            .is_empty()
    );
}

#[tokio::test]
async fn snapshot_round_trip_preserves_order() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("store");

    let units = indexed_units(5);
    let table = snapshot_table_name("users");
    store
        .write_snapshot(&table, 5, &units)
        .await
        .expect("snapshot should write");

    assert_eq!(store.count_rows(&table).await.expect("count"), units.len());
    let loaded = store.load_snapshot(&table).await.expect("snapshot should load");
    assert_eq!(loaded, units);
    assert!(store.validate_integrity(&table).await.expect("integrity"));
}

#[tokio::test]
async fn empty_snapshot_loads_empty() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("store");

    let table = snapshot_table_name("empty");
    store
        .write_snapshot(&table, 8, &[])
        .await
        .expect("empty snapshot should write");
    assert!(store.load_snapshot(&table).await.expect("load").is_empty());
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("store");

    let units = indexed_units(5);
    let result = store.write_snapshot("units_bad", 8, &units).await;
    assert!(matches!(result, Err(ReviewError::Database(_))));
    assert!(store.table_names().await.expect("tables").is_empty());
}

#[tokio::test]
async fn drop_table_reports_existence() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("store");

    let table = snapshot_table_name("users");
    store
        .write_snapshot(&table, 5, &indexed_units(5))
        .await
        .expect("snapshot should write");

    assert!(store.drop_table(&table).await.expect("drop"));
    assert!(!store.drop_table(&table).await.expect("second drop"));
    assert!(!store.validate_integrity(&table).await.expect("integrity"));
}

#[tokio::test]
async fn missing_snapshot_fails_after_retries() {
    let (config, _temp_dir) = create_test_config();
    let store = VectorStore::new(&config).await.expect("store").with_retry(RetryPolicy {
        timeout: Duration::from_secs(5),
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    });

    let result = store.load_snapshot(&snapshot_table_name("gone")).await;
    assert!(matches!(result, Err(ReviewError::Database(_))));
}
