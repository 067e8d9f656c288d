use super::*;
use crate::parser::ParserRegistry;
use crate::patterns::{NamingConvention, extract};

fn metadata(name: &str) -> IndexMetadata {
    IndexMetadata {
        name: name.to_string(),
        source: "/repo".to_string(),
        table_name: format!("units_{name}_1"),
        embedding_model: "hashing-4".to_string(),
        dimension: 4,
        created_date: Utc::now(),
    }
}

fn entries() -> Vec<(CodeUnit, PatternFingerprint, Vec<f32>)> {
    let source = "def load_user(user_id):\n    return user_id\n\n\ndef save_user(user):\n    try:\n        store(user)\n    except OSError:\n        pass\n";
    ParserRegistry::new()
        .parse("users.py", source, None)
        .expect("python should parse")
        .into_iter()
        .enumerate()
        .map(|(i, unit)| {
            let fingerprint = extract(&unit);
            (unit, fingerprint, vec![i as f32; 4])
        })
        .collect()
}

#[test]
fn build_assigns_ordinals_and_statistics() {
    let index = PatternIndex::build(metadata("users"), entries());

    assert_eq!(index.len(), 2);
    assert!(!index.is_empty());
    let ordinals: Vec<usize> = index.units().iter().map(|u| u.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1]);
    assert_eq!(index.units()[1].unit.name, "save_user");
    assert_eq!(index.statistics().unit_count, 2);
    assert_eq!(
        index.statistics().dominant_naming,
        NamingConvention::SnakeCase
    );
    assert!((index.statistics().error_handling_fraction - 0.5).abs() < 1e-9);
}

#[test]
fn stored_rows_are_reordered() {
    let built = PatternIndex::build(metadata("users"), entries());
    let mut shuffled = built.units().to_vec();
    shuffled.reverse();

    let restored = PatternIndex::from_units(metadata("users"), shuffled);
    assert_eq!(restored.units(), built.units());
    assert_eq!(restored.statistics(), built.statistics());
}

#[tokio::test]
async fn registry_swaps_bindings() {
    let registry = IndexRegistry::new();
    assert!(registry.get("users").await.is_none());

    let first = Arc::new(PatternIndex::build(metadata("users"), entries()));
    assert!(registry.bind(Arc::clone(&first)).await.is_none());

    // a review holding the old snapshot keeps it after a rebuild
    let held = registry.get("users").await.expect("bound index");
    let second = Arc::new(PatternIndex::build(metadata("users"), Vec::new()));
    let replaced = registry.bind(second).await.expect("previous binding");

    assert!(Arc::ptr_eq(&replaced, &first));
    assert_eq!(held.len(), 2);
    assert!(registry.get("users").await.is_some_and(|i| i.is_empty()));

    assert_eq!(registry.names().await, vec!["users".to_string()]);
    assert!(registry.remove("users").await.is_some());
    assert!(registry.names().await.is_empty());
}
