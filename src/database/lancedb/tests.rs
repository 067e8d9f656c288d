use super::*;

#[test]
fn snapshot_names_are_unique_and_safe() {
    let first = snapshot_table_name("My Repo/v2");
    let second = snapshot_table_name("My Repo/v2");

    assert_ne!(first, second);
    assert!(first.starts_with("units_my_repo_v2_"));
    assert!(
        first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    );
    assert!(is_snapshot_table(&first));
    assert!(!is_snapshot_table("embeddings"));
}

#[test]
fn snapshot_ownership_is_exact() {
    let table = snapshot_table_name("core");
    assert!(is_snapshot_of(&table, "core"));
    assert!(is_snapshot_of(&table, "CORE"));
    assert!(!is_snapshot_of(&table, "cor"));

    // a longer name sharing the prefix is a different index
    let nested = snapshot_table_name("core_utils");
    assert!(!is_snapshot_of(&nested, "core"));
}
