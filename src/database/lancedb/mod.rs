// LanceDB vector database module
// One table per index snapshot holding unit, fingerprint and embedding rows

#[cfg(test)]
mod tests;

pub mod vector_store;

pub use vector_store::VectorStore;

use uuid::Uuid;

const TABLE_PREFIX: &str = "units_";

fn table_prefix(index_name: &str) -> String {
    let slug: String = index_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{TABLE_PREFIX}{slug}_")
}

/// Fresh table name for a new snapshot of `index_name`
#[inline]
pub fn snapshot_table_name(index_name: &str) -> String {
    format!("{}{}", table_prefix(index_name), Uuid::new_v4().simple())
}

/// Whether `table` is some snapshot of `index_name`, bound or not
#[inline]
pub fn is_snapshot_of(table: &str, index_name: &str) -> bool {
    table
        .strip_prefix(&table_prefix(index_name))
        .is_some_and(|rest| rest.len() == 32 && rest.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Whether `table` was created by [`snapshot_table_name`]
#[inline]
pub fn is_snapshot_table(table: &str) -> bool {
    table.starts_with(TABLE_PREFIX)
}
