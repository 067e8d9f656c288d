// Database module
// SQLite holds the index catalog, LanceDB holds the snapshot rows

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
