use rusqlite::Connection;

pub mod tables {
    pub const CACHE_ENTRIES: &str = "cache_entries";

    pub const ALL_TABLES: &[&str] = &[CACHE_ENTRIES];
}

pub mod columns {
    pub const CANDIDATE_ID: &str = "candidate_id";
    pub const PATH: &str = "path";
    pub const TITLE: &str = "title";
    pub const STORED_AT: &str = "stored_at";
}

pub use columns::*;
pub use tables::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    candidate_id TEXT PRIMARY KEY NOT NULL,
    path TEXT NOT NULL,
    title TEXT,
    stored_at INTEGER NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
