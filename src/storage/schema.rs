//! SQLite schema for the URL state store
//!
//! A single `urls` table holds every namespace, so a URL can only ever be in
//! one of them. The `crawl` column carries the store prefix, letting several
//! crawls share one database file.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS urls (
    crawl TEXT NOT NULL,
    url TEXT NOT NULL,
    namespace TEXT NOT NULL CHECK (namespace IN ('todo', 'doing', 'done', 'trash')),
    value TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (crawl, url)
);

CREATE INDEX IF NOT EXISTS idx_urls_namespace ON urls(crawl, namespace);

-- Published crawl settings, one record per crawl
CREATE TABLE IF NOT EXISTS settings (
    crawl TEXT PRIMARY KEY,
    record TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
