//! Database schema definitions
//!
//! Pages are identified by their page key. Every crawl of a page is one `crawls` row;
//! `data_points` holds the time series of extracted values, with a row written only
//! when a value changes.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per distinct page
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_key TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_crawled_at TEXT
);

-- One row per crawl of a page
CREATE TABLE IF NOT EXISTS crawls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    run_id INTEGER REFERENCES crawl_runs(id),
    requested_url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    success INTEGER NOT NULL,
    status_code INTEGER,
    error_category TEXT,
    error_message TEXT,
    quality_score INTEGER,
    issues TEXT,
    warnings TEXT,
    dom_rendered_completely INTEGER NOT NULL,
    retry_attempt INTEGER NOT NULL,
    stealth INTEGER NOT NULL,
    timeout_secs REAL NOT NULL,
    screenshot TEXT,
    crawled_at TEXT NOT NULL,
    elapsed_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawls_page ON crawls(page_id);
CREATE INDEX IF NOT EXISTS idx_crawls_run ON crawls(run_id);

-- Time series of data point values; NULL value means the data point became absent
CREATE TABLE IF NOT EXISTS data_points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    name TEXT NOT NULL,
    value TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_data_points_page_name ON data_points(page_id, name, id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
