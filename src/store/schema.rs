use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS seeds (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            fallback_body TEXT NOT NULL DEFAULT '',
            slug TEXT,
            source_type TEXT NOT NULL DEFAULT 'manual'
                CHECK (source_type IN ('manual', 'web', 'voice', 'import')),
            snapshot_body TEXT,
            snapshot_captured_at TEXT,
            snapshot_metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            color TEXT
        );

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            parent_id TEXT REFERENCES categories(id),
            name TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS seed_tags (
            seed_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            PRIMARY KEY (seed_id, tag_id),
            FOREIGN KEY (seed_id) REFERENCES seeds(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS seed_categories (
            seed_id TEXT NOT NULL,
            category_id TEXT NOT NULL,
            PRIMARY KEY (seed_id, category_id),
            FOREIGN KEY (seed_id) REFERENCES seeds(id) ON DELETE CASCADE,
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_seeds_created_at ON seeds(created_at);
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
