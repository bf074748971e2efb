use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::config::{ConfigPaths, StorageOptions};

mod schema;

/// A user-authored memory record. `snapshot` carries the current-state
/// capture; when it is absent, `fallback_body` stands in for the body text
/// and the seed exposes no tag or category references.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecord {
    pub id: String,
    pub owner_id: String,
    /// ISO-8601 creation timestamp, kept as stored; parsed where needed.
    pub created_at: String,
    pub fallback_body: String,
    pub slug: Option<String>,
    pub snapshot: Option<SeedSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedSnapshot {
    pub body: String,
    pub captured_at: Option<String>,
    pub tags: Vec<TagRef>,
    pub categories: Vec<CategoryRef>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub path: String,
    pub created_at: String,
}

impl SeedRecord {
    pub fn display_body(&self) -> &str {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.body.as_str())
            .unwrap_or(self.fallback_body.as_str())
    }

    pub fn tag_refs(&self) -> &[TagRef] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.tags.as_slice())
            .unwrap_or(&[])
    }

    pub fn category_refs(&self) -> &[CategoryRef] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.categories.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Clone)]
pub struct StoreHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StoreHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn fetch_all_seeds(&self) -> Result<Vec<SeedRecord>> {
        self.with_connection(|conn| {
            let mut tag_refs = fetch_seed_tag_refs(conn)?;
            let mut category_refs = fetch_seed_category_refs(conn)?;

            let mut stmt = conn.prepare(
                "SELECT id, owner_id, created_at, fallback_body, slug,
                        snapshot_body, snapshot_captured_at, snapshot_metadata
                 FROM seeds
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })?;

            let mut seeds = Vec::new();
            for row in rows {
                let (id, owner_id, created_at, fallback_body, slug, body, captured_at, metadata) =
                    row.context("reading seed row")?;
                let snapshot = body.map(|body| SeedSnapshot {
                    body,
                    captured_at,
                    tags: tag_refs.remove(&id).unwrap_or_default(),
                    categories: category_refs.remove(&id).unwrap_or_default(),
                    metadata: metadata
                        .as_deref()
                        .and_then(|raw| serde_json::from_str(raw).ok())
                        .unwrap_or(serde_json::Value::Null),
                });
                seeds.push(SeedRecord {
                    id,
                    owner_id,
                    created_at,
                    fallback_body,
                    slug,
                    snapshot,
                });
            }
            Ok(seeds)
        })
    }

    pub fn fetch_all_tags(&self) -> Result<Vec<Tag>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, color FROM tags ORDER BY name COLLATE NOCASE")?;
            let rows = stmt.query_map([], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().context("fetching tags")
        })
    }

    pub fn fetch_all_categories(&self) -> Result<Vec<Category>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, parent_id, name, path, created_at
                 FROM categories
                 ORDER BY path COLLATE NOCASE",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    name: row.get(2)?,
                    path: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
                .context("fetching categories")
        })
    }

    /// Captures a new seed with a current-state snapshot. Tags are created
    /// on first use; the category must already exist (categories have an
    /// independent lifecycle).
    pub fn create_seed(
        &self,
        owner_id: &str,
        body: &str,
        tags: &[String],
        category_path: Option<&str>,
    ) -> Result<String> {
        let body = body.trim_end();
        if body.is_empty() {
            bail!("seed body cannot be empty");
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let seed_id = Uuid::new_v4().to_string();
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("formatting creation timestamp")?;

        tx.execute(
            "INSERT INTO seeds (id, owner_id, created_at, fallback_body, snapshot_body, snapshot_captured_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?3)",
            params![seed_id, owner_id, now, body],
        )
        .context("inserting seed")?;

        for tag in tags {
            let name = tag.trim();
            if name.is_empty() {
                continue;
            }
            let tag_id = ensure_tag(&tx, name)?;
            tx.execute(
                "INSERT OR IGNORE INTO seed_tags (seed_id, tag_id) VALUES (?1, ?2)",
                params![seed_id, tag_id],
            )
            .context("linking tag to seed")?;
        }

        if let Some(path) = category_path {
            let category_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM categories WHERE path = ?1",
                    params![path],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(category_id) = category_id else {
                bail!("category '{path}' does not exist");
            };
            tx.execute(
                "INSERT OR IGNORE INTO seed_categories (seed_id, category_id) VALUES (?1, ?2)",
                params![seed_id, category_id],
            )
            .context("linking category to seed")?;
        }

        tx.commit()?;
        Ok(seed_id)
    }

    pub fn create_category(&self, name: &str, parent_path: Option<&str>) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            bail!("category name cannot be empty");
        }
        self.with_connection(|conn| {
            let (parent_id, prefix) = match parent_path {
                Some(path) => {
                    let row: Option<(String, String)> = conn
                        .query_row(
                            "SELECT id, path FROM categories WHERE path = ?1",
                            params![path],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?;
                    match row {
                        Some((id, path)) => (Some(id), path),
                        None => bail!("parent category '{path}' does not exist"),
                    }
                }
                None => (None, String::new()),
            };
            let id = Uuid::new_v4().to_string();
            let path = format!("{prefix}/{name}");
            let now = OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .context("formatting creation timestamp")?;
            conn.execute(
                "INSERT INTO categories (id, parent_id, name, path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, parent_id, name, path, now],
            )
            .context("inserting category")?;
            Ok(id)
        })
    }
}

fn ensure_tag(conn: &Connection, name: &str) -> Result<String> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tags (id, name) VALUES (?1, ?2)",
        params![id, name],
    )
    .context("inserting tag")?;
    Ok(id)
}

fn fetch_seed_tag_refs(conn: &Connection) -> Result<HashMap<String, Vec<TagRef>>> {
    let mut stmt = conn.prepare(
        "SELECT st.seed_id, t.id, t.name
         FROM seed_tags st
         INNER JOIN tags t ON t.id = st.tag_id
         ORDER BY t.name COLLATE NOCASE",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            TagRef {
                id: row.get(1)?,
                name: row.get(2)?,
            },
        ))
    })?;
    let mut refs: HashMap<String, Vec<TagRef>> = HashMap::new();
    for row in rows {
        let (seed_id, tag) = row.context("reading seed tag row")?;
        refs.entry(seed_id).or_default().push(tag);
    }
    Ok(refs)
}

fn fetch_seed_category_refs(conn: &Connection) -> Result<HashMap<String, Vec<CategoryRef>>> {
    let mut stmt = conn.prepare(
        "SELECT sc.seed_id, c.id, c.name, c.path
         FROM seed_categories sc
         INNER JOIN categories c ON c.id = sc.category_id
         ORDER BY c.path COLLATE NOCASE",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            CategoryRef {
                id: row.get(1)?,
                name: row.get(2)?,
                path: row.get(3)?,
            },
        ))
    })?;
    let mut refs: HashMap<String, Vec<CategoryRef>> = HashMap::new();
    for row in rows {
        let (seed_id, category) = row.context("reading seed category row")?;
        refs.entry(seed_id).or_default().push(category);
    }
    Ok(refs)
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StoreHandle> {
    let db_path = &paths.database_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    let handle = StoreHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    };
    if !existed {
        seed_initial_records(&handle)?;
    }
    Ok(handle)
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

fn seed_initial_records(handle: &StoreHandle) -> Result<()> {
    tracing::info!("seeding first-run records");
    handle.create_category("inbox", None)?;
    handle.create_seed(
        "local",
        "Welcome to memoriae. Press `/` to search, `t` and `c` to filter by facet, `s` to change the sort order.",
        &["welcome".to_string()],
        Some("/inbox"),
    )?;
    Ok(())
}
