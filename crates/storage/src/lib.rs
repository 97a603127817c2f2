use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Row, Sqlite, SqliteConnection,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Every row in the cache hangs off this one slot.
const CACHE_SLOT: i64 = 1;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntity {
    pub name: String,
    pub front_image_url: String,
    pub back_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttribute {
    pub position: i64,
    pub kind: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub position: i64,
    pub kind: String,
    pub extra: String,
}

/// The full persisted graph for the cache slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRowSet {
    pub entity: StoredEntity,
    pub attributes: Vec<StoredAttribute>,
    pub events: Vec<StoredEvent>,
}

/// Full-graph access to the single-slot entity cache.
///
/// `replace_all` must be all-or-nothing: a concurrent `read_all` sees either
/// the previous graph or the new one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn replace_all(&self, rows: &StoredRowSet) -> Result<()>;
    async fn read_all(&self) -> Result<Option<StoredRowSet>>;
    async fn read_events(&self) -> Result<Vec<StoredEvent>>;
    async fn clear(&self) -> Result<()>;
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let in_memory = is_memory_url(database_url);
        let mut connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its connection, so the
        // pool keeps exactly one and never recycles it.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// When the current cache content was written, if anything is cached.
    pub async fn cached_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT cached_at FROM cached_entity WHERE slot = ?")
            .bind(CACHE_SLOT)
            .fetch_optional(&self.pool)
            .await
            .context("failed to read cache timestamp")?;
        row.map(|r| r.try_get::<DateTime<Utc>, _>("cached_at"))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn replace_all(&self, rows: &StoredRowSet) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin cache replace")?;

        delete_all_rows(&mut tx).await?;

        sqlx::query(
            "INSERT INTO cached_entity (slot, name, front_image_url, back_image_url, cached_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(CACHE_SLOT)
        .bind(&rows.entity.name)
        .bind(&rows.entity.front_image_url)
        .bind(&rows.entity.back_image_url)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("failed to insert cached entity")?;

        for attribute in &rows.attributes {
            sqlx::query(
                "INSERT INTO cached_attributes (slot, position, kind, value) VALUES (?, ?, ?, ?)",
            )
            .bind(CACHE_SLOT)
            .bind(attribute.position)
            .bind(&attribute.kind)
            .bind(attribute.value)
            .execute(&mut *tx)
            .await
            .context("failed to insert cached attribute")?;
        }

        for event in &rows.events {
            sqlx::query(
                "INSERT INTO cached_events (slot, position, kind, extra) VALUES (?, ?, ?, ?)",
            )
            .bind(CACHE_SLOT)
            .bind(event.position)
            .bind(&event.kind)
            .bind(&event.extra)
            .execute(&mut *tx)
            .await
            .context("failed to insert cached event")?;
        }

        tx.commit().await.context("failed to commit cache replace")?;
        debug!(
            attributes = rows.attributes.len(),
            events = rows.events.len(),
            "storage: cache slot replaced"
        );
        Ok(())
    }

    pub async fn read_all(&self) -> Result<Option<StoredRowSet>> {
        // One read transaction so the three selects share a snapshot.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin cache read")?;

        let Some(main) = sqlx::query(
            "SELECT name, front_image_url, back_image_url FROM cached_entity WHERE slot = ?",
        )
        .bind(CACHE_SLOT)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to read cached entity")?
        else {
            tx.commit().await?;
            return Ok(None);
        };

        let entity = StoredEntity {
            name: main.try_get("name")?,
            front_image_url: main.try_get("front_image_url")?,
            back_image_url: main.try_get("back_image_url")?,
        };
        let attributes = select_attributes(&mut tx).await?;
        let events = select_events(&mut tx).await?;
        tx.commit().await?;

        Ok(Some(StoredRowSet {
            entity,
            attributes,
            events,
        }))
    }

    pub async fn read_events(&self) -> Result<Vec<StoredEvent>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection for event read")?;
        select_events(&mut conn).await
    }

    pub async fn clear(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin cache clear")?;
        delete_all_rows(&mut tx).await?;
        tx.commit().await.context("failed to commit cache clear")?;
        Ok(())
    }
}

async fn delete_all_rows(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM cached_events")
        .execute(&mut *conn)
        .await
        .context("failed to clear cached events")?;
    sqlx::query("DELETE FROM cached_attributes")
        .execute(&mut *conn)
        .await
        .context("failed to clear cached attributes")?;
    sqlx::query("DELETE FROM cached_entity")
        .execute(&mut *conn)
        .await
        .context("failed to clear cached entity")?;
    Ok(())
}

async fn select_attributes(conn: &mut SqliteConnection) -> Result<Vec<StoredAttribute>> {
    let rows = sqlx::query(
        "SELECT position, kind, value FROM cached_attributes WHERE slot = ? ORDER BY position",
    )
    .bind(CACHE_SLOT)
    .fetch_all(&mut *conn)
    .await
    .context("failed to read cached attributes")?;

    rows.into_iter()
        .map(|r| -> Result<StoredAttribute> {
            Ok(StoredAttribute {
                position: r.try_get("position")?,
                kind: r.try_get("kind")?,
                value: r.try_get("value")?,
            })
        })
        .collect()
}

async fn select_events(conn: &mut SqliteConnection) -> Result<Vec<StoredEvent>> {
    let rows = sqlx::query(
        "SELECT position, kind, extra FROM cached_events WHERE slot = ? ORDER BY position",
    )
    .bind(CACHE_SLOT)
    .fetch_all(&mut *conn)
    .await
    .context("failed to read cached events")?;

    rows.into_iter()
        .map(|r| -> Result<StoredEvent> {
            Ok(StoredEvent {
                position: r.try_get("position")?,
                kind: r.try_get("kind")?,
                extra: r.try_get("extra")?,
            })
        })
        .collect()
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[async_trait]
impl CacheStore for Storage {
    async fn replace_all(&self, rows: &StoredRowSet) -> Result<()> {
        Storage::replace_all(self, rows).await
    }

    async fn read_all(&self) -> Result<Option<StoredRowSet>> {
        Storage::read_all(self).await
    }

    async fn read_events(&self) -> Result<Vec<StoredEvent>> {
        Storage::read_events(self).await
    }

    async fn clear(&self) -> Result<()> {
        Storage::clear(self).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
