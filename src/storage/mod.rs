use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use crate::models::{Address, WatchedAddress};

pub type DbPool = SqlitePool;
pub type ChatId = i64;

pub const MAX_ADDRESSES_PER_CHAT: usize = 25;
pub const MIN_UPDATE_INTERVAL_SECS: f64 = 60.0;

#[derive(thiserror::Error, Debug)]
pub enum WatchlistError {
    #[error("address {0} is already on the watchlist")]
    Duplicate(Address),
    #[error("watchlist is full ({} addresses)", MAX_ADDRESSES_PER_CHAT)]
    Full,
    #[error("address {0} is not on the watchlist")]
    NotFound(Address),
    #[error("update interval must be at least {} seconds, got {0}", MIN_UPDATE_INTERVAL_SECS)]
    IntervalTooShort(f64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    ensure_dir_exists(database_url)?;

    let options = SqliteConnectOptions::from_str(database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to SQLite")?;

    apply_schema(&pool).await?;
    Ok(pool)
}

fn ensure_dir_exists(database_url: &str) -> Result<()> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        if path != ":memory:" {
            if let Some(dir) = Path::new(path).parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed creating db directory {:?}", dir))?;
            }
        }
    }
    Ok(())
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            chat_id INTEGER PRIMARY KEY,
            update_interval_secs REAL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS watched_addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            address TEXT NOT NULL,
            label TEXT,
            UNIQUE(chat_id, address),
            FOREIGN KEY(chat_id) REFERENCES chats(chat_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_watched_addresses_chat ON watched_addresses(chat_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn ensure_chat(pool: &SqlitePool, chat_id: ChatId) -> Result<(), WatchlistError> {
    sqlx::query("INSERT INTO chats (chat_id) VALUES (?1) ON CONFLICT(chat_id) DO NOTHING;")
        .bind(chat_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Appends `entry` to the chat's watchlist. The size cap is checked inside the
/// INSERT and duplicates hit the UNIQUE constraint, so concurrent adds cannot
/// overfill a list.
pub async fn add_address(
    pool: &SqlitePool,
    chat_id: ChatId,
    entry: &WatchedAddress,
) -> Result<(), WatchlistError> {
    ensure_chat(pool, chat_id).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO watched_addresses (chat_id, address, label)
        SELECT ?1, ?2, ?3
        WHERE (SELECT COUNT(*) FROM watched_addresses WHERE chat_id = ?1) < ?4
          AND NOT EXISTS (
              SELECT 1 FROM watched_addresses WHERE chat_id = ?1 AND address = ?2
          );
        "#,
    )
    .bind(chat_id)
    .bind(entry.address.as_str())
    .bind(&entry.label)
    .bind(MAX_ADDRESSES_PER_CHAT as i64)
    .execute(pool)
    .await;

    let result = match inserted {
        Ok(result) => result,
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            return Err(WatchlistError::Duplicate(entry.address.clone()));
        }
        Err(err) => return Err(err.into()),
    };
    if result.rows_affected() == 1 {
        return Ok(());
    }
    if contains_address(pool, chat_id, &entry.address).await? {
        Err(WatchlistError::Duplicate(entry.address.clone()))
    } else {
        Err(WatchlistError::Full)
    }
}

async fn contains_address(
    pool: &SqlitePool,
    chat_id: ChatId,
    address: &Address,
) -> Result<bool, WatchlistError> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM watched_addresses WHERE chat_id = ?1 AND address = ?2;",
    )
    .bind(chat_id)
    .bind(address.as_str())
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn remove_address(
    pool: &SqlitePool,
    chat_id: ChatId,
    address: &Address,
) -> Result<(), WatchlistError> {
    let result = sqlx::query("DELETE FROM watched_addresses WHERE chat_id = ?1 AND address = ?2;")
        .bind(chat_id)
        .bind(address.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(WatchlistError::NotFound(address.clone()));
    }
    Ok(())
}

/// Watched addresses in insertion order. Rows that no longer parse are skipped.
pub async fn list_addresses(
    pool: &SqlitePool,
    chat_id: ChatId,
) -> Result<Vec<WatchedAddress>, WatchlistError> {
    #[derive(FromRow)]
    struct Row {
        address: String,
        label: Option<String>,
    }

    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT address, label
        FROM watched_addresses
        WHERE chat_id = ?1
        ORDER BY id ASC;
        "#,
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match row.address.parse() {
            Ok(address) => Some(WatchedAddress {
                address,
                label: row.label,
            }),
            Err(err) => {
                tracing::warn!(chat_id, "skipping stored address: {}", err);
                None
            }
        })
        .collect())
}

pub async fn set_update_interval(
    pool: &SqlitePool,
    chat_id: ChatId,
    secs: f64,
) -> Result<(), WatchlistError> {
    if !secs.is_finite() || secs < MIN_UPDATE_INTERVAL_SECS {
        return Err(WatchlistError::IntervalTooShort(secs));
    }
    sqlx::query(
        r#"
        INSERT INTO chats (chat_id, update_interval_secs) VALUES (?1, ?2)
        ON CONFLICT(chat_id) DO UPDATE SET update_interval_secs = excluded.update_interval_secs;
        "#,
    )
    .bind(chat_id)
    .bind(secs)
    .execute(pool)
    .await?;
    Ok(())
}

/// The chat's interval, or `default_secs` if none was set.
pub async fn update_interval(
    pool: &SqlitePool,
    chat_id: ChatId,
    default_secs: f64,
) -> Result<f64, WatchlistError> {
    let row: Option<(Option<f64>,)> =
        sqlx::query_as("SELECT update_interval_secs FROM chats WHERE chat_id = ?1;")
            .bind(chat_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(secs,)| secs).unwrap_or(default_secs))
}

pub async fn list_chats(pool: &SqlitePool) -> Result<Vec<ChatId>, WatchlistError> {
    let rows: Vec<(ChatId,)> = sqlx::query_as("SELECT chat_id FROM chats ORDER BY chat_id;")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
