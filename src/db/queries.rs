use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{NewPin, Pin};

// ========== Key-value state ==========

/// Read a state slot.
pub async fn get_state(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_state WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to read state slot")?;
    Ok(row.map(|(value,)| value))
}

/// Overwrite a state slot.
pub async fn put_state(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO kv_state (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        ",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .context("Failed to write state slot")?;
    Ok(())
}

// ========== Pins ==========

/// Insert a pin unless the thread is already pinned.
///
/// Returns `true` if a new row was written.
pub async fn insert_pin_if_absent(pool: &SqlitePool, pin: &NewPin) -> Result<bool> {
    let thread_no = i64::try_from(pin.thread_no).context("Thread number out of range")?;
    let post_no = i64::try_from(pin.post_no).context("Post number out of range")?;

    let result = sqlx::query(
        r"
        INSERT OR IGNORE INTO pins (site, board, thread_no, post_no, subject, pin_type)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&pin.site)
    .bind(&pin.board)
    .bind(thread_no)
    .bind(post_no)
    .bind(&pin.subject)
    .bind(pin.pin_type.as_str())
    .execute(pool)
    .await
    .context("Failed to insert pin")?;

    Ok(result.rows_affected() > 0)
}

/// All pins, oldest first.
pub async fn list_pins(pool: &SqlitePool) -> Result<Vec<Pin>> {
    sqlx::query_as("SELECT * FROM pins ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to list pins")
}
