use anyhow::{anyhow, Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::domain::{Item, ItemId, UserId};

const ITEM_COLUMNS: &str = "item_id, name, amount, exp_date, box";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
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

    /// Returns the existing user id when the username is already taken.
    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn username_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT username FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    /// Persists a new item under a freshly assigned id. Any id on `item` is ignored.
    pub async fn insert_item(&self, user_id: UserId, item: &Item) -> Result<Item> {
        let item_id = Uuid::new_v4().to_string();
        let row = sqlx::query(&format!(
            "INSERT INTO items (item_id, user_id, name, amount, exp_date, box)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&item_id)
        .bind(user_id.0)
        .bind(&item.name)
        .bind(item.amount)
        .bind(&item.exp_date)
        .bind(&item.box_label)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert item for user {user_id}"))?;
        item_from_row(&row)
    }

    /// Replaces every field except the id. Returns `None` when the user owns no such item.
    pub async fn update_item(&self, user_id: UserId, item: &Item) -> Result<Option<Item>> {
        let item_id = item
            .assigned_id()
            .ok_or_else(|| anyhow!("cannot update an item without an id"))?;
        let row = sqlx::query(&format!(
            "UPDATE items
             SET name = ?, amount = ?, exp_date = ?, box = ?, updated_at = CURRENT_TIMESTAMP
             WHERE user_id = ? AND item_id = ?
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&item.name)
        .bind(item.amount)
        .bind(&item.exp_date)
        .bind(&item.box_label)
        .bind(user_id.0)
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update item {item_id}"))?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// Deletes the item and hands back the value it held.
    pub async fn delete_item(&self, user_id: UserId, item_id: &ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "DELETE FROM items WHERE user_id = ? AND item_id = ? RETURNING {ITEM_COLUMNS}"
        ))
        .bind(user_id.0)
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to delete item {item_id}"))?;
        row.as_ref().map(item_from_row).transpose()
    }

    pub async fn load_item(&self, user_id: UserId, item_id: &ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE user_id = ? AND item_id = ?"
        ))
        .bind(user_id.0)
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// All items of one user ordered by `(exp_date, item_id)`.
    pub async fn list_items_for_user(&self, user_id: UserId) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE user_id = ? ORDER BY exp_date ASC, item_id ASC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list items for user {user_id}"))?;
        rows.iter().map(item_from_row).collect()
    }

    /// Id of the item sorting immediately before `item` in `(exp_date, item_id)` order.
    pub async fn preceding_item_id(&self, user_id: UserId, item: &Item) -> Result<Option<ItemId>> {
        let item_id = item
            .assigned_id()
            .ok_or_else(|| anyhow!("cannot order an item without an id"))?;
        let row = sqlx::query(
            "SELECT item_id FROM items
             WHERE user_id = ?1 AND (exp_date < ?2 OR (exp_date = ?2 AND item_id < ?3))
             ORDER BY exp_date DESC, item_id DESC
             LIMIT 1",
        )
        .bind(user_id.0)
        .bind(&item.exp_date)
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ItemId(r.get::<String, _>(0))))
    }

    pub async fn count_items_for_user(&self, user_id: UserId) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    Ok(Item {
        id: Some(ItemId(row.try_get("item_id")?)),
        name: row.try_get("name")?,
        amount: row.try_get("amount")?,
        exp_date: row.try_get("exp_date")?,
        box_label: row.try_get("box")?,
    })
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
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
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

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
