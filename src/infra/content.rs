use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};
use time::OffsetDateTime;

use crate::domain::content::{CompanyContent, ContentInput};
use crate::infra::db::Db;
use crate::infra::users::StoreError;

/// Whether an upsert created the page or changed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn list(&self) -> Result<Vec<CompanyContent>, StoreError>;
    async fn get(&self, key: &str) -> Result<Option<CompanyContent>, StoreError>;
    async fn upsert(
        &self,
        key: &str,
        input: ContentInput,
    ) -> Result<(CompanyContent, Upserted), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

const CONTENT_COLUMNS: &str =
    "id, key, title, content, description, keywords, created_at, updated_at";

#[derive(Clone)]
pub struct SqlContentStore {
    db: Db,
}

impl SqlContentStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContentStore for SqlContentStore {
    async fn list(&self) -> Result<Vec<CompanyContent>, StoreError> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM company_contents ORDER BY key");
        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;
        Ok(rows
            .iter()
            .map(content_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get(&self, key: &str) -> Result<Option<CompanyContent>, StoreError> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM company_contents WHERE key = ?");
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.db).await?;
        Ok(row.map(|r| content_from_row(&r)).transpose()?)
    }

    async fn upsert(
        &self,
        key: &str,
        input: ContentInput,
    ) -> Result<(CompanyContent, Upserted), StoreError> {
        let now = OffsetDateTime::now_utc();
        // A fresh row keeps updated_at NULL; the conflict branch stamps it.
        let row = sqlx::query(
            "INSERT INTO company_contents (key, title, content, description, keywords, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (key) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                description = excluded.description,
                keywords = excluded.keywords,
                updated_at = ?
             RETURNING id, key, title, content, description, keywords, created_at, updated_at",
        )
        .bind(key)
        .bind(&input.title)
        .bind(&input.content)
        .bind(&input.description)
        .bind(&input.keywords)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        let content = content_from_row(&row)?;
        let outcome = if content.updated_at.is_some() {
            Upserted::Updated
        } else {
            Upserted::Created
        };
        Ok((content, outcome))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM company_contents WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("content"));
        }
        Ok(())
    }
}

fn content_from_row(row: &SqliteRow) -> Result<CompanyContent, sqlx::Error> {
    Ok(CompanyContent {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        description: row.try_get("description")?,
        keywords: row.try_get("keywords")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
