use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};
use time::OffsetDateTime;

use crate::domain::news::{News, NewsId, NewsInput};
use crate::infra::db::Db;
use crate::infra::users::StoreError;

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Newest first; `published` filters when given.
    async fn list(&self, published: Option<bool>) -> Result<Vec<News>, StoreError>;
    async fn get(&self, id: NewsId) -> Result<Option<News>, StoreError>;
    async fn create(&self, input: NewsInput) -> Result<News, StoreError>;
    async fn update(&self, id: NewsId, input: NewsInput) -> Result<News, StoreError>;
    async fn delete(&self, id: NewsId) -> Result<(), StoreError>;
}

const NEWS_COLUMNS: &str = "id, title, content, summary, author, cover_image, is_published, \
                            created_at, updated_at, published_at";

#[derive(Clone)]
pub struct SqlNewsStore {
    db: Db,
}

impl SqlNewsStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NewsStore for SqlNewsStore {
    async fn list(&self, published: Option<bool>) -> Result<Vec<News>, StoreError> {
        let rows = match published {
            Some(flag) => {
                let sql = format!(
                    "SELECT {NEWS_COLUMNS} FROM news WHERE is_published = ? \
                     ORDER BY created_at DESC, id DESC"
                );
                sqlx::query(&sql).bind(flag).fetch_all(&self.db).await?
            }
            None => {
                let sql =
                    format!("SELECT {NEWS_COLUMNS} FROM news ORDER BY created_at DESC, id DESC");
                sqlx::query(&sql).fetch_all(&self.db).await?
            }
        };
        Ok(rows
            .iter()
            .map(news_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get(&self, id: NewsId) -> Result<Option<News>, StoreError> {
        let sql = format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;
        Ok(row.map(|r| news_from_row(&r)).transpose()?)
    }

    async fn create(&self, input: NewsInput) -> Result<News, StoreError> {
        let now = OffsetDateTime::now_utc();
        let published_at = input.is_published.then_some(now);
        let id: NewsId = sqlx::query_scalar(
            "INSERT INTO news (title, content, summary, author, cover_image, is_published, created_at, published_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&input.title)
        .bind(&input.content)
        .bind(&input.summary)
        .bind(&input.author)
        .bind(&input.cover_image)
        .bind(input.is_published)
        .bind(now)
        .bind(published_at)
        .fetch_one(&self.db)
        .await?;

        Ok(News {
            id,
            title: input.title,
            content: input.content,
            summary: input.summary,
            author: input.author,
            cover_image: input.cover_image,
            is_published: input.is_published,
            created_at: now,
            updated_at: None,
            published_at,
        })
    }

    async fn update(&self, id: NewsId, input: NewsInput) -> Result<News, StoreError> {
        let now = OffsetDateTime::now_utc();
        // published_at is stamped on the draft -> published transition only.
        let res = sqlx::query(
            "UPDATE news SET
                title = ?, content = ?, summary = ?, author = ?, cover_image = ?,
                updated_at = ?,
                published_at = CASE WHEN is_published = 0 AND ? = 1 THEN ? ELSE published_at END,
                is_published = ?
             WHERE id = ?",
        )
        .bind(&input.title)
        .bind(&input.content)
        .bind(&input.summary)
        .bind(&input.author)
        .bind(&input.cover_image)
        .bind(now)
        .bind(input.is_published)
        .bind(now)
        .bind(input.is_published)
        .bind(id)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("news"));
        }
        self.get(id).await?.ok_or(StoreError::NotFound("news"))
    }

    async fn delete(&self, id: NewsId) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM news WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("news"));
        }
        Ok(())
    }
}

fn news_from_row(row: &SqliteRow) -> Result<News, sqlx::Error> {
    Ok(News {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        author: row.try_get("author")?,
        cover_image: row.try_get("cover_image")?,
        is_published: row.try_get("is_published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        published_at: row.try_get("published_at")?,
    })
}
