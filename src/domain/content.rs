use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A keyed static page such as `about` or `privacy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyContent {
    pub id: i64,
    pub key: String,
    pub title: String,
    pub content: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInput {
    pub title: String,
    pub content: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
}
