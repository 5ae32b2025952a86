use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub type UserId = Uuid;

/// A stored account. `password_hash` is an Argon2id PHC string that carries its own salt.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<Date>,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub address: Option<String>,
}

/// Partial profile change. `None` and empty strings leave the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub birth_date: Option<Date>,
    pub address: Option<String>,
}

impl ProfileUpdate {
    pub(crate) fn normalized(self) -> Self {
        Self {
            full_name: self.full_name.filter(|v| !v.is_empty()),
            birth_date: self.birth_date,
            address: self.address.filter(|v| !v.is_empty()),
        }
    }
}

/// What a signed-in user sees about themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub birth_date: Option<Date>,
    pub address: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub roles: Vec<String>,
}

impl ProfileView {
    pub fn new(user: User, roles: Vec<String>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            birth_date: user.birth_date,
            address: user.address,
            created_at: user.created_at,
            last_login: user.last_login,
            roles,
        }
    }
}
