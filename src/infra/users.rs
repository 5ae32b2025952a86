use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::role::{Role, RoleId};
use crate::domain::user::{NewUser, ProfileUpdate, User, UserId};
use crate::infra::db::Db;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error("email already exists")]
    DuplicateEmail,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Credential store. Username and email lookups are exact, case-sensitive matches.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user and grants `default_role` (created if missing) atomically.
    async fn create_user(&self, new: NewUser, default_role: &str) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User, StoreError>;
    async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), StoreError>;
    async fn record_login(&self, id: UserId, at: OffsetDateTime) -> Result<(), StoreError>;
    /// Every user with their role names, newest first, in one round trip.
    async fn list_users_with_roles(&self) -> Result<Vec<(User, Vec<String>)>, StoreError>;
}

/// Role registry.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn ensure_role(&self, name: &str) -> Result<RoleId, StoreError>;
    async fn assign_role(&self, user_id: UserId, role: &str) -> Result<(), StoreError>;
    async fn roles_of(&self, user_id: UserId) -> Result<Vec<String>, StoreError>;
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, address, birth_date, created_at, last_login";

#[derive(Clone)]
pub struct SqlStore {
    db: Db,
}

impl SqlStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|r| user_from_row(&r)).transpose()?)
    }
}

#[async_trait]
impl UserStore for SqlStore {
    async fn create_user(&self, new: NewUser, default_role: &str) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            full_name: new.full_name,
            address: new.address,
            birth_date: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        };

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, full_name, address, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.address)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
            .bind(default_role)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id)
             SELECT ?, id FROM roles WHERE name = ?",
        )
        .bind(user.id)
        .bind(default_role)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;
        Ok(row.map(|r| user_from_row(&r)).transpose()?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email).await
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User, StoreError> {
        let update = update.normalized();
        let res = sqlx::query(
            "UPDATE users SET
                full_name = COALESCE(?, full_name),
                birth_date = COALESCE(?, birth_date),
                address = COALESCE(?, address)
             WHERE id = ?",
        )
        .bind(update.full_name)
        .bind(update.birth_date)
        .bind(update.address)
        .bind(id)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        self.find_by_id(id).await?.ok_or(StoreError::NotFound("user"))
    }

    async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn record_login(&self, id: UserId, at: OffsetDateTime) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn list_users_with_roles(&self) -> Result<Vec<(User, Vec<String>)>, StoreError> {
        // Role names never contain a comma; names are checked before they reach the store.
        let rows = sqlx::query(
            "SELECT u.id AS id, u.username AS username, u.email AS email,
                    u.password_hash AS password_hash, u.full_name AS full_name,
                    u.address AS address, u.birth_date AS birth_date,
                    u.created_at AS created_at, u.last_login AS last_login,
                    GROUP_CONCAT(r.name, ',') AS roles
             FROM users u
             LEFT JOIN user_roles ur ON ur.user_id = u.id
             LEFT JOIN roles r ON r.id = ur.role_id
             GROUP BY u.id
             ORDER BY u.created_at DESC",
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let user = user_from_row(row)?;
                let joined: Option<String> = row.try_get("roles")?;
                let mut roles: Vec<String> = joined
                    .as_deref()
                    .map(|s| s.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                roles.sort();
                Ok((user, roles))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl RoleStore for SqlStore {
    async fn ensure_role(&self, name: &str) -> Result<RoleId, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
            .bind(name)
            .execute(&self.db)
            .await?;
        let id = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
            .bind(name)
            .fetch_one(&self.db)
            .await?;
        Ok(id)
    }

    async fn assign_role(&self, user_id: UserId, role: &str) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;
        let user_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user_exists.is_none() {
            return Err(StoreError::NotFound("user"));
        }
        let role_id: Option<RoleId> = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
            .bind(role)
            .fetch_optional(&mut *tx)
            .await?;
        let role_id = role_id.ok_or(StoreError::NotFound("role"))?;
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn roles_of(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        let roles = sqlx::query_scalar(
            "SELECT r.name FROM roles r
             JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = ?
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(roles)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM roles ORDER BY name")
            .fetch_all(&self.db)
            .await?;
        let roles = rows
            .iter()
            .map(|r| {
                Ok(Role {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(roles)
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        address: row.try_get("address")?,
        birth_date: row.try_get("birth_date")?,
        created_at: row.try_get("created_at")?,
        last_login: row.try_get("last_login")?,
    })
}

/// Turns the store's uniqueness constraint into the matching duplicate error.
fn map_unique(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            if message.contains("users.email") {
                return StoreError::DuplicateEmail;
            }
            if message.contains("users.username") {
                return StoreError::DuplicateUsername;
            }
        }
    }
    StoreError::Database(err)
}
