use std::sync::Arc;

use crate::infra::content::{ContentStore, SqlContentStore};
use crate::infra::db::Db;
use crate::infra::news::{NewsStore, SqlNewsStore};
use crate::infra::users::{RoleStore, SqlStore, UserStore};
use crate::security::config::SecurityConfig;
use crate::security::jwt::JwtManager;
use crate::security::password::PasswordHasher;
use crate::security::rate_limit::RateLimiter;
use crate::service::accounts::AccountService;

pub struct AppState {
    pub accounts: AccountService,
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub news: Arc<dyn NewsStore>,
    pub content: Arc<dyn ContentStore>,
    pub hasher: PasswordHasher,
    pub jwt: JwtManager,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(db: Db, config: &SecurityConfig) -> anyhow::Result<Arc<Self>> {
        let store = Arc::new(SqlStore::new(db.clone()));
        let users: Arc<dyn UserStore> = store.clone();
        let roles: Arc<dyn RoleStore> = store;
        let hasher = PasswordHasher::new(config.hash_cost, config.password_policy.clone())?;
        let jwt = JwtManager::new(&config.jwt);
        let accounts = AccountService::new(users.clone(), roles.clone(), hasher.clone(), jwt.clone());

        Ok(Arc::new(Self {
            accounts,
            users,
            roles,
            news: Arc::new(SqlNewsStore::new(db.clone())),
            content: Arc::new(SqlContentStore::new(db)),
            hasher,
            jwt,
            rate_limiter: RateLimiter::new(&config.rate_limit),
        }))
    }
}
