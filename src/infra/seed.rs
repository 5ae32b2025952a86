use anyhow::Context;
use tracing::{info, warn};

use crate::domain::role::{ADMIN, BUILTIN_ROLES};
use crate::domain::user::NewUser;
use crate::infra::users::{RoleStore, StoreError, UserStore};
use crate::security::config::AdminSeed;
use crate::security::password::PasswordHasher;

/// Creates the built-in roles and the bootstrap admin. Safe to run on every start.
pub async fn seed(
    users: &dyn UserStore,
    roles: &dyn RoleStore,
    hasher: &PasswordHasher,
    admin: &AdminSeed,
) -> anyhow::Result<()> {
    for role in BUILTIN_ROLES {
        roles
            .ensure_role(role)
            .await
            .with_context(|| format!("failed to ensure role {role}"))?;
    }

    if users
        .find_by_email(&admin.email)
        .await
        .context("failed to look up admin account")?
        .is_some()
    {
        return Ok(());
    }

    let password_hash = hasher
        .hash(&admin.password)
        .await
        .context("bootstrap admin password rejected")?;
    let new = NewUser {
        username: admin.username.clone(),
        email: admin.email.clone(),
        password_hash,
        full_name: Some("System Administrator".into()),
        address: None,
    };
    match users.create_user(new, ADMIN).await {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, "bootstrap admin created");
            Ok(())
        }
        Err(StoreError::DuplicateUsername) => {
            warn!(
                username = %admin.username,
                "bootstrap admin skipped: username already belongs to another account"
            );
            Ok(())
        }
        Err(e) => Err(e).context("failed to create bootstrap admin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::{MANAGER, USER};
    use crate::infra::{db, users::SqlStore};
    use crate::security::config::test_config;

    #[tokio::test]
    async fn seeding_twice_leaves_one_admin() {
        let config = test_config();
        let store = SqlStore::new(db::memory().await);
        let hasher = PasswordHasher::new(config.hash_cost, config.password_policy.clone()).unwrap();

        seed(&store, &store, &hasher, &config.admin).await.unwrap();
        seed(&store, &store, &hasher, &config.admin).await.unwrap();

        let users = store.list_users_with_roles().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].1, vec![ADMIN.to_string()]);

        let names: Vec<_> = store
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, [ADMIN, MANAGER, USER]);
    }
}
