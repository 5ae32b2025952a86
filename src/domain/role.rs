use serde::{Deserialize, Serialize};

pub type RoleId = i64;

pub const ADMIN: &str = "Admin";
pub const USER: &str = "User";
pub const MANAGER: &str = "Manager";

/// Roles created at startup.
pub const BUILTIN_ROLES: [&str; 3] = [ADMIN, USER, MANAGER];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}
