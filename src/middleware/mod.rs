pub mod admin;
pub mod auth;
pub mod rate_limit;
