pub mod content;
pub mod news;
pub mod role;
pub mod user;
