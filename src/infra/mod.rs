pub mod content;
pub mod db;
pub mod news;
pub mod seed;
pub mod users;
