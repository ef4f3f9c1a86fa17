pub mod admin;
pub mod auth;
pub mod completions;
pub mod conversations;
pub mod health;
pub mod upload;
