pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{ProxyError, Result};
pub use types::{ChatMessage, ContentPart, Id, ImageUrl, MessageContent, Provider, Tier};
