pub mod bucket;
pub mod limiter;

pub use bucket::Bucket;
pub use limiter::{client_ip, RateLimiter};
