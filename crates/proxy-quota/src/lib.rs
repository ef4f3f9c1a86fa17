pub mod context;
pub mod error;
pub mod estimate;
pub mod gate;
pub mod tiers;

pub use error::{QuotaError, Result};
pub use estimate::{approx_tokens, messages_approx_tokens};
pub use gate::{GatedRequest, QuotaEngine};
pub use tiers::{limits_for, TierLimits};
