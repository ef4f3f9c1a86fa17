use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, time-sortable identifier for any store row (UUIDv7 — sortable,
/// traceable in logs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Service tier — determines context window, output cap, and daily budget (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Max,
}

impl Tier {
    /// Canonicalize input aliases: basic->free, plus/premium->pro, enterprise->max.
    pub fn parse_alias(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "free" | "basic" => Some(Tier::Free),
            "pro" | "plus" | "premium" => Some(Tier::Pro),
            "max" | "enterprise" => Some(Tier::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Max => "max",
        }
    }

    /// Ordinal used to check `tier_level(forced) <= tier_level(token)` (§4.5).
    pub fn level(&self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Pro => 1,
            Tier::Max => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tier::parse_alias(s).ok_or_else(|| format!("unknown tier: {}", s))
    }
}

/// The upstream providers a request may be routed or forced to (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    DeepSeek,
    Kimi,
    Claude,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::DeepSeek => "deepseek",
            Provider::Kimi => "kimi",
            Provider::Claude => "claude",
        }
    }

    pub fn from_path_segment(s: &str) -> Option<Self> {
        match s {
            "deepseek" => Some(Provider::DeepSeek),
            "kimi" => Some(Provider::Kimi),
            "claude" => Some(Provider::Claude),
            _ => None,
        }
    }

    /// The minimum tier level required to force this provider (§4.5):
    /// `claude` is reserved for `max`, the others are open to everyone.
    pub fn min_tier_level(&self) -> u8 {
        match self {
            Provider::DeepSeek | Provider::Kimi => 0,
            Provider::Claude => Tier::Max.level(),
        }
    }

    /// Default provider for a tier when the caller does not force one.
    pub fn default_for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Provider::Kimi,
            Tier::Pro => Provider::Kimi,
            Tier::Max => Provider::Claude,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content of a chat message: plain text, or a multimodal parts list
/// (§4.5/§4.6) — the shape both provider adapters and the quota engine
/// project requests into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Sum of `approx_tokens` over text parts only (§4.4): for a plain
    /// string that's the whole string; for a parts list, only `type: text`
    /// entries contribute.
    pub fn text_for_estimation(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// A single chat message as exchanged with an upstream provider (§4.5) —
/// distinct from `proxy_store::types::Message`, which is the persisted,
/// always-text row; this is the in-flight, possibly-multimodal view built
/// from it at dispatch time (§4.7 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_aliases_canonicalize() {
        assert_eq!(Tier::parse_alias("basic"), Some(Tier::Free));
        assert_eq!(Tier::parse_alias("PLUS"), Some(Tier::Pro));
        assert_eq!(Tier::parse_alias("premium"), Some(Tier::Pro));
        assert_eq!(Tier::parse_alias("Enterprise"), Some(Tier::Max));
        assert_eq!(Tier::parse_alias("bogus"), None);
    }

    #[test]
    fn default_provider_routing_matches_tiers() {
        assert_eq!(Provider::default_for_tier(Tier::Free), Provider::Kimi);
        assert_eq!(Provider::default_for_tier(Tier::Pro), Provider::Kimi);
        assert_eq!(Provider::default_for_tier(Tier::Max), Provider::Claude);
    }

    #[test]
    fn forcing_claude_requires_max_tier() {
        assert!(Provider::Claude.min_tier_level() > Tier::Pro.level());
        assert!(Provider::Claude.min_tier_level() <= Tier::Max.level());
        assert!(Provider::Kimi.min_tier_level() <= Tier::Free.level());
    }
}
