use serde::{Deserialize, Serialize};

/// Default bucket capacity
pub const DEFAULT_MAX_TOKENS: u32 = 10;

/// Default number of tokens regenerated per second
pub const DEFAULT_REGEN_RATE: f64 = 10.0;

/// Token bucket parameters for request-rate throttling.
///
/// Passing `None` instead of a config to the client builder disables
/// throttling entirely; a config with both fields zero never yields a
/// token, so every acquisition waits until cancelled from outside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of tokens the bucket can hold. The bucket starts full.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Tokens added per second. Non-negative; fractional rates are allowed.
    #[serde(default = "default_regen_rate")]
    pub regen_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            regen_rate: default_regen_rate(),
        }
    }
}

/// Default bucket capacity
const fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Default number of tokens regenerated per second
const fn default_regen_rate() -> f64 {
    DEFAULT_REGEN_RATE
}

impl RateLimitConfig {
    /// Create a config from explicit values
    #[must_use]
    pub const fn new(max_tokens: u32, regen_rate: f64) -> Self {
        Self {
            max_tokens,
            regen_rate,
        }
    }

    /// Create a config from individual options, using defaults for missing
    /// values. Returns `None` (no throttling) only when both are unset.
    #[must_use]
    pub fn from_options(max_tokens: Option<u32>, regen_rate: Option<f64>) -> Option<Self> {
        match (max_tokens, regen_rate) {
            (None, None) => None,
            (tokens, rate) => Some(Self {
                max_tokens: tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                regen_rate: rate.unwrap_or(DEFAULT_REGEN_RATE),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limit_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_tokens, 10);
        assert!((config.regen_rate - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_options() {
        assert_eq!(RateLimitConfig::from_options(None, None), None);

        let config = RateLimitConfig::from_options(Some(5), None).unwrap();
        assert_eq!(config.max_tokens, 5);
        assert!((config.regen_rate - DEFAULT_REGEN_RATE).abs() < f64::EPSILON);

        let config = RateLimitConfig::from_options(None, Some(1.0)).unwrap();
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert!((config.regen_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_serialization() {
        let config = RateLimitConfig::new(15, 2.5);

        let toml = toml::to_string(&config).unwrap();
        let deserialized: RateLimitConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RateLimitConfig = toml::from_str("max_tokens = 3").unwrap();
        assert_eq!(config.max_tokens, 3);
        assert!((config.regen_rate - DEFAULT_REGEN_RATE).abs() < f64::EPSILON);
    }
}
