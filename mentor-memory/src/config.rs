//! Store configuration
//!
//! Plain structs with `Default` impls, passed explicitly into constructors.
//! There is no global configuration and no config file parsing here; the
//! host application owns both.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Short-term tier capacity
    pub max_short_term: usize,
    /// Long-term tier capacity
    pub max_long_term: usize,
    /// Long-term retention: importance floor
    pub importance_threshold: f64,
    /// Long-term retention: confidence floor
    pub confidence_threshold: f64,
    /// Long-term retention: access-count floor
    pub access_threshold: u64,
    /// Sources that seed extra confidence at creation
    pub trusted_sources: Vec<String>,
    /// Default result bound for `search`
    pub search_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_short_term: 100,
            max_long_term: 1000,
            importance_threshold: 0.3,
            confidence_threshold: 0.3,
            access_threshold: 2,
            trusted_sources: vec![
                "user_input".to_string(),
                "system".to_string(),
                "verified".to_string(),
            ],
            search_limit: 50,
        }
    }
}

impl MemoryConfig {
    /// Whether `source` seeds the trusted-source confidence bonus
    pub fn is_trusted_source(&self, source: &str) -> bool {
        self.trusted_sources.iter().any(|s| s == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_short_term, 100);
        assert_eq!(config.max_long_term, 1000);
        assert_eq!(config.search_limit, 50);
        assert!(config.is_trusted_source("user_input"));
        assert!(!config.is_trusted_source("web_scrape"));
    }
}
