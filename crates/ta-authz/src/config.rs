//! Engine configuration, optionally loaded from a TOML file.
//!
//! ```toml
//! decision_rule = "allow"
//! max_steps = 100000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AuthzError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Predicate queried by `is_allowed` and `explain`.
    #[serde(default = "default_decision_rule")]
    pub decision_rule: String,

    /// Cap on goals executed per query. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_rule: default_decision_rule(),
            max_steps: None,
        }
    }
}

fn default_decision_rule() -> String {
    "allow".to_string()
}

impl EngineConfig {
    /// Parse configuration text. `origin` names the source in errors.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, AuthzError> {
        let config: EngineConfig = toml::from_str(content).map_err(|e| AuthzError::InvalidConfig {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, AuthzError> {
        let content = std::fs::read_to_string(path).map_err(|e| AuthzError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content, path)
    }

    fn validate(&self, origin: &Path) -> Result<(), AuthzError> {
        let invalid = |reason: &str| AuthzError::InvalidConfig {
            path: origin.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.decision_rule.trim().is_empty() {
            return Err(invalid("decision_rule must not be empty"));
        }
        if self.max_steps == Some(0) {
            return Err(invalid("max_steps must be at least 1"));
        }
        Ok(())
    }
}
