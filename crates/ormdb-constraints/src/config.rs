//! Constraint enforcement configuration.

use serde::Deserialize;

use crate::error::ConfigurationError;

/// Default maximum cascade depth.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 100;

/// Default maximum identifier length (PostgreSQL's limit).
pub const DEFAULT_MAX_IDENTIFIER_LENGTH: usize = 63;

/// Default repository name.
pub const DEFAULT_REPOSITORY: &str = "default";

/// Shortest identifier limit that still leaves room for a digest suffix.
const MIN_IDENTIFIER_LENGTH: usize = 16;

/// Configuration for constraint enforcement and migration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Maximum depth of recursive cascades.
    pub max_cascade_depth: usize,

    /// Log dependent failures tolerated under the non-strict `destroy` policy.
    pub log_destroy_failures: bool,

    /// Refuse strict policies on units of work that cannot roll back.
    pub require_atomic_units: bool,

    /// Longest generated constraint name.
    pub max_identifier_length: usize,

    /// Repository whose schema adapter is used for migrations.
    pub repository: String,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            log_destroy_failures: true,
            require_atomic_units: false,
            max_identifier_length: DEFAULT_MAX_IDENTIFIER_LENGTH,
            repository: DEFAULT_REPOSITORY.to_string(),
        }
    }
}

impl ConstraintConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration values.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_cascade_depth == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "max_cascade_depth must be at least 1".to_string(),
            ));
        }
        if self.max_identifier_length < MIN_IDENTIFIER_LENGTH {
            return Err(ConfigurationError::InvalidConfig(format!(
                "max_identifier_length must be at least {}",
                MIN_IDENTIFIER_LENGTH
            )));
        }
        if self.repository.is_empty() {
            return Err(ConfigurationError::InvalidConfig(
                "repository must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the maximum cascade depth.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Enable or disable logging of tolerated `destroy` failures.
    pub fn with_log_destroy_failures(mut self, enabled: bool) -> Self {
        self.log_destroy_failures = enabled;
        self
    }

    /// Require atomic units of work for strict policies.
    pub fn with_require_atomic_units(mut self, required: bool) -> Self {
        self.require_atomic_units = required;
        self
    }

    /// Set the maximum generated identifier length.
    pub fn with_max_identifier_length(mut self, length: usize) -> Self {
        self.max_identifier_length = length;
        self
    }

    /// Set the repository used for migrations.
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }
}
