//! Configuration loading, schema definitions, and validation.

pub mod schema;

pub use schema::*;

use std::collections::BTreeSet;
use std::path::Path;

use crate::model::TestCategory;

/// Errors that make a configuration unusable. Rejected before any test runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_workers must be at least 1 (got {0})")]
    InvalidWorkers(usize),

    #[error("unknown test category: {0}")]
    UnknownCategory(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    load_config_str(&content)
}

/// Load and validate configuration from a string.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Check invariants that serde cannot express.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.run.max_workers < 1 {
        return Err(ConfigError::InvalidWorkers(config.run.max_workers));
    }
    Ok(())
}

/// Parse category names as they appear in config files and CLI flags.
pub fn parse_categories(names: &[String]) -> Result<BTreeSet<TestCategory>, ConfigError> {
    let mut categories = BTreeSet::new();
    for name in names {
        match TestCategory::parse(name) {
            Some(category) => {
                categories.insert(category);
            }
            None => return Err(ConfigError::UnknownCategory(name.clone())),
        }
    }
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = load_config_str("").unwrap();
        assert_eq!(config.run.max_workers, 4);
        assert_eq!(config.run.retry_flaky, 3);
        assert!(config.run.parallel);
        assert!(!config.run.fail_fast);
        assert_eq!(config.discovery.file_pattern, "test_*.py");
        assert_eq!(config.discovery.method_prefix, "test_");
    }

    #[test]
    fn zero_workers_rejected() {
        let err = load_config_str("[run]\nmax_workers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkers(0)));
    }

    #[test]
    fn unknown_category_rejected() {
        let names = vec!["unit".to_string(), "quantum".to_string()];
        let err = parse_categories(&names).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCategory(name) if name == "quantum"));

        let names = vec!["unit".to_string(), "api".to_string()];
        let categories = parse_categories(&names).unwrap();
        assert_eq!(categories.len(), 2);
    }

    #[test]
    fn category_filter_parses() {
        let config = load_config_str("[run]\ncategories = [\"unit\", \"api\"]\n").unwrap();
        assert_eq!(config.run.categories.len(), 2);
        assert!(config
            .run
            .category_enabled(crate::model::TestCategory::Unit));
        assert!(!config
            .run
            .category_enabled(crate::model::TestCategory::Mock));
    }

    #[test]
    fn empty_filter_enables_everything() {
        let config = Config::default();
        for cat in crate::model::TestCategory::ALL {
            assert!(config.run.category_enabled(cat));
        }
    }
}
