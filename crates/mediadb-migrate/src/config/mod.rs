//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl MigrationConfig {
    /// Load configuration from a YAML file. Not validated; the caller applies
    /// environment and flag overrides first.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: MigrationConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_defaults() {
        let config = MigrationConfig::from_yaml("old_dsn: host=a dbname=old\n").unwrap();
        assert_eq!(config.old_dsn, "host=a dbname=old");
        assert_eq!(config.phase, "refs");
        assert!(!config.dry_run);
        assert_eq!(config.progress_every, 50_000);
        assert_eq!(config.missing_log_limit, 20);
        assert_eq!(
            config.max_duration(),
            Some(std::time::Duration::from_secs(86_400))
        );
    }

    #[test]
    fn test_zero_max_duration_disables_deadline() {
        let config = MigrationConfig::from_yaml("max_duration_secs: 0\n").unwrap();
        assert_eq!(config.max_duration(), None);
    }

    #[test]
    fn test_redacts_spaced_and_quoted_passwords() {
        assert_eq!(
            redact_dsn("host=db password = hunter2 dbname=m"),
            "host=db password=*** dbname=m"
        );
        assert_eq!(
            redact_dsn("host=db password='hunter 2' dbname=m"),
            "host=db password=*** dbname=m"
        );
        assert_eq!(
            redact_dsn(r"host=db password='it\'s secret' user=app"),
            "host=db password=*** user=app"
        );
        assert_eq!(redact_dsn("host=db application_name='a b'"), "host=db application_name='a b'");
    }

    #[test]
    fn test_redacts_url_query_password() {
        let redacted = redact_dsn("postgres://db/movies?user=app&password=hunter2&sslmode=disable");
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.ends_with("?user=app&password=***&sslmode=disable"));
    }

    #[test]
    fn test_malformed_key_value_dsn_hides_remainder() {
        let redacted = redact_dsn("host=db hunter2 password");
        assert!(!redacted.contains("hunter2"));
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let config = MigrationConfig {
            old_dsn: "host=db user=app password=hunter2 dbname=mediadb".into(),
            new_dsn: "postgres://app:s3cret@db:5432/movies".into(),
            ..MigrationConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("password=***"));
        assert!(debug.contains("postgres://app:***@db:5432/movies"));
    }
}
