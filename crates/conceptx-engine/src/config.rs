//! Engine configuration
//!
//! Loaded from a TOML file. Every section is optional; missing keys take the
//! defaults below.
//!
//! ```toml
//! database = ".conceptx/store.db"
//!
//! [logging]
//! profile = "production"
//!
//! [permissions]
//! canonical_default = "modify"
//! reference_default = "read"
//!
//! [processing]
//! max_cascade_operations = 10000
//! ```

#![allow(clippy::result_large_err)]

use conceptx_core::errors::{ExError, ExErrorKind, ExResult};
use conceptx_core::logging_facility::Profile;
use conceptx_core::permission::{AccessRight, ScopeDefaults};
use conceptx_core::processor::DEFAULT_MAX_CASCADE_OPERATIONS;
use conceptx_core::ProcessorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = ".conceptx/store.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub database: PathBuf,
    pub logging: LoggingConfig,
    pub permissions: PermissionsConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub profile: Profile,
}

/// Rights applied when an actor's role names none for a concept type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsConfig {
    pub canonical_default: AccessRight,
    pub reference_default: AccessRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    pub max_cascade_operations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            logging: LoggingConfig::default(),
            permissions: PermissionsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        let defaults = ScopeDefaults::default();
        Self {
            canonical_default: defaults.canonical,
            reference_default: defaults.reference,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_cascade_operations: DEFAULT_MAX_CASCADE_OPERATIONS,
        }
    }
}

impl PermissionsConfig {
    pub fn scope_defaults(&self) -> ScopeDefaults {
        ScopeDefaults {
            canonical: self.canonical_default,
            reference: self.reference_default,
        }
    }
}

impl ProcessingConfig {
    pub fn settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            max_cascade_operations: self.max_cascade_operations,
        }
    }
}

impl EngineConfig {
    /// Read and parse a TOML configuration file
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Validation` if it is not a valid
    /// configuration.
    pub fn load(path: impl AsRef<Path>) -> ExResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("load_config")
                .with_message(format!("{}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// `load` when a path is given, defaults otherwise
    ///
    /// # Errors
    ///
    /// Same as [`EngineConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> ExResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// `Validation` on malformed TOML, unknown keys, or a zero cascade limit.
    pub fn parse(text: &str) -> ExResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| {
            ExError::new(ExErrorKind::Validation)
                .with_op("load_config")
                .with_message(e.to_string())
        })?;
        if config.processing.max_cascade_operations == 0 {
            return Err(ExError::new(ExErrorKind::Validation)
                .with_op("load_config")
                .with_message("processing.max_cascade_operations must be at least 1"));
        }
        Ok(config)
    }

    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = database.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.database, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(
            config.processing.max_cascade_operations,
            DEFAULT_MAX_CASCADE_OPERATIONS
        );
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = EngineConfig::parse(
            r#"
            database = "data/model.db"

            [logging]
            profile = "production"

            [permissions]
            reference_default = "none"

            [processing]
            max_cascade_operations = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.database, PathBuf::from("data/model.db"));
        assert_eq!(config.logging.profile, Profile::Production);
        assert_eq!(config.permissions.reference_default, AccessRight::None);
        assert_eq!(config.permissions.canonical_default, AccessRight::Modify);
        assert_eq!(config.processing.settings().max_cascade_operations, 50);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = EngineConfig::parse("[processing]\nmax_cascades = 3\n").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Validation);
    }

    #[test]
    fn test_zero_cascade_limit_is_rejected() {
        let err = EngineConfig::parse("[processing]\nmax_cascade_operations = 0\n").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Validation);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Io);
    }
}
