use amf::{AmfVersion, ContextOptions, UnknownTypePolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Codec limits and the unknown class policy
    pub context: ContextOptions,

    /// Encoding used when no --version is given
    pub default_version: AmfVersion,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file, or the defaults when none is given
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read configuration file {}", path.display())
                })?;
                toml::from_str(&content).context("Failed to parse configuration file")
            }
            None => Ok(Self::default()),
        }
    }

    /// Context options with command line overrides applied
    pub fn context_options(&self, max_allocation: Option<usize>, strict: bool) -> ContextOptions {
        let mut options = self.context.clone();
        if let Some(limit) = max_allocation {
            options.max_allocation = limit;
        }
        if strict {
            options.unknown_types = UnknownTypePolicy::Reject;
        }
        options
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_defaults_without_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_version, AmfVersion::Amf3);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "default_version = \"amf0\"\n\n[context]\nmax_depth = 8\nunknown_types = \"reject\""
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.default_version, AmfVersion::Amf0);
        assert_eq!(config.context.max_depth, 8);
        assert_eq!(config.context.unknown_types, UnknownTypePolicy::Reject);
        assert_eq!(
            config.context.max_allocation,
            ContextOptions::DEFAULT_MAX_ALLOCATION
        );
        assert!(!config.pretty);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/amfdump.toml"))).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let config = AppConfig::default();
        let options = config.context_options(Some(64), true);

        assert_eq!(options.max_allocation, 64);
        assert_eq!(options.unknown_types, UnknownTypePolicy::Reject);
        assert_eq!(config.context_options(None, false), config.context);
    }
}
