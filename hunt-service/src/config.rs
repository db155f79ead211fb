// Engine Configuration
// YAML configuration for timeouts, the execution store and command plugins

use crate::hunt::builtin::default_command_specs;
use crate::plugins::CommandSpec;

use std::collections::HashSet;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "HUNT_CONFIG";

/// Environment variable overriding the default step timeout (seconds)
pub const TIMEOUT_ENV: &str = "HUNT_DEFAULT_STEP_TIMEOUT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where execution records are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Json {
        dir: PathBuf,
    },
}

/// Hunt engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for steps that do not set their own
    pub default_step_timeout_secs: u64,

    pub store: StoreConfig,

    /// Register the built-in command plugins (dig, whois, curl, ...)
    pub include_default_plugins: bool,

    /// Extra command plugins; an entry named like a built-in replaces it
    pub plugins: Vec<CommandSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_secs: 300,
            store: StoreConfig::Memory,
            include_default_plugins: true,
            plugins: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Default config file location: `<config_dir>/osint-hunt/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("osint-hunt").join("config.yaml"))
    }

    /// Load configuration
    ///
    /// Source order: `explicit`, then `$HUNT_CONFIG`, then the default path if it
    /// exists, then built-in defaults. `$HUNT_DEFAULT_STEP_TIMEOUT` is applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| Self::default_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading engine config");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_timeout_override(env::var(TIMEOUT_ENV).ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        // An empty file means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the timeout override from the environment, if set
    pub fn apply_timeout_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(value) = value {
            self.default_step_timeout_secs =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv {
                        var: TIMEOUT_ENV.to_string(),
                        value: value.to_string(),
                    })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_step_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "default_step_timeout_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if plugin.name.trim().is_empty() {
                return Err(ConfigError::Invalid("plugin with an empty name".to_string()));
            }
            if plugin.program.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "plugin '{}' has no program",
                    plugin.name
                )));
            }
            if !seen.insert(plugin.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "plugin '{}' is defined more than once",
                    plugin.name
                )));
            }
        }

        if let StoreConfig::Json { dir } = &self.store {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("json store needs a dir".to_string()));
            }
        }

        Ok(())
    }

    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.default_step_timeout_secs)
    }

    /// Command plugins to register: built-ins (if enabled) merged with configured ones
    pub fn command_specs(&self) -> Vec<CommandSpec> {
        let mut specs: Vec<CommandSpec> = if self.include_default_plugins {
            default_command_specs()
                .into_iter()
                .filter(|d| !self.plugins.iter().any(|p| p.name == d.name))
                .collect()
        } else {
            Vec::new()
        };
        specs.extend(self.plugins.iter().cloned());
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_step_timeout(), Duration::from_secs(300));
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.command_specs().iter().any(|s| s.name == "dns_lookup"));
    }

    #[test]
    fn test_parse_yaml() {
        let config = EngineConfig::from_yaml_str(
            r#"
default_step_timeout_secs: 45
store:
  kind: json
  dir: /var/lib/hunts
plugins:
  - name: dns_lookup
    program: drill
    args: ["{domain}"]
  - name: shodan_host
    program: shodan
    args: ["host", "{address}"]
    description: Shodan host lookup
"#,
        )
        .unwrap();

        assert_eq!(config.default_step_timeout_secs, 45);
        assert_eq!(
            config.store,
            StoreConfig::Json {
                dir: PathBuf::from("/var/lib/hunts")
            }
        );

        let specs = config.command_specs();
        let dns: Vec<&CommandSpec> = specs.iter().filter(|s| s.name == "dns_lookup").collect();
        assert_eq!(dns.len(), 1);
        assert_eq!(dns[0].program, "drill");
        assert!(specs.iter().any(|s| s.name == "shodan_host"));
        assert!(specs.iter().any(|s| s.name == "whois_lookup"));
    }

    #[test]
    fn test_disable_default_plugins() {
        let config = EngineConfig::from_yaml_str("include_default_plugins: false\n").unwrap();
        assert!(config.command_specs().is_empty());
    }

    #[test]
    fn test_rejects_zero_timeout_and_duplicates() {
        assert!(matches!(
            EngineConfig::from_yaml_str("default_step_timeout_secs: 0"),
            Err(ConfigError::Invalid(_))
        ));

        let duplicate = r#"
plugins:
  - { name: probe, program: curl }
  - { name: probe, program: wget }
"#;
        assert!(matches!(
            EngineConfig::from_yaml_str(duplicate),
            Err(ConfigError::Invalid(msg)) if msg.contains("more than once")
        ));
    }

    #[test]
    fn test_parse_error_names_origin() {
        let err = EngineConfig::from_yaml_str("default_step_timeout_secs: [").unwrap_err();
        assert!(err.to_string().contains("<inline>"));
    }

    #[test]
    fn test_timeout_override() {
        let mut config = EngineConfig::default();
        config.apply_timeout_override(Some("30")).unwrap();
        assert_eq!(config.default_step_timeout_secs, 30);

        config.apply_timeout_override(None).unwrap();
        assert_eq!(config.default_step_timeout_secs, 30);

        assert!(matches!(
            config.apply_timeout_override(Some("soon")),
            Err(ConfigError::InvalidEnv { .. })
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "default_step_timeout_secs: 12").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_step_timeout_secs, 12);

        let missing = EngineConfig::from_file(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
