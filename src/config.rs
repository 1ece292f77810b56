use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::models::PipelineKind;
use crate::pipeline::DEFAULT_MUTATION_TIMEOUT;

/// Settings read from `~/.pipeboard/rc`
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_location: PathBuf,
    pub mutation_timeout: Duration,
    pub default_pipeline: PipelineKind,
}

impl Config {
    /// Directory holding the rc file and the default database
    pub fn dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".pipeboard"))
    }

    /// Get the configuration file path
    pub fn path() -> Result<PathBuf> {
        Ok(Self::dir()?.join("rc"))
    }

    pub fn defaults(dir: &Path) -> Self {
        Self {
            data_location: dir.join("board.db"),
            mutation_timeout: DEFAULT_MUTATION_TIMEOUT,
            default_pipeline: PipelineKind::Deals,
        }
    }

    /// Load the rc file if present, otherwise defaults
    pub fn load() -> Result<Self> {
        let dir = Self::dir()?;
        let path = dir.join("rc");
        if !path.exists() {
            return Ok(Self::defaults(&dir));
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content, &dir).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse `key=value` lines. Relative paths resolve against `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config = Self::defaults(base_dir);

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("line {}: expected key=value, got '{}'", lineno + 1, line);
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "data.location" => {
                    let path = PathBuf::from(value);
                    config.data_location = if path.is_relative() {
                        base_dir.join(path)
                    } else {
                        path
                    };
                }
                "mutation.timeout_ms" => {
                    let ms: u64 = value
                        .parse()
                        .with_context(|| format!("line {}: mutation.timeout_ms must be a number of milliseconds", lineno + 1))?;
                    if ms == 0 {
                        bail!("line {}: mutation.timeout_ms must be positive", lineno + 1);
                    }
                    config.mutation_timeout = Duration::from_millis(ms);
                }
                "pipeline.default" => {
                    config.default_pipeline = PipelineKind::from_str(value)
                        .with_context(|| format!("line {}: unknown pipeline '{}'", lineno + 1, value))?;
                }
                other => log::warn!("Ignoring unknown config key '{}'", other),
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("", Path::new("/home/u/.pipeboard")).unwrap();
        assert_eq!(config.data_location, PathBuf::from("/home/u/.pipeboard/board.db"));
        assert_eq!(config.mutation_timeout, DEFAULT_MUTATION_TIMEOUT);
        assert_eq!(config.default_pipeline, PipelineKind::Deals);
    }

    #[test]
    fn test_parse_all_keys() {
        let content = "# board settings\n\
                       data.location=./custom.db\n\
                       mutation.timeout_ms = 2500\n\
                       pipeline.default=brokers\n\
                       color.theme=dark\n";
        let config = Config::parse(content, Path::new("/cfg")).unwrap();
        assert_eq!(config.data_location, PathBuf::from("/cfg/./custom.db"));
        assert_eq!(config.mutation_timeout, Duration::from_millis(2500));
        assert_eq!(config.default_pipeline, PipelineKind::Brokers);
    }

    #[test]
    fn test_absolute_location_kept() {
        let config = Config::parse("data.location=/var/lib/board.db", Path::new("/cfg")).unwrap();
        assert_eq!(config.data_location, PathBuf::from("/var/lib/board.db"));
    }

    #[test]
    fn test_malformed_values() {
        assert!(Config::parse("mutation.timeout_ms=soon", Path::new("/cfg")).is_err());
        assert!(Config::parse("mutation.timeout_ms=0", Path::new("/cfg")).is_err());
        assert!(Config::parse("pipeline.default=contacts", Path::new("/cfg")).is_err());
        assert!(Config::parse("just some words", Path::new("/cfg")).is_err());
    }
}
