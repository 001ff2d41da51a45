use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Environment, File, FileFormat};
use std::fs;

pub const CONFIG_FILE_NAME: &str = "tracesweep.yaml";

/// Prefix of environment overrides, e.g. `TRACESWEEP_CLEANER__DRY_RUN=true`.
pub const ENV_PREFIX: &str = "TRACESWEEP";

/// Loads and saves `tracesweep.yaml`.
///
/// Loading layers the YAML file (optional) under `TRACESWEEP_<SECTION>__<KEY>`
/// environment overrides. Missing keys fall back to [`AppConfig`] defaults.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager rooted at `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Load the configuration with environment overrides applied.
    pub fn load(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                File::from(self.config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: AppConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Load the YAML file alone, without environment overrides.
    pub fn load_file(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            return Ok(AppConfig::default());
        }

        let contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Write the default configuration unless a file already exists.
    pub fn write_default_if_missing(&self) -> Result<bool> {
        if self.config_path.exists() {
            return Ok(false);
        }
        self.save(&AppConfig::default())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, ConfigManager) {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("cfg")).unwrap();
        let manager = ConfigManager::new(&dir).unwrap();
        (temp, manager)
    }

    #[test]
    fn test_new_creates_dir() {
        let (_temp, manager) = manager();
        assert!(manager.config_dir().is_dir());
        assert!(manager.config_path().ends_with(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_load_file_missing_gives_defaults() {
        let (_temp, manager) = manager();
        assert_eq!(manager.load_file().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_write_default_once() {
        let (_temp, manager) = manager();
        assert!(manager.write_default_if_missing().unwrap());
        assert!(!manager.write_default_if_missing().unwrap());
        assert_eq!(manager.load_file().unwrap(), AppConfig::default());
    }
}
