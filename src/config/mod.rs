use crate::error::ConfigError;
use crate::service::ArbiterSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Player configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Keep playing regardless of other applications taking the audio focus
    pub play_in_background: bool,
    /// Rewind tracks on pause instead of holding the position
    pub stop_instead_of_pause: bool,
    pub preferred_device: Option<String>,
    pub library_path: PathBuf,
    /// Stop timer used by `play --timer` when no duration is given
    pub default_timer_minutes: Option<u32>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            play_in_background: false,
            stop_instead_of_pause: false,
            preferred_device: None,
            library_path: default_config_dir().join("library.toml"),
            default_timer_minutes: None,
        }
    }
}

impl PlayerConfig {
    pub fn arbiter_settings(&self) -> ArbiterSettings {
        ArbiterSettings {
            play_in_background: self.play_in_background,
            stop_instead_of_pause: self.stop_instead_of_pause,
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("ambient-mixer")
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::with_path(config_path)
    }

    /// Open the configuration stored at `config_path`
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Ignoring unreadable configuration: {}", err);
                PlayerConfig::default()
            }
        };

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_play_in_background(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.config.play_in_background = enabled;
        self.save_config()
    }

    pub fn set_stop_instead_of_pause(&mut self, enabled: bool) -> Result<(), ConfigError> {
        self.config.stop_instead_of_pause = enabled;
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn set_default_timer_minutes(&mut self, minutes: Option<u32>) -> Result<(), ConfigError> {
        self.config.default_timer_minutes = minutes.filter(|m| *m > 0);
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("ambient-mixer");

        std::fs::create_dir_all(&config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: PlayerConfig = toml::from_str(&config_content)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_manager = ConfigManager {
            config: PlayerConfig::default(),
            config_path,
        };

        (config_manager, temp_dir)
    }

    #[test]
    fn test_player_config_default() {
        let config = PlayerConfig::default();

        assert!(!config.play_in_background);
        assert!(!config.stop_instead_of_pause);
        assert_eq!(config.preferred_device, None);
        assert_eq!(config.default_timer_minutes, None);
        assert!(config.library_path.to_string_lossy().contains("ambient-mixer"));
        assert!(config.library_path.ends_with("library.toml"));
    }

    #[test]
    fn test_arbiter_settings_follow_config() {
        let config = PlayerConfig {
            play_in_background: true,
            stop_instead_of_pause: true,
            ..Default::default()
        };
        let settings = config.arbiter_settings();
        assert!(settings.play_in_background);
        assert!(settings.stop_instead_of_pause);
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.stop_instead_of_pause = true;
        config_manager.config.preferred_device = Some("USB DAC".to_string());
        config_manager.save_config().unwrap();

        let loaded = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert!(loaded.stop_instead_of_pause);
        assert_eq!(loaded.preferred_device, Some("USB DAC".to_string()));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigManager::load_config(&temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "play_in_background = true\n").unwrap();

        let config = ConfigManager::load_config(&config_path).unwrap();
        assert!(config.play_in_background);
        assert!(!config.stop_instead_of_pause);
        assert_eq!(config.default_timer_minutes, None);
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        fs::write(&config_path, "invalid toml content [[[").unwrap();

        match ConfigManager::load_config(&config_path) {
            Err(ConfigError::DeserializationError(_)) => {}
            other => panic!("Expected DeserializationError, got {:?}", other),
        }

        // The manager itself falls back to defaults
        let manager = ConfigManager::with_path(config_path).unwrap();
        assert_eq!(manager.get_config(), &PlayerConfig::default());
    }

    #[test]
    fn test_update_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager
            .update_config(|config| {
                config.play_in_background = true;
                config.default_timer_minutes = Some(45);
            })
            .unwrap();

        let loaded = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert!(loaded.play_in_background);
        assert_eq!(loaded.default_timer_minutes, Some(45));
    }

    #[test]
    fn test_typed_setters_persist() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_play_in_background(true).unwrap();
        config_manager.set_stop_instead_of_pause(true).unwrap();
        config_manager.set_preferred_device(Some("My DAC".to_string())).unwrap();

        let loaded = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert!(loaded.play_in_background);
        assert!(loaded.stop_instead_of_pause);
        assert_eq!(loaded.preferred_device, Some("My DAC".to_string()));
    }

    #[test]
    fn test_zero_timer_minutes_means_none() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_default_timer_minutes(Some(0)).unwrap();
        assert_eq!(config_manager.config.default_timer_minutes, None);

        config_manager.set_default_timer_minutes(Some(30)).unwrap();
        assert_eq!(config_manager.config.default_timer_minutes, Some(30));
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();
        config_manager.config.play_in_background = true;
        config_manager.config.preferred_device = Some("Custom Device".to_string());

        config_manager.reset_to_defaults().unwrap();
        assert_eq!(config_manager.config, PlayerConfig::default());
    }

    #[test]
    fn test_config_path_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("config").join("config.toml");

        let config_manager = ConfigManager {
            config: PlayerConfig::default(),
            config_path: nested_path.clone(),
        };
        config_manager.save_config().unwrap();

        assert!(nested_path.exists());
    }

    #[test]
    fn test_toml_format() {
        let config = PlayerConfig {
            play_in_background: true,
            stop_instead_of_pause: false,
            preferred_device: Some("AudioQuest DragonFly".to_string()),
            library_path: PathBuf::from("/home/test/.config/ambient-mixer/library.toml"),
            default_timer_minutes: Some(20),
        };

        let toml_string = toml::to_string_pretty(&config).unwrap();
        assert!(toml_string.contains("play_in_background = true"));
        assert!(toml_string.contains("stop_instead_of_pause = false"));
        assert!(toml_string.contains("AudioQuest DragonFly"));
        assert!(toml_string.contains("default_timer_minutes = 20"));
    }
}
