//! Config - Race tunables and the persisted settings they are seeded from

use std::fs::OpenOptions;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::race_server::error::SettingsError;

/// Section generation tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    /// Where the first section is placed
    pub initial_offset: f32,
    /// Length of one section along the track
    pub section_length: f32,
    /// Generate once the furthest player is this close to the frontier
    pub generation_distance: f32,
    /// Hard cap on live sections
    pub max_active: u32,
    /// Seconds between generation checks
    pub check_interval: f32,
    /// Sections further than this behind the trailing runner are retired
    pub retire_margin: f32,
    /// Number of section layouts to pick from
    pub variant_count: usize,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            initial_offset: 20.0,
            section_length: 20.0,
            generation_distance: 60.0,
            max_active: 10,
            check_interval: 0.5,
            retire_margin: 30.0,
            variant_count: 3,
        }
    }
}

/// Power-up tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerUpConfig {
    pub speed_up_multiplier: f32,
    pub slow_down_multiplier: f32,
    /// Seconds a multiplier stays in effect
    pub duration: f32,
}

impl Default for PowerUpConfig {
    fn default() -> Self {
        Self {
            speed_up_multiplier: 2.0,
            slow_down_multiplier: 0.5,
            duration: 3.0,
        }
    }
}

/// Race configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Number of slots; the countdown waits for all of them
    pub max_players: u32,
    pub starting_lives: u32,
    /// Delay between the countdown start and the first tick
    pub countdown_lead_in: f32,
    /// Delay between consecutive ticks and between the last tick and "go"
    pub countdown_interval: f32,
    /// Number of ticks announced (3, 2, 1)
    pub countdown_ticks: u32,
    /// Wait before ranking once only one runner is left
    pub grace_period: f32,
    pub sections: SectionConfig,
    pub power_ups: PowerUpConfig,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_players: 2,
            starting_lives: 3,
            countdown_lead_in: 1.5,
            countdown_interval: 0.7,
            countdown_ticks: 3,
            grace_period: 1.0,
            sections: SectionConfig::default(),
            power_ups: PowerUpConfig::default(),
        }
    }
}

impl RaceConfig {
    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_players == 0 {
            return Err(SettingsError::Invalid {
                key: "max_players",
                reason: "a race needs at least one player".into(),
            });
        }
        if self.sections.check_interval <= 0.0 {
            return Err(SettingsError::Invalid {
                key: "sections.check_interval",
                reason: format!("must be positive, got {}", self.sections.check_interval),
            });
        }
        if self.sections.section_length <= 0.0 {
            return Err(SettingsError::Invalid {
                key: "sections.section_length",
                reason: format!("must be positive, got {}", self.sections.section_length),
            });
        }
        Ok(())
    }

    pub fn with_max_players(max_players: u32) -> Self {
        Self {
            max_players,
            ..Default::default()
        }
    }
}

/// Settings persisted on the local machine between sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSettings {
    #[serde(alias = "MaxPlayers")]
    pub max_players: u32,
    #[serde(default, alias = "PlayerName")]
    pub player_name: Option<String>,
}

impl RaceSettings {
    /// Read settings from a JSON file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let fh = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|source| SettingsError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let settings: RaceSettings = serde_json::from_reader(fh)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: RaceSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        self.race_config().validate()
    }

    /// Build the race configuration these settings describe
    pub fn race_config(&self) -> RaceConfig {
        RaceConfig::with_max_players(self.max_players)
    }
}
