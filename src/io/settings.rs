use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::{Device, PipelineOptions, StreamingCredentials, DEFAULT_MODEL},
    error::Result,
    io::paths::{default_output_dir, settings_file},
};

/// Persisted user preferences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub model_name: String,
    pub enable_enhancement: bool,
    /// Empty means the platform default.
    pub output_directory: String,
    /// `None` means auto-detect.
    pub device: Option<Device>,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.into(),
            enable_enhancement: true,
            output_directory: String::new(),
            device: None,
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
        }
    }
}

impl UserSettings {
    pub fn has_streaming_credentials(&self) -> bool {
        !self.spotify_client_id.trim().is_empty() && !self.spotify_client_secret.trim().is_empty()
    }

    pub fn credentials(&self) -> Option<StreamingCredentials> {
        self.has_streaming_credentials().then(|| {
            StreamingCredentials::new(
                self.spotify_client_id.trim(),
                self.spotify_client_secret.trim(),
            )
        })
    }

    pub fn output_directory(&self) -> PathBuf {
        if self.output_directory.trim().is_empty() {
            default_output_dir()
        } else {
            PathBuf::from(&self.output_directory)
        }
    }

    pub fn to_options(&self) -> PipelineOptions {
        PipelineOptions {
            model_name: self.model_name.clone(),
            device: self.device,
            enable_enhancement: self.enable_enhancement,
            credentials: self.credentials(),
            ..Default::default()
        }
    }
}

/// Reads and writes [`UserSettings`] as pretty JSON.
#[derive(Clone, Debug)]
pub struct SettingsManager {
    path: PathBuf,
}

impl SettingsManager {
    /// Uses the platform configuration directory.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(settings_file()?))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Defaults when the file is missing or unreadable.
    pub fn load(&self) -> UserSettings {
        if !self.path.exists() {
            return UserSettings::default();
        }
        let parsed = fs::read_to_string(&self.path)
            .map_err(crate::error::StemError::from)
            .and_then(|text| Ok(serde_json::from_str::<UserSettings>(&text)?));
        match parsed {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "Failed to load settings from {:?}: {}. Using default settings instead.",
                    self.path,
                    e
                );
                UserSettings::default()
            }
        }
    }

    pub fn save(&self, settings: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        log::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }

    pub fn reset_to_defaults(&self) -> Result<UserSettings> {
        let defaults = UserSettings::default();
        self.save(&defaults)?;
        Ok(defaults)
    }
}
