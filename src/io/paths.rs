use crate::error::{Result, StemError};
use directories::{ProjectDirs, UserDirs};
use std::path::PathBuf;

pub const OUTPUT_DIR_NAME: &str = "Stembler Output";

pub fn settings_file() -> Result<PathBuf> {
    let proj = ProjectDirs::from("com", "Stembler", "Stembler")
        .ok_or(StemError::ConfigDirUnavailable)?;
    let mut p = PathBuf::from(proj.config_dir());
    p.push("settings.json");
    Ok(p)
}

/// `<Music>/Stembler Output`, or under the home directory when there is no music dir.
pub fn default_output_dir() -> PathBuf {
    let base = UserDirs::new()
        .and_then(|u| {
            u.audio_dir()
                .map(PathBuf::from)
                .or_else(|| Some(u.home_dir().to_path_buf()))
        })
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(OUTPUT_DIR_NAME)
}
