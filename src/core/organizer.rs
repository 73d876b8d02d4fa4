use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{
    config::{Device, OutputLayout},
    core::{dsp::AudioMetrics, enhance::EnhancementOutcome, separator::SeparationOutput},
    error::OrganizeError,
    types::{OutputSummary, Stem, StemSet},
};

pub const MAX_NAME_LEN: usize = 100;
pub const FALLBACK_TRACK_NAME: &str = "unknown_track";
pub const METADATA_FILE: &str = "metadata.json";
pub const REPORT_FILE: &str = "report.txt";

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const RULE_WIDTH: usize = 60;

/// Makes `name` safe to use as a single path component. Idempotent.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect();

    let mut out: String = trim_edges(&replaced).chars().take(MAX_NAME_LEN).collect();
    out = trim_edges(&out).to_string();

    if out.is_empty() {
        FALLBACK_TRACK_NAME.to_string()
    } else {
        out
    }
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c == '.' || c == ' ')
}

fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPaths {
    pub track_dir: PathBuf,
    pub stems_dir: PathBuf,
    /// Sanitized track name used for directory and file names.
    pub track_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StemMetadata {
    pub file_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics: Option<AudioMetrics>,
}

/// Contents of `metadata.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub track_name: String,
    pub timestamp: DateTime<Local>,
    pub source_file: PathBuf,
    pub model_used: String,
    pub device_used: Device,
    pub separation_success: bool,
    pub stems: BTreeMap<Stem, StemMetadata>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub processing_applied: Option<bool>,
}

/// What one run produced, as seen by metadata and report rendering.
#[derive(Clone, Copy, Debug)]
pub struct RunRecord<'a> {
    pub track_name: &'a str,
    pub separation: &'a SeparationOutput,
    /// Final stem locations.
    pub stems: &'a StemSet,
    /// `None` when enhancement was disabled.
    pub enhancement: Option<&'a EnhancementOutcome>,
}

impl RunRecord<'_> {
    fn metrics(&self, stem: Stem) -> Option<&AudioMetrics> {
        self.enhancement
            .filter(|e| e.success)
            .and_then(|e| e.metrics.get(&stem))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputValidation {
    pub all_exist: bool,
    pub existing_files: Vec<PathBuf>,
    pub missing_files: Vec<PathBuf>,
    pub total_expected: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSizeInfo {
    pub file_sizes: BTreeMap<PathBuf, u64>,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
}

/// Builds the per-track output tree under a base directory.
#[derive(Clone, Debug)]
pub struct OutputManager {
    base_dir: PathBuf,
    layout: OutputLayout,
}

impl OutputManager {
    pub fn new(base_dir: impl Into<PathBuf>, layout: OutputLayout) -> Self {
        let base_dir = base_dir.into();
        log::info!("Initialized OutputManager with base_dir: {:?}", base_dir);
        Self { base_dir, layout }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Creates `base[/date]/<track>/stems`, or just `base[/date]` without subdirs.
    pub fn layout(&self, track_name: &str) -> Result<OutputPaths, OrganizeError> {
        let safe_name = sanitize_filename(track_name);

        let base = if self.layout.organize_by_date {
            self.base_dir
                .join(Local::now().format("%Y-%m-%d").to_string())
        } else {
            self.base_dir.clone()
        };

        let (track_dir, stems_dir) = if self.layout.create_subdirs {
            let track_dir = base.join(&safe_name);
            let stems_dir = track_dir.join("stems");
            (track_dir, stems_dir)
        } else {
            (base.clone(), base)
        };

        for dir in [&track_dir, &stems_dir] {
            fs::create_dir_all(dir).map_err(|source| OrganizeError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        log::info!("Created output structure for track: {}", track_name);

        Ok(OutputPaths {
            track_dir,
            stems_dir,
            track_name: safe_name,
        })
    }

    /// Copies each stem to `<stems_dir>/<track>_<stem>.wav`. Missing sources
    /// and failed copies are logged and left out of the returned set.
    pub fn relocate(
        &self,
        stems: &StemSet,
        track_name: &str,
    ) -> Result<(OutputPaths, StemSet), OrganizeError> {
        let paths = self.layout(track_name)?;
        let mut organized = Vec::with_capacity(stems.len());

        for (stem, source) in stems.iter() {
            if !source.is_file() {
                log::warn!("Source stem file not found: {:?}", source);
                continue;
            }

            let target = paths
                .stems_dir
                .join(format!("{}_{}.wav", paths.track_name, stem.as_str()));

            match fs::copy(source, &target) {
                Ok(_) => {
                    log::debug!("Organized {}: {:?} -> {:?}", stem, source, target);
                    organized.push((stem, target));
                }
                Err(e) => log::error!("Failed to organize {} file: {}", stem, e),
            }
        }

        Ok((paths, StemSet::from_paths(organized)))
    }

    pub fn generate_metadata(&self, record: &RunRecord<'_>) -> TrackMetadata {
        let stems = record
            .stems
            .iter()
            .map(|(stem, path)| {
                (
                    stem,
                    StemMetadata {
                        file_path: path.to_path_buf(),
                        metrics: record.metrics(stem).cloned(),
                    },
                )
            })
            .collect();

        TrackMetadata {
            track_name: record.track_name.to_string(),
            timestamp: Local::now(),
            source_file: record.separation.audio_file.clone(),
            model_used: record.separation.model_used.clone(),
            device_used: record.separation.device_used,
            separation_success: true,
            stems,
            processing_applied: record.enhancement.map(|e| e.success),
        }
    }

    pub fn save_metadata(
        &self,
        metadata: &TrackMetadata,
        dir: &Path,
    ) -> Result<PathBuf, OrganizeError> {
        fs::create_dir_all(dir).map_err(|source| OrganizeError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(&path, json).map_err(|source| OrganizeError::Write {
            path: path.clone(),
            source,
        })?;

        log::info!("Saved metadata: {:?}", path);
        Ok(path)
    }

    pub fn summary_report(&self, record: &RunRecord<'_>, paths: &OutputPaths) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let sep = record.separation;
        let mut lines = vec![
            rule.clone(),
            "MUSIC STEM SEPARATION REPORT".to_string(),
            rule.clone(),
            format!("Track Name: {}", record.track_name),
            format!("Timestamp: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            String::new(),
            "SEPARATION DETAILS:".to_string(),
            format!("  Source File: {}", sep.audio_file.display()),
            format!("  Model Used: {}", sep.model_used),
            format!("  Device: {}", sep.device_used),
            "  Success: Yes".to_string(),
            String::new(),
        ];

        if !record.stems.is_empty() {
            lines.push("SEPARATED STEMS:".to_string());
            lines.push(String::new());
            for (stem, path) in record.stems.iter() {
                lines.push(format!("  {}: {}", stem.title(), path.display()));
                if let Some(m) = record.metrics(stem) {
                    let peak = m
                        .peak_db
                        .map(|db| format!("{db:.1}dB"))
                        .unwrap_or_else(|| "N/A".to_string());
                    lines.push(format!(
                        "    Duration: {:.1}s, Peak: {}",
                        m.duration_seconds, peak
                    ));
                }
            }
            lines.push(String::new());
        }

        lines.extend([
            "OUTPUT LOCATIONS:".to_string(),
            format!("  Track Directory: {}", paths.track_dir.display()),
            format!("  Stems Directory: {}", paths.stems_dir.display()),
            String::new(),
        ]);

        if let Some(enhancement) = record.enhancement {
            lines.extend([
                "PROCESSING:".to_string(),
                format!(
                    "  Enhancement Applied: {}",
                    if enhancement.success { "Yes" } else { "No" }
                ),
                String::new(),
            ]);
        }

        lines.push(rule);
        lines.join("\n")
    }

    pub fn save_report(&self, report: &str, dir: &Path) -> Result<PathBuf, OrganizeError> {
        let path = dir.join(REPORT_FILE);
        fs::write(&path, report).map_err(|source| OrganizeError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Lists the `.wav` files in the stems directory with their total size.
    pub fn summarize(&self, paths: &OutputPaths) -> OutputSummary {
        let mut summary = OutputSummary {
            track_directory: paths.track_dir.clone(),
            stems_directory: paths.stems_dir.clone(),
            ..Default::default()
        };

        let entries = match fs::read_dir(&paths.stems_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Failed to generate output summary: {}", e);
                return summary;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
            })
            .collect();
        files.sort();

        summary.total_size_bytes = files
            .iter()
            .filter_map(|f| fs::metadata(f).ok())
            .map(|m| m.len())
            .sum();
        summary.total_size_mb = bytes_to_mb(summary.total_size_bytes);
        summary.total_files = files.len();
        summary.stem_files = files;
        summary
    }

    /// Deletes the given files. Failures are logged, never returned.
    pub fn cleanup_temp_files(&self, temp_files: &[PathBuf]) {
        for path in temp_files {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => log::debug!("Cleaned up temporary file: {:?}", path),
                Err(e) => log::warn!("Failed to clean up {:?}: {}", path, e),
            }
        }
    }
}

pub fn validate_output_files(expected: &[PathBuf]) -> OutputValidation {
    let (existing_files, missing_files): (Vec<PathBuf>, Vec<PathBuf>) =
        expected.iter().cloned().partition(|p| p.exists());
    OutputValidation {
        all_exist: missing_files.is_empty(),
        existing_files,
        missing_files,
        total_expected: expected.len(),
    }
}

pub fn file_size_info(paths: &[PathBuf]) -> FileSizeInfo {
    let mut info = FileSizeInfo::default();
    for path in paths {
        match fs::metadata(path) {
            Ok(meta) => {
                info.file_sizes.insert(path.clone(), meta.len());
                info.total_size_bytes += meta.len();
            }
            Err(e) if path.exists() => {
                log::warn!("Failed to get size for {:?}: {}", path, e);
                info.file_sizes.insert(path.clone(), 0);
            }
            Err(_) => {}
        }
    }
    info.total_size_mb = bytes_to_mb(info.total_size_bytes);
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_hostile_chars() {
        assert_eq!(sanitize_filename("a/b:c?d"), "a_b_c_d");
        assert_eq!(sanitize_filename("  ..Song Name.. "), "Song Name");
        assert_eq!(sanitize_filename("..."), FALLBACK_TRACK_NAME);
        assert_eq!(sanitize_filename(""), FALLBACK_TRACK_NAME);
    }

    #[test]
    fn sanitize_truncates_and_is_idempotent() {
        let long = format!("{}. x", "a".repeat(99));
        let once = sanitize_filename(&long);
        assert!(once.chars().count() <= MAX_NAME_LEN);
        assert_eq!(sanitize_filename(&once), once);

        for name in ["Track: 01 / Intro", "<>|", " .hidden. ", "ümlaut?"] {
            let s = sanitize_filename(name);
            assert_eq!(sanitize_filename(&s), s);
        }
    }

    #[test]
    fn mb_rounds_to_two_places() {
        assert_eq!(bytes_to_mb(0), 0.0);
        assert_eq!(bytes_to_mb(1024 * 1024), 1.0);
        assert_eq!(bytes_to_mb(1_500_000), 1.43);
    }
}
