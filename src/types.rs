use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, InputError};

#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// What a raw input string was classified as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    LocalFile,
    StreamingTrackRef,
    RemoteUrl,
    Invalid,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::LocalFile => "local_file",
            InputKind::StreamingTrackRef => "spotify_url",
            InputKind::RemoteUrl => "audio_url",
            InputKind::Invalid => "invalid",
        }
    }

    pub fn requires_download(&self) -> bool {
        matches!(self, InputKind::StreamingTrackRef | InputKind::RemoteUrl)
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one raw input string. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSpec {
    raw_value: String,
    cleaned: String,
    kind: InputKind,
    error: Option<InputError>,
}

impl InputSpec {
    pub(crate) fn valid(raw_value: &str, cleaned: String, kind: InputKind) -> Self {
        debug_assert!(kind != InputKind::Invalid);
        Self {
            raw_value: raw_value.to_string(),
            cleaned,
            kind,
            error: None,
        }
    }

    pub(crate) fn invalid(raw_value: &str, cleaned: String, error: InputError) -> Self {
        Self {
            raw_value: raw_value.to_string(),
            cleaned,
            kind: InputKind::Invalid,
            error: Some(error),
        }
    }

    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    /// The raw value after whitespace trimming and quote stripping.
    pub fn cleaned(&self) -> &str {
        &self.cleaned
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// Why classification failed; present iff the kind is `Invalid`.
    pub fn error(&self) -> Option<&InputError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn is_valid(&self) -> bool {
        self.kind != InputKind::Invalid
    }

    pub fn display_name(&self) -> String {
        match self.kind {
            InputKind::LocalFile => Path::new(&self.cleaned)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.cleaned.clone()),
            InputKind::StreamingTrackRef => "Spotify Track".into(),
            InputKind::RemoteUrl => self
                .cleaned
                .rsplit('/')
                .find(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| "Remote Audio File".into()),
            InputKind::Invalid => "Invalid Input".into(),
        }
    }
}

/// A local audio file ready for separation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquiredAudio {
    pub file_path: PathBuf,
    pub is_temporary: bool,
    pub origin_kind: InputKind,
}

impl AcquiredAudio {
    pub fn track_name(&self) -> String {
        self.file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
            .to_string()
    }
}

/// The fixed stem vocabulary of the separation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Drums,
    Bass,
    Vocals,
    Other,
}

impl Stem {
    pub const ALL: [Stem; 4] = [Stem::Drums, Stem::Bass, Stem::Vocals, Stem::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Vocals => "vocals",
            Stem::Other => "other",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stem::Drums => "Drums",
            Stem::Bass => "Bass",
            Stem::Vocals => "Vocals",
            Stem::Other => "Other",
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stem name to file path. The separation stage fixes the key set; later
/// stages may only repoint existing keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemSet {
    paths: BTreeMap<Stem, PathBuf>,
}

impl StemSet {
    pub fn from_paths(paths: impl IntoIterator<Item = (Stem, PathBuf)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn get(&self, stem: Stem) -> Option<&Path> {
        self.paths.get(&stem).map(PathBuf::as_path)
    }

    /// Repoints `stem` at `path`. Returns false (and changes nothing) for an unknown key.
    pub fn replace(&mut self, stem: Stem, path: PathBuf) -> bool {
        match self.paths.get_mut(&stem) {
            Some(slot) => {
                *slot = path;
                true
            }
            None => false,
        }
    }

    pub fn stems(&self) -> Vec<Stem> {
        self.paths.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stem, &Path)> {
        self.paths.iter().map(|(s, p)| (*s, p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Named phase of a pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    InputProcessing,
    LoadingModel,
    SeparatingStems,
    EnhancingAudio,
    OrganizingOutput,
    Complete,
    Error,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::InputProcessing => "input_processing",
            ProgressStage::LoadingModel => "loading_model",
            ProgressStage::SeparatingStems => "separating_stems",
            ProgressStage::EnhancingAudio => "enhancing_audio",
            ProgressStage::OrganizingOutput => "organizing_output",
            ProgressStage::Complete => "complete",
            ProgressStage::Error => "error",
        }
    }

    /// Percent range owned by this stage.
    pub fn range(&self) -> (u8, u8) {
        match self {
            ProgressStage::InputProcessing => (0, 10),
            ProgressStage::LoadingModel | ProgressStage::SeparatingStems => (10, 80),
            ProgressStage::EnhancingAudio => (80, 90),
            ProgressStage::OrganizingOutput => (90, 100),
            ProgressStage::Complete => (100, 100),
            ProgressStage::Error => (0, 100),
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub percent: u8,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub track_directory: PathBuf,
    pub stems_directory: PathBuf,
    pub stem_files: Vec<PathBuf>,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
}

/// Final outcome of one pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub failed_stage: Option<ProgressStage>,
    pub track_name: Option<String>,
    pub input_kind: Option<InputKind>,
    pub stems_separated: Vec<Stem>,
    pub enhancement_applied: bool,
    pub output_directory: Option<PathBuf>,
    pub stems_directory: Option<PathBuf>,
    pub organized_stems: StemSet,
    pub metadata_saved: bool,
    pub summary_report: Option<String>,
    pub output_summary: Option<OutputSummary>,
}

impl PipelineResult {
    pub fn failure(
        stage: ProgressStage,
        category: ErrorCategory,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_category: Some(category),
            failed_stage: Some(stage),
            ..Default::default()
        }
    }
}
