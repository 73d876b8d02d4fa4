use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "htdemucs";

/// Compute device handed to the separation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device `{other}` (expected cpu or cuda)")),
        }
    }
}

/// How the external separation engine is launched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Arguments placed before the engine options, e.g. `-m demucs.separate`.
    pub args_prefix: Vec<String>,
    /// Arguments that make `program` print `True` when an accelerator is usable.
    pub probe_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            args_prefix: vec!["-m".into(), "demucs.separate".into()],
            probe_args: vec![
                "-c".into(),
                "import torch; print(torch.cuda.is_available())".into(),
            ],
        }
    }
}

/// Remote URL download behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff * 2^(n-1)`.
    pub backoff: Duration,
    pub retry_statuses: Vec<u16>,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: Duration::from_secs(1),
            retry_statuses: vec![429, 500, 502, 503, 504],
            user_agent: concat!("stembler-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl StreamingCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Returns the reason the credentials cannot be used, if any.
    pub fn problem(&self) -> Option<&'static str> {
        if self.client_id.trim().is_empty() {
            Some("client id is empty")
        } else if self.client_secret.trim().is_empty() {
            Some("client secret is empty")
        } else {
            None
        }
    }
}

/// Streaming-service track downloader (`spotdl`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub program: PathBuf,
    pub output_format: String,
    pub audio_providers: Vec<String>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("spotdl"),
            output_format: "mp3".into(),
            audio_providers: vec!["youtube-music".into(), "youtube".into()],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputLayout {
    pub organize_by_date: bool,
    pub create_subdirs: bool,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            organize_by_date: false,
            create_subdirs: true,
        }
    }
}

/// Everything one pipeline run needs besides the input and output directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub model_name: String,
    pub device: Option<Device>,
    pub enable_enhancement: bool,
    pub layout: OutputLayout,
    /// Parent for the per-run working directory; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
    pub engine: EngineConfig,
    pub download: DownloadConfig,
    pub streaming: StreamingConfig,
    #[serde(skip_serializing)]
    pub credentials: Option<StreamingCredentials>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.into(),
            device: None,
            enable_enhancement: true,
            layout: OutputLayout::default(),
            work_dir: None,
            engine: EngineConfig::default(),
            download: DownloadConfig::default(),
            streaming: StreamingConfig::default(),
            credentials: None,
        }
    }
}

/// Separation models known to work with the engine, with a short description.
pub fn available_models() -> &'static [(&'static str, &'static str)] {
    &[
        ("htdemucs", "HTDemucs - Balanced quality and speed (default)"),
        ("htdemucs_ft", "HTDemucs Fine-Tuned - Highest quality, slower"),
        ("htdemucs_6s", "HTDemucs 6-source - Adds guitar and piano"),
        ("hdemucs_mmi", "Hybrid Demucs MMI - Previous generation"),
        ("mdx_extra", "MDX Extra - Alternative high quality"),
        ("mdx_q", "MDX Quantized - Fastest, lower quality"),
    ]
}

pub fn model_description(name: &str) -> &'static str {
    available_models()
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
        .unwrap_or("Unknown model")
}
