//! Turns a raw user-supplied string into a local audio file.
//!
//! Classification is side-effect free apart from filesystem existence
//! checks. Resolution may download into `<working_dir>/temp`.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    config::{DownloadConfig, StreamingConfig, StreamingCredentials},
    error::{InputError, Result},
    io::{
        net::{is_valid_url, UrlDownloader},
        process::ProcessInvoker,
        streaming::{is_streaming_ref, StreamingDownloader},
    },
    types::{AcquiredAudio, InputKind, InputSpec},
};

/// Extensions recognized as audio when classifying input.
pub const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "flac", "m4a", "aac", "ogg", "wma"];

/// Trims whitespace and one pair of matching surrounding quotes.
pub fn clean_input(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

fn supported_list() -> String {
    AUDIO_EXTENSIONS
        .iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks an existing local file is a readable audio file.
pub fn validate_local_file(path: &Path) -> std::result::Result<(), InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(InputError::NotAFile(path.to_path_buf()));
    }
    let ext = extension_of(path);
    if !AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        return Err(InputError::UnsupportedFormat {
            extension: if ext.is_empty() { "(none)".into() } else { format!(".{ext}") },
            supported: supported_list(),
        });
    }
    if File::open(path).is_err() {
        return Err(InputError::Unreadable(path.to_path_buf()));
    }
    Ok(())
}

/// First match wins: streaming reference, existing local file, absolute URL.
pub fn classify(raw: &str) -> InputSpec {
    let cleaned = clean_input(raw);

    if cleaned.is_empty() {
        return InputSpec::invalid(raw, cleaned, InputError::Empty);
    }

    if is_streaming_ref(&cleaned) {
        return InputSpec::valid(raw, cleaned, InputKind::StreamingTrackRef);
    }

    let path = Path::new(&cleaned);
    if path.exists() {
        return match validate_local_file(path) {
            Ok(()) => InputSpec::valid(raw, cleaned, InputKind::LocalFile),
            Err(e) => InputSpec::invalid(raw, cleaned, e),
        };
    }

    if is_valid_url(&cleaned) {
        return InputSpec::valid(raw, cleaned, InputKind::RemoteUrl);
    }

    let error = InputError::NotFound(PathBuf::from(&cleaned));
    InputSpec::invalid(raw, cleaned, error)
}

/// Acquires a local file for a classified input.
pub struct InputResolver<'a> {
    download: DownloadConfig,
    streaming: StreamingConfig,
    credentials: Option<StreamingCredentials>,
    invoker: &'a dyn ProcessInvoker,
}

impl<'a> InputResolver<'a> {
    pub fn new(
        download: DownloadConfig,
        streaming: StreamingConfig,
        credentials: Option<StreamingCredentials>,
        invoker: &'a dyn ProcessInvoker,
    ) -> Self {
        Self {
            download,
            streaming,
            credentials,
            invoker,
        }
    }

    pub fn resolve(&self, spec: &InputSpec, working_dir: &Path) -> Result<AcquiredAudio> {
        let temp_dir = working_dir.join("temp");

        match spec.kind() {
            InputKind::Invalid => Err(spec
                .error()
                .cloned()
                .unwrap_or_else(|| InputError::InvalidReference(spec.raw_value().to_string()))
                .into()),
            InputKind::LocalFile => {
                let path = PathBuf::from(spec.cleaned());
                validate_local_file(&path)?;
                Ok(AcquiredAudio {
                    file_path: path,
                    is_temporary: false,
                    origin_kind: InputKind::LocalFile,
                })
            }
            InputKind::StreamingTrackRef => {
                let downloader = StreamingDownloader::new(
                    self.streaming.clone(),
                    self.credentials.clone(),
                    self.invoker,
                )?;
                let file_path = downloader.download(spec.cleaned(), &temp_dir)?;
                Ok(AcquiredAudio {
                    file_path,
                    is_temporary: true,
                    origin_kind: InputKind::StreamingTrackRef,
                })
            }
            InputKind::RemoteUrl => {
                let downloader = UrlDownloader::new(self.download.clone())?;
                let file_path = downloader.download(spec.cleaned(), &temp_dir)?;
                Ok(AcquiredAudio {
                    file_path,
                    is_temporary: true,
                    origin_kind: InputKind::RemoteUrl,
                })
            }
        }
    }
}
