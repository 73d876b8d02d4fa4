use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::{StreamingConfig, StreamingCredentials},
    error::AcquisitionError,
    io::{process::ProcessInvoker, resolver::AUDIO_EXTENSIONS},
};

static TRACK_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://open\.spotify\.com/track/([a-zA-Z0-9]+)").expect("valid track url regex")
});
static TRACK_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^spotify:track:([a-zA-Z0-9]+)").expect("valid track uri regex"));
static DOWNLOADED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Downloaded "([^"]+)""#).expect("valid downloaded line regex"));

/// spotdl's own naming, so the track name carries artist and title.
pub const OUTPUT_TEMPLATE: &str = "{artists} - {title}.{output-ext}";

const UNAVAILABLE_MARKERS: [&str; 2] = ["No results found", "Requested format is not available"];
const CREDENTIAL_MARKERS: [&str; 4] = [
    "invalid_client",
    "Invalid client",
    "SpotifyOauthError",
    "401 Client Error",
];
const NETWORK_MARKERS: [&str; 5] = [
    "ConnectionError",
    "Max retries exceeded",
    "Failed to establish a new connection",
    "Temporary failure in name resolution",
    "timed out",
];

pub fn is_streaming_ref(input: &str) -> bool {
    let input = input.trim();
    TRACK_URL.is_match(input) || TRACK_URI.is_match(input)
}

pub fn extract_track_id(input: &str) -> Option<String> {
    let input = input.trim();
    TRACK_URI
        .captures(input)
        .or_else(|| TRACK_URL.captures(input))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Fetches streaming-service tracks through the external `spotdl` tool.
pub struct StreamingDownloader<'a> {
    config: StreamingConfig,
    credentials: StreamingCredentials,
    invoker: &'a dyn ProcessInvoker,
}

impl<'a> StreamingDownloader<'a> {
    /// Fails with `MissingCredentials` before anything is launched.
    pub fn new(
        config: StreamingConfig,
        credentials: Option<StreamingCredentials>,
        invoker: &'a dyn ProcessInvoker,
    ) -> Result<Self, AcquisitionError> {
        let credentials = credentials.ok_or_else(|| {
            AcquisitionError::MissingCredentials(
                "no client id or client secret configured".into(),
            )
        })?;
        if let Some(problem) = credentials.problem() {
            return Err(AcquisitionError::MissingCredentials(problem.into()));
        }

        log::info!(
            "Initialized streaming downloader with format: {}, providers: {}",
            config.output_format,
            config.audio_providers.join(", ")
        );
        Ok(Self {
            config,
            credentials,
            invoker,
        })
    }

    fn args(&self, reference: &str, output_dir: &Path) -> Vec<OsString> {
        let template = output_dir.join(OUTPUT_TEMPLATE);
        let mut args: Vec<OsString> = vec![
            "download".into(),
            reference.into(),
            "--client-id".into(),
            self.credentials.client_id.as_str().into(),
            "--client-secret".into(),
            self.credentials.client_secret.as_str().into(),
            "--format".into(),
            self.config.output_format.as_str().into(),
            "--dont-filter-results".into(),
            "--output".into(),
            template.into_os_string(),
            "--audio".into(),
        ];
        args.extend(self.config.audio_providers.iter().map(OsString::from));
        args
    }

    pub fn download(&self, reference: &str, output_dir: &Path) -> Result<PathBuf, AcquisitionError> {
        let track_id = extract_track_id(reference).ok_or_else(|| {
            AcquisitionError::Download(format!("Could not extract track ID from: {reference}"))
        })?;

        fs::create_dir_all(output_dir).map_err(|e| {
            AcquisitionError::Download(format!("cannot create {}: {e}", output_dir.display()))
        })?;

        log::info!("Downloading Spotify track: {}", track_id);

        let out = self
            .invoker
            .invoke(&self.config.program, &self.args(reference.trim(), output_dir))
            .map_err(|source| AcquisitionError::Launch {
                program: self.config.program.display().to_string(),
                source,
            })?;

        let transcript = format!("{}\n{}", out.stdout, out.stderr);
        if !out.success() {
            let err = classify_failure(&transcript, &track_id)
                .unwrap_or_else(|| AcquisitionError::Download(last_line(&out.stderr)));
            log::error!("Spotify download failed: {}", err);
            return Err(err);
        }

        let file = announced_file(&out.stdout, output_dir, &self.config.output_format)
            .or_else(|| newest_audio_file(output_dir));
        if file.is_none() {
            if let Some(err) = classify_failure(&transcript, &track_id) {
                log::error!("Spotify download failed: {}", err);
                return Err(err);
            }
        }

        match file {
            Some(path) => {
                log::info!("Downloaded Spotify track to {:?}", path);
                Ok(path)
            }
            None => Err(AcquisitionError::Download(format!(
                "Download finished but no audio file was written to {}",
                output_dir.display()
            ))),
        }
    }
}

fn classify_failure(transcript: &str, track_id: &str) -> Option<AcquisitionError> {
    if UNAVAILABLE_MARKERS.iter().any(|m| transcript.contains(m)) {
        return Some(AcquisitionError::ContentUnavailable {
            track_id: track_id.to_string(),
        });
    }
    if CREDENTIAL_MARKERS.iter().any(|m| transcript.contains(m)) {
        return Some(AcquisitionError::InvalidCredentials(last_line(transcript)));
    }
    if NETWORK_MARKERS.iter().any(|m| transcript.contains(m)) {
        return Some(AcquisitionError::Network(last_line(transcript)));
    }
    None
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error")
        .to_string()
}

/// The file named by spotdl's `Downloaded "<name>"` line, when it exists as written.
fn announced_file(stdout: &str, dir: &Path, extension: &str) -> Option<PathBuf> {
    DOWNLOADED_LINE
        .captures_iter(stdout)
        .filter_map(|c| c.get(1))
        .map(|m| dir.join(format!("{}.{}", m.as_str(), extension)))
        .find(|p| p.is_file())
}

fn newest_audio_file(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .max_by_key(|p| {
            fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_urls_and_uris() {
        assert!(is_streaming_ref("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"));
        assert!(is_streaming_ref("  spotify:track:4uLU6hMCjMI75M1A2tKUQC "));
        assert!(!is_streaming_ref("https://open.spotify.com/album/abc"));
        assert!(!is_streaming_ref("http://open.spotify.com/track/abc"));
    }

    #[test]
    fn extracts_track_id() {
        assert_eq!(
            extract_track_id("https://open.spotify.com/track/abc123?si=xyz").as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_track_id("spotify:track:XYZ9").as_deref(), Some("XYZ9"));
        assert_eq!(extract_track_id("song.mp3"), None);
    }

    #[test]
    fn failure_text_is_classified() {
        assert!(matches!(
            classify_failure("LookupError: No results found for song", "id1"),
            Some(AcquisitionError::ContentUnavailable { .. })
        ));
        assert!(matches!(
            classify_failure("error: invalid_client", "id1"),
            Some(AcquisitionError::InvalidCredentials(_))
        ));
        assert!(matches!(
            classify_failure("requests.exceptions.ConnectionError: boom", "id1"),
            Some(AcquisitionError::Network(_))
        ));
        assert!(classify_failure("Downloaded \"Song\"", "id1").is_none());
    }

    #[test]
    fn announced_file_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("Artist - Title.mp3");
        fs::write(&file, b"ID3").unwrap();

        let stdout = "Found 1 songs\nDownloaded \"Artist - Title\": https://music.youtube.com/x";
        assert_eq!(announced_file(stdout, dir.path(), "mp3"), Some(file));
        assert_eq!(announced_file("Downloaded \"Other\"", dir.path(), "mp3"), None);
        assert_eq!(announced_file("", dir.path(), "mp3"), None);
    }
}
