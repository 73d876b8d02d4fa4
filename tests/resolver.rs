use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use stembler_core::{
    config::{DownloadConfig, StreamingConfig, StreamingCredentials},
    error::{AcquisitionError, InputError, StemError},
    io::{
        process::{ProcessInvoker, ProcessOutput},
        resolver::{classify, InputResolver},
    },
    ErrorCategory, InputKind,
};
use tempfile::TempDir;

const ARTISTS: &str = "Rick Astley";
const TITLE: &str = "Never Gonna Give You Up";

/// Pretends to be `spotdl`: expands the output template and writes a file,
/// or prints the given failure text.
struct FakeSpotdl {
    failure: Option<&'static str>,
    log: &'static str,
    args: Mutex<Vec<String>>,
}

impl FakeSpotdl {
    fn ok() -> Self {
        Self {
            failure: None,
            log: "",
            args: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds, but logs the given lines before the download line.
    fn chatty(log: &'static str) -> Self {
        Self {
            log,
            ..Self::ok()
        }
    }

    fn failing(text: &'static str) -> Self {
        Self {
            failure: Some(text),
            ..Self::ok()
        }
    }
}

impl ProcessInvoker for FakeSpotdl {
    fn invoke(&self, _program: &Path, args: &[OsString]) -> io::Result<ProcessOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        *self.args.lock().unwrap() = args.clone();

        if let Some(text) = self.failure {
            return Ok(ProcessOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: text.to_string(),
            });
        }

        let pos = args.iter().position(|a| a == "--output").unwrap();
        let target = args[pos + 1]
            .replace("{artists}", ARTISTS)
            .replace("{title}", TITLE)
            .replace("{output-ext}", "mp3");
        fs::write(target, b"ID3 fake mp3")?;
        Ok(ProcessOutput {
            code: Some(0),
            stdout: format!(
                "{}Downloaded \"{ARTISTS} - {TITLE}\": https://music.youtube.com/watch?v=dQw4w9WgXcQ",
                self.log
            ),
            stderr: String::new(),
        })
    }
}

fn creds() -> Option<StreamingCredentials> {
    Some(StreamingCredentials::new("client", "secret"))
}

fn resolver<'a>(
    invoker: &'a dyn ProcessInvoker,
    credentials: Option<StreamingCredentials>,
) -> InputResolver<'a> {
    InputResolver::new(
        DownloadConfig::default(),
        StreamingConfig::default(),
        credentials,
        invoker,
    )
}

#[test]
fn classifies_each_input_kind() {
    let tmp = TempDir::new().unwrap();
    let song = tmp.path().join("song.mp3");
    fs::write(&song, b"data").unwrap();

    assert_eq!(classify(song.to_str().unwrap()).kind(), InputKind::LocalFile);
    assert_eq!(
        classify(&format!("  \"{}\" ", song.display())).kind(),
        InputKind::LocalFile
    );
    assert_eq!(
        classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC").kind(),
        InputKind::StreamingTrackRef
    );
    assert_eq!(classify("spotify:track:abc").kind(), InputKind::StreamingTrackRef);
    assert_eq!(
        classify("https://example.com/audio/file.mp3").kind(),
        InputKind::RemoteUrl
    );
}

#[test]
fn specs_describe_themselves() {
    let tmp = TempDir::new().unwrap();
    let song = tmp.path().join("song.flac");
    fs::write(&song, b"fLaC").unwrap();

    let local = classify(song.to_str().unwrap());
    assert!(local.is_valid());
    assert_eq!(local.display_name(), "song.flac");
    assert!(!local.kind().requires_download());

    let remote = classify("https://example.com/audio/file.mp3");
    assert_eq!(remote.display_name(), "file.mp3");
    assert!(remote.kind().requires_download());

    let streaming = classify("spotify:track:abc");
    assert_eq!(streaming.display_name(), "Spotify Track");
    assert!(streaming.kind().requires_download());

    let invalid = classify("/no/such/file.mp3");
    assert!(!invalid.is_valid());
    assert_eq!(invalid.display_name(), "Invalid Input");
    assert!(!invalid.kind().requires_download());
}

#[test]
fn invalid_inputs_carry_distinct_messages() {
    let tmp = TempDir::new().unwrap();
    let text = tmp.path().join("notes.txt");
    fs::write(&text, b"hello").unwrap();

    let missing = classify("/no/such/file.mp3");
    assert_eq!(missing.kind(), InputKind::Invalid);
    assert!(matches!(missing.error(), Some(InputError::NotFound(_))));

    let unsupported = classify(text.to_str().unwrap());
    assert_eq!(unsupported.kind(), InputKind::Invalid);
    assert!(matches!(
        unsupported.error(),
        Some(InputError::UnsupportedFormat { .. })
    ));

    let dir = classify(tmp.path().to_str().unwrap());
    assert!(matches!(dir.error(), Some(InputError::NotAFile(_))));

    let messages = [missing, unsupported, classify("")]
        .iter()
        .map(|s| s.error_message().unwrap())
        .collect::<Vec<_>>();
    assert_ne!(messages[0], messages[1]);
    assert_ne!(messages[1], messages[2]);
}

#[test]
fn local_files_pass_through_untouched() {
    let tmp = TempDir::new().unwrap();
    let song = tmp.path().join("song.wav");
    fs::write(&song, b"RIFF").unwrap();
    let invoker = FakeSpotdl::ok();

    let audio = resolver(&invoker, None)
        .resolve(&classify(song.to_str().unwrap()), tmp.path())
        .unwrap();

    assert_eq!(audio.file_path, song);
    assert!(!audio.is_temporary);
    assert_eq!(audio.origin_kind, InputKind::LocalFile);
    assert!(!tmp.path().join("temp").exists());
}

#[test]
fn streaming_reference_downloads_into_temp() {
    let tmp = TempDir::new().unwrap();
    let invoker = FakeSpotdl::ok();

    let spec = classify("spotify:track:4uLU6hMCjMI75M1A2tKUQC");
    let audio = resolver(&invoker, creds()).resolve(&spec, tmp.path()).unwrap();

    assert_eq!(
        audio.file_path,
        tmp.path()
            .join("temp")
            .join("Rick Astley - Never Gonna Give You Up.mp3")
    );
    assert!(audio.is_temporary);
    assert_eq!(audio.track_name(), "Rick Astley - Never Gonna Give You Up");

    let args = invoker.args.lock().unwrap().clone();
    for expected in ["--client-id", "client", "--client-secret", "secret", "--dont-filter-results"] {
        assert!(args.iter().any(|a| a == expected), "missing {expected} in {args:?}");
    }
    let audio_pos = args.iter().position(|a| a == "--audio").unwrap();
    assert_eq!(&args[audio_pos + 1..], ["youtube-music", "youtube"]);
}

#[test]
fn successful_download_ignores_retry_chatter() {
    let tmp = TempDir::new().unwrap();
    let invoker = FakeSpotdl::chatty(
        "Read timed out, retrying...\nMax retries exceeded with url: /search (retry 1 of 3)\n",
    );

    let audio = resolver(&invoker, creds())
        .resolve(&classify("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), tmp.path())
        .unwrap();

    assert!(audio.file_path.is_file());
    assert_eq!(audio.track_name(), "Rick Astley - Never Gonna Give You Up");
}

#[test]
fn missing_credentials_never_launch_the_downloader() {
    let tmp = TempDir::new().unwrap();
    let invoker = FakeSpotdl::ok();

    for credentials in [None, Some(StreamingCredentials::new("id", "  "))] {
        let err = resolver(&invoker, credentials)
            .resolve(&classify("spotify:track:abc"), tmp.path())
            .unwrap_err();
        assert!(matches!(
            err,
            StemError::Acquisition(AcquisitionError::MissingCredentials(_))
        ));
        assert_eq!(err.category(), ErrorCategory::Credentials);
    }
    assert!(invoker.args.lock().unwrap().is_empty());
}

#[test]
fn unavailable_track_is_its_own_category() {
    let tmp = TempDir::new().unwrap();
    let invoker = FakeSpotdl::failing("LookupError: No results found for song: abc");

    let err = resolver(&invoker, creds())
        .resolve(&classify("spotify:track:abc"), tmp.path())
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::ContentUnavailable);
    assert!(err.to_string().contains("abc"));
}

#[test]
fn rejected_credentials_are_reported_as_credentials() {
    let tmp = TempDir::new().unwrap();
    let invoker = FakeSpotdl::failing("SpotifyOauthError: error: invalid_client");

    let err = resolver(&invoker, creds())
        .resolve(&classify("spotify:track:abc"), tmp.path())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Credentials);
}

#[test]
fn invalid_spec_resolves_to_its_error() {
    let tmp = TempDir::new().unwrap();
    let invoker = FakeSpotdl::ok();
    let err = resolver(&invoker, None)
        .resolve(&classify("/no/such/file.flac"), tmp.path())
        .unwrap_err();

    match err {
        StemError::Input(InputError::NotFound(p)) => {
            assert_eq!(p, PathBuf::from("/no/such/file.flac"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
