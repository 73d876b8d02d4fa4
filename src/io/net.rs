use crate::{
    config::DownloadConfig,
    error::AcquisitionError,
    io::{progress::emit_download_progress, resolver::AUDIO_EXTENSIONS},
};
use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use std::{
    fs,
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    thread,
};
use url::Url;

pub const AUDIO_CONTENT_TYPES: [&str; 10] = [
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/flac",
    "audio/mp4",
    "audio/aac",
    "audio/ogg",
    "audio/x-wav",
    "audio/wave",
    "audio/x-m4a",
];

const DOWNLOAD_BASENAME: &str = "downloaded_audio";

/// Absolute URL with both a scheme and a host.
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// Lowercased extension of the URL path, without the dot.
pub fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_string();
    Path::new(&last)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

pub fn has_audio_extension(url: &str) -> bool {
    url_extension(url).is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_audio_content_type(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    AUDIO_CONTENT_TYPES.iter().any(|t| ct.contains(t))
}

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteFileInfo {
    pub url: String,
    pub content_type: String,
    pub file_size: u64,
    pub is_audio: bool,
}

/// Downloads direct audio URLs with bounded retry on transient statuses.
pub struct UrlDownloader {
    client: Client,
    config: DownloadConfig,
}

impl UrlDownloader {
    pub fn new(config: DownloadConfig) -> Result<Self, AcquisitionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        log::info!(
            "Initialized URLDownloader with timeout: {:?}, max_retries: {}",
            config.timeout,
            config.max_retries
        );
        Ok(Self { client, config })
    }

    /// Sends the request, retrying transport errors and retryable statuses
    /// up to `max_retries` times with exponential backoff.
    fn send_with_retry<F>(&self, build: F) -> Result<Response, AcquisitionError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = build().send();
            let retryable = match &outcome {
                Ok(resp) => self.config.retry_statuses.contains(&resp.status().as_u16()),
                Err(e) => e.is_timeout() || e.is_connect(),
            };

            if !retryable || attempt >= self.config.max_retries {
                return outcome.map_err(|e| AcquisitionError::Network(e.to_string()));
            }

            attempt += 1;
            let delay = self.config.backoff * 2u32.saturating_pow(attempt - 1);
            match &outcome {
                Ok(resp) => log::warn!(
                    "HTTP {} from server, retry {}/{} in {:?}",
                    resp.status(),
                    attempt,
                    self.config.max_retries,
                    delay
                ),
                Err(e) => log::warn!(
                    "Request failed ({}), retry {}/{} in {:?}",
                    e,
                    attempt,
                    self.config.max_retries,
                    delay
                ),
            }
            thread::sleep(delay);
        }
    }

    pub fn file_info(&self, url: &str) -> Result<RemoteFileInfo, AcquisitionError> {
        if !is_valid_url(url) {
            return Err(AcquisitionError::Download(format!("Invalid URL: {url}")));
        }

        let resp = self
            .send_with_retry(|| self.client.head(url))?
            .error_for_status()
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let file_size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(RemoteFileInfo {
            url: url.to_string(),
            is_audio: is_audio_content_type(&content_type) || has_audio_extension(url),
            content_type,
            file_size,
        })
    }

    /// An audio extension is enough; otherwise the HEAD content type decides.
    pub fn is_audio_url(&self, url: &str) -> Result<bool, AcquisitionError> {
        if !is_valid_url(url) {
            return Ok(false);
        }
        match self.file_info(url) {
            Ok(info) => Ok(info.is_audio),
            Err(e) if has_audio_extension(url) => {
                log::debug!("Could not check content type for {}: {}", url, e);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Saves `url` as `<output_dir>/downloaded_audio<ext>` and returns the path.
    pub fn download(&self, url: &str, output_dir: &Path) -> Result<PathBuf, AcquisitionError> {
        if !is_valid_url(url) {
            return Err(AcquisitionError::Download(format!("Invalid URL: {url}")));
        }
        if !self.is_audio_url(url)? {
            return Err(AcquisitionError::NotAudio(url.to_string()));
        }

        fs::create_dir_all(output_dir).map_err(|e| {
            AcquisitionError::Download(format!("cannot create {}: {e}", output_dir.display()))
        })?;

        let ext = url_extension(url)
            .filter(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
            .unwrap_or_else(|| "mp3".to_string());
        let dest = output_dir.join(format!("{DOWNLOAD_BASENAME}.{ext}"));

        log::info!("Downloading audio file from: {}", url);
        log::info!("Saving to: {:?}", dest);

        let resp = self
            .send_with_retry(|| self.client.get(url))?
            .error_for_status()
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        let downloaded = write_with_progress(resp, &dest)?;
        if downloaded == 0 {
            fs::remove_file(&dest).ok();
            return Err(AcquisitionError::Download(
                "Download failed or file is empty".into(),
            ));
        }

        log::info!(
            "Download completed: {:.1} MB",
            downloaded as f64 / (1024.0 * 1024.0)
        );
        Ok(dest)
    }
}

fn write_with_progress(mut resp: Response, dest: &Path) -> Result<u64, AcquisitionError> {
    let tmp = dest.with_extension("part");
    let io_err = |e: std::io::Error| AcquisitionError::Download(e.to_string());

    let total = resp.content_length().unwrap_or(0);
    if total > 0 {
        log::info!("File size: {:.1} MB", total as f64 / (1024.0 * 1024.0));
    }
    emit_download_progress(0, total);

    let mut file = File::create(&tmp).map_err(io_err)?;
    let mut downloaded: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = resp
            .read(&mut buf)
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(io_err)?;
        downloaded += n as u64;
        emit_download_progress(downloaded, total);
    }
    file.flush().map_err(io_err)?;
    drop(file);

    if dest.exists() {
        fs::remove_file(dest).ok();
    }
    fs::rename(&tmp, dest).map_err(io_err)?;

    emit_download_progress(total.max(downloaded), total.max(downloaded));
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validity_needs_scheme_and_host() {
        assert!(is_valid_url("https://example.com/a.mp3"));
        assert!(!is_valid_url("example.com/a.mp3"));
        assert!(!is_valid_url("file:///tmp/a.mp3"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn extension_ignores_query() {
        assert_eq!(
            url_extension("https://x.io/path/Song.FLAC?sig=1").as_deref(),
            Some("flac")
        );
        assert!(has_audio_extension("https://x.io/a.wma"));
        assert!(!has_audio_extension("https://x.io/page.html"));
        assert_eq!(url_extension("https://x.io/"), None);
    }

    #[test]
    fn content_type_matching() {
        assert!(is_audio_content_type("audio/mpeg"));
        assert!(is_audio_content_type("Audio/X-WAV; charset=binary"));
        assert!(!is_audio_content_type("text/html"));
    }
}
