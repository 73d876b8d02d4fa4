//! User-facing text for failed runs.

use crate::{error::ErrorCategory, types::PipelineResult};

/// Short explanation of a failure for a person, with the technical detail appended.
pub fn user_message(category: ErrorCategory, detail: &str) -> String {
    let headline = match category {
        ErrorCategory::Input => {
            "The input could not be used.\n\nCheck that the file exists and is a supported audio format, or that the URL is correct."
        }
        ErrorCategory::Credentials => {
            "Spotify credentials are invalid or missing.\n\nPlease check your Spotify API credentials in Settings."
        }
        ErrorCategory::ContentUnavailable => {
            "This track could not be found on any audio provider.\n\nPlease try a different track."
        }
        ErrorCategory::Network => {
            "A network connection error occurred.\n\nPlease check your internet connection and try again."
        }
        ErrorCategory::Disk => {
            "A file or directory could not be written.\n\nCheck free disk space and permissions on the output folder."
        }
        ErrorCategory::Engine => {
            "An error occurred while loading or running the AI model.\n\nPlease check the Demucs installation or select a different model."
        }
        ErrorCategory::Memory => {
            "The application ran out of memory.\n\nPlease close other applications and try processing a smaller file."
        }
        ErrorCategory::Unexpected => {
            "An unexpected error occurred.\n\nPlease try again or report this issue if it persists."
        }
    };

    let detail = detail.trim();
    if detail.is_empty() {
        headline.to_string()
    } else {
        format!("{headline}\n\nDetails: {detail}")
    }
}

pub fn credential_setup_instructions() -> &'static str {
    "To use Spotify URLs, you need Spotify API credentials:

1. Go to https://developer.spotify.com/dashboard
2. Log in with your Spotify account
3. Click \"Create an App\"
4. Fill in the app details and click \"Create\"
5. Copy your Client ID and Client Secret

Then either pass them on the command line:

  stem-separator <SPOTIFY_URL> --spotify-client-id <ID> --spotify-client-secret <SECRET>

or save them as `spotify_client_id` and `spotify_client_secret` in the settings file."
}

/// What the CLI prints for a failed run.
///
/// Verbose output adds the failed stage, and for unexpected errors the
/// captured panic trace.
pub fn failure_text(result: &PipelineResult, verbose: bool, trace: Option<&str>) -> String {
    let detail = result.error.as_deref().unwrap_or("Unknown error");
    let mut text = format!("❌ Error: {detail}");

    if let Some(category) = result.error_category {
        text.push_str("\n\n");
        text.push_str(&user_message(category, ""));
        if category == ErrorCategory::Credentials {
            text.push_str("\n\n");
            text.push_str(credential_setup_instructions());
        }
    }

    if verbose {
        if let Some(stage) = result.failed_stage {
            text.push_str(&format!("\n\nFailed stage: {stage}"));
        }
        if result.error_category == Some(ErrorCategory::Unexpected) {
            let trace = trace.map(str::trim).filter(|t| !t.is_empty());
            text.push_str("\n\nTrace:\n");
            text.push_str(trace.unwrap_or("(no trace captured)"));
        }
    }
    text
}
