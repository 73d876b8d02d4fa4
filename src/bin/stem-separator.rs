use std::{
    backtrace::Backtrace,
    io::Write,
    panic,
    path::PathBuf,
    process,
    sync::{mpsc::RecvError, Arc, Mutex, OnceLock},
};

use anyhow::Context;
use clap::Parser;
use stembler_core::{
    available_models,
    config::DEFAULT_MODEL,
    io::{
        progress::{clear_download_progress_callback, format_duration, ProgressTracker},
        resolver::classify,
    },
    messages::failure_text,
    set_download_progress_callback, Device, InputKind, PipelineOptions, PipelineResult,
    PipelineWorker, ProgressEvent, ProgressStage, SettingsManager, StreamingCredentials,
    SystemProcess, WorkerMessage,
};

static PANIC_TRACE: OnceLock<Mutex<Option<String>>> = OnceLock::new();

/// Music Stem Separator - AI-powered audio stem separation tool.
///
/// INPUT_PATH can be a local audio file (MP3, WAV, FLAC, ...), a Spotify
/// track URL or URI, or a direct URL to an audio file.
#[derive(Parser)]
#[command(name = "stem-separator")]
#[command(version)]
struct Cli {
    #[arg(value_name = "INPUT_PATH", required_unless_present = "list_models")]
    input: Option<String>,

    /// Output directory for separated stems
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,

    /// Demucs model to use
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Device to use (cpu or cuda); auto-detected when omitted
    #[arg(short, long)]
    device: Option<Device>,

    /// Disable audio enhancement processing
    #[arg(long)]
    no_enhance: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Spotify client ID (overrides the settings file)
    #[arg(long, requires = "spotify_client_secret")]
    spotify_client_id: Option<String>,

    /// Spotify client secret (overrides the settings file)
    #[arg(long, requires = "spotify_client_id")]
    spotify_client_secret: Option<String>,

    /// List available models and exit
    #[arg(long)]
    list_models: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    capture_panics(cli.verbose);

    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\n\n⏹️  Operation cancelled by user");
        process::exit(1);
    }) {
        log::warn!("Could not install interrupt handler: {}", e);
    }

    if cli.list_models {
        handle_list();
        process::exit(0);
    }

    let verbose = cli.verbose;
    match handle_separate(cli) {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            log::error!("Unexpected error: {}", e);
            eprintln!("\n💥 Unexpected error: {}", e);
            if verbose {
                eprintln!("{:?}", e);
            }
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if verbose {
        builder.format_timestamp_millis();
    } else {
        builder.format_timestamp(None).format_target(false);
    }
    let _ = builder.try_init();
}

/// Panics inside the pipeline are caught and turned into failed results.
/// Keep their trace for verbose output instead of printing it mid-run.
fn capture_panics(verbose: bool) {
    panic::set_hook(Box::new(move |info| {
        if !verbose {
            return;
        }
        let trace = format!("{info}\n{}", Backtrace::force_capture());
        if let Ok(mut slot) = PANIC_TRACE.get_or_init(|| Mutex::new(None)).lock() {
            *slot = Some(trace);
        }
    }));
}

fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.get()?.lock().ok()?.take()
}

fn handle_list() {
    eprintln!("📋 Available Models");
    eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (name, description) in available_models() {
        let marker = if *name == DEFAULT_MODEL { " (default)" } else { "" };
        eprintln!("  • {}{} - {}", name, marker, description);
    }
    eprintln!();
    eprintln!("Use --model <name> to specify a model");
}

/// Flags win over the settings file. clap only accepts both flags or neither.
fn resolve_credentials(cli: &Cli) -> Option<StreamingCredentials> {
    if let (Some(id), Some(secret)) = (&cli.spotify_client_id, &cli.spotify_client_secret) {
        return Some(StreamingCredentials::new(id.trim(), secret.trim()));
    }
    match SettingsManager::new() {
        Ok(manager) => manager.load().credentials(),
        Err(e) => {
            log::debug!("Settings unavailable: {}", e);
            None
        }
    }
}

fn handle_separate(cli: Cli) -> anyhow::Result<bool> {
    let input = cli.input.clone().context("INPUT_PATH is required")?;

    let options = PipelineOptions {
        model_name: cli.model.clone(),
        device: cli.device,
        enable_enhancement: !cli.no_enhance,
        credentials: resolve_credentials(&cli),
        ..Default::default()
    };

    eprintln!("🎵 Music Stem Separator v{} 🎵", env!("CARGO_PKG_VERSION"));
    eprintln!("{}", "=".repeat(50));
    if cli.verbose {
        eprintln!("Input:  {}", input);
        eprintln!("Output: {}", cli.output.display());
        eprintln!("Model:  {}", cli.model);
    }

    let spec = classify(&input);
    let local_file = if spec.is_valid() {
        eprintln!("🎧 {} ({})", spec.display_name(), spec.kind());
        if spec.kind().requires_download() {
            eprintln!("📥 Input will be downloaded before separation");
        }
        (spec.kind() == InputKind::LocalFile).then(|| PathBuf::from(spec.cleaned()))
    } else {
        None
    };

    let mut tracker = ProgressTracker::new(cli.model.clone(), local_file.as_deref());
    if let Some(secs) = tracker.estimate_remaining_secs(0) {
        eprintln!("⏱️  Estimated time: {}", format_duration(secs));
    }
    tracker.start();

    setup_download_progress();

    let (worker, rx) = PipelineWorker::spawn(input, cli.output.clone(), options, Arc::new(SystemProcess));

    let result = loop {
        match rx.recv() {
            Ok(WorkerMessage::Progress(event)) => {
                tracker.update(event.percent);
                print_progress(&event, &tracker, cli.verbose);
            }
            Ok(WorkerMessage::Finished { result, .. }) => break result,
            Err(RecvError) => anyhow::bail!("pipeline worker exited without a result"),
        }
    };
    clear_download_progress_callback();
    if worker.join().is_err() {
        anyhow::bail!("pipeline worker panicked");
    }

    eprintln!("⏱️  Elapsed: {}", tracker.format_elapsed());
    Ok(print_result(&result, cli.verbose))
}

fn setup_download_progress() {
    set_download_progress_callback(|downloaded, total| {
        if total > 0 {
            let percent = (downloaded as f64 / total as f64 * 100.0).round() as u64;
            eprint!(
                "\r📥 Downloading: {:>3}% ({:.2} MB / {:.2} MB)",
                percent,
                downloaded as f64 / 1_000_000.0,
                total as f64 / 1_000_000.0
            );
            if downloaded >= total {
                eprintln!();
            }
        } else {
            eprint!("\r📥 Downloading: {:.2} MB", downloaded as f64 / 1_000_000.0);
        }
        let _ = std::io::stderr().flush();
    });
}

fn print_progress(event: &ProgressEvent, tracker: &ProgressTracker, verbose: bool) {
    let icon = match event.stage {
        ProgressStage::InputProcessing => "🔍",
        ProgressStage::LoadingModel => "🤖",
        ProgressStage::SeparatingStems => "🎚️ ",
        ProgressStage::EnhancingAudio => "🎛️ ",
        ProgressStage::OrganizingOutput => "📁",
        ProgressStage::Complete => "✅",
        // failures are printed with the result
        ProgressStage::Error => return,
    };

    let mut line = format!("{} [{:>3}%] {}", icon, event.percent, event.message);
    if (1..100).contains(&event.percent) {
        if let Some(secs) = tracker.estimate_remaining_secs(event.percent) {
            line.push_str(&format!(" (~{} left)", format_duration(secs)));
        }
    }
    if verbose {
        if let Some(rate) = tracker.processing_rate() {
            line.push_str(&format!(" [{rate:.1}%/s]"));
        }
    }
    eprintln!("{line}");
}

fn print_result(result: &PipelineResult, verbose: bool) -> bool {
    if !result.success {
        let trace = take_panic_trace();
        eprintln!("\n{}", failure_text(result, verbose, trace.as_deref()));
        return false;
    }

    println!("\n✅ Stem separation completed successfully!");
    if let Some(report) = &result.summary_report {
        println!("\n{}", report);
    }
    if let Some(summary) = &result.output_summary {
        println!("\n📁 Output Location: {}", summary.track_directory.display());
        println!("📊 Total Files: {}", summary.total_files);
        println!("💾 Total Size: {:.1} MB", summary.total_size_mb);
    }
    true
}
