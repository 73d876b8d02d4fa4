use std::{
    any::Any,
    fs,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::{
    config::PipelineOptions,
    core::{
        enhance::StemProcessor,
        organizer::{OutputManager, RunRecord},
        separator::StemSeparator,
    },
    error::{ErrorCategory, StemError},
    io::{
        process::ProcessInvoker,
        resolver::{classify, InputResolver},
    },
    types::{PipelineResult, ProgressEvent, ProgressStage},
};

/// Forwards milestones to the caller, never letting the percent go backwards.
struct Reporter<'a> {
    sink: &'a mut dyn FnMut(ProgressEvent),
    stage: ProgressStage,
    percent: u8,
}

impl<'a> Reporter<'a> {
    fn new(sink: &'a mut dyn FnMut(ProgressEvent)) -> Self {
        Self {
            sink,
            stage: ProgressStage::InputProcessing,
            percent: 0,
        }
    }

    fn report(&mut self, stage: ProgressStage, percent: u8, message: impl Into<String>) {
        let message = message.into();
        self.stage = stage;
        self.percent = percent.clamp(self.percent, 100);
        log::info!("[{:>3}%] {}", self.percent, message);
        (self.sink)(ProgressEvent {
            stage,
            percent: self.percent,
            message,
        });
    }
}

/// Per-run scratch space, removed on drop.
fn create_work_dir(parent: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("stembler-");
    match parent {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            builder.tempdir_in(dir)
        }
        None => builder.tempdir(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs one track through input resolution, separation, optional
/// enhancement and output organization.
///
/// Never panics and never returns early without a [`PipelineResult`]:
/// every failure, including a panic inside a stage, becomes a failed
/// result. Temporary inputs are removed on every path once acquired.
pub fn run(
    input: &str,
    output_dir: &Path,
    options: &PipelineOptions,
    invoker: &dyn ProcessInvoker,
    progress: &mut dyn FnMut(ProgressEvent),
) -> PipelineResult {
    let mut reporter = Reporter::new(progress);
    let manager = OutputManager::new(output_dir, options.layout.clone());
    let mut temp_files: Vec<PathBuf> = Vec::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(input, options, invoker, &manager, &mut reporter, &mut temp_files)
    }));

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("Processing failed with an internal error: {}", message);
            PipelineResult::failure(
                reporter.stage,
                ErrorCategory::Unexpected,
                format!("Unexpected error during {}: {}", reporter.stage, message),
            )
        }
    };

    if !temp_files.is_empty() {
        manager.cleanup_temp_files(&temp_files);
    }

    if !result.success {
        let message = result.error.as_deref().unwrap_or("Unknown error");
        let percent = reporter.percent;
        reporter.report(ProgressStage::Error, percent, format!("Error: {message}"));
    }

    result
}

fn fail(stage: ProgressStage, context: &str, err: StemError) -> PipelineResult {
    let message = format!("{context}: {err}");
    log::error!("{}", message);
    PipelineResult::failure(stage, err.category(), message)
}

fn execute(
    input: &str,
    options: &PipelineOptions,
    invoker: &dyn ProcessInvoker,
    manager: &OutputManager,
    progress: &mut Reporter<'_>,
    temp_files: &mut Vec<PathBuf>,
) -> PipelineResult {
    use ProgressStage::*;

    progress.report(InputProcessing, 0, "Processing input...");

    let spec = classify(input);
    let input_kind = spec.kind();
    if let Some(err) = spec.error() {
        let mut result = fail(InputProcessing, "Input processing failed", err.clone().into());
        result.input_kind = Some(input_kind);
        return result;
    }

    let work = match create_work_dir(options.work_dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => return fail(InputProcessing, "Input processing failed", e.into()),
    };

    let resolver = InputResolver::new(
        options.download.clone(),
        options.streaming.clone(),
        options.credentials.clone(),
        invoker,
    );
    let audio = match resolver.resolve(&spec, work.path()) {
        Ok(audio) => audio,
        Err(e) => {
            let mut result = fail(InputProcessing, "Input processing failed", e);
            result.input_kind = Some(input_kind);
            return result;
        }
    };
    if audio.is_temporary {
        temp_files.push(audio.file_path.clone());
    }
    progress.report(InputProcessing, 10, format!("Input processed: {}", input_kind));

    let track_name = audio.track_name();
    let with_context = |mut result: PipelineResult| {
        result.input_kind = Some(input_kind);
        result.track_name = Some(track_name.clone());
        result
    };

    progress.report(
        LoadingModel,
        15,
        format!("Loading AI model ({})...", options.model_name),
    );
    let separator = StemSeparator::new(
        options.model_name.clone(),
        options.device,
        options.engine.clone(),
        invoker,
    );

    progress.report(SeparatingStems, 20, "Separating stems...");
    let separation = match separator.separate(&audio.file_path, &work.path().join("temp_stems")) {
        Ok(s) => s,
        Err(e) => {
            return with_context(fail(SeparatingStems, "Stem separation failed", e.into()));
        }
    };
    progress.report(
        SeparatingStems,
        80,
        format!("Separated {} stems", separation.stems.len()),
    );

    let mut stems = separation.stems.clone();
    let enhancement = if options.enable_enhancement {
        progress.report(EnhancingAudio, 82, "Enhancing audio quality...");
        let outcome = StemProcessor::default().process(&stems, &work.path().join("temp_processed"));
        if outcome.success {
            stems = outcome.processed.clone();
            progress.report(EnhancingAudio, 90, "Audio enhancement completed");
        } else {
            log::warn!(
                "Enhancement failed for {} stem(s), keeping original stems",
                outcome.failed.len()
            );
            progress.report(
                EnhancingAudio,
                90,
                "Audio enhancement failed, using original stems",
            );
        }
        Some(outcome)
    } else {
        progress.report(EnhancingAudio, 90, "Skipping audio enhancement");
        None
    };
    let enhancement_applied = enhancement.as_ref().is_some_and(|e| e.success);

    progress.report(OrganizingOutput, 92, "Organizing output files...");
    let (paths, organized) = match manager.relocate(&stems, &track_name) {
        Ok(r) => r,
        Err(e) => {
            return with_context(fail(OrganizingOutput, "Output organization failed", e.into()));
        }
    };

    progress.report(OrganizingOutput, 95, "Generating metadata...");
    let record = RunRecord {
        track_name: &track_name,
        separation: &separation,
        stems: &organized,
        enhancement: enhancement.as_ref(),
    };
    let metadata = manager.generate_metadata(&record);
    let metadata_saved = match manager.save_metadata(&metadata, &paths.track_dir) {
        Ok(_) => true,
        Err(e) => {
            log::error!("Failed to save metadata: {}", e);
            false
        }
    };
    let summary_report = manager.summary_report(&record, &paths);
    if let Err(e) = manager.save_report(&summary_report, &paths.track_dir) {
        log::warn!("Failed to save report: {}", e);
    }
    let output_summary = manager.summarize(&paths);

    progress.report(OrganizingOutput, 98, "Cleaning up temporary files...");
    manager.cleanup_temp_files(temp_files);
    temp_files.clear();

    progress.report(Complete, 100, "Processing complete!");

    PipelineResult {
        success: true,
        track_name: Some(track_name),
        input_kind: Some(input_kind),
        stems_separated: separation.stems.stems(),
        enhancement_applied,
        output_directory: Some(paths.track_dir.clone()),
        stems_directory: Some(paths.stems_dir.clone()),
        organized_stems: organized,
        metadata_saved,
        summary_report: Some(summary_report),
        output_summary: Some(output_summary),
        ..Default::default()
    }
}
