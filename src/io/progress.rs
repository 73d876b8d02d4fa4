use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
        Arc, Mutex, OnceLock,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::PipelineOptions,
    core::pipeline,
    io::process::ProcessInvoker,
    types::{PipelineResult, ProgressEvent},
};

type DownloadProgressFn = Box<dyn Fn(u64, u64) + Send + 'static>;

static DOWNLOAD_PROGRESS_CB: OnceLock<Mutex<Option<DownloadProgressFn>>> = OnceLock::new();

/// Installs the process-wide observer for remote downloads, replacing any previous one.
pub fn set_download_progress_callback(cb: impl Fn(u64, u64) + Send + 'static) {
    let slot = DOWNLOAD_PROGRESS_CB.get_or_init(|| Mutex::new(None));
    if let Ok(mut g) = slot.lock() {
        *g = Some(Box::new(cb));
    }
}

pub fn clear_download_progress_callback() {
    if let Some(m) = DOWNLOAD_PROGRESS_CB.get() {
        if let Ok(mut g) = m.lock() {
            *g = None;
        }
    }
}

pub fn emit_download_progress(done: u64, total: u64) {
    if let Some(m) = DOWNLOAD_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(done, total);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Messages from a [`PipelineWorker`] to its owner, in emission order.
#[derive(Clone, Debug)]
pub enum WorkerMessage {
    Progress(ProgressEvent),
    /// Always the last message of a job.
    Finished {
        status: JobStatus,
        result: PipelineResult,
    },
}

/// Runs one pipeline on a background thread and streams its progress over a channel.
///
/// Cancellation is coarse: the running stage is not interrupted, but once
/// [`cancel`](Self::cancel) is called no further progress is forwarded and the
/// job finishes as [`JobStatus::Cancelled`].
pub struct PipelineWorker {
    handle: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    status: Arc<Mutex<JobStatus>>,
}

impl PipelineWorker {
    pub fn spawn(
        input: String,
        output_dir: PathBuf,
        options: PipelineOptions,
        invoker: Arc<dyn ProcessInvoker>,
    ) -> (Self, Receiver<WorkerMessage>) {
        let (tx, rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(JobStatus::Pending));

        let worker_cancelled = Arc::clone(&cancelled);
        let worker_status = Arc::clone(&status);

        let handle = thread::spawn(move || {
            set_status(&worker_status, JobStatus::Processing);

            let progress_tx = tx.clone();
            let progress_cancelled = Arc::clone(&worker_cancelled);
            let mut forward = move |event: ProgressEvent| {
                if !progress_cancelled.load(Ordering::SeqCst) {
                    let _ = progress_tx.send(WorkerMessage::Progress(event));
                }
            };

            let result = pipeline::run(&input, &output_dir, &options, invoker.as_ref(), &mut forward);

            let final_status = if worker_cancelled.load(Ordering::SeqCst) {
                JobStatus::Cancelled
            } else if result.success {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            set_status(&worker_status, final_status);
            log::debug!("Pipeline worker finished: {:?}", final_status);

            let _ = tx.send(WorkerMessage::Finished {
                status: final_status,
                result,
            });
        });

        (
            Self {
                handle: Some(handle),
                cancelled,
                status,
            },
            rx,
        )
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> JobStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(JobStatus::Failed)
    }

    /// Waits for the worker thread to exit.
    pub fn join(mut self) -> thread::Result<()> {
        match self.handle.take() {
            Some(h) => h.join(),
            None => Ok(()),
        }
    }
}

fn set_status(slot: &Mutex<JobStatus>, status: JobStatus) {
    if let Ok(mut s) = slot.lock() {
        *s = status;
    }
}

/// Elapsed time and remaining-time estimates for one job.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    model_name: String,
    file_size_mb: f64,
    started: Option<Instant>,
    last_percent: u8,
}

const SETUP_OVERHEAD_SECS: u64 = 25;
const DEFAULT_SECS_PER_MB: f64 = 3.0;
const ASSUMED_FILE_MB: f64 = 10.0;

/// Rough seconds of processing per MB of input for each model.
pub fn model_processing_rate(model_name: &str) -> f64 {
    match model_name {
        "htdemucs" => 3.0,
        "htdemucs_ft" => 3.5,
        "mdx_extra" => 4.0,
        "mdx_q" => 2.0,
        _ => DEFAULT_SECS_PER_MB,
    }
}

impl ProgressTracker {
    pub fn new(model_name: impl Into<String>, file: Option<&Path>) -> Self {
        let file_size_mb = match file {
            Some(path) => fs::metadata(path)
                .map(|m| m.len() as f64 / (1024.0 * 1024.0))
                .unwrap_or(ASSUMED_FILE_MB),
            None => 0.0,
        };
        Self {
            model_name: model_name.into(),
            file_size_mb,
            started: None,
            last_percent: 0,
        }
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.last_percent = 0;
    }

    pub fn update(&mut self, percent: u8) {
        self.last_percent = percent.min(100);
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started.map(|s| s.elapsed().as_secs()).unwrap_or(0)
    }

    /// Percent per second so far.
    pub fn processing_rate(&self) -> Option<f64> {
        let started = self.started?;
        let elapsed = started.elapsed().as_secs_f64();
        (self.last_percent > 0 && elapsed > 0.0).then(|| self.last_percent as f64 / elapsed)
    }

    pub fn estimate_remaining_secs(&self, current_percent: u8) -> Option<u64> {
        match self.started {
            Some(started) if current_percent > 0 => Some(estimate_from_progress(
                current_percent,
                started.elapsed().as_secs_f64(),
            )),
            _ => self.estimate_from_file_size(),
        }
    }

    fn estimate_from_file_size(&self) -> Option<u64> {
        if self.file_size_mb <= 0.0 {
            return None;
        }
        let secs = (self.file_size_mb * model_processing_rate(&self.model_name)) as u64;
        Some(secs + SETUP_OVERHEAD_SECS)
    }

    pub fn format_elapsed(&self) -> String {
        format_duration(self.elapsed_secs())
    }
}

/// Linear extrapolation, padded by 20% once past 80%.
fn estimate_from_progress(current_percent: u8, elapsed_secs: f64) -> u64 {
    if current_percent >= 100 {
        return 0;
    }
    let per_percent = elapsed_secs / current_percent as f64;
    let mut remaining = per_percent * (100 - current_percent) as f64;
    if current_percent > 80 {
        remaining *= 1.2;
    }
    remaining.max(0.0) as u64
}

/// `45s`, `1m 23s` or `2h 5m`.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
