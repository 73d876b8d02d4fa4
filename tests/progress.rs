mod common;

use std::sync::Arc;

use common::{write_tone, EngineBehaviour, FakeEngine};
use stembler_core::{
    config::{Device, PipelineOptions},
    io::progress::{
        format_duration, model_processing_rate, JobStatus, PipelineWorker, ProgressTracker,
        WorkerMessage,
    },
    ErrorCategory, ProgressStage,
};
use tempfile::TempDir;

fn drain(rx: std::sync::mpsc::Receiver<WorkerMessage>) -> Vec<WorkerMessage> {
    rx.into_iter().collect()
}

#[test]
fn worker_streams_progress_then_one_result() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("tune.wav");
    write_tone(&input, 44_100, 0.3, 440.0, 0.4);
    let options = PipelineOptions {
        device: Some(Device::Cpu),
        work_dir: Some(tmp.path().join("work")),
        ..Default::default()
    };

    let (worker, rx) = PipelineWorker::spawn(
        input.to_string_lossy().into_owned(),
        tmp.path().join("out"),
        options,
        Arc::new(FakeEngine::new(EngineBehaviour::Succeed)),
    );
    let messages = drain(rx);
    worker.join().unwrap();

    let finished: Vec<_> = messages
        .iter()
        .filter(|m| matches!(m, WorkerMessage::Finished { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
    match messages.last().unwrap() {
        WorkerMessage::Finished { status, result } => {
            assert_eq!(*status, JobStatus::Completed);
            assert!(result.success);
        }
        other => panic!("last message was {other:?}"),
    }

    let percents: Vec<u8> = messages
        .iter()
        .filter_map(|m| match m {
            WorkerMessage::Progress(e) => Some(e.percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
}

#[test]
fn failed_run_finishes_as_failed() {
    let tmp = TempDir::new().unwrap();
    let (worker, rx) = PipelineWorker::spawn(
        "   ".into(),
        tmp.path().join("out"),
        PipelineOptions::default(),
        Arc::new(FakeEngine::new(EngineBehaviour::Succeed)),
    );
    let messages = drain(rx);
    assert_eq!(worker.status(), JobStatus::Failed);
    worker.join().unwrap();

    let last_progress = messages.iter().rev().find_map(|m| match m {
        WorkerMessage::Progress(e) => Some(e.clone()),
        _ => None,
    });
    assert_eq!(last_progress.unwrap().stage, ProgressStage::Error);
    match messages.last().unwrap() {
        WorkerMessage::Finished { status, result } => {
            assert_eq!(*status, JobStatus::Failed);
            assert_eq!(result.error_category, Some(ErrorCategory::Input));
        }
        other => panic!("last message was {other:?}"),
    }
}

#[test]
fn cancelled_job_reports_cancelled() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("tune.wav");
    write_tone(&input, 44_100, 0.3, 440.0, 0.4);
    let options = PipelineOptions {
        device: Some(Device::Cpu),
        enable_enhancement: false,
        work_dir: Some(tmp.path().join("work")),
        ..Default::default()
    };

    let (worker, rx) = PipelineWorker::spawn(
        input.to_string_lossy().into_owned(),
        tmp.path().join("out"),
        options,
        Arc::new(FakeEngine::new(EngineBehaviour::Succeed)),
    );
    worker.cancel();
    assert!(worker.is_cancelled());

    let messages = drain(rx);
    match messages.last().unwrap() {
        WorkerMessage::Finished { status, .. } => assert_eq!(*status, JobStatus::Cancelled),
        other => panic!("last message was {other:?}"),
    }
    assert_eq!(worker.status(), JobStatus::Cancelled);
    worker.join().unwrap();
}

#[test]
fn tracker_falls_back_to_file_size_estimate() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("big.mp3");
    std::fs::write(&file, vec![0u8; 2 * 1024 * 1024]).unwrap();

    let tracker = ProgressTracker::new("htdemucs_ft", Some(&file));
    assert_eq!(tracker.estimate_remaining_secs(0), Some(7 + 25));

    let unknown = ProgressTracker::new("htdemucs", Some(&tmp.path().join("missing.mp3")));
    assert_eq!(unknown.estimate_remaining_secs(0), Some(30 + 25));
}

#[test]
fn tracker_with_progress_extrapolates() {
    let mut tracker = ProgressTracker::new("htdemucs", None);
    tracker.start();
    tracker.update(50);
    // elapsed is ~0s, so the estimate is ~0s
    assert_eq!(tracker.estimate_remaining_secs(50), Some(0));
    assert_eq!(tracker.estimate_remaining_secs(100), Some(0));
    assert_eq!(tracker.format_elapsed(), "0s");
}

#[test]
fn model_rates_and_durations() {
    assert_eq!(model_processing_rate("mdx_extra"), 4.0);
    assert_eq!(model_processing_rate("something_else"), 3.0);
    assert_eq!(format_duration(0), "0s");
    assert_eq!(format_duration(59), "59s");
    assert_eq!(format_duration(60), "1m 0s");
    assert_eq!(format_duration(3_600), "1h 0m");
}
