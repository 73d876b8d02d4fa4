//! # stembler-core
//!
//! Music stem separation pipeline: resolves a local file, audio URL or
//! streaming track reference into audio, runs an external separation
//! engine, optionally enhances the stems, and organizes the results.

pub mod config;
pub mod error;
pub mod messages;
pub mod types;

pub mod core {
    pub mod audio;
    pub mod dsp;
    pub mod enhance;
    pub mod organizer;
    pub mod pipeline;
    pub mod separator;
}

pub mod io {
    pub mod net;
    pub mod paths;
    pub mod process;
    pub mod progress;
    pub mod resolver;
    pub mod settings;
    pub mod streaming;
}

pub use crate::{
    config::{available_models, Device, OutputLayout, PipelineOptions, StreamingCredentials},
    core::{
        audio::{read_audio, write_audio_f32},
        pipeline::run,
    },
    error::{ErrorCategory, Result, StemError},
    io::{
        process::{ProcessInvoker, SystemProcess},
        progress::{set_download_progress_callback, PipelineWorker, WorkerMessage},
        settings::{SettingsManager, UserSettings},
    },
    types::{InputKind, PipelineResult, ProgressEvent, ProgressStage, Stem},
};
