use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::{Device, EngineConfig},
    error::SeparationError,
    io::process::ProcessInvoker,
    types::{Stem, StemSet},
};

/// Extensions the separation engine can decode.
pub const SUPPORTED_FORMATS: [&str; 6] = ["mp3", "wav", "flac", "m4a", "aac", "ogg"];

pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_FORMATS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Explicit device wins; otherwise ask the engine's interpreter whether an
/// accelerator is usable. A failed probe means CPU.
pub fn resolve_device(
    explicit: Option<Device>,
    engine: &EngineConfig,
    invoker: &dyn ProcessInvoker,
) -> Device {
    if let Some(device) = explicit {
        return device;
    }

    let args: Vec<OsString> = engine.probe_args.iter().map(OsString::from).collect();
    match invoker.invoke(&engine.program, &args) {
        Ok(out) if out.success() && out.stdout.trim() == "True" => Device::Cuda,
        Ok(_) => Device::Cpu,
        Err(e) => {
            log::debug!("Accelerator probe could not run: {}", e);
            Device::Cpu
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeparationOutput {
    pub audio_file: PathBuf,
    pub output_dir: PathBuf,
    pub model_used: String,
    pub device_used: Device,
    pub track_name: String,
    pub stems: StemSet,
}

/// Drives the external separation engine for one model/device pair.
pub struct StemSeparator<'a> {
    model_name: String,
    device: Device,
    engine: EngineConfig,
    invoker: &'a dyn ProcessInvoker,
}

impl<'a> StemSeparator<'a> {
    pub fn new(
        model_name: impl Into<String>,
        device: Option<Device>,
        engine: EngineConfig,
        invoker: &'a dyn ProcessInvoker,
    ) -> Self {
        let model_name = model_name.into();
        let device = resolve_device(device, &engine, invoker);
        log::info!(
            "Initialized StemSeparator with model: {}, device: {}",
            model_name,
            device
        );
        Self {
            model_name,
            device,
            engine,
            invoker,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn separate(
        &self,
        audio_file: &Path,
        output_dir: &Path,
    ) -> Result<SeparationOutput, SeparationError> {
        if !audio_file.is_file() {
            return Err(SeparationError::MissingInput(audio_file.to_path_buf()));
        }
        if !is_supported_format(audio_file) {
            let ext = audio_file
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(SeparationError::UnsupportedFormat(ext));
        }

        fs::create_dir_all(output_dir).map_err(|source| SeparationError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        log::info!("Separating stems for: {:?}", audio_file);
        log::info!("Using model: {}, device: {}", self.model_name, self.device);

        let args = self.engine_args(audio_file, output_dir);
        let out = self
            .invoker
            .invoke(&self.engine.program, &args)
            .map_err(|source| SeparationError::Launch {
                program: self.engine.program.display().to_string(),
                source,
            })?;

        if !out.success() {
            return Err(SeparationError::EngineFailed {
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            });
        }

        let track_name = audio_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
            .to_string();
        let stems = self.stem_paths(output_dir, &track_name);

        let missing: Vec<Stem> = verify_stems_exist(&stems)
            .into_iter()
            .filter_map(|(stem, exists)| (!exists).then_some(stem))
            .collect();
        if !missing.is_empty() {
            return Err(SeparationError::MissingStems { missing });
        }

        log::info!("Separated {} stems for {}", stems.len(), track_name);

        Ok(SeparationOutput {
            audio_file: audio_file.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            model_used: self.model_name.clone(),
            device_used: self.device,
            track_name,
            stems,
        })
    }

    fn engine_args(&self, audio_file: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.engine.args_prefix.iter().map(OsString::from).collect();
        args.extend([
            OsString::from("--name"),
            OsString::from(&self.model_name),
            OsString::from("--device"),
            OsString::from(self.device.as_str()),
            OsString::from("--out"),
            output_dir.as_os_str().to_owned(),
            audio_file.as_os_str().to_owned(),
        ]);
        args
    }

    /// Where the engine writes stems: `<output_dir>/<model>/<track>/<stem>.wav`.
    pub fn stem_paths(&self, output_dir: &Path, track_name: &str) -> StemSet {
        let dir = output_dir.join(&self.model_name).join(track_name);
        StemSet::from_paths(
            Stem::ALL
                .iter()
                .map(|s| (*s, dir.join(format!("{}.wav", s.as_str())))),
        )
    }
}

pub fn verify_stems_exist(stems: &StemSet) -> BTreeMap<Stem, bool> {
    stems.iter().map(|(s, p)| (s, p.is_file())).collect()
}
