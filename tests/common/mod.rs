#![allow(dead_code)]

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use stembler_core::io::process::{ProcessInvoker, ProcessOutput};

/// Writes a 16-bit stereo sine WAV.
pub fn write_tone(path: &Path, sample_rate: u32, seconds: f32, freq: f32, amplitude: f32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let v = (2.0 * std::f32::consts::PI * freq * t).sin() * amplitude;
        let s = (v * i16::MAX as f32) as i16;
        writer.write_sample(s).unwrap();
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineBehaviour {
    /// Writes all four stems.
    Succeed,
    /// Writes every stem except the named one.
    Omit(&'static str),
    /// Writes a zero-length file for the named stem.
    Corrupt(&'static str),
    /// Exits non-zero without writing anything.
    Fail,
}

/// Stands in for the separation engine, the accelerator probe and the
/// streaming downloader.
pub struct FakeEngine {
    pub behaviour: EngineBehaviour,
    pub calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeEngine {
    pub fn new(behaviour: EngineBehaviour) -> Self {
        Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn separation_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|(_, args)| args.iter().any(|a| a == "--out"))
            .count()
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

impl ProcessInvoker for FakeEngine {
    fn invoke(&self, program: &Path, args: &[OsString]) -> io::Result<ProcessOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        self.calls.lock().unwrap().push((program.to_path_buf(), args.clone()));

        if args.first().map(String::as_str) == Some("-c") {
            return Ok(ProcessOutput {
                code: Some(0),
                stdout: "False\n".into(),
                stderr: String::new(),
            });
        }

        if args.first().map(String::as_str) == Some("download") {
            let template = value_after(&args, "--output").unwrap_or_default();
            let target = template
                .replace("{artists}", "Test Artist")
                .replace("{title}", "Test Song")
                .replace("{output-ext}", "wav");
            write_tone(Path::new(&target), 44_100, 0.25, 330.0, 0.4);
            return Ok(ProcessOutput {
                code: Some(0),
                stdout: "Downloaded \"Test Artist - Test Song\": https://music.youtube.com/x".into(),
                stderr: String::new(),
            });
        }

        if self.behaviour == EngineBehaviour::Fail {
            return Ok(ProcessOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "RuntimeError: model weights not found".into(),
            });
        }

        let (Some(model), Some(out)) = (value_after(&args, "--name"), value_after(&args, "--out"))
        else {
            return Ok(ProcessOutput {
                code: Some(2),
                stdout: String::new(),
                stderr: "unexpected invocation".into(),
            });
        };
        let input = PathBuf::from(args.last().cloned().unwrap_or_default());
        let track = input.file_stem().unwrap().to_string_lossy().into_owned();
        let dir = Path::new(out).join(model).join(track);

        for (i, stem) in ["drums", "bass", "vocals", "other"].iter().enumerate() {
            let path = dir.join(format!("{stem}.wav"));
            match self.behaviour {
                EngineBehaviour::Omit(name) if name == *stem => continue,
                EngineBehaviour::Corrupt(name) if name == *stem => {
                    std::fs::create_dir_all(&dir)?;
                    std::fs::write(&path, b"")?;
                }
                _ => write_tone(&path, 44_100, 0.5, 220.0 * (i + 1) as f32, 0.5),
            }
        }

        Ok(ProcessOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}
