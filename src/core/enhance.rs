use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{
    core::{
        audio::{read_audio, resample, to_interleaved, to_planar, write_audio_f32},
        dsp::{self, AudioMetrics},
    },
    error::EnhanceError,
    types::{Stem, StemSet},
};

pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Result of enhancing every stem of one run.
#[derive(Clone, Debug, Default)]
pub struct EnhancementOutcome {
    /// True only when no stem failed.
    pub success: bool,
    /// Input keys; successful stems repointed at their processed files.
    pub processed: StemSet,
    pub metrics: BTreeMap<Stem, AudioMetrics>,
    pub failed: BTreeMap<Stem, String>,
}

/// Load, enhance, fade, normalize and save each stem independently.
#[derive(Clone, Debug)]
pub struct StemProcessor {
    sample_rate: u32,
    apply_enhancement: bool,
}

impl Default for StemProcessor {
    fn default() -> Self {
        Self::new(TARGET_SAMPLE_RATE, true)
    }
}

impl StemProcessor {
    pub fn new(sample_rate: u32, apply_enhancement: bool) -> Self {
        log::info!(
            "Initialized StemProcessor with sample_rate: {}, enhancement: {}",
            sample_rate,
            apply_enhancement
        );
        Self {
            sample_rate,
            apply_enhancement,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn process(&self, stems: &StemSet, output_dir: &Path) -> EnhancementOutcome {
        if let Err(e) = fs::create_dir_all(output_dir) {
            log::warn!("Could not create {:?}: {}", output_dir, e);
        }

        let jobs: Vec<(Stem, PathBuf)> = stems.iter().map(|(s, p)| (s, p.to_path_buf())).collect();
        let results: Vec<(Stem, PathBuf, Result<AudioMetrics, EnhanceError>)> = jobs
            .par_iter()
            .map(|(stem, input)| {
                let output = output_dir.join(format!("{}_processed.wav", stem.as_str()));
                let result = self.process_stem(input, &output);
                (*stem, output, result)
            })
            .collect();

        let mut outcome = EnhancementOutcome {
            success: true,
            processed: stems.clone(),
            ..Default::default()
        };

        for (stem, output, result) in results {
            match result {
                Ok(metrics) => {
                    outcome.processed.replace(stem, output);
                    outcome.metrics.insert(stem, metrics);
                }
                Err(e) => {
                    log::error!("Failed to process stem {}: {}", stem, e);
                    outcome.failed.insert(stem, e.to_string());
                    outcome.success = false;
                }
            }
        }

        log::info!(
            "Processed {}/{} stems successfully",
            outcome.metrics.len(),
            stems.len()
        );
        outcome
    }

    pub fn process_stem(&self, input: &Path, output: &Path) -> Result<AudioMetrics, EnhanceError> {
        let audio = read_audio(input).map_err(|e| EnhanceError::Decode {
            path: input.to_path_buf(),
            reason: format!("{e:#}"),
        })?;

        let mut planar = to_planar(&audio);
        dsp::validate(&planar)?;

        if audio.sample_rate != self.sample_rate {
            log::debug!(
                "Resampling {:?} from {} Hz to {} Hz",
                input,
                audio.sample_rate,
                self.sample_rate
            );
            planar = resample(&planar, audio.sample_rate, self.sample_rate)
                .map_err(|e| EnhanceError::Resample(e.to_string()))?;
        }

        if self.apply_enhancement {
            dsp::enhance(&mut planar, self.sample_rate);
        }
        dsp::apply_fades(&mut planar, self.sample_rate, dsp::FADE_SECONDS);
        dsp::normalize_peak(&mut planar, dsp::PEAK_CEILING_DB);
        dsp::validate(&planar)?;

        write_audio_f32(output, &to_interleaved(&planar, self.sample_rate)).map_err(|e| {
            EnhanceError::Write {
                path: output.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        log::debug!("Saved processed stem: {:?}", output);
        Ok(dsp::compute_metrics(&planar, self.sample_rate))
    }
}
