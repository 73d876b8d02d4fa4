use ndarray::{Array1, Array2, ArrayViewMut1, Axis};
use num_complex::Complex32;
use once_cell::sync::Lazy;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::EnhanceError;

pub const PRE_EMPHASIS: f32 = 0.97;
pub const HIGH_PASS_HZ: f32 = 8_000.0;
pub const HIGH_PASS_MIX: f32 = 0.15;
pub const FADE_SECONDS: f32 = 0.05;
pub const PEAK_CEILING_DB: f32 = -0.1;

const CENTROID_N_FFT: usize = 2048;
const CENTROID_HOP: usize = 512;

struct FftCache {
    fft_forward: Arc<dyn Fft<f32>>,
    hann_window: Vec<f32>,
}

static FFT_CACHE_2048: Lazy<FftCache> = Lazy::new(|| {
    let mut planner = FftPlanner::new();
    FftCache {
        fft_forward: planner.plan_fft_forward(CENTROID_N_FFT),
        hann_window: compute_hann(CENTROID_N_FFT),
    }
});

/// Periodic Hann window.
fn compute_hann(n_fft: usize) -> Vec<f32> {
    if n_fft <= 1 {
        return vec![1.0];
    }
    let denom = n_fft as f32;
    (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

/// Descriptive measurements of a processed stem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioMetrics {
    pub peak_amplitude: f32,
    pub rms_level: f32,
    pub duration_seconds: f64,
    pub zero_crossings: u64,
    pub spectral_centroid: f32,
    /// `None` for digital silence.
    pub peak_db: Option<f32>,
}

/// Rejects empty buffers and buffers holding NaN or infinity.
pub fn validate(audio: &Array2<f32>) -> Result<(), EnhanceError> {
    if audio.is_empty() {
        return Err(EnhanceError::InvalidAudio("audio buffer is empty".into()));
    }
    if let Some(pos) = audio.iter().position(|s| !s.is_finite()) {
        return Err(EnhanceError::InvalidAudio(format!(
            "non-finite sample at index {pos}"
        )));
    }
    Ok(())
}

pub fn peak(audio: &Array2<f32>) -> f32 {
    audio.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Linear fade-in and fade-out, each at most a quarter of the buffer.
pub fn apply_fades(audio: &mut Array2<f32>, sample_rate: u32, fade_seconds: f32) {
    let frames = audio.ncols();
    let fade = ((fade_seconds * sample_rate as f32) as usize).min(frames / 4);
    if fade == 0 {
        return;
    }
    let ramp = ramp(fade);

    for mut channel in audio.axis_iter_mut(Axis(0)) {
        for (i, gain) in ramp.iter().enumerate() {
            channel[i] *= gain;
            channel[frames - 1 - i] *= gain;
        }
    }
}

/// `n` points from 0.0 to 1.0 inclusive.
fn ramp(n: usize) -> Vec<f32> {
    if n == 1 {
        return vec![0.0];
    }
    let step = 1.0 / (n - 1) as f32;
    (0..n).map(|i| i as f32 * step).collect()
}

/// Scales so the absolute peak sits at `ceiling_db`. Silent buffers are left alone.
pub fn normalize_peak(audio: &mut Array2<f32>, ceiling_db: f32) {
    let current = peak(audio);
    if current == 0.0 {
        return;
    }
    let target = 10f32.powf(ceiling_db / 20.0).min(1.0);
    let gain = target / current;
    audio.mapv_inplace(|s| (s * gain).clamp(-1.0, 1.0));
    log::debug!("Normalized audio: peak {:.4} -> {:.4}", current, peak(audio));
}

/// Pre-emphasis followed by a blend with a high-passed copy, per channel.
pub fn enhance(audio: &mut Array2<f32>, sample_rate: u32) {
    let coeffs = Biquad::butterworth_highpass(HIGH_PASS_HZ, sample_rate as f32);
    for channel in audio.axis_iter_mut(Axis(0)) {
        enhance_channel(channel, coeffs);
    }
}

fn enhance_channel(mut channel: ArrayViewMut1<f32>, coeffs: Biquad) {
    let mut prev = 0.0f32;
    for s in channel.iter_mut() {
        let x = *s;
        *s = x - PRE_EMPHASIS * prev;
        prev = x;
    }

    let mut state = BiquadState::default();
    for s in channel.iter_mut() {
        let hp = state.process(&coeffs, *s);
        *s = (1.0 - HIGH_PASS_MIX) * *s + HIGH_PASS_MIX * hp;
    }
}

#[derive(Clone, Copy, Debug)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Biquad {
    /// Second-order Butterworth high-pass via the bilinear transform.
    fn butterworth_highpass(cutoff: f32, sample_rate: f32) -> Self {
        let nyquist = sample_rate / 2.0;
        let cutoff = cutoff.min(nyquist * 0.99);
        let k = (std::f32::consts::PI * cutoff / sample_rate).tan();
        let q = std::f32::consts::FRAC_1_SQRT_2;
        let norm = 1.0 / (1.0 + k / q + k * k);
        let b0 = norm;
        Self {
            b0,
            b1: -2.0 * b0,
            b2: b0,
            a1: 2.0 * (k * k - 1.0) * norm,
            a2: (1.0 - k / q + k * k) * norm,
        }
    }
}

#[derive(Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    fn process(&mut self, c: &Biquad, x: f32) -> f32 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

pub fn mono_mixdown(audio: &Array2<f32>) -> Array1<f32> {
    audio
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(audio.ncols()))
}

pub fn compute_metrics(audio: &Array2<f32>, sample_rate: u32) -> AudioMetrics {
    let mono = mono_mixdown(audio);
    let samples = mono.as_slice().map(<[f32]>::to_vec).unwrap_or_else(|| mono.to_vec());

    let peak_amplitude = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let rms_level = if samples.is_empty() {
        0.0
    } else {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    };
    let duration_seconds = if sample_rate == 0 {
        0.0
    } else {
        samples.len() as f64 / sample_rate as f64
    };

    AudioMetrics {
        peak_amplitude,
        rms_level,
        duration_seconds,
        zero_crossings: zero_crossings(&samples),
        spectral_centroid: spectral_centroid(&samples, sample_rate),
        peak_db: (peak_amplitude > 0.0).then(|| 20.0 * peak_amplitude.log10()),
    }
}

pub fn zero_crossings(samples: &[f32]) -> u64 {
    samples
        .windows(2)
        .filter(|w| w[0].is_sign_negative() != w[1].is_sign_negative())
        .count() as u64
}

/// Mean of per-frame spectral centroids (Hz) over a centered Hann STFT.
pub fn spectral_centroid(samples: &[f32], sample_rate: u32) -> f32 {
    if samples.is_empty() || sample_rate == 0 {
        return 0.0;
    }

    let n_fft = CENTROID_N_FFT;
    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let cache = &*FFT_CACHE_2048;
    let fft = &cache.fft_forward;
    let window = &cache.hann_window;

    let frames = 1 + samples.len() / CENTROID_HOP;
    let bins = n_fft / 2 + 1;
    let bin_hz = sample_rate as f32 / n_fft as f32;
    let mut buf = vec![Complex32::zero(); n_fft];
    let mut total = 0.0f64;

    for fr in 0..frames {
        let start = fr * CENTROID_HOP;
        let frame = &padded[start..start + n_fft];
        for i in 0..n_fft {
            buf[i] = Complex32::new(frame[i] * window[i], 0.0);
        }
        fft.process(&mut buf);

        let mut weighted = 0.0f64;
        let mut sum = 0.0f64;
        for (k, c) in buf.iter().take(bins).enumerate() {
            let mag = c.norm() as f64;
            weighted += mag * (k as f32 * bin_hz) as f64;
            sum += mag;
        }
        if sum > 0.0 {
            total += weighted / sum;
        }
    }

    (total / frames as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, sr: u32, frames: usize, amp: f32) -> Array2<f32> {
        let data: Vec<f32> = (0..frames)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect();
        Array2::from_shape_vec((1, frames), data).unwrap()
    }

    #[test]
    fn validate_rejects_empty_and_nan() {
        assert!(validate(&Array2::zeros((1, 0))).is_err());
        let mut a = Array2::<f32>::zeros((2, 8));
        assert!(validate(&a).is_ok());
        a[[1, 3]] = f32::NAN;
        assert!(validate(&a).is_err());
    }

    #[test]
    fn fades_leave_middle_untouched() {
        let sr = 1000;
        let mut audio = Array2::from_elem((2, 1000), 0.5f32);
        apply_fades(&mut audio, sr, 0.05);
        assert_eq!(audio[[0, 0]], 0.0);
        assert_eq!(audio[[1, 999]], 0.0);
        for i in 50..950 {
            assert_eq!(audio[[0, i]], 0.5);
            assert_eq!(audio[[1, i]], 0.5);
        }
    }

    #[test]
    fn fade_is_capped_at_quarter_length() {
        let mut audio = Array2::from_elem((1, 8), 1.0f32);
        apply_fades(&mut audio, 44_100, 0.05);
        assert_eq!(audio[[0, 0]], 0.0);
        assert_eq!(audio[[0, 1]], 1.0);
        assert_eq!(audio[[0, 4]], 1.0);
        assert_eq!(audio[[0, 7]], 0.0);
    }

    #[test]
    fn normalize_hits_ceiling() {
        let mut audio = sine(440.0, 44_100, 4096, 0.3);
        normalize_peak(&mut audio, PEAK_CEILING_DB);
        let expected = 10f32.powf(PEAK_CEILING_DB / 20.0);
        assert_abs_diff_eq!(peak(&audio), expected, epsilon = 1e-5);
        assert!(audio.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn normalize_leaves_silence_alone() {
        let mut audio = Array2::<f32>::zeros((1, 64));
        normalize_peak(&mut audio, PEAK_CEILING_DB);
        assert!(audio.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn enhance_keeps_samples_finite() {
        let mut audio = sine(220.0, 44_100, 44_100, 0.8);
        enhance(&mut audio, 44_100);
        assert!(validate(&audio).is_ok());
    }

    #[test]
    fn metrics_of_sine() {
        let audio = sine(1000.0, 44_100, 44_100, 0.5);
        let m = compute_metrics(&audio, 44_100);
        assert_abs_diff_eq!(m.peak_amplitude, 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(m.rms_level, 0.5 / 2f32.sqrt(), epsilon = 1e-3);
        assert_abs_diff_eq!(m.duration_seconds, 1.0, epsilon = 1e-9);
        assert!((m.zero_crossings as i64 - 2000).abs() <= 2);
        assert_abs_diff_eq!(m.spectral_centroid, 1000.0, epsilon = 150.0);
        assert_abs_diff_eq!(m.peak_db.unwrap(), -6.02, epsilon = 0.05);
    }

    #[test]
    fn silent_metrics_have_no_peak_db() {
        let m = compute_metrics(&Array2::zeros((2, 1024)), 44_100);
        assert_eq!(m.peak_db, None);
        assert_eq!(m.spectral_centroid, 0.0);
        assert_eq!(m.zero_crossings, 0);
    }
}
