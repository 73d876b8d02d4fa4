use std::{fs::File, path::Path};

use anyhow::{anyhow, Context, Result};
use hound::WavWriter;
use ndarray::Array2;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::types::AudioData;

pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path: &Path = path.as_ref();

    let file: File =
        File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;

    let mss: MediaSourceStream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint: Hint = Hint::new();

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Unrecognized audio container: {:?}", path))?;

    let mut format = probed.format;
    let track = format.default_track().context("No default track found")?;
    let track_id = track.id;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: u32 = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels: u16 = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {:?}: {}", path, e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        sample_rate = decoded.spec().rate;
        channels = decoded.spec().channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        samples.extend_from_slice(buffer.samples());
    }

    log::debug!(
        "Read audio {:?}: sample_rate={}, channels={}, samples={}",
        path,
        sample_rate,
        channels,
        samples.len()
    );

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

/// 32-bit float WAV, lossless for processed stems.
pub fn write_audio_f32<P: AsRef<Path>>(path: P, audio: &AudioData) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for sample in &audio.samples {
        writer.write_sample(*sample)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Interleaved samples to a `[channels, frames]` array.
pub fn to_planar(audio: &AudioData) -> Array2<f32> {
    let channels = audio.channels.max(1) as usize;
    let frames = audio.samples.len() / channels;
    let mut out = Array2::<f32>::zeros((channels, frames));
    for (i, frame) in audio.samples.chunks_exact(channels).enumerate() {
        for (ch, sample) in frame.iter().enumerate() {
            out[[ch, i]] = *sample;
        }
    }
    out
}

pub fn to_interleaved(planar: &Array2<f32>, sample_rate: u32) -> AudioData {
    let (channels, frames) = planar.dim();
    let mut samples = Vec::with_capacity(channels * frames);
    for i in 0..frames {
        for ch in 0..channels {
            samples.push(planar[[ch, i]]);
        }
    }
    AudioData {
        samples,
        sample_rate,
        channels: channels as u16,
    }
}

pub fn resample(planar: &Array2<f32>, from_rate: u32, to_rate: u32) -> Result<Array2<f32>> {
    if from_rate == to_rate {
        return Ok(planar.clone());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(anyhow!("Cannot resample from {} Hz to {} Hz", from_rate, to_rate));
    }

    let (channels, frames) = planar.dim();
    if frames == 0 {
        return Ok(planar.clone());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        frames,
        channels,
    )?;

    let input: Vec<Vec<f32>> = (0..channels).map(|ch| planar.row(ch).to_vec()).collect();
    let output = resampler.process(&input, None)?;

    let out_frames = output.first().map(Vec::len).unwrap_or(0);
    let mut result = Array2::<f32>::zeros((channels, out_frames));
    for (ch, samples) in output.iter().enumerate() {
        for (i, &sample) in samples.iter().enumerate() {
            result[[ch, i]] = sample;
        }
    }

    Ok(result)
}
