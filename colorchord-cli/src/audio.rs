//! # Audio Input Module
//!
//! Live capture through CPAL and WAV file reading through hound. Both hand
//! mono `f32` samples in the -1.0..1.0 range to the caller, together with the
//! rate they were recorded at; converting to the engine's rate is the
//! resampler's job.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use log::{info, warn};

/// Mono samples per chunk sent from the capture callback.
pub const CHUNK_SIZE: usize = 512;

/// Device rate to ask for. Any rate works, the resampler takes it from here.
const PREFERRED_RATE: u32 = 48_000;

/// Starts audio capture from the default input device.
///
/// The callback downmixes every interleaved frame to mono and sends fixed
/// size chunks over `sender`. Chunks are dropped rather than queued when the
/// consumer falls behind.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and device sample rate
/// * `Err(e)` - No input device or no `f32` input format
pub fn start_audio_capture(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("[AUDIO] Using input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, PREFERRED_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = PREFERRED_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    info!("[AUDIO] Capturing {channels} channel(s) at {rate} Hz");

    let err_fn = |err| warn!("[AUDIO] Stream error: {err}");

    let mut pending = Vec::with_capacity(CHUNK_SIZE * 2);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            pending.extend(data.chunks(channels).map(downmix));
            while pending.len() >= CHUNK_SIZE {
                let chunk = pending[..CHUNK_SIZE].to_vec();
                let _ = sender.try_send(chunk);
                pending.drain(..CHUNK_SIZE);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, rate))
}

/// Picks the `f32` input configuration closest to `target_rate`, preferring
/// mono when several are equally close.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = c.min_sample_rate().0.abs_diff(target_rate);
            let max_diff = c.max_sample_rate().0.abs_diff(target_rate);
            let in_range =
                (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate);
            let distance = if in_range { 0 } else { min_diff.min(max_diff) };
            (distance, c.channels() != 1, c.channels())
        })
}

/// Averages one interleaved frame down to a single sample.
fn downmix(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().sum::<f32>() / frame.len() as f32
}

/// Reads a whole WAV file as mono `f32` samples.
///
/// # Returns
/// * `Ok((samples, sample_rate))`
/// * `Err(e)` - Unreadable file or an unsupported sample format
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("WAV file {} has no channels", path.display());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to decode float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .context("failed to decode integer samples")?
        }
    };

    let samples: Vec<f32> = interleaved
        .chunks(spec.channels as usize)
        .map(downmix)
        .collect();

    info!(
        "[AUDIO] Read {} ({} Hz, {} channel(s), {:.2} s)",
        path.display(),
        spec.sample_rate,
        spec.channels,
        samples.len() as f32 / spec.sample_rate.max(1) as f32
    );

    Ok((samples, spec.sample_rate))
}
