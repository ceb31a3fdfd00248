//! # ColorChord - terminal front end
//!
//! Feeds live microphone audio or a WAV file through the ColorChord engine and
//! prints one line per frame with the LED strip and the tracked notes.
//!
//! ## Architecture
//! - **Audio callback**: CPAL delivers device audio and sends mono chunks
//!   over a crossbeam channel
//! - **Main thread**: owns the engine, resamples each chunk to the engine
//!   rate and renders frames as they are produced

mod audio;
mod profile;
mod render;
mod resample;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use colorchord_core::tuning::root_offset_for;
use colorchord_core::{ColorChord, EngineConfig, OutputPolicy, TrackingSource};
use cpal::traits::StreamTrait;
use crossbeam_channel::select;
use log::{info, warn};

use resample::Resampler;

/// Queued capture chunks before the callback starts dropping audio.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Linear,
    Dominant,
}

impl From<PolicyArg> for OutputPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Linear => OutputPolicy::Linear,
            PolicyArg::Dominant => OutputPolicy::Dominant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TrackArg {
    Spectrum,
    Chromagram,
}

impl From<TrackArg> for TrackingSource {
    fn from(track: TrackArg) -> Self {
        match track {
            TrackArg::Spectrum => TrackingSource::Spectrum,
            TrackArg::Chromagram => TrackingSource::Chromagram,
        }
    }
}

/// Turns sound into tracked notes and LED colors.
#[derive(Parser, Debug)]
#[command(name = "colorchord", version, about)]
struct Args {
    /// Read audio from a WAV file instead of the default input device
    #[arg(long, value_name = "PATH")]
    wav: Option<PathBuf>,

    /// How long to listen to the input device, in seconds
    #[arg(long, default_value_t = 10.0)]
    seconds: f32,

    /// Load the engine configuration from a JSON profile
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the effective configuration to a JSON profile
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,

    /// Number of LED channels
    #[arg(long)]
    channels: Option<u16>,

    /// How notes share the LED strip
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Track notes on the full spectrum or on the folded chromagram
    #[arg(long, value_enum)]
    track: Option<TrackArg>,

    /// Note name that should map to the first hue (e.g. C, F#, Bb)
    #[arg(long, value_name = "NOTE")]
    root: Option<String>,

    /// Input gain applied before conversion to 16-bit samples
    #[arg(long, default_value_t = 1.0)]
    gain: f32,

    /// Print every Nth frame
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    every: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    if let Some(path) = &args.save_config {
        profile::save_profile(&config, path)?;
        info!("[CONFIG] Saved profile to {}", path.display());
    }

    let engine = ColorChord::new(config).context("invalid engine configuration")?;
    let mut session = Session::new(engine, args.every);

    match &args.wav {
        Some(path) => run_wav(&mut session, path, args.gain),
        None => run_live(&mut session, args.seconds, args.gain),
    }
}

/// Applies command-line overrides on top of the profile or the defaults.
fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => profile::load_profile(path)?,
        None => EngineConfig::default(),
    };
    if let Some(channels) = args.channels {
        config.output.channels = channels;
    }
    if let Some(policy) = args.policy {
        config.output.policy = policy.into();
    }
    if let Some(track) = args.track {
        config.tracking_source = track.into();
    }
    if let Some(root) = &args.root {
        config.output.root_note_offset = root_offset_for(&config, root)
            .ok_or_else(|| anyhow!("unknown note name `{root}`"))?;
    }
    Ok(config)
}

/// Engine plus the output side of the pipeline.
struct Session {
    engine: ColorChord,
    every: u64,
    samples: Vec<i16>,
}

impl Session {
    fn new(engine: ColorChord, every: u64) -> Self {
        Self {
            engine,
            every,
            samples: Vec::new(),
        }
    }

    /// Resamples `chunk`, runs it through the engine and prints the frames it
    /// produced.
    fn feed(&mut self, resampler: &mut Resampler, chunk: &[f32]) -> Result<()> {
        self.samples.clear();
        resampler.process(chunk, &mut self.samples);

        let config = self.engine.config().clone();
        let every = self.every;
        let mut stdout = io::stdout().lock();
        let mut written = Ok(());
        self.engine.push_samples(&self.samples, |frame| {
            if written.is_ok() && frame.index % every == 0 {
                written = writeln!(stdout, "{}", render::render_frame(frame, &config));
            }
        });
        written.context("failed to write to stdout")
    }
}

fn run_wav(session: &mut Session, path: &Path, gain: f32) -> Result<()> {
    let (samples, rate) = audio::read_wav(path)?;
    let mut resampler = Resampler::new(rate, session.engine.config().sample_rate, gain)?;
    for chunk in samples.chunks(audio::CHUNK_SIZE) {
        session.feed(&mut resampler, chunk)?;
    }
    info!(
        "[ENGINE] Processed {} frames from {}",
        session.engine.frame_index(),
        path.display()
    );
    Ok(())
}

fn run_live(session: &mut Session, seconds: f32, gain: f32) -> Result<()> {
    let duration = Duration::try_from_secs_f32(seconds)
        .map_err(|_| anyhow!("invalid duration: {seconds} s"))?;
    let (audio_tx, audio_rx) = crossbeam_channel::bounded::<Vec<f32>>(CHANNEL_CAPACITY);
    let (stream, rate) = audio::start_audio_capture(audio_tx)?;
    let mut resampler = Resampler::new(rate, session.engine.config().sample_rate, gain)?;
    let deadline = crossbeam_channel::after(duration);

    info!("[AUDIO] Listening for {seconds} s");
    let result = loop {
        select! {
            recv(audio_rx) -> msg => match msg {
                Ok(chunk) => {
                    if let Err(e) = session.feed(&mut resampler, &chunk) {
                        break Err(e);
                    }
                }
                Err(_) => {
                    warn!("[AUDIO] Capture channel closed");
                    break Ok(());
                }
            },
            recv(deadline) -> _ => break Ok(()),
        }
    };

    if let Err(e) = stream.pause() {
        warn!("[AUDIO] Error pausing stream: {e}");
    }
    drop(stream);
    info!("[ENGINE] Rendered {} frames", session.engine.frame_index());
    result
}
