//! # Engine
//!
//! [`ColorChord`] owns one instance of every stage and drives them in order:
//! samples go into the analyzer as they arrive, and every `frame_interval`
//! samples the host calls [`ColorChord::compute_frame`] to run smoothing,
//! folding, tracking and color mapping on the latest snapshot.
//!
//! All state lives in fixed-size arrays inside the engine, so nothing is
//! allocated after construction.

use log::{info, trace};

use crate::color::{ColorMapper, Rgb};
use crate::config::{ConfigError, EngineConfig, TrackingSource};
use crate::dft::SpectralAnalyzer;
use crate::fold::OctaveFolder;
use crate::notes::{Note, NoteSlot, NoteTracker};
use crate::smoother::BinSmoother;

/// Borrowed view of everything one frame produced.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Frames computed since construction or the last reset, starting at 1.
    pub index: u64,
    pub raw_spectrum: &'a [u16],
    pub spectrum: &'a [u16],
    pub chromagram: &'a [u16],
    pub notes: &'a [NoteSlot],
    pub colors: &'a [Rgb],
}

impl Frame<'_> {
    /// Notes that are alive in this frame, with their slot index.
    pub fn live_notes(&self) -> impl Iterator<Item = (usize, &Note)> + '_ {
        self.notes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.live().map(|note| (i, note)))
    }
}

#[derive(Debug, Clone)]
pub struct ColorChord {
    config: EngineConfig,
    analyzer: SpectralAnalyzer,
    smoother: BinSmoother,
    folder: OctaveFolder,
    tracker: NoteTracker,
    mapper: ColorMapper,
    samples_since_frame: u16,
    frame_index: u64,
}

impl ColorChord {
    /// Validates `config` and builds every stage.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "[ENGINE] {} bins ({} per octave x {} octaves) from {:.1} Hz to {:.1} Hz at {} Hz",
            config.total_bins(),
            config.bins_per_octave,
            config.octaves,
            config.base_frequency,
            config.top_frequency(),
            config.sample_rate
        );
        info!(
            "[ENGINE] frame every {} samples, up to {} notes tracked on the {:?}, {} output channels",
            config.frame_interval, config.max_notes, config.tracking_source, config.output.channels
        );

        Ok(Self {
            analyzer: SpectralAnalyzer::new(&config),
            smoother: BinSmoother::new(&config),
            folder: OctaveFolder::new(&config),
            tracker: NoteTracker::new(&config),
            mapper: ColorMapper::new(&config),
            samples_since_frame: 0,
            frame_index: 0,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Feeds one sample. Returns `true` once every `frame_interval` samples,
    /// when the host should call [`compute_frame`](Self::compute_frame).
    pub fn push_sample(&mut self, sample: i16) -> bool {
        self.analyzer.push_sample(sample);
        self.samples_since_frame += 1;
        if self.samples_since_frame >= self.config.frame_interval {
            self.samples_since_frame = 0;
            true
        } else {
            false
        }
    }

    /// Feeds a block of samples, computing a frame and handing it to
    /// `on_frame` whenever one is due.
    pub fn push_samples(&mut self, samples: &[i16], mut on_frame: impl FnMut(&Frame<'_>)) {
        for &sample in samples {
            if self.push_sample(sample) {
                let frame = self.compute_frame();
                on_frame(&frame);
            }
        }
    }

    /// Runs every post-analysis stage on the latest DFT snapshot.
    pub fn compute_frame(&mut self) -> Frame<'_> {
        let raw = self.analyzer.compute_frame();
        let denoised = self.smoother.process(raw);
        self.folder.fold(denoised);

        let tracked = match self.config.tracking_source {
            TrackingSource::Spectrum => self.smoother.denoised(),
            TrackingSource::Chromagram => self.folder.chromagram(),
        };
        self.tracker.update(tracked);
        self.mapper.update(self.tracker.slots());

        self.frame_index += 1;
        trace!(
            "[ENGINE] frame {}: {} live notes",
            self.frame_index,
            self.tracker.active_count()
        );
        self.frame()
    }

    /// Snapshot of the last computed frame.
    pub fn frame(&self) -> Frame<'_> {
        Frame {
            index: self.frame_index,
            raw_spectrum: self.raw_spectrum(),
            spectrum: self.spectrum(),
            chromagram: self.chromagram(),
            notes: self.notes(),
            colors: self.colors(),
        }
    }

    /// Denoised spectrum.
    pub fn spectrum(&self) -> &[u16] {
        self.smoother.denoised()
    }

    /// Magnitudes straight out of the analyzer.
    pub fn raw_spectrum(&self) -> &[u16] {
        self.analyzer.magnitudes()
    }

    pub fn chromagram(&self) -> &[u16] {
        self.folder.chromagram()
    }

    pub fn notes(&self) -> &[NoteSlot] {
        self.tracker.slots()
    }

    pub fn colors(&self) -> &[Rgb] {
        self.mapper.colors()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Live note with the largest fast amplitude.
    pub fn loudest_note(&self) -> Option<(usize, &Note)> {
        self.tracker.loudest()
    }

    pub fn loudest_pitch_class(&self) -> Option<u8> {
        self.folder.loudest_pitch_class()
    }

    /// Returns the engine to its freshly constructed state.
    pub fn reset(&mut self) {
        self.analyzer.reset();
        self.smoother.reset();
        self.folder.reset();
        self.tracker.reset();
        self.mapper.reset();
        self.samples_since_frame = 0;
        self.frame_index = 0;
        info!("[ENGINE] reset");
    }
}
