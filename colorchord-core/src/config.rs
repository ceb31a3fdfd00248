//! # Engine Configuration
//!
//! Every threshold, shift and count the engine uses is fixed when the engine is
//! built. The structs here are plain data (serde-friendly so a host can keep
//! them in a JSON profile) plus one validation pass that turns impossible
//! combinations into a [`ConfigError`] before any buffer is touched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest number of spectral bins. Pitches are stored as `u8`, and 255 is
/// reserved as the free-slot sentinel in the flat note layout.
pub const MAX_BINS: usize = 255;

/// Largest number of analyzed octaves. The DFT schedule has `2^octaves` steps.
pub const MAX_OCTAVES: usize = 8;

/// Capacity of the note registry.
pub const MAX_NOTES: usize = 32;

/// Largest number of output color channels.
pub const MAX_CHANNELS: usize = 256;

/// Largest shift accepted for any IIR or leak constant.
pub const MAX_SHIFT: u8 = 15;

/// Largest sub-bin resolution. Note positions are `u16`, so
/// `MAX_BINS << MAX_SEMI_BITS` must stay below `u16::MAX`.
pub const MAX_SEMI_BITS: u8 = 6;

/// Errors raised while validating an [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("bins per octave must be at least 1")]
    NoBins,
    #[error("octave count must be between 1 and {max}, got {got}")]
    OctaveCount { got: u8, max: usize },
    #[error("{total} bins requested, at most {max} are supported")]
    TooManyBins { total: usize, max: usize },
    #[error("note capacity must be between 1 and {max}, got {got}")]
    NoteCapacity { got: u8, max: usize },
    #[error("output channel count must be between 1 and {max}, got {got}")]
    ChannelCount { got: u16, max: usize },
    #[error("shift `{name}` is {value}, the largest supported shift is {max}")]
    ShiftOutOfRange { name: &'static str, value: u8, max: u8 },
    #[error("base frequency must be a positive number of Hz, got {0}")]
    BaseFrequency(f32),
    #[error("top bin at {top_hz:.1} Hz is not below Nyquist for {sample_rate} Hz")]
    AboveNyquist { top_hz: f64, sample_rate: u32 },
    #[error("frame interval must be at least one sample")]
    FrameInterval,
    #[error("taper of {taper} bins does not fit in half of {total} bins")]
    TaperTooWide { taper: u16, total: usize },
    #[error("sub-bin resolution of {got} bits is above the supported {max}")]
    SemiBits { got: u8, max: u8 },
    #[error("chromagram tracking needs at least 2 bins per octave")]
    ChromagramTooNarrow,
}

/// Where the note tracker looks for peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingSource {
    /// The full denoised spectrum. Pitches keep their octave.
    #[default]
    Spectrum,
    /// The folded chromagram. Pitches are pitch classes and distances wrap.
    Chromagram,
}

/// How tracked notes are spread across the output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPolicy {
    /// Notes share the strip in proportion to their strength, with a slowly
    /// rotating offset.
    #[default]
    Linear,
    /// The loudest note colors every channel.
    Dominant,
}

/// Mapping from pitch class to hue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HueMap {
    /// Pitch classes are spaced evenly around the hue circle.
    #[default]
    Linear,
    /// The classic ColorChord curve: yellow through red, blue and green.
    ColorChord,
}

/// Settings for the color mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub channels: u16,
    pub policy: OutputPolicy,
    /// Transposition, in pitch-class bins, applied before the hue lookup.
    pub root_note_offset: u8,
    pub hue_map: HueMap,
    /// 8.8 fixed-point multiplier from fast amplitude to brightness.
    pub brightness_gain: u16,
    /// Fraction (out of 256) of the summed slow amplitude a note needs to get
    /// any channels in the linear policy.
    pub nerf_proportion: u8,
    /// 8.8 fixed-point channels the linear strip rotates by each frame.
    pub rotation_step: u16,
    /// Apply gamma correction to the final RGB values.
    pub gamma: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            channels: 9,
            policy: OutputPolicy::Linear,
            root_note_offset: 0,
            hue_map: HueMap::Linear,
            brightness_gain: 0x28,
            nerf_proportion: 64,
            rotation_step: 16,
            gamma: false,
        }
    }
}

/// Full engine configuration. Missing fields take their defaults when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frequency of bin 0, in Hz. Only used when the engine is built.
    pub base_frequency: f32,
    pub bins_per_octave: u8,
    pub octaves: u8,
    /// Samples between two computed frames.
    pub frame_interval: u16,
    /// Leak applied to the DFT accumulators once per schedule cycle.
    pub dft_iir_shift: u8,
    /// Frame-to-frame IIR on every bin.
    pub temporal_shift: u8,
    pub blur_passes: u8,
    /// Width of the linear taper at each end of the spectrum. `None` tapers
    /// one octave.
    pub taper_bins: Option<u16>,
    pub chroma_blur_passes: u8,
    /// Note positions carry this many fractional bits below the bin index.
    pub semi_bits: u8,
    /// IIR shift for the slow (size) note amplitude.
    pub slow_shift: u8,
    /// IIR shift for the fast (brightness) note amplitude.
    pub fast_shift: u8,
    /// Peaks below this magnitude are not note candidates.
    pub min_amp_for_note: u16,
    /// Notes whose slow amplitude drops below this are retired.
    pub min_amp_to_keep: u16,
    /// Farthest a note may move between frames and still be the same note,
    /// in sub-bin units.
    pub max_jump_distance: u8,
    /// Notes this close to each other are merged, in sub-bin units.
    pub max_combine_distance: u8,
    pub max_notes: u8,
    pub tracking_source: TrackingSource,
    pub output: OutputConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            base_frequency: 55.0,
            bins_per_octave: 24,
            octaves: 5,
            frame_interval: 128,
            dft_iir_shift: 6,
            temporal_shift: 1,
            blur_passes: 2,
            taper_bins: None,
            chroma_blur_passes: 0,
            semi_bits: 3,
            slow_shift: 4,
            fast_shift: 2,
            min_amp_for_note: 80,
            min_amp_to_keep: 64,
            max_jump_distance: 16,
            max_combine_distance: 8,
            max_notes: 12,
            tracking_source: TrackingSource::Spectrum,
            output: OutputConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Number of bins across all octaves.
    pub fn total_bins(&self) -> usize {
        self.bins_per_octave as usize * self.octaves as usize
    }

    /// Number of pitch positions the tracker works in for the configured
    /// tracking source.
    pub fn pitch_range(&self) -> usize {
        match self.tracking_source {
            TrackingSource::Spectrum => self.total_bins(),
            TrackingSource::Chromagram => self.bins_per_octave as usize,
        }
    }

    /// Sub-bin positions per bin.
    pub fn positions_per_bin(&self) -> u16 {
        1 << self.semi_bits.min(MAX_SEMI_BITS)
    }

    /// Number of sub-bin positions the tracker works in.
    pub fn position_span(&self) -> u16 {
        self.pitch_range() as u16 * self.positions_per_bin()
    }

    /// Effective taper width.
    pub fn taper_width(&self) -> usize {
        self.taper_bins
            .map(usize::from)
            .unwrap_or(self.bins_per_octave as usize)
    }

    /// Center frequency of the highest bin, in Hz.
    pub fn top_frequency(&self) -> f64 {
        let bpo = self.bins_per_octave.max(1) as f64;
        let octave_span = 2f64.powi(self.octaves as i32 - 1);
        self.base_frequency as f64 * octave_span * 2f64.powf((bpo - 1.0) / bpo)
    }

    /// Checks every constraint the fixed-size buffers and the fixed-point
    /// math rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bins_per_octave == 0 {
            return Err(ConfigError::NoBins);
        }
        if self.octaves == 0 || self.octaves as usize > MAX_OCTAVES {
            return Err(ConfigError::OctaveCount {
                got: self.octaves,
                max: MAX_OCTAVES,
            });
        }
        let total = self.total_bins();
        if total > MAX_BINS {
            return Err(ConfigError::TooManyBins {
                total,
                max: MAX_BINS,
            });
        }
        if self.max_notes == 0 || self.max_notes as usize > MAX_NOTES {
            return Err(ConfigError::NoteCapacity {
                got: self.max_notes,
                max: MAX_NOTES,
            });
        }
        let channels = self.output.channels;
        if channels == 0 || channels as usize > MAX_CHANNELS {
            return Err(ConfigError::ChannelCount {
                got: channels,
                max: MAX_CHANNELS,
            });
        }
        for (name, value) in [
            ("dft_iir_shift", self.dft_iir_shift),
            ("temporal_shift", self.temporal_shift),
            ("slow_shift", self.slow_shift),
            ("fast_shift", self.fast_shift),
        ] {
            if value > MAX_SHIFT {
                return Err(ConfigError::ShiftOutOfRange {
                    name,
                    value,
                    max: MAX_SHIFT,
                });
            }
        }
        if !self.base_frequency.is_finite() || self.base_frequency <= 0.0 {
            return Err(ConfigError::BaseFrequency(self.base_frequency));
        }
        let top_hz = self.top_frequency();
        if top_hz >= self.sample_rate as f64 / 2.0 {
            return Err(ConfigError::AboveNyquist {
                top_hz,
                sample_rate: self.sample_rate,
            });
        }
        if self.frame_interval == 0 {
            return Err(ConfigError::FrameInterval);
        }
        let taper = self.taper_width();
        if taper * 2 > total {
            return Err(ConfigError::TaperTooWide {
                taper: taper as u16,
                total,
            });
        }
        if self.semi_bits > MAX_SEMI_BITS {
            return Err(ConfigError::SemiBits {
                got: self.semi_bits,
                max: MAX_SEMI_BITS,
            });
        }
        if self.tracking_source == TrackingSource::Chromagram && self.bins_per_octave < 2 {
            return Err(ConfigError::ChromagramTooNarrow);
        }
        if self.min_amp_to_keep > self.min_amp_for_note {
            log::warn!(
                "[CONFIG] keep threshold {} is above birth threshold {}; new notes may die on their first frame",
                self.min_amp_to_keep,
                self.min_amp_for_note
            );
        }
        Ok(())
    }
}
