//! # Musical Tuning Module
//!
//! Host-side helpers that translate between the engine's bin indices and
//! musical terms: center frequencies, note names, cent offsets and root-note
//! transpositions. None of this runs in the per-sample path, so it is free to
//! use floating point.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use crate::config::{EngineConfig, TrackingSource};

/// Semitone names starting at C, as MIDI numbering does.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Lookup from a note name (sharps and flats) to its semitone above C.
static NAME_MAP: Lazy<BTreeMap<&'static str, u8>> = Lazy::new(|| {
    let flats = [
        ("Db", 1), ("Eb", 3), ("Gb", 6), ("Ab", 8), ("Bb", 10), ("Cb", 11), ("Fb", 4),
    ];
    NOTE_NAMES
        .iter()
        .enumerate()
        .map(|(i, &name)| (name, i as u8))
        .chain(flats)
        .collect()
});

/// Converts a frequency to a (fractional) MIDI note number.
fn frequency_to_midi(freq: f64) -> f64 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

/// Center frequency of a pitch position, in Hz.
///
/// In spectrum tracking `pitch` is a full bin index; in chromagram tracking it
/// is a pitch class and the frequency of its lowest octave is returned.
pub fn bin_frequency(config: &EngineConfig, pitch: usize) -> f32 {
    fractional_bin_frequency(config, pitch as f64) as f32
}

fn fractional_bin_frequency(config: &EngineConfig, bin: f64) -> f64 {
    config.base_frequency as f64 * 2f64.powf(bin / config.bins_per_octave as f64)
}

/// Finds the spectral bin closest to `freq`, or `None` when the frequency is
/// outside the analyzed range by more than half a bin.
pub fn nearest_bin(config: &EngineConfig, freq: f32) -> Option<usize> {
    if !(freq > 0.0) {
        return None;
    }
    let bpo = config.bins_per_octave as f64;
    let position = (freq as f64 / config.base_frequency as f64).log2() * bpo;
    let bin = position.round();
    if bin < 0.0 || bin >= config.total_bins() as f64 {
        return None;
    }
    Some(bin as usize)
}

/// Names a sub-bin note position (see [`Note::position`]) and returns its
/// offset from the nearest equal-tempered semitone in cents.
///
/// Spectrum pitches carry an octave number ("C#3"); chromagram pitches are
/// bare pitch classes ("C#").
///
/// [`Note::position`]: crate::notes::Note::position
pub fn describe_pitch(config: &EngineConfig, position: u16) -> (String, f32) {
    let bin = position as f64 / config.positions_per_bin() as f64;
    let midi = frequency_to_midi(fractional_bin_frequency(config, bin));
    let nearest = midi.round();
    let cents = ((midi - nearest) * 100.0) as f32;
    let nearest = nearest as i32;
    let name = NOTE_NAMES[nearest.rem_euclid(12) as usize];
    match config.tracking_source {
        TrackingSource::Spectrum => {
            let octave = nearest.div_euclid(12) - 1;
            (format!("{name}{octave}"), cents)
        }
        TrackingSource::Chromagram => (name.to_string(), cents),
    }
}

/// Semitone of a note name above C, accepting sharps and flats.
pub fn semitone_from_name(name: &str) -> Option<u8> {
    NAME_MAP.get(name.trim()).copied()
}

/// Converts a root note name into the color mapper's `root_note_offset`.
///
/// The offset rotates hues so that `name` lands where bin 0 would otherwise
/// land, measured in pitch-class bins.
pub fn root_offset_for(config: &EngineConfig, name: &str) -> Option<u8> {
    let semitone = semitone_from_name(name)? as f64;
    let base_semitone = frequency_to_midi(config.base_frequency as f64).rem_euclid(12.0);
    let bpo = config.bins_per_octave as f64;
    let steps = (base_semitone - semitone).rem_euclid(12.0) * bpo / 12.0;
    Some((steps.round() as usize % config.bins_per_octave as usize) as u8)
}
