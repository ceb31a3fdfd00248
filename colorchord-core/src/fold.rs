//! # Octave Folder
//!
//! Folds the denoised spectrum into a single octave: every bin that shares a
//! pitch class is summed into one chromagram slot.

use crate::config::{EngineConfig, MAX_BINS};
use crate::fixed::blur_pass;

#[derive(Debug, Clone)]
pub struct OctaveFolder {
    bins_per_octave: usize,
    octaves: usize,
    blur_passes: u8,
    chromagram: [u16; MAX_BINS],
}

impl OctaveFolder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            bins_per_octave: config.bins_per_octave as usize,
            octaves: config.octaves as usize,
            blur_passes: config.chroma_blur_passes,
            chromagram: [0; MAX_BINS],
        }
    }

    /// Sums `denoised` across octaves, then applies the optional circular
    /// blur.
    pub fn fold(&mut self, denoised: &[u16]) -> &[u16] {
        let bpo = self.bins_per_octave;
        let chroma = &mut self.chromagram[..bpo];
        chroma.fill(0);
        for octave in denoised.chunks(bpo).take(self.octaves) {
            for (slot, &magnitude) in chroma.iter_mut().zip(octave) {
                *slot = slot.saturating_add(magnitude);
            }
        }

        let mut scratch = [0u16; MAX_BINS];
        for _ in 0..self.blur_passes {
            blur_pass(chroma, &mut scratch[..bpo], true);
            chroma.copy_from_slice(&scratch[..bpo]);
        }
        chroma
    }

    pub fn chromagram(&self) -> &[u16] {
        &self.chromagram[..self.bins_per_octave]
    }

    /// Pitch class with the largest folded magnitude, or `None` when the
    /// chromagram is silent. Ties go to the lower pitch class.
    pub fn loudest_pitch_class(&self) -> Option<u8> {
        let mut best: Option<(usize, u16)> = None;
        for (i, &m) in self.chromagram().iter().enumerate() {
            if m > 0 && best.is_none_or(|(_, b)| m > b) {
                best = Some((i, m));
            }
        }
        best.map(|(i, _)| i as u8)
    }

    pub fn reset(&mut self) {
        self.chromagram = [0; MAX_BINS];
    }
}
