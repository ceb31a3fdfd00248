//! # Bin Smoother
//!
//! Turns raw per-bin magnitudes into the denoised spectrum the rest of the
//! engine reads: a per-bin temporal IIR, a few passes of a 3-tap blur along
//! the bin axis, and a linear taper at both ends of the spectrum where the
//! transform's edge effects live.

use crate::config::{EngineConfig, MAX_BINS};
use crate::fixed::{blur_pass, iir_step, scale_q16};

#[derive(Debug, Clone)]
pub struct BinSmoother {
    total_bins: usize,
    temporal_shift: u8,
    blur_passes: u8,
    taper_bins: usize,
    /// Temporal filter memory. Blur and taper never feed back into it.
    history: [u16; MAX_BINS],
    denoised: [u16; MAX_BINS],
}

impl BinSmoother {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            total_bins: config.total_bins(),
            temporal_shift: config.temporal_shift,
            blur_passes: config.blur_passes,
            taper_bins: config.taper_width(),
            history: [0; MAX_BINS],
            denoised: [0; MAX_BINS],
        }
    }

    /// Runs one frame of smoothing over `raw` and returns the denoised
    /// spectrum.
    pub fn process(&mut self, raw: &[u16]) -> &[u16] {
        let n = self.total_bins.min(raw.len());

        for (state, &input) in self.history.iter_mut().zip(raw).take(n) {
            *state = iir_step(*state, input, self.temporal_shift);
        }

        self.denoised[..n].copy_from_slice(&self.history[..n]);
        let mut scratch = [0u16; MAX_BINS];
        for _ in 0..self.blur_passes {
            blur_pass(&self.denoised[..n], &mut scratch[..n], false);
            self.denoised[..n].copy_from_slice(&scratch[..n]);
        }

        let taper = self.taper_bins.min(n / 2);
        for i in 0..taper {
            let factor = i as u32;
            self.denoised[i] = scale_q16(self.denoised[i], factor, taper as u32);
            let mirror = n - 1 - i;
            self.denoised[mirror] = scale_q16(self.denoised[mirror], factor, taper as u32);
        }

        &self.denoised[..n]
    }

    /// Output of the last [`process`](Self::process) call.
    pub fn denoised(&self) -> &[u16] {
        &self.denoised[..self.total_bins]
    }

    pub fn reset(&mut self) {
        self.history = [0; MAX_BINS];
        self.denoised = [0; MAX_BINS];
    }
}
