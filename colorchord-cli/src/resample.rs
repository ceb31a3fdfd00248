//! Converts device audio to the engine's sample format and rate.
//!
//! Input samples are scaled by a gain, clipped into `i16` and averaged over
//! each output period (a box filter). The output clock is a Q16 phase
//! accumulator, so arbitrary rate ratios drift by at most one sample.

use anyhow::{Result, bail};

const ONE: u32 = 1 << 16;

#[derive(Debug, Clone)]
pub struct Resampler {
    /// Output samples per input sample, Q16.
    step: u32,
    phase: u32,
    gain: f32,
    sum: i64,
    count: i64,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, gain: f32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            bail!("sample rates must be non-zero ({input_rate} Hz -> {output_rate} Hz)");
        }
        if !gain.is_finite() || gain < 0.0 {
            bail!("gain must be a non-negative number, got {gain}");
        }
        let step = ((output_rate as u64) << 16) / input_rate as u64;
        Ok(Self {
            step: step.min(u32::MAX as u64) as u32,
            phase: 0,
            gain,
            sum: 0,
            count: 0,
        })
    }

    /// Appends the output for `input` to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<i16>) {
        for &sample in input {
            let scaled = (sample * self.gain * i16::MAX as f32)
                .clamp(i16::MIN as f32, i16::MAX as f32) as i64;
            self.sum += scaled;
            self.count += 1;

            self.phase += self.step;
            let mut emitted = false;
            while self.phase >= ONE {
                self.phase -= ONE;
                out.push((self.sum / self.count) as i16);
                emitted = true;
            }
            if emitted {
                self.sum = 0;
                self.count = 0;
            }
        }
    }
}
