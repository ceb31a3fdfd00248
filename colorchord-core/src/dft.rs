//! # Progressive Fixed-Point DFT
//!
//! Incremental spectral analysis tuned for small targets. Instead of buffering
//! a window and running a full transform each frame, every bin keeps a pair of
//! leaky sin/cos accumulators that are updated as samples arrive.
//!
//! ## How it works
//! - Every sample is handled twice, and each handling is one step of a
//!   schedule with `2^octaves` steps.
//! - Step 0 snapshots the accumulators for [`SpectralAnalyzer::compute_frame`]
//!   and leaks them by `acc >> dft_iir_shift`.
//! - Every other step processes one octave. The top octave runs every other
//!   step (once per sample), each octave below it half as often, on a
//!   box-filtered average of the samples that arrived since its last turn.
//! - Because each octave runs at half the rate of the one above, a single
//!   phase advance per pitch class lands on the right frequency in every
//!   octave.

use once_cell::sync::Lazy;

use crate::config::{EngineConfig, MAX_BINS, MAX_OCTAVES};
use crate::fixed::{approx_norm, saturate_u16_from_u32};

/// Peak value of the sine table. Larger values risk overflowing the
/// accumulators on loud input.
const SINE_AMPLITUDE: f64 = 1500.0;

/// Quarter turn of the 256-entry table, for the cosine lookup.
const QUARTER_TURN: u8 = 64;

/// Schedule entry that snapshots and leaks instead of processing an octave.
const SNAPSHOT_STEP: u8 = u8::MAX;

/// 256-entry sine table, built once on first use.
static SINE_TABLE: Lazy<[i16; 256]> = Lazy::new(|| {
    let mut table = [0i16; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let angle = i as f64 / 256.0 * std::f64::consts::TAU;
        *entry = (angle.sin() * SINE_AMPLITUDE) as i16;
    }
    table
});

/// Phase state of one bin's local oscillator.
#[derive(Debug, Clone, Copy, Default)]
struct Oscillator {
    /// Phase advance per processed sample, in 1/65536 turns.
    advance: u16,
    phase: u16,
}

/// Leaky sin/cos accumulator pair.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sin: i32,
    cos: i32,
}

/// Incremental fixed-point spectral analyzer.
#[derive(Debug, Clone)]
pub struct SpectralAnalyzer {
    bins_per_octave: usize,
    octaves: usize,
    dft_iir_shift: u8,
    /// Which octave (or [`SNAPSHOT_STEP`]) each schedule step handles.
    schedule: [u8; 1 << MAX_OCTAVES],
    schedule_len: usize,
    step: usize,
    /// Running sample sums awaiting each octave's turn.
    octave_sums: [i32; MAX_OCTAVES],
    oscillators: [Oscillator; MAX_BINS],
    live: [Accumulator; MAX_BINS],
    snapshot: [Accumulator; MAX_BINS],
    magnitudes: [u16; MAX_BINS],
}

impl SpectralAnalyzer {
    /// Builds an analyzer for a validated configuration, precomputing the
    /// per-bin phase advances.
    pub fn new(config: &EngineConfig) -> Self {
        let bins_per_octave = config.bins_per_octave as usize;
        let octaves = config.octaves as usize;
        let (schedule, schedule_len) = build_schedule(octaves);

        let mut oscillators = [Oscillator::default(); MAX_BINS];
        let advances = phase_advances(config);
        for (bin, osc) in oscillators
            .iter_mut()
            .take(bins_per_octave * octaves)
            .enumerate()
        {
            osc.advance = advances[bin % bins_per_octave];
        }

        Lazy::force(&SINE_TABLE);

        Self {
            bins_per_octave,
            octaves,
            dft_iir_shift: config.dft_iir_shift,
            schedule,
            schedule_len,
            step: 0,
            octave_sums: [0; MAX_OCTAVES],
            oscillators,
            live: [Accumulator::default(); MAX_BINS],
            snapshot: [Accumulator::default(); MAX_BINS],
            magnitudes: [0; MAX_BINS],
        }
    }

    /// Total number of bins.
    pub fn total_bins(&self) -> usize {
        self.bins_per_octave * self.octaves
    }

    /// Feeds one raw sample.
    pub fn push_sample(&mut self, sample: i16) {
        self.handle_step(sample);
        self.handle_step(sample);
    }

    /// Converts the latest accumulator snapshot into one magnitude per bin.
    ///
    /// Higher octaves are updated more often and so accumulate more; the
    /// `>> octave` brings every octave back to a comparable scale.
    pub fn compute_frame(&mut self) -> &[u16] {
        let total = self.total_bins();
        for (bin, acc) in self.snapshot.iter().take(total).enumerate() {
            let octave = bin / self.bins_per_octave;
            let norm = approx_norm(acc.sin, acc.cos) >> 16;
            self.magnitudes[bin] = saturate_u16_from_u32((norm << 1) >> octave);
        }
        &self.magnitudes[..total]
    }

    /// Magnitudes from the last [`compute_frame`](Self::compute_frame).
    pub fn magnitudes(&self) -> &[u16] {
        &self.magnitudes[..self.total_bins()]
    }

    /// Clears all accumulated history, keeping the frequency table.
    pub fn reset(&mut self) {
        self.step = 0;
        self.octave_sums = [0; MAX_OCTAVES];
        for osc in self.oscillators.iter_mut() {
            osc.phase = 0;
        }
        self.live = [Accumulator::default(); MAX_BINS];
        self.snapshot = [Accumulator::default(); MAX_BINS];
        self.magnitudes = [0; MAX_BINS];
    }

    fn handle_step(&mut self, sample: i16) {
        let octave = self.schedule[self.step];
        self.step += 1;
        if self.step == self.schedule_len {
            self.step = 0;
        }

        for sum in self.octave_sums.iter_mut().take(self.octaves) {
            *sum = sum.saturating_add(sample as i32);
        }

        let total = self.total_bins();
        if octave == SNAPSHOT_STEP {
            for (live, snap) in self.live.iter_mut().zip(self.snapshot.iter_mut()).take(total) {
                *snap = *live;
                live.sin -= live.sin >> self.dft_iir_shift;
                live.cos -= live.cos >> self.dft_iir_shift;
            }
            return;
        }

        let octave = octave as usize;
        // The octave has summed 2^(octaves - octave) steps since its last turn.
        let decimation = (self.octaves - octave) as u32;
        let filtered = (self.octave_sums[octave] >> decimation)
            .clamp(i16::MIN as i32, i16::MAX as i32);
        self.octave_sums[octave] = 0;

        let table = &*SINE_TABLE;
        let start = octave * self.bins_per_octave;
        let end = start + self.bins_per_octave;
        for (osc, acc) in self.oscillators[start..end]
            .iter_mut()
            .zip(self.live[start..end].iter_mut())
        {
            let index = (osc.phase >> 8) as u8;
            osc.phase = osc.phase.wrapping_add(osc.advance);
            let sin = table[index as usize] as i32;
            let cos = table[index.wrapping_add(QUARTER_TURN) as usize] as i32;
            acc.sin = acc.sin.saturating_add(sin * filtered);
            acc.cos = acc.cos.saturating_add(cos * filtered);
        }
    }
}

/// Builds the step schedule: entry 0 snapshots, and entry `i + 1` processes
/// octave `octaves - 1 - j`, where `j` is the index of the lowest clear bit of
/// `i`. For five octaves that reads `S 4 3 4 2 4 3 4 1 4 3 4 2 4 3 4 0 4 ...`.
fn build_schedule(octaves: usize) -> ([u8; 1 << MAX_OCTAVES], usize) {
    let len = 1usize << octaves;
    let mut schedule = [0u8; 1 << MAX_OCTAVES];
    schedule[0] = SNAPSHOT_STEP;
    for i in 0..len - 1 {
        let lowest_clear = (!i).trailing_zeros() as usize;
        schedule[i + 1] = (octaves - lowest_clear - 1) as u8;
    }
    (schedule, len)
}

/// Phase advance per processed sample for each pitch class, in 1/65536 turns.
///
/// Evaluated once at construction so no transcendental math runs per sample.
fn phase_advances(config: &EngineConfig) -> [u16; MAX_BINS] {
    let mut advances = [0u16; MAX_BINS];
    let bpo = config.bins_per_octave as f64;
    let top_octave_scale = 2f64.powi(config.octaves as i32 - 1);
    for (i, advance) in advances
        .iter_mut()
        .take(config.bins_per_octave as usize)
        .enumerate()
    {
        let freq = config.base_frequency as f64 * 2f64.powf(i as f64 / bpo);
        let turns = freq * top_octave_scale / config.sample_rate as f64;
        *advance = (turns * 65536.0).round().min(u16::MAX as f64) as u16;
    }
    advances
}
