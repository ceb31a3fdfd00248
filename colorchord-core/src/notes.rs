//! # Note Tracker
//!
//! A fixed-capacity registry of notes that persist across frames. Each frame
//! the tracker picks peaks out of its input (the denoised spectrum or the
//! chromagram), lets existing notes follow nearby peaks, births new notes for
//! unclaimed peaks, runs a slow and a fast amplitude IIR per note, merges
//! notes that converge and retires notes that fade away.
//!
//! Peaks are located between bins: each one is placed by a parabolic fit
//! through its two neighbors, in units of `1 / 2^semi_bits` bin. Matching,
//! merging and hue selection all work in those sub-bin positions.
//!
//! Consumers poll slots by index every frame. A slot keeps its index for the
//! whole life of its note, and a note that was absorbed by a neighbor stays
//! visible for one frame with [`Note::merged_into`] set before the slot is
//! freed.

use log::debug;

use crate::config::{EngineConfig, MAX_BINS, MAX_NOTES, TrackingSource};
use crate::fixed::iir_step;

/// Pitch value that marks a free slot in the flat layout returned by
/// [`NoteSlot::raw_pitch`]. Never a valid bin, since at most 255 bins exist.
pub const FREE_SENTINEL: u8 = 255;

/// A tracked note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// Nearest whole bin, in spectral bins or pitch-class bins depending on
    /// the tracking source.
    pub pitch: u8,
    /// Sub-bin position: `pitch << semi_bits` plus the interpolated offset.
    pub position: u16,
    /// Slow amplitude, used for stability and size.
    pub slow_amp: u16,
    /// Fast amplitude, used for brightness.
    pub fast_amp: u16,
    /// Set when this note was absorbed by the note in the given slot during
    /// the last frame.
    pub merged_into: Option<u8>,
}

impl Note {
    /// A note that has not been merged away.
    pub fn is_live(&self) -> bool {
        self.merged_into.is_none()
    }
}

/// One registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteSlot {
    #[default]
    Free,
    Occupied(Note),
}

impl NoteSlot {
    pub fn note(&self) -> Option<&Note> {
        match self {
            NoteSlot::Free => None,
            NoteSlot::Occupied(note) => Some(note),
        }
    }

    /// The note in this slot, unless the slot is free or its note was merged.
    pub fn live(&self) -> Option<&Note> {
        self.note().filter(|note| note.is_live())
    }

    pub fn is_free(&self) -> bool {
        matches!(self, NoteSlot::Free)
    }

    pub fn pitch(&self) -> Option<u8> {
        self.note().map(|note| note.pitch)
    }

    /// Pitch in the flat layout, with [`FREE_SENTINEL`] for free slots.
    pub fn raw_pitch(&self) -> u8 {
        self.pitch().unwrap_or(FREE_SENTINEL)
    }

    fn live_mut(&mut self) -> Option<&mut Note> {
        match self {
            NoteSlot::Occupied(note) if note.is_live() => Some(note),
            _ => None,
        }
    }
}

/// A peak found in the current frame.
#[derive(Debug, Clone, Copy, Default)]
struct Candidate {
    position: u16,
    magnitude: u16,
    claimed: bool,
}

/// Best (slot, candidate) pairing found so far during matching.
#[derive(Debug, Clone, Copy)]
struct Pairing {
    slot: usize,
    candidate: usize,
    /// Sort key: distance, then louder slot, then louder candidate.
    rank: (u16, u16, u16),
}

#[derive(Debug, Clone)]
pub struct NoteTracker {
    slots: [NoteSlot; MAX_NOTES],
    capacity: usize,
    pitch_range: usize,
    semi_bits: u8,
    /// Number of sub-bin positions, `pitch_range << semi_bits`.
    span: u16,
    circular: bool,
    min_amp_for_note: u16,
    min_amp_to_keep: u16,
    max_jump_distance: u16,
    max_combine_distance: u16,
    slow_shift: u8,
    fast_shift: u8,
}

impl NoteTracker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            slots: [NoteSlot::Free; MAX_NOTES],
            capacity: config.max_notes as usize,
            pitch_range: config.pitch_range(),
            semi_bits: config.semi_bits,
            span: config.position_span(),
            circular: config.tracking_source == TrackingSource::Chromagram,
            min_amp_for_note: config.min_amp_for_note,
            min_amp_to_keep: config.min_amp_to_keep,
            max_jump_distance: config.max_jump_distance as u16,
            max_combine_distance: config.max_combine_distance as u16,
            slow_shift: config.slow_shift,
            fast_shift: config.fast_shift,
        }
    }

    /// All slots, in stable index order.
    pub fn slots(&self) -> &[NoteSlot] {
        &self.slots[..self.capacity]
    }

    /// Slots holding a note that has not been merged away.
    pub fn live_notes(&self) -> impl Iterator<Item = (usize, &Note)> + '_ {
        self.slots()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.live().map(|note| (i, note)))
    }

    pub fn active_count(&self) -> usize {
        self.live_notes().count()
    }

    /// Live note with the largest fast amplitude. Ties go to the lower slot.
    pub fn loudest(&self) -> Option<(usize, &Note)> {
        let mut best: Option<(usize, &Note)> = None;
        for (i, note) in self.live_notes() {
            if best.is_none_or(|(_, b)| note.fast_amp > b.fast_amp) {
                best = Some((i, note));
            }
        }
        best
    }

    pub fn reset(&mut self) {
        self.slots = [NoteSlot::Free; MAX_NOTES];
    }

    /// Runs one frame of tracking against `input`.
    pub fn update(&mut self, input: &[u16]) {
        let input = &input[..self.pitch_range.min(input.len())];

        self.retire_merged();

        let mut candidates = [Candidate::default(); MAX_BINS];
        let count = self.find_candidates(input, &mut candidates);
        let candidates = &mut candidates[..count];

        let hits = self.match_candidates(candidates);
        let born = self.birth(candidates);

        // Notes that found no peak this frame decay toward silence.
        for ((slot, hit), _) in self.slots[..self.capacity]
            .iter_mut()
            .zip(hits)
            .zip(born)
            .filter(|(_, newborn)| !newborn)
        {
            if let Some(note) = slot.live_mut() {
                let target = hit.unwrap_or(0);
                note.slow_amp = iir_step(note.slow_amp, target, self.slow_shift);
                note.fast_amp = iir_step(note.fast_amp, target, self.fast_shift);
            }
        }

        self.merge_close_notes();
        self.retire_faded();
    }

    /// Frees slots whose notes were merged during the previous frame.
    fn retire_merged(&mut self) {
        for (i, slot) in self.slots[..self.capacity].iter_mut().enumerate() {
            if let Some(into) = slot.note().and_then(|note| note.merged_into) {
                debug!("[TRACKER] slot {i} released after merging into slot {into}");
                *slot = NoteSlot::Free;
            }
        }
    }

    /// Collects local maxima at or above the birth threshold. A plateau only
    /// yields its leftmost bin.
    fn find_candidates(&self, input: &[u16], out: &mut [Candidate; MAX_BINS]) -> usize {
        let n = input.len();
        let mut count = 0;
        for (i, &magnitude) in input.iter().enumerate() {
            if magnitude < self.min_amp_for_note {
                continue;
            }
            let left = match i {
                0 if self.circular => input[n - 1],
                0 => 0,
                _ => input[i - 1],
            };
            let right = if i + 1 < n {
                input[i + 1]
            } else if self.circular {
                input[0]
            } else {
                0
            };
            if magnitude > left && magnitude >= right {
                out[count] = Candidate {
                    position: self.interpolate(i, left, magnitude, right),
                    magnitude,
                    claimed: false,
                };
                count += 1;
            }
        }
        count
    }

    /// Places a peak between its neighbors with a parabolic fit, in sub-bin
    /// units. The offset stays within half a bin of `bin`.
    fn interpolate(&self, bin: usize, left: u16, peak: u16, right: u16) -> u16 {
        let (l, m, r) = (left as i32, peak as i32, right as i32);
        // m > l and m >= r, so the curvature is positive.
        let curvature = 2 * (2 * m - l - r);
        let offset = ((r - l) << self.semi_bits) / curvature;
        let position = ((bin as i32) << self.semi_bits) + offset;
        self.wrap_position(position)
    }

    /// Folds a position back into range: around the octave when pitches wrap,
    /// by clamping otherwise.
    fn wrap_position(&self, position: i32) -> u16 {
        let span = self.span as i32;
        if self.circular {
            position.rem_euclid(span) as u16
        } else {
            position.clamp(0, span - 1) as u16
        }
    }

    /// Nearest whole bin of a sub-bin position.
    fn bin_of(&self, position: u16) -> u8 {
        let half = (1u32 << self.semi_bits) >> 1;
        let bin = ((position as u32 + half) >> self.semi_bits) as usize;
        if self.circular {
            (bin % self.pitch_range) as u8
        } else {
            bin.min(self.pitch_range - 1) as u8
        }
    }

    fn place(&self, note: &mut Note, position: u16) {
        note.position = position;
        note.pitch = self.bin_of(position);
    }

    /// Lets each live note claim the nearest peak within the jump distance
    /// and returns the magnitude each slot claimed.
    ///
    /// Pairs are taken greedily, shortest distance first. Equal distances go
    /// to the louder note, then to the louder peak.
    fn match_candidates(&mut self, candidates: &mut [Candidate]) -> [Option<u16>; MAX_NOTES] {
        let mut hits = [None; MAX_NOTES];
        loop {
            let mut best: Option<Pairing> = None;
            for (s, slot) in self.slots[..self.capacity].iter().enumerate() {
                if hits[s].is_some() {
                    continue;
                }
                let Some(note) = slot.live() else {
                    continue;
                };
                for (c, candidate) in candidates.iter().enumerate() {
                    if candidate.claimed {
                        continue;
                    }
                    let distance = self.distance(note.position, candidate.position);
                    if distance > self.max_jump_distance {
                        continue;
                    }
                    let rank = (
                        distance,
                        u16::MAX - note.slow_amp,
                        u16::MAX - candidate.magnitude,
                    );
                    if best.is_none_or(|b| rank < b.rank) {
                        best = Some(Pairing {
                            slot: s,
                            candidate: c,
                            rank,
                        });
                    }
                }
            }

            let Some(pairing) = best else {
                break;
            };
            let candidate = &mut candidates[pairing.candidate];
            candidate.claimed = true;
            hits[pairing.slot] = Some(candidate.magnitude);
            let position = candidate.position;
            let mut slot = self.slots[pairing.slot];
            if let Some(note) = slot.live_mut() {
                self.place(note, position);
            }
            self.slots[pairing.slot] = slot;
        }
        hits
    }

    /// Places unclaimed peaks, loudest first, into free slots. Peaks that do
    /// not fit are dropped.
    fn birth(&mut self, candidates: &mut [Candidate]) -> [bool; MAX_NOTES] {
        let mut born = [false; MAX_NOTES];
        candidates.sort_unstable_by(|a, b| {
            b.magnitude
                .cmp(&a.magnitude)
                .then(a.position.cmp(&b.position))
        });

        let mut next_free = 0;
        for candidate in candidates.iter().filter(|c| !c.claimed) {
            while next_free < self.capacity && !self.slots[next_free].is_free() {
                next_free += 1;
            }
            if next_free == self.capacity {
                break;
            }
            let mut note = Note {
                pitch: 0,
                position: 0,
                slow_amp: candidate.magnitude,
                fast_amp: candidate.magnitude,
                merged_into: None,
            };
            self.place(&mut note, candidate.position);
            self.slots[next_free] = NoteSlot::Occupied(note);
            born[next_free] = true;
            debug!(
                "[TRACKER] slot {next_free} born at pitch {} (position {}, magnitude {})",
                note.pitch, note.position, candidate.magnitude
            );
            next_free += 1;
        }
        born
    }

    /// Marks the weaker of every pair of close notes as merged into the
    /// stronger one. The survivor moves toward the absorbed position in
    /// proportion to its amplitude and keeps the larger amplitudes.
    fn merge_close_notes(&mut self) {
        for i in 0..self.capacity {
            for j in 0..i {
                let (Some(&a), Some(&b)) = (self.slots[i].live(), self.slots[j].live()) else {
                    continue;
                };
                if self.distance(a.position, b.position) > self.max_combine_distance {
                    continue;
                }
                // Equal amplitudes keep the lower slot.
                let (into, from, kept, absorbed) = if a.slow_amp > b.slow_amp {
                    (i, j, a, b)
                } else {
                    (j, i, b, a)
                };

                let position = self.weighted_position(&kept, &absorbed);
                let mut survivor = kept;
                self.place(&mut survivor, position);
                survivor.slow_amp = kept.slow_amp.max(absorbed.slow_amp);
                survivor.fast_amp = kept.fast_amp.max(absorbed.fast_amp);
                self.slots[into] = NoteSlot::Occupied(survivor);
                self.slots[from] = NoteSlot::Occupied(Note {
                    merged_into: Some(into as u8),
                    ..absorbed
                });
                debug!(
                    "[TRACKER] slot {from} (pitch {}) merged into slot {into} (pitch {})",
                    absorbed.pitch, survivor.pitch
                );
            }
        }
    }

    /// Frees live notes whose slow amplitude fell below the keep threshold.
    fn retire_faded(&mut self) {
        let threshold = self.min_amp_to_keep;
        for (i, slot) in self.slots[..self.capacity].iter_mut().enumerate() {
            let faded = slot
                .live()
                .filter(|note| note.slow_amp < threshold)
                .map(|note| note.pitch);
            if let Some(pitch) = faded {
                debug!("[TRACKER] slot {i} at pitch {pitch} faded out");
                *slot = NoteSlot::Free;
            }
        }
    }

    /// Distance between two positions, wrapping around the octave when
    /// tracking pitch classes.
    fn distance(&self, a: u16, b: u16) -> u16 {
        let d = a.abs_diff(b);
        if self.circular {
            d.min(self.span - d)
        } else {
            d
        }
    }

    /// Signed step from `from` to `to`, taking the short way around when
    /// positions wrap.
    fn signed_delta(&self, from: u16, to: u16) -> i32 {
        let mut delta = to as i32 - from as i32;
        if self.circular {
            let span = self.span as i32;
            if delta > span / 2 {
                delta -= span;
            } else if delta < -span / 2 {
                delta += span;
            }
        }
        delta
    }

    fn weighted_position(&self, kept: &Note, absorbed: &Note) -> u16 {
        let total = kept.slow_amp as i32 + absorbed.slow_amp as i32;
        if total == 0 {
            return kept.position;
        }
        let delta = self.signed_delta(kept.position, absorbed.position);
        self.wrap_position(kept.position as i32 + delta * absorbed.slow_amp as i32 / total)
    }
}
