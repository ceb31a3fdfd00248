//! # Color Mapper
//!
//! Maps tracked notes onto a strip of RGB channels. Pitch class picks the
//! hue, the fast amplitude picks the brightness, and the output policy decides
//! how notes share the strip. Everything here is integer math.

use once_cell::sync::Lazy;

use crate::config::{EngineConfig, HueMap, MAX_CHANNELS, MAX_NOTES, OutputConfig, OutputPolicy};
use crate::fixed::saturate_u8;
use crate::notes::{Note, NoteSlot};

const GAMMA: f64 = 2.2;

/// Width of one hue sector. Six sectors cover the 8-bit hue circle.
const SECTOR: u32 = 43;

/// A third of the 16-bit hue circle, used by the ColorChord curve.
const THIRD: u32 = 65535 / 3;

static GAMMA_TABLE: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let normalized = i as f64 / 255.0;
        *entry = (normalized.powf(GAMMA) * 255.0).round() as u8;
    }
    table
});

/// One output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_off(self) -> bool {
        self == Rgb::BLACK
    }

    fn gamma_corrected(self) -> Self {
        let table = &*GAMMA_TABLE;
        Self {
            r: table[self.r as usize],
            g: table[self.g as usize],
            b: table[self.b as usize],
        }
    }
}

/// Integer HSV to RGB. Hue 0 is red, about 86 green and 172 blue.
pub fn hsv_to_rgb(hue: u8, sat: u8, val: u8) -> Rgb {
    let v = val as u32;
    let s = sat as u32;
    let sector = hue as u32 / SECTOR;
    // Position inside the sector, scaled to 0..=252.
    let frac = (hue as u32 % SECTOR) * 6;

    let p = (v * (255 - s) / 255) as u8;
    let q = (v * (255 - s * frac / 255) / 255) as u8;
    let t = (v * (255 - s * (255 - frac) / 255) / 255) as u8;
    let v = val;

    match sector {
        0 => Rgb::new(v, t, p),
        1 => Rgb::new(q, v, p),
        2 => Rgb::new(p, v, t),
        3 => Rgb::new(p, q, v),
        4 => Rgb::new(t, p, v),
        _ => Rgb::new(v, p, q),
    }
}

/// Sub-bin positions in one octave.
fn note_range(bins_per_octave: u8, semi_bits: u8) -> u32 {
    (bins_per_octave.max(1) as u32) << semi_bits
}

/// Pitch class of a sub-bin note position after transposition by
/// `root_offset` whole bins. The result keeps the `semi_bits` fraction.
pub fn pitch_class(position: u16, bins_per_octave: u8, semi_bits: u8, root_offset: u8) -> u16 {
    let range = note_range(bins_per_octave, semi_bits);
    let root = (root_offset as u32) << semi_bits;
    ((position as u32 % range + root) % range) as u16
}

/// Hue of a sub-bin pitch class.
pub fn hue_for(class: u16, bins_per_octave: u8, semi_bits: u8, map: HueMap) -> u8 {
    let range = note_range(bins_per_octave, semi_bits);
    match map {
        HueMap::Linear => (class as u32 * 256 / range) as u8,
        HueMap::ColorChord => {
            let position = class as u32 * 65536 / range;
            let hue = if position < THIRD {
                // yellow to red
                (THIRD - position) >> 1
            } else if position < THIRD << 1 {
                // red, wrapping through magenta to blue
                (THIRD + 65536 - position) & 0xFFFF
            } else {
                // blue through green back toward yellow
                ((65536 - position) << 16) / (THIRD << 1) + (THIRD >> 1)
            };
            (hue >> 8) as u8
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColorMapper {
    output: OutputConfig,
    bins_per_octave: u8,
    semi_bits: u8,
    channels: usize,
    /// 8.8 fixed-point rotation of the linear strip, kept below
    /// `channels << 8`.
    phase: u32,
    colors: [Rgb; MAX_CHANNELS],
}

impl ColorMapper {
    pub fn new(config: &EngineConfig) -> Self {
        Lazy::force(&GAMMA_TABLE);
        Self {
            output: config.output.clone(),
            bins_per_octave: config.bins_per_octave,
            semi_bits: config.semi_bits,
            channels: config.output.channels as usize,
            phase: 0,
            colors: [Rgb::BLACK; MAX_CHANNELS],
        }
    }

    /// Recomputes every channel from the current note registry.
    pub fn update(&mut self, slots: &[NoteSlot]) -> &[Rgb] {
        self.colors[..self.channels].fill(Rgb::BLACK);
        match self.output.policy {
            OutputPolicy::Linear => self.fill_linear(slots),
            OutputPolicy::Dominant => self.fill_dominant(slots),
        }
        if self.output.gamma {
            for color in self.colors[..self.channels].iter_mut() {
                *color = color.gamma_corrected();
            }
        }
        &self.colors[..self.channels]
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors[..self.channels]
    }

    pub fn reset(&mut self) {
        self.phase = 0;
        self.colors = [Rgb::BLACK; MAX_CHANNELS];
    }

    /// Color of a single note, before gamma.
    pub fn note_color(&self, note: &Note) -> Rgb {
        let class = pitch_class(
            note.position,
            self.bins_per_octave,
            self.semi_bits,
            self.output.root_note_offset,
        );
        let hue = hue_for(class, self.bins_per_octave, self.semi_bits, self.output.hue_map);
        let value = saturate_u8(note.fast_amp as u32 * self.output.brightness_gain as u32 >> 8);
        hsv_to_rgb(hue, 255, value)
    }

    fn fill_dominant(&mut self, slots: &[NoteSlot]) {
        let mut loudest: Option<&Note> = None;
        for note in slots.iter().filter_map(NoteSlot::live) {
            if loudest.is_none_or(|best| note.fast_amp > best.fast_amp) {
                loudest = Some(note);
            }
        }
        if let Some(note) = loudest {
            let color = self.note_color(note);
            self.colors[..self.channels].fill(color);
        }
    }

    /// Shares the strip between notes in proportion to how far their slow
    /// amplitude rises above the nerf level.
    fn fill_linear(&mut self, slots: &[NoteSlot]) {
        let rotation = (self.phase >> 8) as usize % self.channels;
        let turn = (self.channels as u32) << 8;
        self.phase = (self.phase + self.output.rotation_step as u32) % turn;

        let total: u32 = slots
            .iter()
            .filter_map(NoteSlot::live)
            .map(|note| note.slow_amp as u32)
            .sum();
        let nerf = total * self.output.nerf_proportion as u32 >> 8;

        let mut kept = [Note {
            pitch: 0,
            position: 0,
            slow_amp: 0,
            fast_amp: 0,
            merged_into: None,
        }; MAX_NOTES];
        let mut count = 0;
        for note in slots.iter().filter_map(NoteSlot::live) {
            if (note.slow_amp as u32) < nerf || count == MAX_NOTES {
                continue;
            }
            kept[count] = *note;
            count += 1;
        }
        let kept = &mut kept[..count];
        kept.sort_by_key(|note| note.position);

        let weight_sum: u32 = kept.iter().map(|n| n.slow_amp as u32 - nerf).sum();
        if weight_sum == 0 {
            return;
        }

        let per_weight = ((self.channels as u64) << 16) / weight_sum as u64;
        let mut shares = [0usize; MAX_NOTES];
        let mut assigned = 0;
        for (share, note) in shares.iter_mut().zip(kept.iter()) {
            let weight = (note.slow_amp as u32 - nerf) as u64;
            *share = ((weight * per_weight) >> 16) as usize;
            assigned += *share;
        }
        let mut leftover = self.channels.saturating_sub(assigned);
        while leftover > 0 {
            for share in shares[..count].iter_mut() {
                if leftover == 0 {
                    break;
                }
                *share += 1;
                leftover -= 1;
            }
        }

        let mut position = 0;
        for (note, &share) in kept.iter().zip(shares.iter()) {
            let color = self.note_color(note);
            for _ in 0..share {
                if position == self.channels {
                    break;
                }
                self.colors[(position + rotation) % self.channels] = color;
                position += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, slow_amp: u16, fast_amp: u16) -> NoteSlot {
        NoteSlot::Occupied(Note {
            pitch,
            position: (pitch as u16) << 3,
            slow_amp,
            fast_amp,
            merged_into: None,
        })
    }

    fn mapper(output: OutputConfig) -> ColorMapper {
        ColorMapper::new(&EngineConfig {
            output,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn primaries() {
        assert_eq!(hsv_to_rgb(0, 255, 255), Rgb::new(255, 0, 0));
        assert_eq!(hsv_to_rgb(86, 255, 255), Rgb::new(0, 255, 0));
        assert_eq!(hsv_to_rgb(172, 255, 255), Rgb::new(0, 0, 255));
        assert_eq!(hsv_to_rgb(100, 0, 200), Rgb::new(200, 200, 200));
        assert!(hsv_to_rgb(100, 255, 0).is_off());
    }

    #[test]
    fn linear_hues_spread_evenly() {
        assert_eq!(hue_for(0, 24, 3, HueMap::Linear), 0);
        assert_eq!(hue_for(12 << 3, 24, 3, HueMap::Linear), 128);
        assert_eq!(hue_for(6 << 3, 24, 3, HueMap::Linear), 64);
        assert_eq!(hue_for(12, 24, 0, HueMap::Linear), 128);
    }

    #[test]
    fn hue_moves_between_bins() {
        let low = hue_for(12 << 3, 24, 3, HueMap::Linear);
        let between = hue_for((12 << 3) + 4, 24, 3, HueMap::Linear);
        let high = hue_for(13 << 3, 24, 3, HueMap::Linear);
        assert_eq!((low, between, high), (128, 133, 138));
    }

    #[test]
    fn colorchord_curve_starts_at_yellow() {
        assert_eq!(hue_for(0, 24, 3, HueMap::ColorChord), 42);
        let yellow = hsv_to_rgb(hue_for(0, 24, 3, HueMap::ColorChord), 255, 255);
        assert!(yellow.r > 200 && yellow.g > 200 && yellow.b == 0);
    }

    #[test]
    fn root_offset_transposes_pitch_class() {
        assert_eq!(pitch_class(30 << 3, 24, 3, 0), 6 << 3);
        assert_eq!(pitch_class(30 << 3, 24, 3, 18), 0);
        assert_eq!(pitch_class(54 << 3, 24, 3, 18), 0);
        assert_eq!(pitch_class((30 << 3) + 5, 24, 3, 18), 5);
    }

    #[test]
    fn brightness_follows_fast_amplitude() {
        let mapper = mapper(OutputConfig::default());
        let dim = mapper.note_color(&Note {
            pitch: 0,
            position: 0,
            slow_amp: 1000,
            fast_amp: 1000,
            merged_into: None,
        });
        assert_eq!(dim, Rgb::new(156, 0, 0));
        let bright = mapper.note_color(&Note {
            pitch: 0,
            position: 0,
            slow_amp: 1000,
            fast_amp: 10_000,
            merged_into: None,
        });
        assert_eq!(bright, Rgb::new(255, 0, 0));
    }

    #[test]
    fn no_notes_turns_everything_off() {
        let mut mapper = mapper(OutputConfig::default());
        let slots = [NoteSlot::Free; 12];
        assert!(mapper.update(&slots).iter().all(|c| c.is_off()));
        assert_eq!(mapper.colors().len(), 9);
    }

    #[test]
    fn merged_notes_are_not_drawn() {
        let mut mapper = mapper(OutputConfig::default());
        let slots = [NoteSlot::Occupied(Note {
            pitch: 10,
            position: 80,
            slow_amp: 900,
            fast_amp: 900,
            merged_into: Some(1),
        })];
        assert!(mapper.update(&slots).iter().all(|c| c.is_off()));
    }

    #[test]
    fn dominant_note_fills_the_strip() {
        let mut mapper = mapper(OutputConfig {
            policy: OutputPolicy::Dominant,
            ..OutputConfig::default()
        });
        let slots = [note(0, 500, 300), note(12, 400, 900)];
        // 900 * 0x28 >> 8
        let expected = hsv_to_rgb(128, 255, 140);
        assert!(mapper.update(&slots).iter().all(|&c| c == expected));
    }

    #[test]
    fn single_note_gets_every_channel() {
        let mut mapper = mapper(OutputConfig::default());
        let slots = [note(0, 800, 1000), NoteSlot::Free];
        let colors = mapper.update(&slots);
        assert!(colors.iter().all(|&c| c == Rgb::new(156, 0, 0)));
    }

    #[test]
    fn strip_is_shared_by_strength() {
        let mut mapper = mapper(OutputConfig {
            nerf_proportion: 0,
            rotation_step: 0,
            ..OutputConfig::default()
        });
        let slots = [note(12, 200, 1000), note(0, 600, 1000)];
        let colors = mapper.update(&slots).to_vec();
        let red = colors.iter().filter(|c| **c == Rgb::new(156, 0, 0)).count();
        assert_eq!(red, 7);
        assert_eq!(&colors[..7], &[Rgb::new(156, 0, 0); 7]);
        assert!(colors[7..].iter().all(|c| !c.is_off() && c.r != 156));
    }

    #[test]
    fn weak_notes_are_nerfed() {
        let mut mapper = mapper(OutputConfig::default());
        let slots = [note(0, 600, 1000), note(12, 100, 1000)];
        assert!(mapper.update(&slots).iter().all(|&c| c == Rgb::new(156, 0, 0)));
    }

    #[test]
    fn strip_rotates_by_the_phase_step() {
        let mut mapper = mapper(OutputConfig {
            nerf_proportion: 0,
            rotation_step: 256,
            ..OutputConfig::default()
        });
        let slots = [note(12, 200, 1000), note(0, 600, 1000)];
        let first = mapper.update(&slots).to_vec();
        let second = mapper.update(&slots).to_vec();
        for i in 0..first.len() {
            assert_eq!(second[(i + 1) % first.len()], first[i]);
        }
    }

    #[test]
    fn rotation_stays_in_step_past_a_full_turn() {
        let mut mapper = mapper(OutputConfig {
            nerf_proportion: 0,
            rotation_step: 0x0F00,
            ..OutputConfig::default()
        });
        let slots = [note(12, 200, 1000), note(0, 600, 1000)];
        let mut previous = mapper.update(&slots).to_vec();
        // 15 channels per frame on a 9 channel strip is a shift of 6.
        for _ in 0..40 {
            let next = mapper.update(&slots).to_vec();
            for i in 0..previous.len() {
                assert_eq!(next[(i + 6) % 9], previous[i]);
            }
            previous = next;
        }
    }

    #[test]
    fn gamma_darkens_midtones() {
        let table = &*GAMMA_TABLE;
        assert_eq!(table[0], 0);
        assert_eq!(table[255], 255);
        assert!(table[128] < 64);
    }
}
