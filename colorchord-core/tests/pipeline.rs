//! End-to-end checks of the sample-to-color pipeline.

use colorchord_core::color::{hsv_to_rgb, hue_for, pitch_class};
use colorchord_core::dft::SpectralAnalyzer;
use colorchord_core::tuning::{bin_frequency, nearest_bin};
use colorchord_core::{
    ColorChord, EngineConfig, FREE_SENTINEL, NoteSlot, OutputConfig, OutputPolicy, Rgb,
};
use rustfft::{FftPlanner, num_complex::Complex};
use std::f64::consts::TAU;

const SAMPLE_RATE: u32 = 8000;
const C3: f64 = 130.81;
const C4: f64 = 261.63;

fn tone(freq: f64, amplitude: f64, count: usize) -> Vec<i16> {
    (0..count)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            (amplitude * (TAU * freq * t).sin()) as i16
        })
        .collect()
}

/// Deterministic white noise from a 32-bit LCG.
fn noise(seed: u32, amplitude: i32, count: usize) -> Vec<i16> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (state >> 16) as i32 - 32768;
            (unit * amplitude / 32768) as i16
        })
        .collect()
}

/// A sine whose frequency follows `bin_at(sample)`, a fractional bin index,
/// with continuous phase.
fn glide(
    config: &EngineConfig,
    amplitude: f64,
    count: usize,
    bin_at: impl Fn(usize) -> f64,
) -> Vec<i16> {
    let base = bin_frequency(config, 0) as f64;
    let bpo = config.bins_per_octave as f64;
    let mut phase = 0.0f64;
    (0..count)
        .map(|i| {
            let sample = amplitude * phase.sin();
            let freq = base * 2f64.powf(bin_at(i) / bpo);
            phase = (phase + TAU * freq / SAMPLE_RATE as f64) % TAU;
            sample as i16
        })
        .collect()
}

/// Moves linearly from `from` to `to` between sample `start` and `end`.
fn ramp(i: usize, start: usize, end: usize, from: f64, to: f64) -> f64 {
    if i <= start {
        from
    } else if i >= end {
        to
    } else {
        from + (to - from) * (i - start) as f64 / (end - start) as f64
    }
}

fn engine(config: EngineConfig) -> ColorChord {
    ColorChord::new(config).unwrap()
}

fn circular_distance(a: u8, b: u8, range: u8) -> u8 {
    let d = a.abs_diff(b);
    d.min(range - d)
}

#[test]
fn identical_input_gives_identical_frames() {
    let mut input = noise(7, 6000, 16_000);
    for (sample, t) in input.iter_mut().zip(tone(C3, 3000.0, 16_000)) {
        *sample = sample.saturating_add(t);
    }

    let mut first = engine(EngineConfig::default());
    let mut second = engine(EngineConfig::default());
    let mut recorded: Vec<(Vec<NoteSlot>, Vec<Rgb>)> = Vec::new();
    first.push_samples(&input, |frame| {
        recorded.push((frame.notes.to_vec(), frame.colors.to_vec()));
    });

    let mut replayed = 0;
    second.push_samples(&input, |frame| {
        let (notes, colors) = &recorded[replayed];
        assert_eq!(frame.notes, notes.as_slice());
        assert_eq!(frame.colors, colors.as_slice());
        replayed += 1;
    });
    assert_eq!(replayed, recorded.len());
    assert_eq!(replayed, 125);
}

#[test]
fn slots_stay_consistent_under_noise() {
    let config = EngineConfig::default();
    let total = config.total_bins();
    let mut engine = engine(config);

    let mut input = noise(0xC0FFEE, 12_000, 32_000);
    // A clipped burst in the middle.
    for sample in input[12_000..14_000].iter_mut() {
        *sample = if *sample >= 0 { i16::MAX } else { i16::MIN };
    }

    engine.push_samples(&input, |frame| {
        assert_eq!(frame.notes.len(), 12);
        for slot in frame.notes {
            match slot {
                NoteSlot::Free => assert_eq!(slot.raw_pitch(), FREE_SENTINEL),
                NoteSlot::Occupied(note) => {
                    assert!((note.pitch as usize) < total);
                    assert_ne!(slot.raw_pitch(), FREE_SENTINEL);
                    if let Some(into) = note.merged_into {
                        assert!((into as usize) < frame.notes.len());
                    }
                }
            }
        }
    });
}

#[test]
fn a_tone_is_tracked_at_its_bin() {
    let mut engine = engine(EngineConfig::default());
    let mut first_sighting = None;
    engine.push_samples(&tone(C3, 3000.0, 8000), |frame| {
        if first_sighting.is_none() && frame.live_notes().count() > 0 {
            first_sighting = Some(frame.index);
        }
    });
    assert!(first_sighting.is_some());

    let (_, loudest) = engine.loudest_note().unwrap();
    assert!(loudest.pitch.abs_diff(30) <= 1, "tracked at bin {}", loudest.pitch);
}

#[test]
fn a_steady_tone_holds_exactly_one_note() {
    let mut engine = engine(EngineConfig::default());
    engine.push_samples(&tone(C3, 3000.0, 16_000), |_| {});

    let live: Vec<_> = engine
        .notes()
        .iter()
        .filter_map(NoteSlot::live)
        .map(|note| (note.pitch, note.slow_amp))
        .collect();
    assert_eq!(live.len(), 1, "live notes: {live:?}");
    assert!(live[0].0.abs_diff(30) <= 1, "tracked at bin {}", live[0].0);
}

#[test]
fn a_gliding_tone_keeps_its_slot() {
    let config = EngineConfig::default();
    // One second at bin 30, one bin every six frames up to bin 36, one more
    // second there.
    let glide_end = 8000 + 6 * 6 * 128;
    let input = glide(&config, 3000.0, glide_end + 8000, |i| {
        ramp(i, 8000, glide_end, 30.0, 36.0)
    });

    let mut engine = engine(config);
    let mut tracked_slot = None;
    engine.push_samples(&input, |frame| {
        if frame.index < 50 {
            return;
        }
        let loudest = frame
            .live_notes()
            .max_by_key(|&(i, note)| (note.fast_amp, std::cmp::Reverse(i)))
            .map(|(i, _)| i);
        assert!(loudest.is_some(), "tone lost at frame {}", frame.index);
        match tracked_slot {
            None => tracked_slot = loudest,
            Some(slot) => {
                assert_eq!(loudest, Some(slot), "slot changed at frame {}", frame.index)
            }
        }
    });

    let (_, note) = engine.loudest_note().unwrap();
    assert!(note.pitch.abs_diff(36) <= 1, "ended at bin {}", note.pitch);
}

#[test]
fn converging_tones_merge_into_one_slot() {
    let config = EngineConfig {
        max_combine_distance: 16,
        ..EngineConfig::default()
    };
    let count = 8000 + 12_000 + 4000;
    let steady = glide(&config, 2000.0, count, |_| 40.0);
    let falling = glide(&config, 2000.0, count, |i| ramp(i, 8000, 20_000, 46.0, 40.0));
    let input: Vec<i16> = steady
        .iter()
        .zip(&falling)
        .map(|(&a, &b)| a.saturating_add(b))
        .collect();

    let mut engine = engine(config);
    let mut two_notes_seen = false;
    let mut merge = None;
    engine.push_samples(&input, |frame| {
        if frame.live_notes().count() >= 2 {
            two_notes_seen = true;
        }
        if merge.is_none() {
            merge = frame.notes.iter().enumerate().find_map(|(i, slot)| {
                slot.note().and_then(|note| note.merged_into).map(|into| (i, into))
            });
            if let Some((from, into)) = merge {
                assert_ne!(from, into as usize);
                assert!(frame.notes[into as usize].live().is_some());
            }
        }
    });

    assert!(two_notes_seen, "the two tones were never tracked apart");
    assert!(merge.is_some(), "the converging notes never merged");
}

#[test]
fn silence_after_a_tone_frees_every_slot() {
    let mut engine = engine(EngineConfig::default());
    engine.push_samples(&tone(C3, 3000.0, 8000), |_| {});
    assert!(engine.loudest_note().is_some());

    engine.push_samples(&vec![0; 24_000], |_| {});
    assert!(engine.notes().iter().all(NoteSlot::is_free));
    assert!(engine.colors().iter().all(|c| c.is_off()));
}

#[test]
fn octaves_of_a_note_share_a_pitch_class() {
    // bin 30 folded into 24 bins per octave
    let expected = 6;
    for freq in [C3, C4] {
        let mut engine = engine(EngineConfig::default());
        engine.push_samples(&tone(freq, 3000.0, 8000), |_| {});
        let class = engine.loudest_pitch_class().unwrap();
        assert!(
            circular_distance(class, expected, 24) <= 1,
            "{freq} Hz folded to class {class}"
        );
    }
}

#[test]
fn dominant_color_matches_the_loudest_note() {
    let config = EngineConfig {
        output: OutputConfig {
            policy: OutputPolicy::Dominant,
            ..OutputConfig::default()
        },
        ..EngineConfig::default()
    };
    let mut engine = engine(config.clone());
    engine.push_samples(&tone(C3, 3000.0, 8000), |_| {});

    let (_, note) = engine.loudest_note().unwrap();
    let class = pitch_class(note.position, config.bins_per_octave, config.semi_bits, 0);
    let hue = hue_for(class, config.bins_per_octave, config.semi_bits, config.output.hue_map);
    let value = (note.fast_amp as u32 * config.output.brightness_gain as u32 >> 8).min(255) as u8;
    let expected = hsv_to_rgb(hue, 255, value);

    assert!(!expected.is_off());
    assert!(engine.colors().iter().all(|&c| c == expected));
}

#[test]
fn analyzer_peak_agrees_with_fft() {
    let config = EngineConfig::default();
    // G3, bin 44
    let freq = 196.0;
    let signal = tone(freq, 3000.0, 8192);

    let mut analyzer = SpectralAnalyzer::new(&config);
    for &sample in &signal {
        analyzer.push_sample(sample);
    }
    let analyzer_peak = analyzer
        .compute_frame()
        .iter()
        .enumerate()
        .max_by_key(|&(_, &m)| m)
        .map(|(bin, _)| bin)
        .unwrap();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(signal.len());
    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&s| Complex {
            re: s as f32,
            im: 0.0,
        })
        .collect();
    fft.process(&mut buffer);
    let fft_peak = buffer
        .iter()
        .take(signal.len() / 2)
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
        .map(|(index, _)| index as f32 * SAMPLE_RATE as f32 / signal.len() as f32)
        .unwrap();

    let fft_bin = nearest_bin(&config, fft_peak).unwrap();
    assert!(
        analyzer_peak.abs_diff(fft_bin) <= 1,
        "analyzer bin {analyzer_peak}, fft bin {fft_bin}"
    );
}
