//! Terminal rendering of engine frames.
//!
//! One line per frame: the LED strip drawn in truecolor, followed by the live
//! notes with their names and strengths.

use std::fmt::Write;

use colorchord_core::tuning::describe_pitch;
use colorchord_core::{EngineConfig, Frame, Rgb};
use crossterm::style::{Color, Stylize};

const BLOCK: &str = "\u{2588}\u{2588}";

fn paint(line: &mut String, color: Rgb) {
    let color = Color::Rgb {
        r: color.r,
        g: color.g,
        b: color.b,
    };
    let _ = write!(line, "{}", BLOCK.with(color));
}

/// Formats one frame.
pub fn render_frame(frame: &Frame<'_>, config: &EngineConfig) -> String {
    let mut line = String::new();
    let _ = write!(line, "{:>6} ", frame.index);
    for &color in frame.colors {
        paint(&mut line, color);
    }

    let mut any = false;
    for (slot, note) in frame.live_notes() {
        let (name, cents) = describe_pitch(config, note.position);
        let _ = write!(
            line,
            "  [{slot}] {name}{cents:+.0}c {}/{}",
            note.slow_amp, note.fast_amp
        );
        any = true;
    }
    if !any {
        line.push_str("  -");
    }
    line
}
