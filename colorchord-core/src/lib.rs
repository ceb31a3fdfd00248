// colorchord-core/src/lib.rs

//! The core engine for ColorChord-style music visualization.
//! This crate turns a stream of 16-bit audio samples into a set of tracked
//! notes and a strip of LED colors, using integer math only in the
//! per-sample and per-frame paths. It is completely headless and contains no
//! audio I/O or display code.
//!
//! The pipeline is: [`dft`] (progressive spectral analysis) -> [`smoother`]
//! (temporal IIR, blur and taper) -> [`fold`] (chromagram) -> [`notes`]
//! (persistent note tracking) -> [`color`] (LED colors), all owned and driven
//! by [`engine::ColorChord`].

pub mod color;
pub mod config;
pub mod dft;
pub mod engine;
pub mod fixed;
pub mod fold;
pub mod notes;
pub mod smoother;
pub mod tuning;

pub use color::Rgb;
pub use config::{ConfigError, EngineConfig, HueMap, OutputConfig, OutputPolicy, TrackingSource};
pub use engine::{ColorChord, Frame};
pub use notes::{FREE_SENTINEL, Note, NoteSlot};
