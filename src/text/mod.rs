//! Text preparation for speech.
//!
//! Turns raw chat messages into speakable text or a skip signal.

mod normalizer;

pub use normalizer::{Normalized, Normalizer};
