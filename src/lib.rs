//! Core of a desktop focus assistant. Once per second the engine samples the
//! screen, the running processes, the foreground window and recent input
//! activity, scores the user's focus with a small set of fixed rules, and
//! pushes short feedback messages to the embedding shell over a channel.
//!
//! The crate is a library with no CLI surface of its own: a GUI shell
//! constructs an [engine::Engine], calls `start`/`stop`, and drains the
//! feedback receiver on its own thread.

pub mod analysis;
pub mod engine;
pub mod feedback;
pub mod monitors;
pub mod utils;
pub mod window_api;
