//! Input: per-frame snapshots of keyboard and pointer state.
//!
//! The windowing layer feeds raw events into an [`InputCollector`]; the render
//! loop takes one [`InputSnapshot`] per frame and consumes it synchronously.
//!
//! # Invariants
//! - No callbacks: input is pulled once per frame, never pushed mid-frame.
//! - A close request, once observed, stays set until the loop exits.

mod collector;
mod snapshot;

pub use collector::InputCollector;
pub use snapshot::{InputSnapshot, Key, KeySet};
