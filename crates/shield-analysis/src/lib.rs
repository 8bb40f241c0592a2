//! shield-analysis crate
//!
//! Drainer-bot pattern detection over wallet history and the gas strategy
//! recommended for racing the detected bot.

pub mod drainer;
pub mod gas;

pub use drainer::{classify, find_sweeps, DrainerDetector};
pub use gas::{recommend, GasPreset, GasRecommendation, SubmissionPath};
