//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the phase a run is in, with its legal transitions
//! - `PhaseTracker`: shared holder of the current phase
//! - `SeenSet`: append-only registry of dispatched document ids

mod phase;
mod seen;

pub use phase::{CrawlPhase, PhaseTracker};
pub use seen::SeenSet;
