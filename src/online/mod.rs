//! Online indexer (spec §4.11): adaptive throttling, the four build
//! strategies, and the scrubber.

pub mod build;
pub mod scrub;
pub mod throttle;

pub use build::{BuildReport, MutualReport};
pub use scrub::{ScrubMode, ScrubReport};
pub use throttle::AdaptiveThrottle;
