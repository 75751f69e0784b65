//! Internal numeric building blocks.
//!
//! - optimize: rectangular linear sum assignment with unmatchable entries

pub mod optimize;
