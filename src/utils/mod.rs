//! Utility modules

pub mod range;

pub use range::clamp;
