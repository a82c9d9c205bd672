//! # Workflows Module
//!
//! The highest-level, user-facing layer: complete perception procedures
//! assembled from the `core` and `analysis` building blocks.

mod analyze;

pub use analyze::analyze;
