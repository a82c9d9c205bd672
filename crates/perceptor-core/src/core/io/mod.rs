//! File import for molecular systems.
//!
//! The only format handled by the core is Amber prmtop ([`prmtop`]); other
//! formats live in external converter crates that populate the system model
//! through its public API.

pub mod prmtop;
