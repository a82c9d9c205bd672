//! # Analysis Module
//!
//! The perception algorithms of the library.
//!
//! Every function here reads a [`MolecularSystem`] through its public
//! accessors and records results back into the system model (bond orders,
//! formal charges, aromatic flags) or returns them as plain values (rings,
//! invariants, matches). Pseudo particles and order-0 placeholder bonds are
//! invisible to all perception code.
//!
//! - [`rings`] - smallest set of smallest rings and ring-system grouping
//! - [`aromatic`] - per-ring electron counting and planarity scoring
//! - [`bond_orders`] - integer bond-order and formal-charge assignment
//! - [`graph`] - Morgan-style invariants, canonical hashing, isomorphism
//! - [`guess`] - distance-based connectivity and hydrogen placement
//!
//! [`MolecularSystem`]: crate::core::models::system::MolecularSystem

pub mod aromatic;
pub mod bond_orders;
pub mod graph;
pub mod guess;
pub mod rings;
