//! Core data models for molecular structures.
//!
//! This module contains the fundamental data structures used to represent
//! molecular systems: atoms, bonds, residues, chains, the static periodic
//! element table, and the owning `MolecularSystem` container with its
//! connectivity caches and fragment bookkeeping.

pub mod atom;
pub mod chain;
pub mod element;
pub mod ids;
pub mod residue;
pub mod system;
pub mod topology;
