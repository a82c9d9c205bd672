//! # Core Module
//!
//! The foundational data structures of the perception library.
//!
//! ## Overview
//!
//! This module owns everything the analysis layer reads and writes: the
//! molecular system model with its arena-allocated atoms, bonds, residues and
//! chains, the static periodic element table, the typed parameter and term
//! tables that carry force-field data, and the Amber prmtop importer that
//! materializes a fully populated system from a fixed-width text file.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - atoms, bonds, residues,
//!   chains, the element table, and the `MolecularSystem` container
//! - **Parameter Storage** ([`tables`]) - row-oriented parameter tables and
//!   atom-tuple-keyed term tables with shared-table lifecycle rules
//! - **File I/O** ([`io`]) - the prmtop pull parser and its unit conventions

pub mod io;
pub mod models;
pub mod tables;
