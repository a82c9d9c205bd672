//! # Perceptor Core Library
//!
//! The chemistry perception core of a molecular-modeling stack: given a
//! molecular system (atoms, bonds, residues, coordinates), this crate performs
//! the structural and electronic inference needed by downstream force-field
//! assembly and selection tooling.
//!
//! ## Architectural Philosophy
//!
//! The library keeps a strict three-layer architecture so that each layer can
//! be tested and reasoned about in isolation.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`MolecularSystem`,
//!   the periodic element table, parameter and term tables) and file import
//!   (Amber prmtop).
//!
//! - **[`analysis`]: The Logic Core.** The perception algorithms: smallest set
//!   of smallest rings, aromaticity classification, bond-order and
//!   formal-charge assignment, Morgan-style topological canonicalization, and
//!   geometric connectivity guessing.
//!
//! - **[`workflows`]: The Public API.** The highest-level entry points, such
//!   as [`workflows::analyze`], which chain the analysis stages in the order
//!   downstream consumers expect.
//!
//! Every analysis stage reads its inputs from and writes its outputs to the
//! system model, never through side channels, and each stage is idempotent.

pub mod analysis;
pub mod core;
pub mod workflows;
