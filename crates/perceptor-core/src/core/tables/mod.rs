//! Typed parameter and term tables.
//!
//! Force-field data lives in row-oriented [`param::ParamTable`]s with named,
//! typed columns; [`term::TermTable`]s relate fixed-arity tuples of atoms to
//! rows of a parameter table. Parameter tables are registered with the system
//! and shared across term tables by id; the system enforces the lifecycle
//! rules (a referenced table cannot be deleted, detach-on-write clones).

pub mod param;
pub mod term;

pub use param::{Column, ColumnKind, ParamTable, TableError, Value};
pub use term::{Term, TermTable};
