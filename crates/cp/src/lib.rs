//! Finite-domain constraint layer for the Slothy optimizer.
//!
//! The engine lowers a data-flow graph into a [`Model`] of integer variables
//! and constraints, hands it to an implementation of [`Solve`], and reads a
//! schedule back out of the [`Assignment`]. The solver is deliberately a
//! narrow seam: any CP solver that can answer SAT/UNSAT with an assignment
//! can sit behind it. [`Backtrack`] is the built-in one.

pub mod domain;
pub mod model;
pub mod prop;
pub mod solve;

pub use crate::domain::{Domain, DomainStore, Empty, PropResult, Var};
pub use crate::model::{Model, VarData};
pub use crate::prop::{Con, LifeVal, Lifetimes, Loc, UnitCap, UnitItem};
pub use crate::solve::{Assignment, Backtrack, Limits, Outcome, Solve};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
