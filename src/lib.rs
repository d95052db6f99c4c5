//! Satisfactory production planner
//!
//! Finds the minimum-power mix of recipes that satisfies a set of requested
//! material rates, given a recipe catalog and the player's unlocked content.
//!
//! Data flows catalog → [`classifier::classify`] → [`filter::filter`] →
//! [`calculator::optimize`]; [`differ::diff`] compares catalog snapshots.

pub mod calculator;
pub mod classifier;
pub mod db;
pub mod differ;
pub mod error;
pub mod filter;
pub mod loader;
pub mod models;
pub mod resources;
pub mod solver;

pub use calculator::{Demand, ExtractionCaps, OptimizeOptions, Solution, optimize, optimize_with};
pub use classifier::{MaterialInfo, classify};
pub use differ::{DiffReport, diff};
pub use error::{CatalogError, DiffError, OptimizeError};
pub use filter::{SelectionSettings, UnlockSelection, filter};
pub use models::{Catalog, Recipe, UnlockCondition};
pub use solver::{CancelToken, IntegerSolver, MicrolpSolver};
