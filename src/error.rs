//! Error types for the planner core

use std::path::PathBuf;

use thiserror::Error;

use crate::solver::SolveFailure;

/// Errors raised while loading or validating a catalog snapshot
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A recipe record is structurally invalid
    #[error("Malformed recipe '{recipe}': {reason}")]
    Malformed { recipe: String, reason: String },

    /// Two records share the same recipe name
    #[error("Duplicate recipe name: {0}")]
    DuplicateRecipe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    pub(crate) fn malformed(recipe: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            recipe: recipe.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a single optimization call
#[derive(Debug, Error)]
pub enum OptimizeError {
    /// A demanded or consumed material has no active producing recipe
    #[error("No active recipe produces '{0}'")]
    UnproducibleMaterial(String),

    /// A demand entry is negative or not a finite number
    #[error("Invalid demand for '{material}': {quantity}")]
    InvalidDemand { material: String, quantity: f64 },

    /// The balance constraints admit no integer assignment
    #[error("No recipe mix satisfies the requested demand")]
    Infeasible,

    /// The solver could not be invoked, was cancelled, or gave up
    #[error("Solver error: {0}")]
    Solver(#[from] SolveFailure),
}

/// Errors raised when comparing catalog snapshot files
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("New catalog not found: {}", .0.display())]
    MissingNewCatalog(PathBuf),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
