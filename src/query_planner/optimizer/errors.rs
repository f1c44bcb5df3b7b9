use std::fmt::Display;

use thiserror::Error;

use crate::entity_catalog::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    TypeFilterPruning,
    UnsatisfiableSubtypePruning,
    SupertypeJoinElimination,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::TypeFilterPruning => write!(f, "TypeFilterPruning"),
            Pass::UnsatisfiableSubtypePruning => write!(f, "UnsatisfiableSubtypePruning"),
            Pass::SupertypeJoinElimination => write!(f, "SupertypeJoinElimination"),
        }
    }
}

/// Raised only when the plan and the catalog disagree; a pass that cannot
/// prove anything leaves the plan unchanged instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OptimizerError {
    #[error("{pass}: {source}")]
    Catalog {
        pass: Pass,
        #[source]
        source: CatalogError,
    },

    #[error("{pass}: join `{alias}` is not part of the plan")]
    MissingJoin { pass: Pass, alias: String },
}
