//! Polytreat - polymorphic TREAT path resolution for ORM query planners
//!
//! This crate turns path expressions over polymorphic entity hierarchies into
//! physical join trees:
//! - an entity catalog and type hierarchy index for Joined, SingleTable and
//!   TablePerClass inheritance mappings
//! - normalization of nested `TREAT(..)` into plain joins plus one terminal treat
//! - join tree construction with per-strategy physical shapes
//! - optimizer passes that prune joins ruled out by type predicates

pub mod config;
pub mod entity_catalog;
pub mod join_plan;
pub mod query_planner;

pub use config::{ImplicitJoinSemantics, ResolverConfig};
pub use entity_catalog::{CatalogError, EntityCatalog, EntityCatalogConfig, TypeHierarchyIndex};
pub use join_plan::{JoinKind, JoinNode, JoinTree, ResolvedPlan};
pub use query_planner::{
    errors::{ResolveError, ResolveErrorKind, ResolveResult},
    evaluate_treat_query,
    path_expr::PathExpression,
    query::{ComparisonOp, Predicate, TreatQuery},
    Resolver,
};
