use std::sync::Arc;

use log::debug;

use crate::config::ResolverConfig;
use crate::entity_catalog::TypeHierarchyIndex;
use crate::join_plan::{PredicateClause, ResolvedPlan, ResolvedPredicate};
use crate::query_planner::{
    errors::{ResolveError, ResolveResult},
    join_builder::JoinTreeBuilder,
    normalizer::Normalizer,
    optimizer::OptimizerCtx,
    plan_ctx::{AliasValue, PlanCtx, TableCtx},
    query::{Predicate, TreatQuery},
};

pub mod errors;
pub mod join_builder;
pub mod normalizer;
pub mod optimizer;
pub mod path_expr;
mod path_parser;
pub mod plan_ctx;
pub mod query;
pub mod strategy;
pub mod transformed;

/// Resolves treat queries against one shared type hierarchy.
///
/// Cloning is cheap; clones share the index.
#[derive(Clone)]
pub struct Resolver {
    index: Arc<TypeHierarchyIndex>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(index: Arc<TypeHierarchyIndex>, config: ResolverConfig) -> Self {
        Resolver { index, config }
    }

    pub fn index(&self) -> &TypeHierarchyIndex {
        &self.index
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Builds and optimizes the join plan of `query`.
    pub fn resolve(&self, query: &TreatQuery) -> ResolveResult<ResolvedPlan> {
        evaluate_treat_query(&self.index, &self.config, query)
    }

    /// The join plan exactly as built, before any optimizer pass runs.
    pub fn resolve_unoptimized(&self, query: &TreatQuery) -> ResolveResult<ResolvedPlan> {
        build_plan(&self.index, &self.config, query)
    }
}

pub fn evaluate_treat_query(
    index: &TypeHierarchyIndex,
    config: &ResolverConfig,
    query: &TreatQuery,
) -> ResolveResult<ResolvedPlan> {
    let plan = build_plan(index, config, query)?;
    let plan = optimizer::optimize(plan, &OptimizerCtx::new(index, config))?;
    debug!(
        "Resolved {} roots into {} joins",
        plan.tree.roots.len(),
        plan.tree.join_count()
    );
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("Optimized plan:\n{}", crate::join_plan::explain::explain(&plan));
    }
    Ok(plan)
}

fn build_plan(
    index: &TypeHierarchyIndex,
    config: &ResolverConfig,
    query: &TreatQuery,
) -> ResolveResult<ResolvedPlan> {
    let normalizer = Normalizer::new(index, config);
    let mut builder = JoinTreeBuilder::new(index, config);
    let mut plan_ctx = PlanCtx::new(config.alias_separator.clone());

    for root in &query.roots {
        if !index.contains(&root.entity) {
            return Err(ResolveError::UnknownType {
                name: root.entity.clone(),
                segment: format!("{} {}", root.entity, root.alias),
            });
        }
        plan_ctx.insert_table_ctx(TableCtx::build(
            root.alias.clone(),
            AliasValue::Entity {
                static_type: root.entity.clone(),
                declared_type: root.entity.clone(),
            },
            true,
        ))?;
        builder.add_root(root)?;
    }

    for join in &query.joins {
        let requests = normalizer.normalize_join(&join.path, &join.alias, join.kind, &mut plan_ctx)?;
        builder.add_joins(&requests)?;
    }

    let mut references = Vec::with_capacity(query.select.len());
    for path in &query.select {
        let normalized = normalizer.normalize_reference(path, &mut plan_ctx)?;
        builder.add_joins(&normalized.joins)?;
        references.push(builder.resolve_terminal(&normalized.terminal)?);
    }

    let mut predicates = Vec::with_capacity(query.predicates.len());
    for predicate in &query.predicates {
        predicates.push(match predicate {
            Predicate::TypeIs {
                clause,
                path,
                types,
            } => {
                check_clause(&builder, clause, &path.to_string())?;
                let normalized = normalizer.normalize_type_operand(path, &mut plan_ctx)?;
                builder.add_joins(&normalized.joins)?;
                builder.resolve_type_is(&normalized.terminal, types, clause)?
            }
            Predicate::Comparison { clause, path, op } => {
                check_clause(&builder, clause, &path.to_string())?;
                let normalized = normalizer.normalize_reference(path, &mut plan_ctx)?;
                builder.add_joins(&normalized.joins)?;
                ResolvedPredicate::Comparison {
                    clause: clause.clone(),
                    path: builder.resolve_terminal(&normalized.terminal)?,
                    op: *op,
                }
            }
            Predicate::Opaque { clause, paths } => {
                let mut resolved = Vec::with_capacity(paths.len());
                for path in paths {
                    check_clause(&builder, clause, &path.to_string())?;
                    let normalized = normalizer.normalize_reference(path, &mut plan_ctx)?;
                    builder.add_joins(&normalized.joins)?;
                    resolved.push(builder.resolve_terminal(&normalized.terminal)?);
                }
                ResolvedPredicate::Opaque {
                    clause: clause.clone(),
                    paths: resolved,
                }
            }
        });
    }

    if log::log_enabled!(log::Level::Trace) {
        log::trace!("Aliases:\n{}", plan_ctx);
    }

    Ok(ResolvedPlan {
        tree: builder.finish(),
        references,
        predicates,
    })
}

fn check_clause(
    builder: &JoinTreeBuilder<'_>,
    clause: &PredicateClause,
    segment: &str,
) -> ResolveResult<()> {
    match clause {
        PredicateClause::Where => Ok(()),
        PredicateClause::On(alias) => builder.check_join_alias(alias, segment),
    }
}
