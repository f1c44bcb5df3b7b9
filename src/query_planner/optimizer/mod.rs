//! Plan-level rewrites run after the join tree is built.
//!
//! Each pass only removes joins, union branches or guards that cannot
//! change the result. Passes run in a fixed order and each is idempotent,
//! so running the whole pipeline twice yields the same plan.

use std::collections::BTreeSet;

use crate::config::ResolverConfig;
use crate::entity_catalog::TypeHierarchyIndex;
use crate::join_plan::ResolvedPlan;
use crate::query_planner::optimizer::{
    errors::{OptimizerError, Pass},
    optimizer_pass::{OptimizerPass, OptimizerResult},
    supertype_join_elimination::SupertypeJoinElimination,
    type_filter_pruning::TypeFilterPruning,
    unsatisfiable_subtype_pruning::UnsatisfiableSubtypePruning,
};

pub mod errors;
pub mod optimizer_pass;
mod restrictions;
mod supertype_join_elimination;
mod type_filter_pruning;
mod unsatisfiable_subtype_pruning;

pub struct OptimizerCtx<'a> {
    pub index: &'a TypeHierarchyIndex,
    pub config: &'a ResolverConfig,
}

impl<'a> OptimizerCtx<'a> {
    pub fn new(index: &'a TypeHierarchyIndex, config: &'a ResolverConfig) -> Self {
        OptimizerCtx { index, config }
    }

    pub(crate) fn concrete(&self, entity: &str, pass: Pass) -> OptimizerResult<BTreeSet<String>> {
        let concrete = self
            .index
            .concrete_subtree(entity)
            .map_err(|source| OptimizerError::Catalog { pass, source })?;
        Ok(concrete.into_iter().map(str::to_string).collect())
    }
}

fn log_plan(stage: &str, plan: &ResolvedPlan) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    log::trace!("{}:\n{}", stage, plan.tree);
}

pub fn optimize(plan: ResolvedPlan, ctx: &OptimizerCtx<'_>) -> OptimizerResult<ResolvedPlan> {
    log_plan("Plan before optimization", &plan);
    let mut plan = plan;

    if ctx.config.type_filter_pruning {
        let transformed = TypeFilterPruning.optimize(plan, ctx)?;
        if transformed.is_yes() {
            log::debug!("{} changed the plan", Pass::TypeFilterPruning);
        }
        plan = transformed.get_plan();
    }

    if ctx.config.unsatisfiable_subtype_pruning {
        let transformed = UnsatisfiableSubtypePruning.optimize(plan, ctx)?;
        if transformed.is_yes() {
            log::debug!("{} changed the plan", Pass::UnsatisfiableSubtypePruning);
        }
        plan = transformed.get_plan();
    }

    // Runs last: pruning may leave hierarchy joins nothing reads any more.
    if ctx.config.supertype_join_elimination {
        let transformed = SupertypeJoinElimination.optimize(plan, ctx)?;
        if transformed.is_yes() {
            log::debug!("{} changed the plan", Pass::SupertypeJoinElimination);
        }
        plan = transformed.get_plan();
    }

    log_plan("Plan after optimization", &plan);
    Ok(plan)
}
