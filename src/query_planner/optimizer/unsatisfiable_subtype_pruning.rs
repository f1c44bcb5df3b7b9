use log::debug;

use crate::join_plan::{PredicateClause, ResolvedPlan, ResolvedPredicate};
use crate::query_planner::{
    optimizer::{
        errors::Pass,
        optimizer_pass::{OptimizerPass, OptimizerResult},
        restrictions::{self, AllowedTypes},
        OptimizerCtx,
    },
    transformed::Transformed,
};

/// Turns null-rejecting comparisons on treated paths into type facts.
///
/// `TREAT(b AS Sub1).value = 1` is NULL for every row that is not a
/// `Sub1`, so a WHERE clause holding it keeps only `Sub1` rows. Predicates
/// the resolver cannot see into (`COALESCE(..)`, `IS NULL`) prove nothing.
pub struct UnsatisfiableSubtypePruning;

impl UnsatisfiableSubtypePruning {
    fn implied_types(
        plan: &ResolvedPlan,
        ctx: &OptimizerCtx<'_>,
    ) -> OptimizerResult<AllowedTypes> {
        let mut allowed = AllowedTypes::default();
        for predicate in &plan.predicates {
            let ResolvedPredicate::Comparison { clause, path, op } = predicate else {
                continue;
            };
            if !op.rejects_null() || path.always_null {
                continue;
            }
            let Some(treat) = &path.treat else {
                continue;
            };
            // An ON clause only filters the rows of the join it belongs to.
            let applies = match clause {
                PredicateClause::Where => true,
                PredicateClause::On(join) => join == &path.alias,
            };
            if !applies {
                continue;
            }
            let types = ctx.concrete(treat, Pass::UnsatisfiableSubtypePruning)?;
            debug!(
                "{}: `{}` implies {} is one of {:?}",
                Pass::UnsatisfiableSubtypePruning,
                path.expression,
                path.alias,
                types
            );
            allowed.restrict(&path.alias, &types);
        }
        Ok(allowed)
    }
}

impl OptimizerPass for UnsatisfiableSubtypePruning {
    fn optimize(
        &self,
        plan: ResolvedPlan,
        ctx: &OptimizerCtx<'_>,
    ) -> OptimizerResult<Transformed<ResolvedPlan>> {
        let allowed = Self::implied_types(&plan, ctx)?;
        if allowed.is_empty() {
            return Ok(Transformed::No(plan));
        }
        let mut plan = plan;
        let changed =
            restrictions::prune(&mut plan, &allowed, ctx, Pass::UnsatisfiableSubtypePruning)?;
        Ok(Transformed::from_flag(changed, plan))
    }
}
