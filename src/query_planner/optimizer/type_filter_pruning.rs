use crate::join_plan::ResolvedPlan;
use crate::query_planner::{
    optimizer::{
        errors::Pass,
        optimizer_pass::{OptimizerPass, OptimizerResult},
        restrictions::{self, AllowedTypes},
        OptimizerCtx,
    },
    transformed::Transformed,
};

/// Prunes subtype joins and union branches that `TYPE(..)` filters and
/// treat joins rule out.
///
/// A `WHERE TYPE(b) IN (Sub1)` means no surviving row of `b` is a `Sub2`,
/// so the `Sub2` subtype table of `b` contributes nothing and reads of
/// `TREAT(b AS Sub2)` are always NULL.
pub struct TypeFilterPruning;

impl OptimizerPass for TypeFilterPruning {
    fn optimize(
        &self,
        plan: ResolvedPlan,
        ctx: &OptimizerCtx<'_>,
    ) -> OptimizerResult<Transformed<ResolvedPlan>> {
        let allowed = AllowedTypes::from_type_predicates(&plan);
        if allowed.is_empty() {
            return Ok(Transformed::No(plan));
        }
        let mut plan = plan;
        let changed = restrictions::prune(&mut plan, &allowed, ctx, Pass::TypeFilterPruning)?;
        Ok(Transformed::from_flag(changed, plan))
    }
}
