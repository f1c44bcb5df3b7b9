//! Optimizer pass trait and result types.
//!
//! Defines the [`OptimizerPass`] trait that all optimization passes implement,
//! enabling a uniform interface for plan transformation.
//!
//! # Implementing a Pass
//!
//! ```ignore
//! impl OptimizerPass for MyPass {
//!     fn optimize(&self, plan: ResolvedPlan, ctx: &OptimizerCtx<'_>)
//!         -> OptimizerResult<Transformed<ResolvedPlan>> {
//!         // Transform plan here
//!     }
//! }
//! ```
//!
//! A pass must never change the rows the plan produces. When it cannot
//! prove a rewrite safe it returns `Transformed::No` with the plan as given.

use crate::join_plan::ResolvedPlan;
use crate::query_planner::{
    optimizer::{errors::OptimizerError, OptimizerCtx},
    transformed::Transformed,
};

pub type OptimizerResult<T> = Result<T, OptimizerError>;

pub trait OptimizerPass {
    fn optimize(
        &self,
        plan: ResolvedPlan,
        ctx: &OptimizerCtx<'_>,
    ) -> OptimizerResult<Transformed<ResolvedPlan>>;
}
