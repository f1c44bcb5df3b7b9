//! Drops hierarchy joins nothing reads from.
//!
//! Under the joined strategy an entity join brings in the tables of every
//! supertype (inner) and subtype (left) of its entity. A supertype join on
//! the shared id always matches and a subtype join never multiplies rows,
//! so either can go once no column, guard or join condition outside it
//! reads its tables.
//!
//! A treat join `JOIN TREAT(b.parent AS Sub1) p` is shaped as a join to the
//! declared type's table restricted to rows with a `Sub1` row. When nothing
//! but the shared id is read from the declared table, the join is
//! re-anchored onto the `Sub1` table itself and the restriction dropped.

use std::collections::HashSet;

use log::debug;

use crate::entity_catalog::{CatalogError, InheritanceStrategy};
use crate::join_plan::{
    ColumnRef, JoinNode, JoinPredicate, Materialized, ResolvedPlan, ResolvedPredicate, RowPattern,
    TypeTest,
};
use crate::query_planner::{
    optimizer::{
        errors::{OptimizerError, Pass},
        optimizer_pass::{OptimizerPass, OptimizerResult},
        restrictions::{referenced_outside, subtree_aliases},
        OptimizerCtx,
    },
    transformed::Transformed,
};

pub struct SupertypeJoinElimination;

/// A treat join that can read the narrowed type's table directly.
#[derive(Debug)]
struct Reanchor {
    alias: String,
    /// Subtype join holding the narrowed type's rows.
    present: String,
    /// Subtype joins between `alias` and `present`.
    between: Vec<String>,
}

impl SupertypeJoinElimination {
    fn drop_unreferenced(plan: &mut ResolvedPlan) -> bool {
        let mut changed = false;
        loop {
            let view: &ResolvedPlan = plan;
            let candidate = view
                .tree
                .nodes()
                .into_iter()
                .filter(|node| node.materializes.is_hierarchy())
                .find(|node| !referenced_outside(view, &subtree_aliases(node)))
                .map(|node| node.alias.clone());
            let Some(alias) = candidate else {
                return changed;
            };
            debug!(
                "{}: dropping unreferenced hierarchy join {}",
                Pass::SupertypeJoinElimination,
                alias
            );
            plan.tree.remove(&alias);
            changed = true;
        }
    }

    fn reanchor_candidates(
        plan: &ResolvedPlan,
        ctx: &OptimizerCtx<'_>,
    ) -> OptimizerResult<Vec<Reanchor>> {
        let mut out = Vec::new();
        for node in plan.tree.nodes() {
            if node.strategy != Some(InheritanceStrategy::Joined)
                || node.source_alias.is_none()
                || node.materializes.is_hierarchy()
            {
                continue;
            }
            let Some(present) = single_subtype_restriction(node) else {
                continue;
            };
            let Some(between) = chain_to(node, present) else {
                continue;
            };
            let Some(storage) = node.storage_entity.as_deref() else {
                continue;
            };
            let id = catalog(ctx.index.id_column(storage))?;

            // The node's join conditions keep reading `id` after the swap
            let mut shares_id = true;
            for alias in between.iter().map(String::as_str).chain([present]) {
                let entity = plan
                    .tree
                    .find(alias)
                    .and_then(|hop| hop.storage_entity.as_deref());
                shares_id &= match entity {
                    Some(entity) => catalog(ctx.index.id_column(entity))? == id,
                    None => false,
                };
            }
            if !shares_id {
                debug!(
                    "{}: {} keeps its declared table, {} has its own id column",
                    Pass::SupertypeJoinElimination,
                    node.alias,
                    present
                );
                continue;
            }

            let mut covered: HashSet<&str> = between.iter().map(String::as_str).collect();
            covered.insert(&node.alias);
            let only_id = column_refs(plan, node, present, &between)
                .into_iter()
                .filter(|column| covered.contains(column.alias.as_str()))
                .all(|column| column.column == id);
            if only_id {
                out.push(Reanchor {
                    alias: node.alias.clone(),
                    present: present.to_string(),
                    between,
                });
            }
        }
        Ok(out)
    }

    fn reanchor(plan: &mut ResolvedPlan, target: Reanchor) -> OptimizerResult<bool> {
        let missing = |alias: &str| OptimizerError::MissingJoin {
            pass: Pass::SupertypeJoinElimination,
            alias: alias.to_string(),
        };
        let node = plan
            .tree
            .find_mut(&target.alias)
            .ok_or_else(|| missing(&target.alias))?;
        let Some(head) = node.hierarchy.pop() else {
            return Ok(false);
        };
        let present = take_chain(head, &target.present).ok_or_else(|| missing(&target.present))?;

        node.relation = present.relation;
        node.storage_entity = present.storage_entity;
        node.hierarchy = present.hierarchy;
        let own = target.alias.clone();
        node.on.retain(|predicate| {
            !matches!(predicate, JoinPredicate::TypeRestriction { alias, .. } if *alias == own)
        });

        plan.rename_alias(&target.present, &target.alias);
        for alias in &target.between {
            plan.rename_alias(alias, &target.alias);
        }
        debug!(
            "{}: {} now reads {} directly",
            Pass::SupertypeJoinElimination,
            target.alias,
            target.present
        );
        Ok(true)
    }
}

impl OptimizerPass for SupertypeJoinElimination {
    fn optimize(
        &self,
        plan: ResolvedPlan,
        ctx: &OptimizerCtx<'_>,
    ) -> OptimizerResult<Transformed<ResolvedPlan>> {
        let mut plan = plan;
        let mut changed = Self::drop_unreferenced(&mut plan);

        let mut reanchored = false;
        for target in Self::reanchor_candidates(&plan, ctx)? {
            reanchored |= Self::reanchor(&mut plan, target)?;
        }
        if reanchored {
            Self::drop_unreferenced(&mut plan);
            changed = true;
        }
        Ok(Transformed::from_flag(changed, plan))
    }
}

fn catalog<T>(result: Result<T, CatalogError>) -> OptimizerResult<T> {
    result.map_err(|source| OptimizerError::Catalog {
        pass: Pass::SupertypeJoinElimination,
        source,
    })
}

/// Alias of the single table whose presence restricts `node`'s rows.
fn single_subtype_restriction(node: &JoinNode) -> Option<&str> {
    let mut own = node.on.iter().filter_map(|predicate| match predicate {
        JoinPredicate::TypeRestriction { alias, test, .. } if *alias == node.alias => Some(test),
        _ => None,
    });
    let test = own.next()?;
    if own.next().is_some() {
        return None;
    }
    match test {
        TypeTest::SubtypeRows { alternatives } => match alternatives.as_slice() {
            [RowPattern { present, absent }] if absent.is_empty() && present.alias != node.alias => {
                Some(present.alias.as_str())
            }
            _ => None,
        },
        _ => None,
    }
}

/// Subtype joins strictly between `node` and `present`, if they form a chain
/// of single hierarchy joins.
fn chain_to(node: &JoinNode, present: &str) -> Option<Vec<String>> {
    let mut between = Vec::new();
    let mut current = node;
    loop {
        let [next] = current.hierarchy.as_slice() else {
            return None;
        };
        if !matches!(next.materializes, Materialized::Subtype { .. }) {
            return None;
        }
        if next.alias == present {
            return Some(between);
        }
        between.push(next.alias.clone());
        current = next;
    }
}

fn take_chain(mut node: JoinNode, present: &str) -> Option<JoinNode> {
    loop {
        if node.alias == present {
            return Some(node);
        }
        if node.hierarchy.len() != 1 {
            return None;
        }
        node = node.hierarchy.pop()?;
    }
}

/// Every column the plan reads, except the join conditions that vanish when
/// `node` is re-anchored onto `present`.
fn column_refs<'p>(
    plan: &'p ResolvedPlan,
    node: &JoinNode,
    present: &str,
    between: &[String],
) -> Vec<&'p ColumnRef> {
    let mut out = Vec::new();
    for path in plan
        .references
        .iter()
        .chain(plan.predicates.iter().flat_map(|p| p.paths()))
    {
        out.extend(path.column.iter());
        if let Some(guard) = &path.guard {
            out.extend(guard.columns());
        }
    }
    for predicate in &plan.predicates {
        if let ResolvedPredicate::TypeIs { test, .. } = predicate {
            out.extend(test.columns());
        }
    }
    for sub in &plan.tree.root_treats {
        if let Some(guard) = &sub.guard {
            out.extend(guard.columns());
        }
    }
    for other in plan.tree.nodes() {
        let vanishing = other.alias == present || between.contains(&other.alias);
        if vanishing {
            continue;
        }
        for predicate in &other.on {
            match predicate {
                JoinPredicate::ColumnsEqual { left, right } => {
                    out.push(left);
                    out.push(right);
                }
                JoinPredicate::TypeRestriction { alias, test, .. } => {
                    if other.alias == node.alias && *alias == node.alias {
                        continue;
                    }
                    out.extend(test.columns());
                }
            }
        }
    }
    out
}
