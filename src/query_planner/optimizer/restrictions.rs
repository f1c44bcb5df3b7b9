//! Facts about the types an alias can hold, and the pruning they allow.
//!
//! Every fact is a set of concrete types a non-null row of an alias must
//! belong to. Facts about the same alias intersect. Given those sets:
//!
//! - reads through a treat of a type outside the set are always NULL
//! - joined subtype tables outside the set contribute nothing and can go,
//!   provided nothing else still reads them
//! - table-per-class union branches outside the set can go

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::debug;

use crate::entity_catalog::InheritanceStrategy;
use crate::join_plan::{
    JoinNode, JoinPredicate, Materialized, PhysicalRelation, PredicateClause, ResolvedPlan,
    ResolvedPredicate,
};

use super::errors::Pass;
use super::optimizer_pass::OptimizerResult;
use super::OptimizerCtx;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowedTypes {
    allowed: BTreeMap<String, BTreeSet<String>>,
}

impl AllowedTypes {
    pub fn restrict<'t>(&mut self, alias: &str, types: impl IntoIterator<Item = &'t String>) {
        let incoming: BTreeSet<String> = types.into_iter().cloned().collect();
        match self.allowed.get_mut(alias) {
            Some(current) => current.retain(|t| incoming.contains(t)),
            None => {
                self.allowed.insert(alias.to_string(), incoming);
            }
        }
    }

    /// Facts stated by `TYPE(..)` predicates and by the type restrictions
    /// joins carry for their own alias.
    pub fn from_type_predicates(plan: &ResolvedPlan) -> Self {
        let mut allowed = AllowedTypes::default();
        for predicate in &plan.predicates {
            if let ResolvedPredicate::TypeIs {
                clause,
                alias,
                types,
                ..
            } = predicate
            {
                let applies = match clause {
                    PredicateClause::Where => true,
                    PredicateClause::On(join) => join == alias,
                };
                if applies {
                    allowed.restrict(alias, types);
                }
            }
        }
        for node in plan.tree.nodes() {
            for predicate in &node.on {
                if let JoinPredicate::TypeRestriction { alias, types, .. } = predicate {
                    if alias == &node.alias {
                        allowed.restrict(alias, types);
                    }
                }
            }
        }
        allowed
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn get(&self, alias: &str) -> Option<&BTreeSet<String>> {
        self.allowed.get(alias)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.allowed.iter()
    }
}

/// Applies `allowed` to the plan. Returns whether anything changed.
pub fn prune(
    plan: &mut ResolvedPlan,
    allowed: &AllowedTypes,
    ctx: &OptimizerCtx<'_>,
    pass: Pass,
) -> OptimizerResult<bool> {
    let mut changed = false;
    for (alias, types) in allowed.iter() {
        let Some(node) = plan.tree.find(alias) else {
            continue;
        };
        let strategy = node.strategy;
        let excluded = match strategy {
            Some(InheritanceStrategy::Joined) => {
                let mut excluded = Vec::new();
                excluded_subtypes(node, types, ctx, pass, &mut excluded)?;
                excluded
            }
            _ => vec![],
        };

        changed |= nullify_dead_reads(plan, alias, types, ctx, pass)?;

        for subtype in excluded {
            let Some(subtree) = plan.tree.find(&subtype).map(subtree_aliases) else {
                continue;
            };
            if referenced_outside(plan, &subtree) {
                debug!("{}: keeping {}, still referenced", pass, subtype);
                continue;
            }
            plan.tree.remove(&subtype);
            debug!("{}: pruned subtype join {} of {}", pass, subtype, alias);
            changed = true;
        }

        if strategy == Some(InheritanceStrategy::TablePerClass) {
            let node = plan.tree.find_mut(alias).ok_or_else(|| {
                super::errors::OptimizerError::MissingJoin {
                    pass,
                    alias: alias.clone(),
                }
            })?;
            // The union is kept even with one branch left: tests may read its
            // discriminator column.
            if let PhysicalRelation::Union { branches, .. } = &mut node.relation {
                let before = branches.len();
                branches.retain(|branch| types.contains(&branch.entity));
                if branches.len() != before {
                    debug!(
                        "{}: {} keeps {} of {} union branches",
                        pass,
                        alias,
                        branches.len(),
                        before
                    );
                    changed = true;
                }
            }
        }
    }
    Ok(changed)
}

/// Subtype joins below `node` whose whole subtree lies outside `types`.
fn excluded_subtypes(
    node: &JoinNode,
    types: &BTreeSet<String>,
    ctx: &OptimizerCtx<'_>,
    pass: Pass,
    out: &mut Vec<String>,
) -> OptimizerResult<()> {
    for child in &node.hierarchy {
        let Materialized::Subtype { entity } = &child.materializes else {
            continue;
        };
        let concrete = ctx.concrete(entity, pass)?;
        if concrete.is_disjoint(types) {
            out.push(child.alias.clone());
        } else {
            excluded_subtypes(child, types, ctx, pass, out)?;
        }
    }
    Ok(())
}

/// Nullifies reads through a treat of `alias` that no allowed row can satisfy.
fn nullify_dead_reads(
    plan: &mut ResolvedPlan,
    alias: &str,
    types: &BTreeSet<String>,
    ctx: &OptimizerCtx<'_>,
    pass: Pass,
) -> OptimizerResult<bool> {
    let mut changed = false;
    let paths = plan
        .references
        .iter_mut()
        .chain(plan.predicates.iter_mut().flat_map(|p| p.paths_mut()));
    for path in paths {
        if path.alias != alias || path.always_null {
            continue;
        }
        if let Some(treat) = &path.treat {
            if ctx.concrete(treat, pass)?.is_disjoint(types) {
                debug!("{}: `{}` can never be non-null", pass, path.expression);
                path.nullify();
                changed = true;
            }
        }
    }
    for sub in &mut plan.tree.root_treats {
        if sub.alias != alias || (sub.physical_alias.is_none() && sub.guard.is_none()) {
            continue;
        }
        if ctx.concrete(&sub.treat, pass)?.is_disjoint(types) {
            sub.physical_alias = None;
            sub.guard = None;
            changed = true;
        }
    }
    Ok(changed)
}

pub(super) fn subtree_aliases(node: &JoinNode) -> HashSet<String> {
    node.nodes().into_iter().map(|n| n.alias.clone()).collect()
}

/// Whether anything outside the nodes `subtree` reads one of them.
pub(super) fn referenced_outside(plan: &ResolvedPlan, subtree: &HashSet<String>) -> bool {
    let hit = |alias: &str| subtree.contains(alias);

    let path_hit = plan
        .references
        .iter()
        .chain(plan.predicates.iter().flat_map(|p| p.paths()))
        .any(|path| path.referenced_aliases().into_iter().any(hit));
    if path_hit {
        return true;
    }

    let type_test_hit = plan.predicates.iter().any(|predicate| match predicate {
        ResolvedPredicate::TypeIs { test, .. } => {
            test.columns().into_iter().any(|c| hit(&c.alias))
        }
        _ => false,
    });
    if type_test_hit {
        return true;
    }

    let root_treat_hit = plan.tree.root_treats.iter().any(|sub| {
        sub.physical_alias.as_deref().is_some_and(hit)
            || sub
                .guard
                .as_ref()
                .is_some_and(|g| g.columns().into_iter().any(|c| hit(&c.alias)))
    });
    if root_treat_hit {
        return true;
    }

    plan.tree
        .nodes()
        .into_iter()
        .filter(|node| !subtree.contains(&node.alias))
        .flat_map(|node| node.on.iter())
        .any(|predicate| predicate.referenced_aliases().into_iter().any(hit))
}
