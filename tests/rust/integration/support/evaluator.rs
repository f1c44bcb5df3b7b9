//! Executes a resolved plan over an in-memory [`Database`].
//!
//! A node and everything below it form one unit: its hierarchy and child
//! joins are evaluated first, then the node's ON predicates filter the
//! combined rows. A LEFT node with no surviving rows leaves the whole unit
//! NULL, which is exactly how a nested `LEFT JOIN (..) ON ..` behaves.

use std::collections::HashMap;

use polytreat::join_plan::{
    ColumnRef, JoinKind, JoinNode, JoinPredicate, PhysicalRelation, PredicateClause, ResolvedPath,
    ResolvedPredicate, TypeTest,
};
use polytreat::{ComparisonOp, ResolvedPlan};

use super::data::{Database, Row, Value};

/// Bound rows by alias; a missing alias is NULL-extended.
type Binding = HashMap<String, Row>;

pub type ResultRow = Vec<Option<Value>>;

pub struct Evaluator<'a> {
    db: &'a Database,
}

impl<'a> Evaluator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Evaluator { db }
    }

    /// Result rows of `plan`, one value per selected path, sorted.
    pub fn run(&self, plan: &ResolvedPlan) -> Vec<ResultRow> {
        let mut bindings = vec![Binding::new()];
        for root in &plan.tree.roots {
            bindings = bindings
                .iter()
                .flat_map(|outer| self.join_node(root, outer))
                .collect();
        }

        let mut rows: Vec<ResultRow> = bindings
            .iter()
            .filter(|binding| {
                plan.predicates
                    .iter()
                    .all(|predicate| self.where_holds(predicate, binding))
            })
            .map(|binding| {
                plan.references
                    .iter()
                    .map(|path| self.read(path, binding))
                    .collect()
            })
            .collect();
        rows.sort();
        rows
    }

    /// Values of the single selected path, sorted.
    pub fn column(&self, plan: &ResolvedPlan) -> Vec<Option<Value>> {
        self.run(plan)
            .into_iter()
            .map(|mut row| row.remove(0))
            .collect()
    }

    fn relation_rows(&self, relation: &PhysicalRelation) -> Vec<Row> {
        match relation {
            PhysicalRelation::Table { name } => self.db.rows(name).to_vec(),
            PhysicalRelation::Union {
                branches,
                discriminator_column,
            } => branches
                .iter()
                .flat_map(|branch| {
                    self.db.rows(&branch.table).iter().map(move |row| {
                        let mut row = row.clone();
                        row.insert(
                            discriminator_column.clone(),
                            Value::Text(branch.entity.clone()),
                        );
                        row
                    })
                })
                .collect(),
        }
    }

    fn join_node(&self, node: &JoinNode, outer: &Binding) -> Vec<Binding> {
        let mut matched = Vec::new();
        for row in self.relation_rows(&node.relation) {
            let mut binding = outer.clone();
            binding.insert(node.alias.clone(), row);
            for unit in self.join_children(node, binding) {
                if node.on.iter().all(|predicate| self.on_holds(predicate, &unit)) {
                    matched.push(unit);
                }
            }
        }
        if matched.is_empty() && node.kind == JoinKind::Left {
            return vec![outer.clone()];
        }
        matched
    }

    fn join_children(&self, node: &JoinNode, binding: Binding) -> Vec<Binding> {
        let mut current = vec![binding];
        for child in node.hierarchy.iter().chain(node.children.iter()) {
            current = current
                .iter()
                .flat_map(|outer| self.join_node(child, outer))
                .collect();
        }
        current
    }

    fn value(&self, column: &ColumnRef, binding: &Binding) -> Option<Value> {
        binding
            .get(&column.alias)
            .and_then(|row| row.get(&column.column))
            .cloned()
    }

    fn on_holds(&self, predicate: &JoinPredicate, binding: &Binding) -> bool {
        match predicate {
            JoinPredicate::ColumnsEqual { left, right } => {
                match (self.value(left, binding), self.value(right, binding)) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                }
            }
            JoinPredicate::TypeRestriction { test, .. } => self.test_holds(test, binding),
        }
    }

    fn test_holds(&self, test: &TypeTest, binding: &Binding) -> bool {
        match test {
            TypeTest::Always => true,
            TypeTest::Never => false,
            TypeTest::Discriminator { column, values } => self
                .value(column, binding)
                .is_some_and(|value| values.contains(&value.render())),
            TypeTest::SubtypeRows { alternatives } => alternatives.iter().any(|alt| {
                self.value(&alt.present, binding).is_some()
                    && alt
                        .absent
                        .iter()
                        .all(|column| self.value(column, binding).is_none())
            }),
        }
    }

    fn read(&self, path: &ResolvedPath, binding: &Binding) -> Option<Value> {
        if path.always_null {
            return None;
        }
        if let Some(guard) = &path.guard {
            if !self.test_holds(guard, binding) {
                return None;
            }
        }
        path.column
            .as_ref()
            .and_then(|column| self.value(column, binding))
    }

    fn where_holds(&self, predicate: &ResolvedPredicate, binding: &Binding) -> bool {
        if predicate.clause() != &PredicateClause::Where {
            return true;
        }
        match predicate {
            ResolvedPredicate::TypeIs { alias, test, .. } => {
                binding.contains_key(alias) && self.test_holds(test, binding)
            }
            ResolvedPredicate::Comparison { path, op, .. } => match op {
                ComparisonOp::IsNull => self.read(path, binding).is_none(),
                ComparisonOp::IsNotNull => self.read(path, binding).is_some(),
                other => panic!("the evaluator has no operand for `{}`", other),
            },
            // Opaque conditions are accepted as true; only the plan shape is checked
            ResolvedPredicate::Opaque { .. } => true,
        }
    }
}

pub fn int(value: i64) -> Option<Value> {
    Some(Value::Int(value))
}
