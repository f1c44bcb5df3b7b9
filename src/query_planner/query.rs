//! The query envelope handed to the resolver: FROM roots, explicit joins,
//! selected paths and the predicates the optimizer can learn from.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::join_plan::{JoinKind, PredicateClause};

use super::path_expr::PathExpression;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FromRoot {
    pub entity: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryJoin {
    pub path: PathExpression,
    pub alias: String,
    pub kind: JoinKind,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl ComparisonOp {
    /// Whether a NULL operand can never satisfy the comparison.
    pub fn rejects_null(self) -> bool {
        !matches!(self, ComparisonOp::IsNull)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = match self {
            ComparisonOp::Eq => "= ?",
            ComparisonOp::NotEq => "<> ?",
            ComparisonOp::Lt => "< ?",
            ComparisonOp::LtEq => "<= ?",
            ComparisonOp::Gt => "> ?",
            ComparisonOp::GtEq => ">= ?",
            ComparisonOp::Like => "LIKE ?",
            ComparisonOp::In => "IN (?)",
            ComparisonOp::IsNull => "IS NULL",
            ComparisonOp::IsNotNull => "IS NOT NULL",
        };
        write!(f, "{}", rendered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Predicate {
    /// `TYPE(path) IN (types)`
    TypeIs {
        clause: PredicateClause,
        path: PathExpression,
        types: Vec<String>,
    },
    /// `path <op> <operand>`; only the path side matters for resolution.
    Comparison {
        clause: PredicateClause,
        path: PathExpression,
        op: ComparisonOp,
    },
    /// Any other condition, e.g. `COALESCE(p.value, 0) < 100`. The paths are
    /// resolved but never used to prove anything about types.
    Opaque {
        clause: PredicateClause,
        paths: Vec<PathExpression>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreatQuery {
    pub roots: Vec<FromRoot>,
    #[serde(default)]
    pub joins: Vec<QueryJoin>,
    #[serde(default)]
    pub select: Vec<PathExpression>,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
}

impl TreatQuery {
    pub fn new(entity: impl Into<String>, alias: impl Into<String>) -> Self {
        TreatQuery::default().with_root(entity, alias)
    }

    pub fn with_root(mut self, entity: impl Into<String>, alias: impl Into<String>) -> Self {
        self.roots.push(FromRoot {
            entity: entity.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn join(mut self, kind: JoinKind, path: PathExpression, alias: impl Into<String>) -> Self {
        self.joins.push(QueryJoin {
            path,
            alias: alias.into(),
            kind,
        });
        self
    }

    pub fn left_join(self, path: PathExpression, alias: impl Into<String>) -> Self {
        self.join(JoinKind::Left, path, alias)
    }

    pub fn inner_join(self, path: PathExpression, alias: impl Into<String>) -> Self {
        self.join(JoinKind::Inner, path, alias)
    }

    pub fn select(mut self, path: PathExpression) -> Self {
        self.select.push(path);
        self
    }

    pub fn where_type<S: Into<String>>(
        mut self,
        path: PathExpression,
        types: impl IntoIterator<Item = S>,
    ) -> Self {
        self.predicates.push(Predicate::TypeIs {
            clause: PredicateClause::Where,
            path,
            types: types.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn where_compare(mut self, path: PathExpression, op: ComparisonOp) -> Self {
        self.predicates.push(Predicate::Comparison {
            clause: PredicateClause::Where,
            path,
            op,
        });
        self
    }

    pub fn where_opaque(mut self, paths: impl IntoIterator<Item = PathExpression>) -> Self {
        self.predicates.push(Predicate::Opaque {
            clause: PredicateClause::Where,
            paths: paths.into_iter().collect(),
        });
        self
    }

    /// Adds a predicate to the ON clause of the explicit join `alias`.
    pub fn on(mut self, alias: impl Into<String>, predicate: Predicate) -> Self {
        let clause = PredicateClause::On(alias.into());
        self.predicates.push(match predicate {
            Predicate::TypeIs { path, types, .. } => Predicate::TypeIs {
                clause,
                path,
                types,
            },
            Predicate::Comparison { path, op, .. } => Predicate::Comparison { clause, path, op },
            Predicate::Opaque { paths, .. } => Predicate::Opaque { clause, paths },
        });
        self
    }
}
