//! Physical join plan produced by the resolver.
//!
//! A [`JoinTree`] is a forest of [`JoinNode`]s, one tree per FROM root.
//! Each node carries two kinds of children:
//!
//! - `hierarchy`: joins that bring in the other tables of the node's own
//!   entity (supertype and subtype tables under the joined strategy)
//! - `children`: navigation joins hanging off this node
//!
//! Children are evaluated inside their parent, so a LEFT join whose ON
//! clause carries a type restriction null-extends the whole subtree instead
//! of filtering rows of the enclosing query. ON predicates may reference any
//! alias visible from the node: ancestors, their hierarchy nodes, and the
//! node's own hierarchy.

pub mod explain;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity_catalog::InheritanceStrategy;
use crate::query_planner::query::ComparisonOp;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    /// Kind of a join nested below a join of kind `self`. Once a path is
    /// outer-joined, everything reached through it stays outer-joined.
    pub fn cascade(self, requested: JoinKind) -> JoinKind {
        match self {
            JoinKind::Left => JoinKind::Left,
            JoinKind::Inner => requested,
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::Left => write!(f, "LEFT JOIN"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct UnionBranch {
    pub entity: String,
    pub table: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum PhysicalRelation {
    Table {
        name: String,
    },
    /// `UNION ALL` over concrete tables. Every branch projects the entity
    /// name it came from into `discriminator_column`.
    Union {
        branches: Vec<UnionBranch>,
        discriminator_column: String,
    },
}

impl PhysicalRelation {
    pub fn table(name: impl Into<String>) -> Self {
        PhysicalRelation::Table { name: name.into() }
    }

    pub fn is_union(&self) -> bool {
        matches!(self, PhysicalRelation::Union { .. })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum MapSide {
    Key,
    Value,
}

/// What a node brings into the query.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum Materialized {
    /// A FROM root.
    Root { entity: String },
    /// Target of a to-one relation or element of a collection.
    Attribute { name: String },
    /// Link table of a collection, or the collection's basic map key.
    CollectionTable { attribute: String },
    /// Key or value entity of a map reached through `KEY(..)` / `VALUE(..)`.
    MapEntry { attribute: String, side: MapSide },
    /// Table of a supertype of the node's entity.
    Supertype { entity: String },
    /// Table of a subtype of the node's entity.
    Subtype { entity: String },
}

impl Materialized {
    pub fn is_hierarchy(&self) -> bool {
        matches!(
            self,
            Materialized::Supertype { .. } | Materialized::Subtype { .. }
        )
    }
}

/// Row pattern of a joined hierarchy: the row belongs to a type when its
/// table row is present and none of the listed subtype rows are.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct RowPattern {
    pub present: ColumnRef,
    pub absent: Vec<ColumnRef>,
}

/// Physical test deciding whether a row is an instance of a set of types.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum TypeTest {
    Always,
    Never,
    Discriminator {
        column: ColumnRef,
        values: Vec<String>,
    },
    SubtypeRows {
        alternatives: Vec<RowPattern>,
    },
}

impl TypeTest {
    pub fn columns(&self) -> Vec<&ColumnRef> {
        match self {
            TypeTest::Always | TypeTest::Never => vec![],
            TypeTest::Discriminator { column, .. } => vec![column],
            TypeTest::SubtypeRows { alternatives } => alternatives
                .iter()
                .flat_map(|alt| std::iter::once(&alt.present).chain(alt.absent.iter()))
                .collect(),
        }
    }

    fn rename_alias(&mut self, from: &str, to: &str) {
        match self {
            TypeTest::Always | TypeTest::Never => {}
            TypeTest::Discriminator { column, .. } => rename_column(column, from, to),
            TypeTest::SubtypeRows { alternatives } => {
                for alt in alternatives {
                    rename_column(&mut alt.present, from, to);
                    for absent in &mut alt.absent {
                        rename_column(absent, from, to);
                    }
                }
            }
        }
    }
}

fn rename_column(column: &mut ColumnRef, from: &str, to: &str) {
    if column.alias == from {
        column.alias = to.to_string();
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum JoinPredicate {
    ColumnsEqual {
        left: ColumnRef,
        right: ColumnRef,
    },
    /// Rows of `alias` must be instances of one of `types`.
    TypeRestriction {
        alias: String,
        types: Vec<String>,
        test: TypeTest,
    },
}

impl JoinPredicate {
    pub fn columns_equal(left: ColumnRef, right: ColumnRef) -> Self {
        JoinPredicate::ColumnsEqual { left, right }
    }

    /// Aliases whose columns the predicate reads.
    pub fn referenced_aliases(&self) -> Vec<&str> {
        match self {
            JoinPredicate::ColumnsEqual { left, right } => {
                vec![left.alias.as_str(), right.alias.as_str()]
            }
            JoinPredicate::TypeRestriction { test, .. } => test
                .columns()
                .into_iter()
                .map(|column| column.alias.as_str())
                .collect(),
        }
    }

    fn rename_alias(&mut self, from: &str, to: &str) {
        match self {
            JoinPredicate::ColumnsEqual { left, right } => {
                rename_column(left, from, to);
                rename_column(right, from, to);
            }
            JoinPredicate::TypeRestriction { alias, test, .. } => {
                if alias == from {
                    *alias = to.to_string();
                }
                test.rename_alias(from, to);
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct JoinNode {
    pub alias: String,
    /// Alias of the node this one was joined from; `None` for roots.
    pub source_alias: Option<String>,
    pub materializes: Materialized,
    pub relation: PhysicalRelation,
    /// Type whose storage `relation` holds. `None` for link tables.
    pub storage_entity: Option<String>,
    /// Static type of the rows, narrowed by a treat join.
    pub entity: Option<String>,
    pub strategy: Option<InheritanceStrategy>,
    pub kind: JoinKind,
    /// Join condition. For roots these are filters on the root rows.
    pub on: Vec<JoinPredicate>,
    pub hierarchy: Vec<JoinNode>,
    pub children: Vec<JoinNode>,
}

impl JoinNode {
    pub fn new(
        alias: impl Into<String>,
        source_alias: Option<String>,
        materializes: Materialized,
        relation: PhysicalRelation,
        kind: JoinKind,
    ) -> Self {
        JoinNode {
            alias: alias.into(),
            source_alias,
            materializes,
            relation,
            storage_entity: None,
            entity: None,
            strategy: None,
            kind,
            on: vec![],
            hierarchy: vec![],
            children: vec![],
        }
    }

    pub fn find(&self, alias: &str) -> Option<&JoinNode> {
        if self.alias == alias {
            return Some(self);
        }
        self.hierarchy
            .iter()
            .chain(self.children.iter())
            .find_map(|node| node.find(alias))
    }

    pub fn find_mut(&mut self, alias: &str) -> Option<&mut JoinNode> {
        if self.alias == alias {
            return Some(self);
        }
        self.hierarchy
            .iter_mut()
            .chain(self.children.iter_mut())
            .find_map(|node| node.find_mut(alias))
    }

    /// This node and everything below it, parents before children.
    pub fn nodes(&self) -> Vec<&JoinNode> {
        let mut out = vec![self];
        for node in self.hierarchy.iter().chain(self.children.iter()) {
            out.extend(node.nodes());
        }
        out
    }

    /// Alias of the table holding the columns of `entity` for this node's
    /// rows. Only the joined strategy spreads a row over several tables.
    pub fn alias_for_type(&self, entity: &str) -> Option<&str> {
        match self.strategy {
            Some(InheritanceStrategy::Joined) => {
                if self.storage_entity.as_deref() == Some(entity) {
                    return Some(&self.alias);
                }
                self.hierarchy
                    .iter()
                    .find_map(|node| node.alias_for_type(entity))
            }
            Some(_) => Some(&self.alias),
            None => None,
        }
    }

    /// Removes a node anywhere below this one.
    pub fn remove(&mut self, alias: &str) -> Option<JoinNode> {
        if let Some(pos) = self.hierarchy.iter().position(|n| n.alias == alias) {
            return Some(self.hierarchy.remove(pos));
        }
        if let Some(pos) = self.children.iter().position(|n| n.alias == alias) {
            return Some(self.children.remove(pos));
        }
        self.hierarchy
            .iter_mut()
            .chain(self.children.iter_mut())
            .find_map(|node| node.remove(alias))
    }

    pub fn rename_alias(&mut self, from: &str, to: &str) {
        if self.alias == from {
            self.alias = to.to_string();
        }
        if self.source_alias.as_deref() == Some(from) {
            self.source_alias = Some(to.to_string());
        }
        for predicate in &mut self.on {
            predicate.rename_alias(from, to);
        }
        for node in self.hierarchy.iter_mut().chain(self.children.iter_mut()) {
            node.rename_alias(from, to);
        }
    }
}

/// Alias substitution recorded for a root-path treat `TREAT(alias AS treat)`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct RootTreatSubstitution {
    pub alias: String,
    pub treat: String,
    /// Alias of the table holding the treated type's own columns. `None`
    /// when that table was pruned because no row can be of the type.
    pub physical_alias: Option<String>,
    /// Applied to every attribute read through the substitution.
    pub guard: Option<TypeTest>,
}

#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct JoinTree {
    pub roots: Vec<JoinNode>,
    pub root_treats: Vec<RootTreatSubstitution>,
}

impl JoinTree {
    pub fn find(&self, alias: &str) -> Option<&JoinNode> {
        self.roots.iter().find_map(|root| root.find(alias))
    }

    pub fn find_mut(&mut self, alias: &str) -> Option<&mut JoinNode> {
        self.roots.iter_mut().find_map(|root| root.find_mut(alias))
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.find(alias).is_some()
    }

    pub fn nodes(&self) -> Vec<&JoinNode> {
        self.roots.iter().flat_map(|root| root.nodes()).collect()
    }

    /// Joins in the tree, FROM roots excluded.
    pub fn join_count(&self) -> usize {
        self.nodes().len() - self.roots.len()
    }

    pub fn parent_of(&self, alias: &str) -> Option<&JoinNode> {
        self.nodes().into_iter().find(|node| {
            node.hierarchy
                .iter()
                .chain(node.children.iter())
                .any(|child| child.alias == alias)
        })
    }

    pub fn remove(&mut self, alias: &str) -> Option<JoinNode> {
        self.roots.iter_mut().find_map(|root| root.remove(alias))
    }

    pub fn root_treat(&self, alias: &str, treat: &str) -> Option<&RootTreatSubstitution> {
        self.root_treats
            .iter()
            .find(|sub| sub.alias == alias && sub.treat == treat)
    }

    pub fn rename_alias(&mut self, from: &str, to: &str) {
        for root in &mut self.roots {
            root.rename_alias(from, to);
        }
        for sub in &mut self.root_treats {
            if sub.physical_alias.as_deref() == Some(from) {
                sub.physical_alias = Some(to.to_string());
            }
            if let Some(guard) = &mut sub.guard {
                guard.rename_alias(from, to);
            }
        }
    }
}

/// A path reference resolved to a physical column.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ResolvedPath {
    /// The path as written, for diagnostics.
    pub expression: String,
    /// Alias the terminal attributes are read from.
    pub alias: String,
    pub treat: Option<String>,
    pub attributes: Vec<String>,
    /// `None` for composite values such as a whole embeddable.
    pub column: Option<ColumnRef>,
    /// The value reads as NULL unless the guard holds.
    pub guard: Option<TypeTest>,
    /// The path can never produce a value.
    pub always_null: bool,
}

impl ResolvedPath {
    pub fn referenced_aliases(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.column.iter().map(|c| c.alias.as_str()).collect();
        if let Some(guard) = &self.guard {
            out.extend(guard.columns().into_iter().map(|c| c.alias.as_str()));
        }
        out
    }

    pub fn nullify(&mut self) {
        self.column = None;
        self.guard = None;
        self.always_null = true;
    }

    fn rename_alias(&mut self, from: &str, to: &str) {
        if let Some(column) = &mut self.column {
            rename_column(column, from, to);
        }
        if let Some(guard) = &mut self.guard {
            guard.rename_alias(from, to);
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum PredicateClause {
    Where,
    /// ON clause of the join that introduced the alias.
    On(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum ResolvedPredicate {
    TypeIs {
        clause: PredicateClause,
        alias: String,
        types: Vec<String>,
        test: TypeTest,
    },
    Comparison {
        clause: PredicateClause,
        path: ResolvedPath,
        op: ComparisonOp,
    },
    Opaque {
        clause: PredicateClause,
        paths: Vec<ResolvedPath>,
    },
}

impl ResolvedPredicate {
    pub fn clause(&self) -> &PredicateClause {
        match self {
            ResolvedPredicate::TypeIs { clause, .. }
            | ResolvedPredicate::Comparison { clause, .. }
            | ResolvedPredicate::Opaque { clause, .. } => clause,
        }
    }

    /// Paths whose values the predicate reads.
    pub fn paths(&self) -> Vec<&ResolvedPath> {
        match self {
            ResolvedPredicate::TypeIs { .. } => vec![],
            ResolvedPredicate::Comparison { path, .. } => vec![path],
            ResolvedPredicate::Opaque { paths, .. } => paths.iter().collect(),
        }
    }

    pub fn paths_mut(&mut self) -> Vec<&mut ResolvedPath> {
        match self {
            ResolvedPredicate::TypeIs { .. } => vec![],
            ResolvedPredicate::Comparison { path, .. } => vec![path],
            ResolvedPredicate::Opaque { paths, .. } => paths.iter_mut().collect(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedPlan {
    pub tree: JoinTree,
    pub references: Vec<ResolvedPath>,
    pub predicates: Vec<ResolvedPredicate>,
}

impl ResolvedPlan {
    pub fn rename_alias(&mut self, from: &str, to: &str) {
        self.tree.rename_alias(from, to);
        for path in &mut self.references {
            path.rename_alias(from, to);
        }
        for predicate in &mut self.predicates {
            match predicate {
                ResolvedPredicate::TypeIs {
                    clause,
                    alias,
                    test,
                    ..
                } => {
                    if alias == from {
                        *alias = to.to_string();
                    }
                    if let PredicateClause::On(on) = clause {
                        if on == from {
                            *on = to.to_string();
                        }
                    }
                    test.rename_alias(from, to);
                }
                ResolvedPredicate::Comparison { clause, .. }
                | ResolvedPredicate::Opaque { clause, .. } => {
                    if let PredicateClause::On(on) = clause {
                        if on == from {
                            *on = to.to_string();
                        }
                    }
                }
            }
            for path in predicate.paths_mut() {
                path.rename_alias(from, to);
            }
        }
    }
}
