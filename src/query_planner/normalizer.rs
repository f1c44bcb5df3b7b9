//! Path normalization.
//!
//! A path is walked from its root outwards. Wherever a TREAT is applied to a
//! navigated relation, or a path continues past an entity-valued attribute,
//! the prefix becomes a join request of its own:
//!
//! ```text
//! TREAT(TREAT(b AS Sub1).parent1 AS Sub1).sub1Value
//!   => join b.parent1 (b treated as Sub1) as b_parent1
//!      read TREAT(b_parent1 AS Sub1).sub1Value
//! ```
//!
//! What remains is a terminal read of attributes off a single alias,
//! optionally through one treat of that alias, which the join builder
//! resolves without further joins.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{ImplicitJoinSemantics, ResolverConfig};
use crate::entity_catalog::{
    Attribute, AttributeKind, CollectionMapping, CollectionStorage, MapKeyType,
    TypeHierarchyIndex,
};
use crate::join_plan::JoinKind;

use super::errors::{ResolveError, ResolveResult};
use super::path_expr::PathExpression;
use super::plan_ctx::{AliasValue, ImplicitJoinKey, MapOrigin, PlanCtx, TableCtx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinSide {
    /// The relation target, or the element of a collection.
    Element,
    MapKey,
    MapValue,
}

/// One join the builder must add, in dependency order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub alias: String,
    pub source: String,
    /// Treat applied to `source` before navigating.
    pub source_treat: Option<String>,
    /// Embedded attributes followed by exactly one relation attribute.
    pub attributes: Vec<String>,
    pub side: JoinSide,
    pub kind: JoinKind,
    pub explicit: bool,
    /// Explicit treat join target: `JOIN TREAT(b.parent AS Sub1) s1`.
    pub narrow_to: Option<String>,
    pub segment: String,
}

impl fmt::Display for JoinRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source_treat {
            Some(treat) => format!("TREAT({} AS {})", self.source, treat),
            None => self.source.clone(),
        };
        let mut path = format!("{}.{}", source, self.attributes.join("."));
        match self.side {
            JoinSide::Element => {}
            JoinSide::MapKey => path = format!("KEY({})", path),
            JoinSide::MapValue => path = format!("VALUE({})", path),
        }
        if let Some(target) = &self.narrow_to {
            path = format!("TREAT({} AS {})", path, target);
        }
        write!(f, "{} {} {}", self.kind, path, self.alias)
    }
}

/// Attribute read off a single alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalPath {
    pub alias: String,
    pub treat: Option<String>,
    pub attributes: Vec<String>,
    /// The path as written.
    pub expression: String,
}

impl TerminalPath {
    /// The flat path this terminal reads, e.g. `TREAT(b_parent AS Sub1).sub1Value`.
    pub fn to_path_expression(&self) -> PathExpression {
        let mut path = PathExpression::root(self.alias.clone());
        if let Some(treat) = &self.treat {
            path = path.treat(treat.clone());
        }
        self.attributes
            .iter()
            .fold(path, |path, attribute| path.nav(attribute.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    pub joins: Vec<JoinRequest>,
    pub terminal: TerminalPath,
}

impl NormalizedPath {
    pub fn to_path_expression(&self) -> PathExpression {
        self.terminal.to_path_expression()
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// What the attributes pending on a cursor evaluate to.
#[derive(Debug, Clone)]
enum PendingValue {
    Entity(String),
    Embeddable(String),
    Basic,
    Collection(CollectionMapping),
}

/// Position reached while walking a path: attributes `pending` have been
/// navigated from `alias` (seen through `treat`) but not joined yet.
#[derive(Debug, Clone)]
struct Cursor {
    alias: String,
    treat: Option<String>,
    pending: Vec<String>,
    value: PendingValue,
    /// Most recently navigated attribute.
    last: Option<Attribute>,
}

impl Cursor {
    fn needs_join(&self) -> bool {
        !self.pending.is_empty()
            && matches!(
                self.value,
                PendingValue::Entity(_) | PendingValue::Collection(_)
            )
    }
}

/// How a materialized join was asked for.
enum JoinOrigin<'a> {
    Implicit,
    Explicit {
        alias: &'a str,
        kind: JoinKind,
        narrow_to: Option<&'a str>,
    },
}

// ============================================================================
// Normalizer
// ============================================================================

pub struct Normalizer<'a> {
    index: &'a TypeHierarchyIndex,
    config: &'a ResolverConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(index: &'a TypeHierarchyIndex, config: &'a ResolverConfig) -> Self {
        Normalizer { index, config }
    }

    /// Normalizes a path read in SELECT or in a predicate.
    ///
    /// A path ending in a collection is joined so its element can be read.
    pub fn normalize_reference(
        &self,
        expr: &PathExpression,
        ctx: &mut PlanCtx,
    ) -> ResolveResult<NormalizedPath> {
        let mut joins = Vec::new();
        let mut cursor = self.eval(expr, ctx, &mut joins)?;
        if matches!(cursor.value, PendingValue::Collection(_)) {
            cursor = self.materialize(
                cursor,
                JoinSide::Element,
                JoinOrigin::Implicit,
                expr,
                ctx,
                &mut joins,
            )?;
        }
        Ok(NormalizedPath {
            joins,
            terminal: TerminalPath {
                alias: cursor.alias,
                treat: cursor.treat,
                attributes: cursor.pending,
                expression: expr.to_string(),
            },
        })
    }

    /// Normalizes the operand of `TYPE(..)`, which must denote an entity.
    pub fn normalize_type_operand(
        &self,
        expr: &PathExpression,
        ctx: &mut PlanCtx,
    ) -> ResolveResult<NormalizedPath> {
        let mut joins = Vec::new();
        let mut cursor = self.eval(expr, ctx, &mut joins)?;
        if cursor.needs_join() {
            cursor = self.materialize(
                cursor,
                JoinSide::Element,
                JoinOrigin::Implicit,
                expr,
                ctx,
                &mut joins,
            )?;
        }
        if !matches!(cursor.value, PendingValue::Entity(_)) {
            return Err(ResolveError::invalid_navigation(
                expr.to_string(),
                "TYPE() needs an entity-valued path",
            ));
        }
        Ok(NormalizedPath {
            joins,
            terminal: TerminalPath {
                alias: cursor.alias,
                treat: cursor.treat,
                attributes: vec![],
                expression: expr.to_string(),
            },
        })
    }

    /// Normalizes an explicit FROM-clause join `JOIN <expr> alias`.
    ///
    /// An outer `TREAT(.. AS T)` becomes the join's narrowing instead of a
    /// treat of the joined alias. The explicit request comes last.
    pub fn normalize_join(
        &self,
        expr: &PathExpression,
        alias: &str,
        kind: JoinKind,
        ctx: &mut PlanCtx,
    ) -> ResolveResult<Vec<JoinRequest>> {
        let (path, narrow_to) = match expr {
            PathExpression::Treat { parent, target } => {
                self.check_known(target, expr)?;
                (parent.as_ref(), Some(target.as_str()))
            }
            other => (other, None),
        };

        let mut joins = Vec::new();
        let (cursor, side) = match path {
            PathExpression::MapKey(parent) => {
                (self.eval(parent, ctx, &mut joins)?, JoinSide::MapKey)
            }
            PathExpression::MapValue(parent) => {
                (self.eval(parent, ctx, &mut joins)?, JoinSide::MapValue)
            }
            other => (self.eval(other, ctx, &mut joins)?, JoinSide::Element),
        };
        if !cursor.needs_join() {
            return Err(ResolveError::invalid_navigation(
                expr.to_string(),
                "a join path must end in a relation or collection",
            ));
        }
        self.materialize(
            cursor,
            side,
            JoinOrigin::Explicit {
                alias,
                kind,
                narrow_to,
            },
            expr,
            ctx,
            &mut joins,
        )?;
        Ok(joins)
    }

    // ========================================================================
    // Path walking
    // ========================================================================

    fn eval(
        &self,
        expr: &PathExpression,
        ctx: &mut PlanCtx,
        joins: &mut Vec<JoinRequest>,
    ) -> ResolveResult<Cursor> {
        match expr {
            PathExpression::Root(alias) => {
                let table_ctx = ctx
                    .get_table_ctx(alias)
                    .ok_or_else(|| ResolveError::UnknownAlias {
                        alias: alias.clone(),
                        segment: expr.to_string(),
                    })?;
                let value = match table_ctx.value() {
                    AliasValue::Entity { static_type, .. } => {
                        PendingValue::Entity(static_type.clone())
                    }
                    AliasValue::Basic { .. } => PendingValue::Basic,
                };
                Ok(Cursor {
                    alias: alias.clone(),
                    treat: None,
                    pending: vec![],
                    value,
                    last: None,
                })
            }
            PathExpression::Navigate { parent, attribute } => {
                let mut cursor = self.eval(parent, ctx, joins)?;
                if cursor.needs_join() {
                    cursor = self.materialize(
                        cursor,
                        JoinSide::Element,
                        JoinOrigin::Implicit,
                        parent,
                        ctx,
                        joins,
                    )?;
                }
                let attr = self.lookup(&cursor, attribute, expr)?;
                cursor.pending.push(attribute.clone());
                cursor.value = match &attr.kind {
                    AttributeKind::Scalar { .. } => PendingValue::Basic,
                    AttributeKind::ToOneRelation { target, .. } => {
                        PendingValue::Entity(target.clone())
                    }
                    AttributeKind::Embedded { target, .. } => {
                        PendingValue::Embeddable(target.clone())
                    }
                    AttributeKind::CollectionRelation(mapping)
                    | AttributeKind::EmbeddedCollectionRelation(mapping) => {
                        PendingValue::Collection(mapping.clone())
                    }
                };
                cursor.last = Some(attr);
                Ok(cursor)
            }
            PathExpression::MapKey(parent) | PathExpression::MapValue(parent) => {
                let cursor = self.eval(parent, ctx, joins)?;
                let side = if matches!(expr, PathExpression::MapKey(_)) {
                    JoinSide::MapKey
                } else {
                    JoinSide::MapValue
                };
                self.materialize(cursor, side, JoinOrigin::Implicit, expr, ctx, joins)
            }
            PathExpression::Treat { parent, target } => {
                self.check_known(target, expr)?;
                let mut cursor = self.eval(parent, ctx, joins)?;
                match cursor.value {
                    PendingValue::Basic | PendingValue::Embeddable(_) => {
                        return Err(ResolveError::invalid_navigation(
                            expr.to_string(),
                            "TREAT needs an entity-valued path",
                        ));
                    }
                    PendingValue::Entity(_) | PendingValue::Collection(_) => {}
                }
                // TREAT over a navigated relation: join it first, then treat the join alias
                if cursor.needs_join() {
                    cursor = self.materialize(
                        cursor,
                        JoinSide::Element,
                        JoinOrigin::Implicit,
                        parent,
                        ctx,
                        joins,
                    )?;
                }
                self.apply_treat(cursor, target, expr, ctx)
            }
        }
    }

    fn apply_treat(
        &self,
        mut cursor: Cursor,
        target: &str,
        expr: &PathExpression,
        ctx: &PlanCtx,
    ) -> ResolveResult<Cursor> {
        let PendingValue::Entity(static_type) = &cursor.value else {
            return Err(ResolveError::invalid_navigation(
                expr.to_string(),
                "TREAT needs an entity-valued path",
            ));
        };
        if let Some(origin) = ctx.get_table_ctx(&cursor.alias).and_then(TableCtx::map_origin) {
            if origin.link_tables > 1 {
                return Err(ResolveError::AmbiguousMapKeyTreat {
                    attribute: origin.attribute.clone(),
                    tables: origin.link_tables,
                    segment: expr.to_string(),
                });
            }
        }

        let effective = cursor.treat.as_deref().unwrap_or(static_type);
        if !self.index.is_same_or_descendant(target, effective) {
            return Err(ResolveError::TypeMismatch {
                target: target.to_string(),
                static_type: effective.to_string(),
                segment: expr.to_string(),
            });
        }
        cursor.treat = (target != static_type).then(|| target.to_string());
        Ok(cursor)
    }

    fn lookup(
        &self,
        cursor: &Cursor,
        attribute: &str,
        expr: &PathExpression,
    ) -> ResolveResult<Attribute> {
        match &cursor.value {
            PendingValue::Entity(static_type) => {
                let owner = cursor.treat.as_deref().unwrap_or(static_type);
                match self.index.attribute(owner, attribute)? {
                    Some(attr) => Ok(attr.clone()),
                    None => {
                        let declared_on = self.index.declared_below(owner, attribute)?;
                        Err(ResolveError::unknown_attribute(
                            owner,
                            attribute,
                            expr.to_string(),
                            &declared_on,
                        ))
                    }
                }
            }
            PendingValue::Embeddable(embeddable) => self
                .index
                .embeddable_attribute(embeddable, attribute)?
                .cloned()
                .ok_or_else(|| {
                    ResolveError::unknown_attribute(embeddable, attribute, expr.to_string(), &[])
                }),
            PendingValue::Basic => Err(ResolveError::invalid_navigation(
                expr.to_string(),
                "a basic value has no attributes",
            )),
            PendingValue::Collection(_) => Err(ResolveError::invalid_navigation(
                expr.to_string(),
                "a collection must be joined before it is navigated",
            )),
        }
    }

    fn check_known(&self, name: &str, expr: &PathExpression) -> ResolveResult<()> {
        if self.index.contains(name) {
            Ok(())
        } else {
            Err(ResolveError::UnknownType {
                name: name.to_string(),
                segment: expr.to_string(),
            })
        }
    }

    // ========================================================================
    // Join materialization
    // ========================================================================

    /// Turns the pending attributes of `cursor` into a join request and
    /// returns a cursor positioned on the joined alias.
    fn materialize(
        &self,
        cursor: Cursor,
        side: JoinSide,
        origin: JoinOrigin<'_>,
        expr: &PathExpression,
        ctx: &mut PlanCtx,
        joins: &mut Vec<JoinRequest>,
    ) -> ResolveResult<Cursor> {
        let segment = expr.to_string();
        let Some(attribute) = cursor.last.clone() else {
            return Err(match side {
                JoinSide::Element => ResolveError::invalid_navigation(segment, "nothing to join"),
                JoinSide::MapKey | JoinSide::MapValue => ResolveError::NotAMap {
                    attribute: cursor.alias,
                    segment,
                },
            });
        };

        // Value the joined alias will hold
        let target = match (&cursor.value, side) {
            (PendingValue::Entity(target), JoinSide::Element) => AliasValue::Entity {
                static_type: target.clone(),
                declared_type: target.clone(),
            },
            (PendingValue::Collection(mapping), JoinSide::Element)
            | (PendingValue::Collection(mapping), JoinSide::MapValue) => {
                if side == JoinSide::MapValue {
                    self.require_map(mapping, &attribute, &segment)?;
                }
                AliasValue::Entity {
                    static_type: mapping.target.clone(),
                    declared_type: mapping.target.clone(),
                }
            }
            (PendingValue::Collection(mapping), JoinSide::MapKey) => {
                match self.require_map(mapping, &attribute, &segment)? {
                    MapKeyType::Entity { target, .. } => AliasValue::Entity {
                        static_type: target.clone(),
                        declared_type: target.clone(),
                    },
                    MapKeyType::Basic { column } => AliasValue::Basic {
                        column: column.clone(),
                    },
                }
            }
            _ => {
                return Err(ResolveError::NotAMap {
                    attribute: attribute.name.clone(),
                    segment,
                })
            }
        };

        let map_origin = match (&cursor.value, side) {
            (PendingValue::Collection(mapping), JoinSide::MapKey | JoinSide::MapValue) => {
                Some(MapOrigin {
                    attribute: attribute.name.clone(),
                    link_tables: self.link_tables(&cursor, mapping, ctx)?,
                })
            }
            _ => None,
        };

        let (alias, kind, explicit, narrow_to) = match origin {
            JoinOrigin::Implicit => {
                let key = ImplicitJoinKey {
                    source: cursor.alias.clone(),
                    source_treat: cursor.treat.clone(),
                    attributes: cursor.pending.clone(),
                    side,
                };
                if let Some(existing) = ctx.implicit_join_alias(&key) {
                    debug!("Reusing implicit join {} for `{}`", existing, segment);
                    return Ok(positioned(existing.to_string(), &target));
                }
                let alias = ctx.allocate_implicit_alias(key);
                (alias, self.implicit_join_kind(&attribute), false, None)
            }
            JoinOrigin::Explicit {
                alias,
                kind,
                narrow_to,
            } => (alias.to_string(), kind, true, narrow_to.map(str::to_string)),
        };

        let value = match (&target, &narrow_to) {
            (
                AliasValue::Entity {
                    declared_type, ..
                },
                Some(narrow),
            ) => {
                if let Some(origin) = &map_origin {
                    if origin.link_tables > 1 {
                        return Err(ResolveError::AmbiguousMapKeyTreat {
                            attribute: origin.attribute.clone(),
                            tables: origin.link_tables,
                            segment,
                        });
                    }
                }
                if !self.index.is_same_or_descendant(narrow, declared_type) {
                    return Err(ResolveError::TypeMismatch {
                        target: narrow.clone(),
                        static_type: declared_type.clone(),
                        segment,
                    });
                }
                AliasValue::Entity {
                    static_type: narrow.clone(),
                    declared_type: declared_type.clone(),
                }
            }
            (AliasValue::Basic { .. }, Some(_)) => {
                return Err(ResolveError::invalid_navigation(
                    segment,
                    "TREAT needs an entity-valued path",
                ))
            }
            (value, None) => value.clone(),
        };

        let mut table_ctx = TableCtx::build(alias.clone(), value.clone(), explicit);
        if let Some(origin) = map_origin {
            table_ctx = table_ctx.with_map_origin(origin);
        }
        ctx.insert_table_ctx(table_ctx)?;

        let request = JoinRequest {
            alias: alias.clone(),
            source: cursor.alias,
            source_treat: cursor.treat,
            attributes: cursor.pending,
            side,
            kind,
            explicit,
            narrow_to,
            segment,
        };
        debug!("Join request: {}", request);
        joins.push(request);

        Ok(positioned(alias, &value))
    }

    fn require_map<'m>(
        &self,
        mapping: &'m CollectionMapping,
        attribute: &Attribute,
        segment: &str,
    ) -> ResolveResult<&'m MapKeyType> {
        let key = mapping.map_key().ok_or_else(|| ResolveError::NotAMap {
            attribute: attribute.name.clone(),
            segment: segment.to_string(),
        })?;
        if matches!(mapping.storage, CollectionStorage::MappedBy { .. }) {
            return Err(ResolveError::invalid_navigation(
                segment,
                "KEY()/VALUE() need a map stored in a join table",
            ));
        }
        Ok(key)
    }

    /// Number of link tables holding the rows of a map for the cursor's owner.
    fn link_tables(
        &self,
        cursor: &Cursor,
        mapping: &CollectionMapping,
        ctx: &PlanCtx,
    ) -> ResolveResult<usize> {
        match &mapping.storage {
            CollectionStorage::PerConcreteTable { .. } => {
                let owner = match &cursor.treat {
                    Some(treat) => treat.as_str(),
                    None => ctx
                        .get_table_ctx(&cursor.alias)
                        .and_then(TableCtx::static_type)
                        .ok_or_else(|| ResolveError::UnknownAlias {
                            alias: cursor.alias.clone(),
                            segment: cursor.alias.clone(),
                        })?,
                };
                Ok(self.index.concrete_table_count(owner)?)
            }
            CollectionStorage::JoinTable(_) | CollectionStorage::MappedBy { .. } => Ok(1),
        }
    }

    fn implicit_join_kind(&self, attribute: &Attribute) -> JoinKind {
        match self.config.implicit_join_semantics {
            ImplicitJoinSemantics::Inner => JoinKind::Inner,
            ImplicitJoinSemantics::Natural => {
                attribute.natural_join_kind().unwrap_or(JoinKind::Left)
            }
        }
    }
}

fn positioned(alias: String, value: &AliasValue) -> Cursor {
    let value = match value {
        AliasValue::Entity { static_type, .. } => PendingValue::Entity(static_type.clone()),
        AliasValue::Basic { .. } => PendingValue::Basic,
    };
    Cursor {
        alias,
        treat: None,
        pending: vec![],
        value,
        last: None,
    }
}
