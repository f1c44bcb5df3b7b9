use log::debug;

use crate::entity_catalog::{CatalogError, InheritanceStrategy};
use crate::join_plan::{
    ColumnRef, JoinKind, JoinNode, JoinPredicate, Materialized, PhysicalRelation, RowPattern,
    TypeTest,
};

use super::{trivial_test, EntityJoin, ShapeCtx, StrategyAdapter};
use crate::query_planner::errors::ResolveResult;

/// One table per type. The declared type's table is the node itself,
/// supertype tables are joined inner on the shared id and every subtype
/// table is joined left below its direct supertype. Each side of a
/// hierarchy join reads its own table's id column.
pub struct JoinedAdapter;

impl StrategyAdapter for JoinedAdapter {
    fn strategy(&self) -> InheritanceStrategy {
        InheritanceStrategy::Joined
    }

    fn entity_node(&self, cx: &ShapeCtx<'_>, join: &EntityJoin<'_>) -> ResolveResult<JoinNode> {
        let storage = join.declared;
        let id = cx.index.id_column(storage)?;
        let mut node = JoinNode::new(
            join.alias,
            join.source_alias.map(str::to_string),
            join.materializes.clone(),
            PhysicalRelation::table(cx.index.table_of(storage)?.name.clone()),
            join.kind,
        );
        node.strategy = Some(InheritanceStrategy::Joined);
        node.storage_entity = Some(storage.to_string());
        node.entity = Some(join.narrow_to.unwrap_or(storage).to_string());

        for ancestor in cx.index.ancestors(storage)? {
            let alias = cx.hierarchy_alias(join.alias, ancestor);
            let mut supertype = JoinNode::new(
                alias.clone(),
                Some(join.alias.to_string()),
                Materialized::Supertype {
                    entity: ancestor.clone(),
                },
                PhysicalRelation::table(cx.index.table_of(ancestor)?.name.clone()),
                join.kind.cascade(JoinKind::Inner),
            );
            supertype.strategy = Some(InheritanceStrategy::Joined);
            supertype.storage_entity = Some(ancestor.clone());
            supertype.entity = Some(ancestor.clone());
            supertype.on.push(JoinPredicate::columns_equal(
                ColumnRef::new(alias, cx.index.id_column(ancestor)?),
                ColumnRef::new(join.alias, id),
            ));
            node.hierarchy.push(supertype);
        }
        node.hierarchy
            .extend(subtype_nodes(cx, join.alias, join.alias, storage)?);

        if let Some(target) = join.narrow_to.filter(|target| *target != storage) {
            let types = cx.concrete(target)?;
            let test = self.type_test(cx, &node, &types)?;
            debug!(
                "{}: restricting {} to {} ({:?})",
                join.segment, join.alias, target, types
            );
            node.on.push(JoinPredicate::TypeRestriction {
                alias: join.alias.to_string(),
                types,
                test,
            });
        }
        Ok(node)
    }

    fn type_test(
        &self,
        cx: &ShapeCtx<'_>,
        node: &JoinNode,
        types: &[String],
    ) -> ResolveResult<TypeTest> {
        let candidates = cx.candidates(node)?;
        if let Some(test) = trivial_test(&candidates, types) {
            return Ok(test);
        }
        let mut alternatives = Vec::new();
        if let Some(storage) = &node.storage_entity {
            row_patterns(cx, node, storage, types, &mut alternatives)?;
        }
        Ok(TypeTest::SubtypeRows { alternatives })
    }
}

/// Left joins for the direct subtypes of `entity`, each carrying the joins
/// of its own subtypes.
fn subtype_nodes(
    cx: &ShapeCtx<'_>,
    base_alias: &str,
    parent_alias: &str,
    entity: &str,
) -> ResolveResult<Vec<JoinNode>> {
    let mut nodes = Vec::new();
    let parent_id = cx.index.id_column(entity)?;
    for subtype in cx.index.direct_subtypes(entity)? {
        let alias = cx.hierarchy_alias(base_alias, subtype);
        let mut node = JoinNode::new(
            alias.clone(),
            Some(parent_alias.to_string()),
            Materialized::Subtype {
                entity: subtype.clone(),
            },
            PhysicalRelation::table(cx.index.table_of(subtype)?.name.clone()),
            JoinKind::Left,
        );
        node.strategy = Some(InheritanceStrategy::Joined);
        node.storage_entity = Some(subtype.clone());
        node.entity = Some(subtype.clone());
        node.on.push(JoinPredicate::columns_equal(
            ColumnRef::new(alias.clone(), cx.index.id_column(subtype)?),
            ColumnRef::new(parent_alias, parent_id),
        ));
        node.hierarchy = subtype_nodes(cx, base_alias, &alias, subtype)?;
        nodes.push(node);
    }
    Ok(nodes)
}

/// Patterns matching rows of exactly `types` within the subtree of `entity`.
///
/// A subtree requested as a whole is matched by the presence of its top
/// table row alone; a requested type with unrequested subtypes also needs
/// the subtype rows to be absent.
fn row_patterns(
    cx: &ShapeCtx<'_>,
    node: &JoinNode,
    entity: &str,
    types: &[String],
    out: &mut Vec<RowPattern>,
) -> ResolveResult<()> {
    let concrete = cx.concrete(entity)?;
    if !concrete.is_empty() && concrete.iter().all(|c| types.contains(c)) {
        out.push(RowPattern {
            present: id_of(cx, node, entity)?,
            absent: vec![],
        });
        return Ok(());
    }
    if types.iter().any(|t| t == entity) {
        let mut absent = Vec::new();
        for subtype in cx.index.direct_subtypes(entity)? {
            absent.push(id_of(cx, node, subtype)?);
        }
        out.push(RowPattern {
            present: id_of(cx, node, entity)?,
            absent,
        });
    }
    for subtype in cx.index.direct_subtypes(entity)? {
        row_patterns(cx, node, subtype, types, out)?;
    }
    Ok(())
}

fn id_of(cx: &ShapeCtx<'_>, node: &JoinNode, entity: &str) -> ResolveResult<ColumnRef> {
    let alias = node
        .alias_for_type(entity)
        .ok_or_else(|| CatalogError::MissingTable {
            name: entity.to_string(),
            strategy: InheritanceStrategy::Joined,
        })?;
    Ok(ColumnRef::new(alias, cx.index.id_column(entity)?))
}
