use log::debug;

use crate::entity_catalog::{CatalogError, InheritanceStrategy};
use crate::join_plan::{ColumnRef, JoinNode, JoinPredicate, Materialized, PhysicalRelation, TypeTest};

use super::{trivial_test, EntityJoin, ShapeCtx, StrategyAdapter};
use crate::query_planner::errors::ResolveResult;

/// All types share the root table; narrowing is a discriminator predicate.
pub struct SingleTableAdapter;

impl StrategyAdapter for SingleTableAdapter {
    fn strategy(&self) -> InheritanceStrategy {
        InheritanceStrategy::SingleTable
    }

    fn entity_node(&self, cx: &ShapeCtx<'_>, join: &EntityJoin<'_>) -> ResolveResult<JoinNode> {
        let root = cx.index.root_of(join.declared)?;
        // A FROM root of a subtype scans rows of every type in the table.
        // Relation targets only ever point at rows of the declared type.
        let storage = match join.materializes {
            Materialized::Root { .. } => root,
            _ => join.declared,
        };
        let mut node = JoinNode::new(
            join.alias,
            join.source_alias.map(str::to_string),
            join.materializes.clone(),
            PhysicalRelation::table(cx.index.table_of(root)?.name.clone()),
            join.kind,
        );
        node.strategy = Some(InheritanceStrategy::SingleTable);
        node.storage_entity = Some(storage.to_string());

        let entity = join.narrow_to.unwrap_or(join.declared);
        node.entity = Some(entity.to_string());
        if entity != storage {
            let types = cx.concrete(entity)?;
            let test = self.type_test(cx, &node, &types)?;
            debug!(
                "{}: restricting {} to {} ({:?})",
                join.segment, join.alias, entity, types
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
        let storage = node.storage_entity.as_deref().unwrap_or_default();
        let column = cx.index.discriminator_column(storage)?.ok_or_else(|| {
            CatalogError::MissingDiscriminatorColumn {
                root: storage.to_string(),
            }
        })?;

        let mut values = Vec::new();
        for candidate in candidates.iter().filter(|c| types.contains(c)) {
            let entity = cx.index.entity(candidate)?;
            values.push(
                entity
                    .discriminator_value
                    .clone()
                    .unwrap_or_else(|| entity.name.clone()),
            );
        }
        Ok(TypeTest::Discriminator {
            column: ColumnRef::new(node.alias.clone(), column),
            values,
        })
    }
}
