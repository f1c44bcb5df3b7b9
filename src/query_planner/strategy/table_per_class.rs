use crate::entity_catalog::{Attribute, AttributeKind, ForeignKeyMode, InheritanceStrategy};
use crate::join_plan::{ColumnRef, JoinNode, PhysicalRelation, TypeTest, UnionBranch};

use super::{trivial_test, EntityJoin, ShapeCtx, StrategyAdapter};
use crate::query_planner::errors::{ResolveError, ResolveResult};

/// Every concrete type owns a complete table. A reference to a type with
/// several concrete subtypes reads a union of their tables, tagged with the
/// configured discriminator column.
pub struct TablePerClassAdapter;

impl TablePerClassAdapter {
    pub fn relation_for(cx: &ShapeCtx<'_>, entity: &str) -> ResolveResult<PhysicalRelation> {
        let concrete = cx.index.concrete_subtree(entity)?;
        if let [only] = concrete.as_slice() {
            return Ok(PhysicalRelation::table(cx.index.table_of(only)?.name.clone()));
        }
        let mut branches = Vec::with_capacity(concrete.len());
        for member in concrete {
            branches.push(UnionBranch {
                entity: member.to_string(),
                table: cx.index.table_of(member)?.name.clone(),
            });
        }
        Ok(PhysicalRelation::Union {
            branches,
            discriminator_column: cx.config.union_discriminator_column.clone(),
        })
    }
}

impl StrategyAdapter for TablePerClassAdapter {
    fn strategy(&self) -> InheritanceStrategy {
        InheritanceStrategy::TablePerClass
    }

    fn entity_node(&self, cx: &ShapeCtx<'_>, join: &EntityJoin<'_>) -> ResolveResult<JoinNode> {
        // A treat join reads the narrowed type's tables directly
        let entity = join.narrow_to.unwrap_or(join.declared);
        let mut node = JoinNode::new(
            join.alias,
            join.source_alias.map(str::to_string),
            join.materializes.clone(),
            Self::relation_for(cx, entity)?,
            join.kind,
        );
        node.strategy = Some(InheritanceStrategy::TablePerClass);
        node.storage_entity = Some(entity.to_string());
        node.entity = Some(entity.to_string());
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
        Ok(TypeTest::Discriminator {
            column: ColumnRef::new(
                node.alias.clone(),
                cx.config.union_discriminator_column.clone(),
            ),
            values: candidates
                .into_iter()
                .filter(|c| types.contains(c))
                .collect(),
        })
    }

    fn check_reference(
        &self,
        cx: &ShapeCtx<'_>,
        attribute: &Attribute,
        segment: &str,
    ) -> ResolveResult<()> {
        if let AttributeKind::ToOneRelation {
            target,
            foreign_key: ForeignKeyMode::Constraint,
            ..
        } = &attribute.kind
        {
            let tables = cx.index.concrete_table_count(target)?;
            if tables > 1 {
                return Err(ResolveError::UnsupportedStrategyCombination {
                    strategy: InheritanceStrategy::TablePerClass,
                    message: format!(
                        "`{}.{}` declares a foreign key constraint into `{}`, which spans {} tables",
                        attribute.declaring_type, attribute.name, target, tables
                    ),
                    segment: segment.to_string(),
                });
            }
        }
        Ok(())
    }
}
