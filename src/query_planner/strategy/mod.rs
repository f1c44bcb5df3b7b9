//! Physical shape of entity joins, one adapter per inheritance strategy.
//!
//! The join builder decides *what* is joined; an adapter decides which
//! tables hold the rows of an entity, which extra hierarchy joins they need
//! and how a "row is an instance of T" test is expressed:
//!
//! | strategy        | storage                         | type test                      |
//! |-----------------|---------------------------------|--------------------------------|
//! | joined          | one table per type, shared id   | presence of subtype table rows |
//! | single table    | the root table                  | discriminator column           |
//! | table per class | one table (or union) per type   | union discriminator column     |

mod joined;
mod single_table;
mod table_per_class;

pub use joined::JoinedAdapter;
pub use single_table::SingleTableAdapter;
pub use table_per_class::TablePerClassAdapter;

use crate::config::ResolverConfig;
use crate::entity_catalog::{Attribute, InheritanceStrategy, TypeHierarchyIndex};
use crate::join_plan::{JoinKind, JoinNode, Materialized, TypeTest};

use super::errors::{ResolveError, ResolveResult};

/// Read-only inputs every adapter needs.
#[derive(Clone, Copy)]
pub struct ShapeCtx<'a> {
    pub index: &'a TypeHierarchyIndex,
    pub config: &'a ResolverConfig,
}

impl ShapeCtx<'_> {
    /// Alias of a hierarchy join, e.g. `s1_joined_sub1` for `JoinedSub1` under `s1`.
    pub fn hierarchy_alias(&self, alias: &str, entity: &str) -> String {
        format!(
            "{}{}{}",
            alias,
            self.config.alias_separator,
            to_snake_case(entity)
        )
    }

    /// Concrete types the rows of `node` may have, as far as its storage goes.
    pub fn candidates(&self, node: &JoinNode) -> ResolveResult<Vec<String>> {
        let storage = node.storage_entity.as_deref().ok_or_else(|| {
            ResolveError::invalid_navigation(node.alias.clone(), "not an entity join")
        })?;
        Ok(self
            .index
            .concrete_subtree(storage)?
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    pub fn concrete(&self, entity: &str) -> ResolveResult<Vec<String>> {
        Ok(self
            .index
            .concrete_subtree(entity)?
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

/// An entity-valued join the builder asks an adapter to shape.
#[derive(Debug, Clone)]
pub struct EntityJoin<'a> {
    pub alias: &'a str,
    pub source_alias: Option<&'a str>,
    pub materializes: Materialized,
    /// Type declared by the attribute or FROM clause.
    pub declared: &'a str,
    /// Target of an explicit treat join.
    pub narrow_to: Option<&'a str>,
    pub kind: JoinKind,
    pub segment: &'a str,
}

pub trait StrategyAdapter: Send + Sync {
    fn strategy(&self) -> InheritanceStrategy;

    /// Builds the node for `join` together with its hierarchy joins. The
    /// caller adds the condition linking it to its source.
    fn entity_node(&self, cx: &ShapeCtx<'_>, join: &EntityJoin<'_>) -> ResolveResult<JoinNode>;

    /// Test deciding whether a row of `node` is exactly one of `types`
    /// (concrete type names).
    fn type_test(
        &self,
        cx: &ShapeCtx<'_>,
        node: &JoinNode,
        types: &[String],
    ) -> ResolveResult<TypeTest>;

    /// Alias holding the columns `treat` declares itself.
    fn treat_alias<'n>(&self, node: &'n JoinNode, treat: &str) -> Option<&'n str> {
        node.alias_for_type(treat)
    }

    /// Rejects references into this strategy's storage that cannot be expressed.
    fn check_reference(
        &self,
        _cx: &ShapeCtx<'_>,
        _attribute: &Attribute,
        _segment: &str,
    ) -> ResolveResult<()> {
        Ok(())
    }
}

pub fn for_strategy(strategy: InheritanceStrategy) -> &'static dyn StrategyAdapter {
    match strategy {
        InheritanceStrategy::Joined => &JoinedAdapter,
        InheritanceStrategy::SingleTable => &SingleTableAdapter,
        InheritanceStrategy::TablePerClass => &TablePerClassAdapter,
    }
}

/// Adapter for the hierarchy `entity` belongs to.
pub fn for_entity(
    index: &TypeHierarchyIndex,
    entity: &str,
) -> ResolveResult<&'static dyn StrategyAdapter> {
    Ok(for_strategy(index.strategy_of(entity)?))
}

/// Answers the cases every strategy shares: all candidates requested, or
/// none of them. `None` means a physical test is needed.
fn trivial_test(candidates: &[String], types: &[String]) -> Option<TypeTest> {
    let requested = candidates.iter().filter(|c| types.contains(c)).count();
    if requested == candidates.len() {
        Some(TypeTest::Always)
    } else if requested == 0 {
        Some(TypeTest::Never)
    } else {
        None
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("JoinedSub1"), "joined_sub1");
        assert_eq!(to_snake_case("TablePerClassBase"), "table_per_class_base");
        assert_eq!(to_snake_case("Sub1"), "sub1");
    }

    #[test]
    fn test_trivial_test() {
        let candidates = vec!["Sub1".to_string(), "Sub2".to_string()];
        assert_eq!(
            trivial_test(&candidates, &candidates.clone()),
            Some(TypeTest::Always)
        );
        assert_eq!(
            trivial_test(&candidates, &["Other".to_string()]),
            Some(TypeTest::Never)
        );
        assert_eq!(trivial_test(&candidates, &["Sub1".to_string()]), None);
    }

    #[test]
    fn test_adapter_dispatch() {
        for strategy in [
            InheritanceStrategy::Joined,
            InheritanceStrategy::SingleTable,
            InheritanceStrategy::TablePerClass,
        ] {
            assert_eq!(for_strategy(strategy).strategy(), strategy);
        }
    }
}
