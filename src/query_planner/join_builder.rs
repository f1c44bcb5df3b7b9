//! Join tree construction.
//!
//! Consumes the join requests produced by the normalizer, in order, and
//! hangs one node (plus its hierarchy joins) per request below the node of
//! its source alias. Terminal paths are then resolved against the finished
//! nodes: a treat on a terminal alias never adds a join, it only picks the
//! table holding the treated type's columns and a guard test.

use std::collections::HashMap;

use log::debug;

use crate::config::ResolverConfig;
use crate::entity_catalog::{
    Attribute, AttributeKind, CollectionMapping, CollectionStorage, TypeHierarchyIndex,
};
use crate::join_plan::{
    ColumnRef, JoinKind, JoinNode, JoinPredicate, JoinTree, MapSide, Materialized,
    PhysicalRelation, PredicateClause, ResolvedPath, ResolvedPredicate, RootTreatSubstitution,
    TypeTest, UnionBranch,
};

use super::errors::{ResolveError, ResolveResult};
use super::normalizer::{JoinRequest, JoinSide, TerminalPath};
use super::query::FromRoot;
use super::strategy::{for_entity, EntityJoin, ShapeCtx, StrategyAdapter};

/// Attribute chain resolved against an owner type: embedded attributes
/// followed by the attribute they lead to.
struct AttributeChain {
    embeddings: Vec<Attribute>,
    last: Attribute,
}

impl AttributeChain {
    fn overrides(&self) -> Vec<&Attribute> {
        self.embeddings.iter().collect()
    }

    /// Type declaring the first attribute, i.e. the table the chain is read from.
    fn host_type(&self) -> &str {
        self.embeddings
            .first()
            .map(|attr| attr.declaring_type.as_str())
            .unwrap_or(&self.last.declaring_type)
    }

    fn dotted(&self) -> String {
        self.embeddings
            .iter()
            .chain(std::iter::once(&self.last))
            .map(|attr| attr.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Source information copied out of the tree before a join is attached.
struct SourceInfo {
    alias: String,
    entity: String,
    kind: JoinKind,
    id: ColumnRef,
    adapter: &'static dyn StrategyAdapter,
}

pub struct JoinTreeBuilder<'a> {
    index: &'a TypeHierarchyIndex,
    config: &'a ResolverConfig,
    tree: JoinTree,
    /// Aliases of basic map keys, read straight off their link table.
    basic_keys: HashMap<String, ColumnRef>,
}

impl<'a> JoinTreeBuilder<'a> {
    pub fn new(index: &'a TypeHierarchyIndex, config: &'a ResolverConfig) -> Self {
        JoinTreeBuilder {
            index,
            config,
            tree: JoinTree::default(),
            basic_keys: HashMap::new(),
        }
    }

    fn shape(&self) -> ShapeCtx<'a> {
        ShapeCtx {
            index: self.index,
            config: self.config,
        }
    }

    pub fn tree(&self) -> &JoinTree {
        &self.tree
    }

    pub fn finish(self) -> JoinTree {
        self.tree
    }

    // ========================================================================
    // Joins
    // ========================================================================

    pub fn add_root(&mut self, root: &FromRoot) -> ResolveResult<()> {
        let segment = format!("{} {}", root.entity, root.alias);
        if !self.index.contains(&root.entity) {
            return Err(ResolveError::UnknownType {
                name: root.entity.clone(),
                segment,
            });
        }
        let adapter = for_entity(self.index, &root.entity)?;
        let node = adapter.entity_node(
            &self.shape(),
            &EntityJoin {
                alias: &root.alias,
                source_alias: None,
                materializes: Materialized::Root {
                    entity: root.entity.clone(),
                },
                declared: &root.entity,
                narrow_to: None,
                kind: JoinKind::Inner,
                segment: &segment,
            },
        )?;
        debug!(
            "Root {} ({}) with {} hierarchy joins",
            root.alias,
            root.entity,
            node.hierarchy.len()
        );
        self.tree.roots.push(node);
        Ok(())
    }

    pub fn add_joins(&mut self, requests: &[JoinRequest]) -> ResolveResult<()> {
        for request in requests {
            self.add_join(request)?;
        }
        Ok(())
    }

    pub fn add_join(&mut self, request: &JoinRequest) -> ResolveResult<()> {
        if self.tree.contains(&request.alias) || self.basic_keys.contains_key(&request.alias) {
            return Ok(());
        }
        let source = self.source_info(&request.source, &request.segment)?;
        let owner = request.source_treat.as_deref().unwrap_or(&source.entity);
        let chain = self.resolve_chain(owner, &request.attributes, &request.segment)?;
        let kind = source.kind.cascade(request.kind);

        let host = {
            let node = self.node(&source.alias, &request.segment)?;
            host_alias(node, chain.host_type())
        };

        let mut top = match &chain.last.kind {
            AttributeKind::ToOneRelation { target, .. } => {
                self.to_one_node(request, &chain, target, &host, kind)?
            }
            AttributeKind::CollectionRelation(mapping)
            | AttributeKind::EmbeddedCollectionRelation(mapping) => {
                self.collection_node(request, &chain, mapping, &source, owner, kind)?
            }
            AttributeKind::Scalar { .. } | AttributeKind::Embedded { .. } => {
                return Err(ResolveError::invalid_navigation(
                    request.segment.clone(),
                    format!("`{}` is not a relation", chain.last.name),
                ))
            }
        };

        // Navigating from a treated source only follows rows of the treated type
        if let Some(treat) = &request.source_treat {
            let types = self.shape().concrete(treat)?;
            let test = {
                let node = self.node(&source.alias, &request.segment)?;
                source.adapter.type_test(&self.shape(), node, &types)?
            };
            if test != TypeTest::Always {
                top.on.push(JoinPredicate::TypeRestriction {
                    alias: source.alias.clone(),
                    types,
                    test,
                });
            }
        }

        debug!(
            "Added {} {} ({}) below {} for `{}`",
            top.kind, top.alias, chain.dotted(), source.alias, request.segment
        );
        let parent = self
            .tree
            .find_mut(&source.alias)
            .ok_or_else(|| unknown_alias(&source.alias, &request.segment))?;
        parent.children.push(top);
        Ok(())
    }

    fn to_one_node(
        &self,
        request: &JoinRequest,
        chain: &AttributeChain,
        target: &str,
        host: &str,
        kind: JoinKind,
    ) -> ResolveResult<JoinNode> {
        if request.side != JoinSide::Element {
            return Err(ResolveError::NotAMap {
                attribute: chain.last.name.clone(),
                segment: request.segment.clone(),
            });
        }
        let adapter = for_entity(self.index, target)?;
        adapter.check_reference(&self.shape(), &chain.last, &request.segment)?;

        let mut node = adapter.entity_node(
            &self.shape(),
            &EntityJoin {
                alias: &request.alias,
                source_alias: Some(&request.source),
                materializes: Materialized::Attribute {
                    name: chain.dotted(),
                },
                declared: target,
                narrow_to: request.narrow_to.as_deref(),
                kind,
                segment: &request.segment,
            },
        )?;
        let fk = self
            .index
            .column_for(&chain.last, &chain.overrides())
            .ok_or_else(|| {
                ResolveError::invalid_navigation(request.segment.clone(), "relation has no column")
            })?;
        let id = storage_id(self.index, &node)?;
        node.on
            .insert(0, JoinPredicate::columns_equal(id, ColumnRef::new(host, fk)));
        Ok(node)
    }

    fn collection_node(
        &mut self,
        request: &JoinRequest,
        chain: &AttributeChain,
        mapping: &CollectionMapping,
        source: &SourceInfo,
        owner: &str,
        kind: JoinKind,
    ) -> ResolveResult<JoinNode> {
        let attribute = chain.dotted();
        let (target, materializes) = match request.side {
            JoinSide::Element => (
                Some(mapping.target.as_str()),
                Materialized::Attribute {
                    name: attribute.clone(),
                },
            ),
            JoinSide::MapValue => (
                Some(mapping.target.as_str()),
                Materialized::MapEntry {
                    attribute: attribute.clone(),
                    side: MapSide::Value,
                },
            ),
            JoinSide::MapKey => {
                let key = mapping.map_key().ok_or_else(|| ResolveError::NotAMap {
                    attribute: chain.last.name.clone(),
                    segment: request.segment.clone(),
                })?;
                (
                    key.target(),
                    Materialized::MapEntry {
                        attribute: attribute.clone(),
                        side: MapSide::Key,
                    },
                )
            }
        };

        let (relation, owner_column, element_column) = match &mapping.storage {
            // Inverse side: the element table points back at the owner
            CollectionStorage::MappedBy { attribute: inverse } => {
                let target = target.unwrap_or(&mapping.target);
                return self.mapped_by_node(request, target, inverse, materializes, source, kind);
            }
            CollectionStorage::JoinTable(table) => (
                PhysicalRelation::table(table.name.clone()),
                table.owner_column.clone(),
                table.element_column.clone(),
            ),
            CollectionStorage::PerConcreteTable {
                suffix,
                owner_column,
                element_column,
            } => (
                self.per_table_relation(owner, suffix)?,
                owner_column.clone(),
                element_column.clone(),
            ),
        };

        if let (PhysicalRelation::Union { branches, .. }, JoinSide::MapKey | JoinSide::MapValue) =
            (&relation, request.side)
        {
            if request.narrow_to.is_some() {
                return Err(ResolveError::AmbiguousMapKeyTreat {
                    attribute: chain.last.name.clone(),
                    tables: branches.len(),
                    segment: request.segment.clone(),
                });
            }
        }

        let entity_column = match (request.side, mapping.map_key()) {
            (JoinSide::MapKey, Some(key)) => key.column().to_string(),
            _ => element_column,
        };

        // A basic map key has no entity table: the link table is the alias
        let Some(target) = target else {
            let mut link = JoinNode::new(
                request.alias.clone(),
                Some(request.source.clone()),
                Materialized::CollectionTable {
                    attribute: attribute.clone(),
                },
                relation,
                kind,
            );
            link.on.push(JoinPredicate::columns_equal(
                ColumnRef::new(request.alias.clone(), owner_column),
                source.id.clone(),
            ));
            self.basic_keys.insert(
                request.alias.clone(),
                ColumnRef::new(request.alias.clone(), entity_column),
            );
            return Ok(link);
        };

        let link_alias = format!(
            "{}{}{}{}jt",
            request.alias, self.config.alias_separator, attribute, self.config.alias_separator
        )
        .replace('.', &self.config.alias_separator);
        let mut link = JoinNode::new(
            link_alias.clone(),
            Some(request.source.clone()),
            Materialized::CollectionTable {
                attribute: attribute.clone(),
            },
            relation,
            kind,
        );
        link.on.push(JoinPredicate::columns_equal(
            ColumnRef::new(link_alias.clone(), owner_column),
            source.id.clone(),
        ));

        let adapter = for_entity(self.index, target)?;
        let mut node = adapter.entity_node(
            &self.shape(),
            &EntityJoin {
                alias: &request.alias,
                source_alias: Some(&link_alias),
                materializes,
                declared: target,
                narrow_to: request.narrow_to.as_deref(),
                kind,
                segment: &request.segment,
            },
        )?;
        let id = storage_id(self.index, &node)?;
        node.on
            .insert(0, JoinPredicate::columns_equal(id, ColumnRef::new(link_alias, entity_column)));
        link.children.push(node);
        Ok(link)
    }

    fn mapped_by_node(
        &self,
        request: &JoinRequest,
        target: &str,
        inverse: &str,
        materializes: Materialized,
        source: &SourceInfo,
        kind: JoinKind,
    ) -> ResolveResult<JoinNode> {
        let adapter = for_entity(self.index, target)?;
        let mut node = adapter.entity_node(
            &self.shape(),
            &EntityJoin {
                alias: &request.alias,
                source_alias: Some(&request.source),
                materializes,
                declared: target,
                narrow_to: request.narrow_to.as_deref(),
                kind,
                segment: &request.segment,
            },
        )?;
        let inverse_attr = self.index.attribute(target, inverse)?.ok_or_else(|| {
            ResolveError::unknown_attribute(target, inverse, request.segment.clone(), &[])
        })?;
        let fk = self.index.column_for(inverse_attr, &[]).ok_or_else(|| {
            ResolveError::invalid_navigation(request.segment.clone(), "inverse side has no column")
        })?;
        let inverse_host = host_alias(&node, &inverse_attr.declaring_type);
        node.on.insert(
            0,
            JoinPredicate::columns_equal(ColumnRef::new(inverse_host, fk), source.id.clone()),
        );
        Ok(node)
    }

    /// Link tables of a per-table collection for every concrete owner type.
    fn per_table_relation(&self, owner: &str, suffix: &str) -> ResolveResult<PhysicalRelation> {
        let mut branches = Vec::new();
        for member in self.index.concrete_subtree(owner)? {
            branches.push(UnionBranch {
                entity: member.to_string(),
                table: format!("{}_{}", self.index.table_of(member)?.name, suffix),
            });
        }
        if branches.len() == 1 {
            return Ok(PhysicalRelation::table(branches.remove(0).table));
        }
        Ok(PhysicalRelation::Union {
            branches,
            discriminator_column: self.config.union_discriminator_column.clone(),
        })
    }

    // ========================================================================
    // Terminals
    // ========================================================================

    /// Resolves a terminal read to its physical column. A treat on the
    /// terminal alias is recorded as a root-treat substitution.
    pub fn resolve_terminal(&mut self, terminal: &TerminalPath) -> ResolveResult<ResolvedPath> {
        let segment = &terminal.expression;
        let mut path = ResolvedPath {
            expression: terminal.expression.clone(),
            alias: terminal.alias.clone(),
            treat: terminal.treat.clone(),
            attributes: terminal.attributes.clone(),
            column: None,
            guard: None,
            always_null: false,
        };

        if let Some(column) = self.basic_keys.get(&terminal.alias) {
            if !terminal.attributes.is_empty() {
                return Err(ResolveError::invalid_navigation(
                    segment.clone(),
                    "a basic value has no attributes",
                ));
            }
            path.column = Some(column.clone());
            return Ok(path);
        }

        let node = self.node(&terminal.alias, segment)?;
        let adapter = node_adapter(node, segment)?;
        let static_type = node.entity.clone().ok_or_else(|| {
            ResolveError::invalid_navigation(segment.clone(), "not an entity alias")
        })?;
        let owner = terminal.treat.as_deref().unwrap_or(&static_type);

        path.column = if terminal.attributes.is_empty() {
            let treated = terminal
                .treat
                .as_deref()
                .and_then(|treat| adapter.treat_alias(node, treat).map(|alias| (alias, treat)));
            match treated {
                Some((alias, treat)) => Some(ColumnRef::new(alias, self.index.id_column(treat)?)),
                None => Some(storage_id(self.index, node)?),
            }
        } else {
            let chain = self.resolve_chain(owner, &terminal.attributes, segment)?;
            match &chain.last.kind {
                AttributeKind::Scalar { .. } | AttributeKind::ToOneRelation { .. } => {
                    let column = self
                        .index
                        .column_for(&chain.last, &chain.overrides())
                        .ok_or_else(|| {
                            ResolveError::invalid_navigation(segment.clone(), "attribute has no column")
                        })?;
                    Some(ColumnRef::new(host_alias(node, chain.host_type()), column))
                }
                AttributeKind::Embedded { .. } => None,
                AttributeKind::CollectionRelation(_)
                | AttributeKind::EmbeddedCollectionRelation(_) => {
                    return Err(ResolveError::invalid_navigation(
                        segment.clone(),
                        "a collection must be joined before it is read",
                    ))
                }
            }
        };

        if let Some(treat) = &terminal.treat {
            let types = self.shape().concrete(treat)?;
            let test = adapter.type_test(&self.shape(), node, &types)?;
            let physical_alias = adapter.treat_alias(node, treat).map(str::to_string);
            match test {
                TypeTest::Always => {}
                TypeTest::Never => path.nullify(),
                test => path.guard = Some(test),
            }
            if self.tree.root_treat(&terminal.alias, treat).is_none() {
                debug!(
                    "Root treat {} as {} -> {}",
                    terminal.alias,
                    treat,
                    physical_alias.as_deref().unwrap_or("<none>")
                );
                let guard = path.guard.clone();
                self.tree.root_treats.push(RootTreatSubstitution {
                    alias: terminal.alias.clone(),
                    treat: treat.clone(),
                    physical_alias,
                    guard,
                });
            }
        }
        Ok(path)
    }

    /// Resolves `TYPE(operand) IN (types)`. In an ON clause the restriction
    /// is also attached to that join.
    pub fn resolve_type_is(
        &mut self,
        operand: &TerminalPath,
        types: &[String],
        clause: &PredicateClause,
    ) -> ResolveResult<ResolvedPredicate> {
        let segment = &operand.expression;
        if self.basic_keys.contains_key(&operand.alias) {
            return Err(ResolveError::invalid_navigation(
                segment.clone(),
                "TYPE() needs an entity-valued path",
            ));
        }
        let node = self.node(&operand.alias, segment)?;
        let adapter = node_adapter(node, segment)?;
        let static_type = operand
            .treat
            .clone()
            .or_else(|| node.entity.clone())
            .unwrap_or_default();

        let mut exact = Vec::new();
        for name in types {
            if !self.index.contains(name) {
                return Err(ResolveError::UnknownType {
                    name: name.clone(),
                    segment: segment.clone(),
                });
            }
            if !self.index.same_hierarchy(name, &static_type) {
                return Err(ResolveError::TypeMismatch {
                    target: name.clone(),
                    static_type: static_type.clone(),
                    segment: segment.clone(),
                });
            }
            if !self.index.entity(name)?.is_abstract && !exact.contains(name) {
                exact.push(name.clone());
            }
        }
        let test = adapter.type_test(&self.shape(), node, &exact)?;

        if let PredicateClause::On(join_alias) = clause {
            let join = self
                .tree
                .find_mut(join_alias)
                .ok_or_else(|| unknown_alias(join_alias, segment))?;
            join.on.push(JoinPredicate::TypeRestriction {
                alias: operand.alias.clone(),
                types: exact.clone(),
                test: test.clone(),
            });
        }
        Ok(ResolvedPredicate::TypeIs {
            clause: clause.clone(),
            alias: operand.alias.clone(),
            types: exact,
            test,
        })
    }

    /// Fails unless `alias` names a join an ON clause can be attached to.
    pub fn check_join_alias(&self, alias: &str, segment: &str) -> ResolveResult<()> {
        match self.tree.find(alias) {
            Some(node) if node.source_alias.is_some() => Ok(()),
            _ if self.basic_keys.contains_key(alias) => Ok(()),
            _ => Err(unknown_alias(alias, segment)),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn node(&self, alias: &str, segment: &str) -> ResolveResult<&JoinNode> {
        self.tree
            .find(alias)
            .ok_or_else(|| unknown_alias(alias, segment))
    }

    fn source_info(&self, alias: &str, segment: &str) -> ResolveResult<SourceInfo> {
        if self.basic_keys.contains_key(alias) {
            return Err(ResolveError::invalid_navigation(
                segment,
                "a basic value has no attributes",
            ));
        }
        let node = self.node(alias, segment)?;
        let entity = node.entity.clone().ok_or_else(|| {
            ResolveError::invalid_navigation(segment, "not an entity alias")
        })?;
        Ok(SourceInfo {
            alias: node.alias.clone(),
            id: storage_id(self.index, node)?,
            entity,
            kind: node.kind,
            adapter: node_adapter(node, segment)?,
        })
    }

    fn resolve_chain(
        &self,
        owner: &str,
        attributes: &[String],
        segment: &str,
    ) -> ResolveResult<AttributeChain> {
        let Some((first, rest)) = attributes.split_first() else {
            return Err(ResolveError::invalid_navigation(segment, "no attribute to read"));
        };
        let mut current = self
            .index
            .attribute(owner, first)?
            .cloned()
            .ok_or_else(|| ResolveError::unknown_attribute(owner, first.clone(), segment, &[]))?;
        let mut embeddings = Vec::new();
        for name in rest {
            let AttributeKind::Embedded { target, .. } = &current.kind else {
                return Err(ResolveError::invalid_navigation(
                    segment,
                    format!("`{}` has no attribute `{}`", current.name, name),
                ));
            };
            let next = self
                .index
                .embeddable_attribute(target, name)?
                .cloned()
                .ok_or_else(|| ResolveError::unknown_attribute(target, name.clone(), segment, &[]))?;
            embeddings.push(std::mem::replace(&mut current, next));
        }
        Ok(AttributeChain {
            embeddings,
            last: current,
        })
    }
}

/// Id column of the table `node` itself reads, which under the joined
/// strategy may differ from the id column of the type it is narrowed to.
fn storage_id(index: &TypeHierarchyIndex, node: &JoinNode) -> ResolveResult<ColumnRef> {
    let entity = node
        .storage_entity
        .as_deref()
        .or(node.entity.as_deref())
        .ok_or_else(|| ResolveError::invalid_navigation(node.alias.clone(), "not an entity alias"))?;
    Ok(ColumnRef::new(node.alias.clone(), index.id_column(entity)?))
}

/// Alias of the table of `node` holding columns declared by `declaring_type`.
/// Embeddable attributes live with their owner.
fn host_alias(node: &JoinNode, declaring_type: &str) -> String {
    node.alias_for_type(declaring_type)
        .unwrap_or(&node.alias)
        .to_string()
}

fn node_adapter(node: &JoinNode, segment: &str) -> ResolveResult<&'static dyn StrategyAdapter> {
    node.strategy
        .map(super::strategy::for_strategy)
        .ok_or_else(|| ResolveError::invalid_navigation(segment, "not an entity alias"))
}

fn unknown_alias(alias: &str, segment: &str) -> ResolveError {
    ResolveError::UnknownAlias {
        alias: alias.to_string(),
        segment: segment.to_string(),
    }
}
