//! Precomputed hierarchy facts used on every resolution.
//!
//! The index is built once from a [`SchemaCatalog`], owns a copy of all
//! metadata it needs and is never mutated afterwards, so one instance can be
//! shared behind an `Arc` by any number of concurrent resolutions.

use std::collections::{HashMap, HashSet};

use super::catalog::SchemaCatalog;
use super::entity_schema::{
    Attribute, AttributeKind, EmbeddableType, EntityType, InheritanceStrategy, TableMapping,
};
use super::errors::CatalogError;

#[derive(Debug, Clone)]
struct HierarchyEntry {
    entity: EntityType,
    root: String,
    /// Strict supertypes, nearest first.
    ancestors: Vec<String>,
    /// The type itself followed by all descendants in pre-order.
    subtree: Vec<String>,
    /// Attributes visible on the type, including inherited ones.
    visible: HashMap<String, Attribute>,
}

#[derive(Debug, Clone, Default)]
pub struct TypeHierarchyIndex {
    entries: HashMap<String, HierarchyEntry>,
    embeddables: HashMap<String, EmbeddableType>,
    declaration_order: Vec<String>,
}

impl TypeHierarchyIndex {
    pub fn build<C: SchemaCatalog + ?Sized>(catalog: &C) -> Result<Self, CatalogError> {
        let mut index = TypeHierarchyIndex::default();

        for entity in catalog.entity_types() {
            let mut ancestors = Vec::new();
            let mut current = entity;
            while let Some(parent) = &current.supertype {
                if ancestors.contains(parent) || parent == &entity.name {
                    return Err(CatalogError::CyclicHierarchy {
                        name: entity.name.clone(),
                    });
                }
                ancestors.push(parent.clone());
                current = catalog.resolve_type(parent)?;
            }

            let visible = catalog
                .attributes_of(entity)?
                .into_iter()
                .map(|attr| (attr.name.clone(), attr.clone()))
                .collect();

            index.declaration_order.push(entity.name.clone());
            index.entries.insert(
                entity.name.clone(),
                HierarchyEntry {
                    entity: entity.clone(),
                    root: current.name.clone(),
                    ancestors,
                    subtree: Vec::new(),
                    visible,
                },
            );
        }

        for name in index.declaration_order.clone() {
            let subtree = index.collect_subtree(&name)?;
            if let Some(entry) = index.entries.get_mut(&name) {
                entry.subtree = subtree;
            }
        }

        for embeddable in catalog.embeddable_types() {
            index
                .embeddables
                .insert(embeddable.name.clone(), embeddable.clone());
        }

        log::debug!(
            "Type hierarchy index built over {} entity types",
            index.entries.len()
        );
        Ok(index)
    }

    fn collect_subtree(&self, name: &str) -> Result<Vec<String>, CatalogError> {
        let mut out = vec![name.to_string()];
        for sub in &self.entity(name)?.subtypes {
            out.extend(self.collect_subtree(sub)?);
        }
        Ok(out)
    }

    fn entry(&self, name: &str) -> Result<&HierarchyEntry, CatalogError> {
        self.entries
            .get(name)
            .ok_or_else(|| CatalogError::UnknownType {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType, CatalogError> {
        self.entry(name).map(|entry| &entry.entity)
    }

    pub fn embeddable(&self, name: &str) -> Result<&EmbeddableType, CatalogError> {
        self.embeddables
            .get(name)
            .ok_or_else(|| CatalogError::UnknownEmbeddable {
                name: name.to_string(),
            })
    }

    pub fn entity_names(&self) -> &[String] {
        &self.declaration_order
    }

    pub fn root_of(&self, name: &str) -> Result<&str, CatalogError> {
        self.entry(name).map(|entry| entry.root.as_str())
    }

    pub fn strategy_of(&self, name: &str) -> Result<InheritanceStrategy, CatalogError> {
        self.entity(name).map(|entity| entity.strategy)
    }

    /// Strict supertypes of `name`, nearest first.
    pub fn ancestors(&self, name: &str) -> Result<&[String], CatalogError> {
        self.entry(name).map(|entry| entry.ancestors.as_slice())
    }

    /// `name` and all of its descendants, in pre-order.
    pub fn subtree(&self, name: &str) -> Result<&[String], CatalogError> {
        self.entry(name).map(|entry| entry.subtree.as_slice())
    }

    pub fn direct_subtypes(&self, name: &str) -> Result<&[String], CatalogError> {
        self.entity(name).map(|entity| entity.subtypes.as_slice())
    }

    /// Non-abstract members of the subtree of `name`, in pre-order.
    pub fn concrete_subtree(&self, name: &str) -> Result<Vec<&str>, CatalogError> {
        let mut out = Vec::new();
        for member in self.subtree(name)? {
            if !self.entity(member)?.is_abstract {
                out.push(member.as_str());
            }
        }
        Ok(out)
    }

    /// True when `ancestor` is a strict supertype of `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.entries
            .get(descendant)
            .is_some_and(|entry| entry.ancestors.iter().any(|name| name == ancestor))
    }

    pub fn is_same_or_descendant(&self, name: &str, of: &str) -> bool {
        name == of || self.is_ancestor(of, name)
    }

    pub fn same_hierarchy(&self, left: &str, right: &str) -> bool {
        match (self.entries.get(left), self.entries.get(right)) {
            (Some(l), Some(r)) => l.root == r.root,
            _ => false,
        }
    }

    /// Attribute visible on `entity`, declared there or on a supertype.
    pub fn attribute(&self, entity: &str, name: &str) -> Result<Option<&Attribute>, CatalogError> {
        self.entry(entity).map(|entry| entry.visible.get(name))
    }

    /// Proper subtypes of `entity` that declare an attribute called `name`.
    pub fn declared_below(&self, entity: &str, name: &str) -> Result<Vec<&str>, CatalogError> {
        let mut out = Vec::new();
        for member in self.subtree(entity)?.iter().skip(1) {
            if self.entity(member)?.declared_attribute(name).is_some() {
                out.push(member.as_str());
            }
        }
        Ok(out)
    }

    pub fn embeddable_attribute(
        &self,
        embeddable: &str,
        name: &str,
    ) -> Result<Option<&Attribute>, CatalogError> {
        self.embeddable(embeddable).map(|emb| emb.attribute(name))
    }

    pub fn table_of(&self, name: &str) -> Result<&TableMapping, CatalogError> {
        let entity = self.entity(name)?;
        entity.table.as_ref().ok_or_else(|| CatalogError::MissingTable {
            name: name.to_string(),
            strategy: entity.strategy,
        })
    }

    pub fn id_column(&self, name: &str) -> Result<&str, CatalogError> {
        self.entity(name).map(|entity| entity.id_column.as_str())
    }

    /// Discriminator column of a single-table hierarchy.
    pub fn discriminator_column(&self, name: &str) -> Result<Option<&str>, CatalogError> {
        let root = self.root_of(name)?;
        Ok(self
            .table_of(root)?
            .discriminator_column
            .as_deref())
    }

    /// Number of concrete tables a table-per-class reference to `name` may land in.
    pub fn concrete_table_count(&self, name: &str) -> Result<usize, CatalogError> {
        Ok(self.concrete_subtree(name)?.len())
    }

    /// Column an attribute maps to after applying the override chain of the
    /// embeddings it was reached through.
    pub fn column_for(&self, attribute: &Attribute, overrides: &[&Attribute]) -> Option<String> {
        let base = match &attribute.kind {
            AttributeKind::Scalar { column } => column.clone(),
            AttributeKind::ToOneRelation { join_column, .. } => join_column.clone(),
            _ => return None,
        };
        // The outermost embedding wins.
        let mut column = base;
        let mut name = attribute.name.clone();
        for embedding in overrides.iter().rev() {
            if let AttributeKind::Embedded {
                column_overrides, ..
            } = &embedding.kind
            {
                if let Some(overridden) = column_overrides.get(&name) {
                    column = overridden.clone();
                }
            }
            name = format!("{}.{}", embedding.name, name);
        }
        Some(column)
    }

    /// All types that share a hierarchy with `name`, in declaration order.
    pub fn hierarchy_members(&self, name: &str) -> Result<Vec<&str>, CatalogError> {
        let root = self.root_of(name)?;
        Ok(self
            .declaration_order
            .iter()
            .filter(|member| self.entries.get(member.as_str()).is_some_and(|e| e.root == root))
            .map(String::as_str)
            .collect())
    }

    pub fn all_types(&self) -> HashSet<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}
