use std::collections::{BTreeMap, HashSet};

use super::entity_schema::{Attribute, EmbeddableType, EntityType, InheritanceStrategy};
use super::errors::CatalogError;
use super::schema_validator::SchemaValidator;

/// Read access to entity metadata.
///
/// The resolver never talks to a catalog directly: it builds a
/// [`TypeHierarchyIndex`](super::hierarchy::TypeHierarchyIndex) from one
/// up front and works against the index from then on.
pub trait SchemaCatalog {
    fn resolve_type(&self, name: &str) -> Result<&EntityType, CatalogError>;

    fn resolve_embeddable(&self, name: &str) -> Result<&EmbeddableType, CatalogError>;

    /// All entity types, in declaration order.
    fn entity_types(&self) -> Vec<&EntityType>;

    fn embeddable_types(&self) -> Vec<&EmbeddableType>;

    fn strategy_of(&self, entity: &EntityType) -> InheritanceStrategy {
        entity.strategy
    }

    fn subtypes_of(&self, entity: &EntityType) -> Result<Vec<&EntityType>, CatalogError> {
        entity
            .subtypes
            .iter()
            .map(|name| self.resolve_type(name))
            .collect()
    }

    /// Attributes visible on `entity`: inherited ones first, root to leaf.
    fn attributes_of(&self, entity: &EntityType) -> Result<Vec<&Attribute>, CatalogError> {
        let mut chain = vec![self.resolve_type(&entity.name)?];
        let mut current = chain[0];
        while let Some(parent) = &current.supertype {
            current = self.resolve_type(parent)?;
            chain.push(current);
        }
        Ok(chain
            .iter()
            .rev()
            .flat_map(|ty| ty.attributes.iter())
            .collect())
    }

    /// True when `ancestor` is a strict supertype of `descendant`.
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut current = self.resolve_type(descendant).ok();
        while let Some(ty) = current {
            match &ty.supertype {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = self.resolve_type(parent).ok(),
                None => return false,
            }
        }
        false
    }
}

/// In-memory catalog assembled from entity and embeddable declarations.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: BTreeMap<String, EntityType>,
    embeddables: BTreeMap<String, EmbeddableType>,
    declaration_order: Vec<String>,
}

impl EntityCatalog {
    /// Links supertypes to subtypes, propagates hierarchy-wide table data and
    /// validates the result.
    pub fn new(
        entities: Vec<EntityType>,
        embeddables: Vec<EmbeddableType>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = EntityCatalog::default();

        for entity in entities {
            if catalog.entities.contains_key(&entity.name) {
                return Err(CatalogError::DuplicateType { name: entity.name });
            }
            catalog.declaration_order.push(entity.name.clone());
            catalog.entities.insert(entity.name.clone(), entity);
        }
        for embeddable in embeddables {
            if catalog.embeddables.contains_key(&embeddable.name)
                || catalog.entities.contains_key(&embeddable.name)
            {
                return Err(CatalogError::DuplicateType {
                    name: embeddable.name,
                });
            }
            catalog
                .embeddables
                .insert(embeddable.name.clone(), embeddable);
        }

        catalog.link_hierarchies()?;
        SchemaValidator::new(&catalog).validate()?;

        log::debug!(
            "Entity catalog built: {} entity types, {} embeddables",
            catalog.entities.len(),
            catalog.embeddables.len()
        );
        Ok(catalog)
    }

    /// Root of the hierarchy `name` belongs to.
    pub fn root_of(&self, name: &str) -> Result<&EntityType, CatalogError> {
        let mut current = self.resolve_type(name)?;
        let mut seen = HashSet::new();
        while let Some(parent) = &current.supertype {
            if !seen.insert(current.name.clone()) {
                return Err(CatalogError::CyclicHierarchy {
                    name: name.to_string(),
                });
            }
            current = self.entities.get(parent).ok_or_else(|| {
                CatalogError::unknown_type_with_context(
                    parent.clone(),
                    format!("supertype of `{}`", current.name),
                )
            })?;
        }
        Ok(current)
    }

    fn link_hierarchies(&mut self) -> Result<(), CatalogError> {
        // Resolve every root first so cycles and dangling supertypes surface
        // before anything is mutated.
        let mut roots = BTreeMap::new();
        for name in &self.declaration_order {
            let root = self.root_of(name)?;
            roots.insert(name.clone(), root.name.clone());
        }

        for name in &self.declaration_order {
            let root_name = &roots[name];
            let root = &self.entities[root_name];
            let entity = &self.entities[name];
            if entity.strategy != root.strategy {
                return Err(CatalogError::ConflictingStrategy {
                    name: name.clone(),
                    root: root_name.clone(),
                    declared: entity.strategy,
                    inherited: root.strategy,
                });
            }
        }

        let mut subtypes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in &self.declaration_order {
            if let Some(parent) = &self.entities[name].supertype {
                subtypes.entry(parent.clone()).or_default().push(name.clone());
            }
        }

        for name in self.declaration_order.clone() {
            let root_name = roots[&name].clone();
            let (root_table, root_id) = {
                let root = &self.entities[&root_name];
                (root.table.clone(), root.id_column.clone())
            };
            if let Some(entity) = self.entities.get_mut(&name) {
                entity.subtypes = subtypes.remove(&name).unwrap_or_default();
                if entity.id_column.is_empty() {
                    entity.id_column = root_id;
                }
                if entity.strategy == InheritanceStrategy::SingleTable && name != root_name {
                    entity.table = root_table;
                }
            }
        }
        Ok(())
    }
}

impl SchemaCatalog for EntityCatalog {
    fn resolve_type(&self, name: &str) -> Result<&EntityType, CatalogError> {
        self.entities
            .get(name)
            .ok_or_else(|| CatalogError::UnknownType {
                name: name.to_string(),
            })
    }

    fn resolve_embeddable(&self, name: &str) -> Result<&EmbeddableType, CatalogError> {
        self.embeddables
            .get(name)
            .ok_or_else(|| CatalogError::UnknownEmbeddable {
                name: name.to_string(),
            })
    }

    fn entity_types(&self) -> Vec<&EntityType> {
        self.declaration_order
            .iter()
            .filter_map(|name| self.entities.get(name))
            .collect()
    }

    fn embeddable_types(&self) -> Vec<&EmbeddableType> {
        self.embeddables.values().collect()
    }
}
