//! Structural validation of an entity catalog.
//!
//! Runs once when an [`EntityCatalog`] is assembled and checks that:
//!
//! - every type has the tables its inheritance strategy needs
//! - single-table hierarchies can tell their types apart
//! - attribute targets, inverse sides and column overrides resolve
//! - foreign key constraints only point at types stored in a single table

use std::collections::HashSet;

use super::catalog::{EntityCatalog, SchemaCatalog};
use super::entity_schema::{
    Attribute, AttributeKind, CollectionMapping, CollectionStorage, EntityType, ForeignKeyMode,
    InheritanceStrategy, MapKeyType,
};
use super::errors::CatalogError;

pub struct SchemaValidator<'a> {
    catalog: &'a EntityCatalog,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(catalog: &'a EntityCatalog) -> Self {
        SchemaValidator { catalog }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        for entity in self.catalog.entity_types() {
            self.validate_tables(entity)?;
            self.validate_inherited_names(entity)?;
            for attribute in &entity.attributes {
                self.validate_attribute(&entity.name, attribute, Some(entity))?;
            }
        }
        for embeddable in self.catalog.embeddable_types() {
            for attribute in &embeddable.attributes {
                self.validate_attribute(&embeddable.name, attribute, None)?;
            }
            self.validate_embedding_is_acyclic(&embeddable.name, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Concrete tables a reference to `name` may land in under table-per-class.
    pub fn concrete_table_count(&self, name: &str) -> Result<usize, CatalogError> {
        let entity = self.catalog.resolve_type(name)?;
        let mut count = usize::from(!entity.is_abstract);
        for sub in &entity.subtypes {
            count += self.concrete_table_count(sub)?;
        }
        Ok(count)
    }

    fn validate_tables(&self, entity: &EntityType) -> Result<(), CatalogError> {
        let needs_table = match entity.strategy {
            InheritanceStrategy::Joined => true,
            InheritanceStrategy::SingleTable => entity.supertype.is_none(),
            InheritanceStrategy::TablePerClass => !entity.is_abstract,
        };
        if needs_table && entity.table.is_none() {
            return Err(CatalogError::MissingTable {
                name: entity.name.clone(),
                strategy: entity.strategy,
            });
        }

        if entity.strategy == InheritanceStrategy::SingleTable {
            let root = self.catalog.root_of(&entity.name)?;
            let has_subtypes = !root.subtypes.is_empty();
            let discriminator = root
                .table
                .as_ref()
                .and_then(|table| table.discriminator_column.as_ref());
            if has_subtypes && discriminator.is_none() {
                return Err(CatalogError::MissingDiscriminatorColumn {
                    root: root.name.clone(),
                });
            }
            if has_subtypes && !entity.is_abstract && entity.discriminator_value.is_none() {
                return Err(CatalogError::MissingDiscriminatorValue {
                    name: entity.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_inherited_names(&self, entity: &EntityType) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for attribute in self.catalog.attributes_of(entity)? {
            if !seen.insert(attribute.name.as_str()) {
                return Err(CatalogError::DuplicateAttribute {
                    owner: entity.name.clone(),
                    attribute: attribute.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_attribute(
        &self,
        owner: &str,
        attribute: &Attribute,
        owning_entity: Option<&EntityType>,
    ) -> Result<(), CatalogError> {
        if owning_entity.is_some() && attribute.declaring_type != owner {
            return Err(CatalogError::invalid_attribute(
                owner,
                &attribute.name,
                format!("declared on `{}`", attribute.declaring_type),
            ));
        }

        match &attribute.kind {
            AttributeKind::Scalar { .. } => Ok(()),
            AttributeKind::ToOneRelation {
                target,
                foreign_key,
                ..
            } => {
                let target_type = self.resolve_target(owner, attribute, target)?;
                if *foreign_key == ForeignKeyMode::Constraint
                    && target_type.strategy == InheritanceStrategy::TablePerClass
                {
                    let tables = self.concrete_table_count(target)?;
                    if tables > 1 {
                        return Err(CatalogError::UnsupportedForeignKey {
                            owner: owner.to_string(),
                            attribute: attribute.name.clone(),
                            target: target.clone(),
                            tables,
                        });
                    }
                }
                Ok(())
            }
            AttributeKind::Embedded {
                target,
                column_overrides,
            } => {
                let embeddable = self.catalog.resolve_embeddable(target).map_err(|_| {
                    CatalogError::invalid_attribute(
                        owner,
                        &attribute.name,
                        format!("unknown embeddable `{}`", target),
                    )
                })?;
                for key in column_overrides.keys() {
                    if embeddable.attribute(key).is_none() {
                        return Err(CatalogError::invalid_attribute(
                            owner,
                            &attribute.name,
                            format!("column override for unknown attribute `{}`", key),
                        ));
                    }
                }
                Ok(())
            }
            AttributeKind::CollectionRelation(mapping) => {
                if owning_entity.is_none() {
                    return Err(CatalogError::invalid_attribute(
                        owner,
                        &attribute.name,
                        "collections inside embeddables must be embedded collections",
                    ));
                }
                self.validate_collection(owner, attribute, mapping, owning_entity)
            }
            AttributeKind::EmbeddedCollectionRelation(mapping) => {
                if owning_entity.is_some() {
                    return Err(CatalogError::invalid_attribute(
                        owner,
                        &attribute.name,
                        "embedded collections belong to embeddables",
                    ));
                }
                self.validate_collection(owner, attribute, mapping, None)
            }
        }
    }

    fn validate_collection(
        &self,
        owner: &str,
        attribute: &Attribute,
        mapping: &CollectionMapping,
        owning_entity: Option<&EntityType>,
    ) -> Result<(), CatalogError> {
        let target = self.resolve_target(owner, attribute, &mapping.target)?;
        if let Some(MapKeyType::Entity { target: key, .. }) = mapping.map_key() {
            self.resolve_target(owner, attribute, key)?;
        }

        match &mapping.storage {
            CollectionStorage::JoinTable(_) => Ok(()),
            CollectionStorage::MappedBy { attribute: inverse } => {
                let inverse_attr = self
                    .catalog
                    .attributes_of(target)?
                    .into_iter()
                    .find(|attr| &attr.name == inverse);
                match inverse_attr {
                    Some(Attribute {
                        kind: AttributeKind::ToOneRelation { .. },
                        ..
                    }) => Ok(()),
                    _ => Err(CatalogError::invalid_attribute(
                        owner,
                        &attribute.name,
                        format!(
                            "mapped by `{}` which is not a to-one attribute of `{}`",
                            inverse, target.name
                        ),
                    )),
                }
            }
            CollectionStorage::PerConcreteTable { .. } => match owning_entity {
                Some(entity) if entity.strategy == InheritanceStrategy::TablePerClass => Ok(()),
                _ => Err(CatalogError::invalid_attribute(
                    owner,
                    &attribute.name,
                    "per-table link storage needs a table-per-class owner",
                )),
            },
        }
    }

    fn resolve_target(
        &self,
        owner: &str,
        attribute: &Attribute,
        target: &str,
    ) -> Result<&'a EntityType, CatalogError> {
        self.catalog.resolve_type(target).map_err(|_| {
            CatalogError::unknown_type_with_context(
                target,
                format!("target of attribute `{}.{}`", owner, attribute.name),
            )
        })
    }

    fn validate_embedding_is_acyclic(
        &self,
        name: &str,
        path: &mut Vec<String>,
    ) -> Result<(), CatalogError> {
        if path.iter().any(|seen| seen == name) {
            return Err(CatalogError::invalid_attribute(
                path.first().map(String::as_str).unwrap_or(name),
                name,
                "embeddable embeds itself",
            ));
        }
        path.push(name.to_string());
        let embeddable = self.catalog.resolve_embeddable(name)?;
        for attribute in &embeddable.attributes {
            if let AttributeKind::Embedded { target, .. } = &attribute.kind {
                self.validate_embedding_is_acyclic(target, path)?;
            }
        }
        path.pop();
        Ok(())
    }
}
