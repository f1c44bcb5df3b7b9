//! Entity catalog definitions loaded from YAML (or JSON of the same shape).
//!
//! Catalogs are declared with the following structure:
//!
//! ```yaml
//! name: shop                      # Optional catalog name
//! entities:
//!   - name: Base
//!     abstract: true
//!     strategy: joined            # joined | single_table | table_per_class
//!     table: base
//!     id_column: id
//!     attributes:
//!       - { name: value, kind: scalar }
//!       - { name: parent, kind: to_one, target: Base, join_column: parent_id }
//!       - { name: embeddable, kind: embedded, target: BaseEmbeddable }
//!       - name: map
//!         kind: collection
//!         target: Base
//!         collection: map
//!         map_key: { target: Base, column: map_key_id }
//!         join_table: { name: base_map, owner_column: base_id, element_column: map_id }
//!   - name: Sub1
//!     supertype: Base
//!     table: sub1
//! embeddables:
//!   - name: BaseEmbeddable
//!     attributes:
//!       - { name: someValue, kind: scalar, column: some_value }
//! ```
//!
//! Subtypes inherit the strategy and identifier column of their hierarchy
//! root. Scalar columns default to the snake_case attribute name and to-one
//! join columns to `<attribute>_id`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::catalog::EntityCatalog;
use super::entity_schema::{
    Attribute, AttributeKind, CollectionKind, CollectionMapping, CollectionStorage,
    EmbeddableType, EntityType, ForeignKeyMode, InheritanceStrategy, JoinTableMapping,
    MapKeyType, TableMapping,
};
use super::errors::CatalogError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCatalogConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub entities: Vec<EntityDefinition>,
    #[serde(default)]
    pub embeddables: Vec<EmbeddableDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub strategy: Option<InheritanceStrategy>,
    #[serde(default)]
    pub supertype: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub discriminator_column: Option<String>,
    #[serde(default)]
    pub discriminator_value: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddableDefinition {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKindDefinition {
    List,
    #[default]
    Set,
    Map,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinTableDefinition {
    pub name: String,
    pub owner_column: String,
    pub element_column: String,
    #[serde(default)]
    pub order_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerTableDefinition {
    pub suffix: String,
    pub owner_column: String,
    pub element_column: String,
    #[serde(default)]
    pub order_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapKeyDefinition {
    /// Entity type of the key; omitted for basic keys.
    #[serde(default)]
    pub target: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeDefinition {
    Scalar {
        name: String,
        #[serde(default)]
        column: Option<String>,
    },
    ToOne {
        name: String,
        target: String,
        #[serde(default)]
        join_column: Option<String>,
        #[serde(default = "default_nullable")]
        nullable: bool,
        #[serde(default)]
        foreign_key: ForeignKeyMode,
    },
    Embedded {
        name: String,
        target: String,
        #[serde(default)]
        column_overrides: BTreeMap<String, String>,
    },
    Collection {
        name: String,
        target: String,
        #[serde(default)]
        collection: CollectionKindDefinition,
        #[serde(default)]
        map_key: Option<MapKeyDefinition>,
        #[serde(default)]
        join_table: Option<JoinTableDefinition>,
        #[serde(default)]
        mapped_by: Option<String>,
        #[serde(default)]
        per_table: Option<PerTableDefinition>,
    },
}

fn default_nullable() -> bool {
    true
}

impl AttributeDefinition {
    pub fn name(&self) -> &str {
        match self {
            AttributeDefinition::Scalar { name, .. }
            | AttributeDefinition::ToOne { name, .. }
            | AttributeDefinition::Embedded { name, .. }
            | AttributeDefinition::Collection { name, .. } => name,
        }
    }

    /// Converts the definition. Collections declared inside an embeddable
    /// become embedded collections.
    fn to_attribute(&self, owner: &str, in_embeddable: bool) -> Result<Attribute, CatalogError> {
        let kind = match self {
            AttributeDefinition::Scalar { name, column } => AttributeKind::Scalar {
                column: column.clone().unwrap_or_else(|| snake_case(name)),
            },
            AttributeDefinition::ToOne {
                name,
                target,
                join_column,
                nullable,
                foreign_key,
            } => AttributeKind::ToOneRelation {
                target: target.clone(),
                nullable: *nullable,
                join_column: join_column
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", snake_case(name))),
                foreign_key: *foreign_key,
            },
            AttributeDefinition::Embedded {
                target,
                column_overrides,
                ..
            } => AttributeKind::Embedded {
                target: target.clone(),
                column_overrides: column_overrides.clone(),
            },
            AttributeDefinition::Collection {
                name,
                target,
                collection,
                map_key,
                join_table,
                mapped_by,
                per_table,
            } => {
                let invalid = |message: &str| CatalogError::invalid_attribute(owner, name, message);

                let (storage, order_column) = match (join_table, mapped_by, per_table) {
                    (Some(table), None, None) => (
                        CollectionStorage::JoinTable(JoinTableMapping {
                            name: table.name.clone(),
                            owner_column: table.owner_column.clone(),
                            element_column: table.element_column.clone(),
                        }),
                        table.order_column.clone(),
                    ),
                    (None, Some(inverse), None) => (
                        CollectionStorage::MappedBy {
                            attribute: inverse.clone(),
                        },
                        None,
                    ),
                    (None, None, Some(per_table)) => (
                        CollectionStorage::PerConcreteTable {
                            suffix: per_table.suffix.clone(),
                            owner_column: per_table.owner_column.clone(),
                            element_column: per_table.element_column.clone(),
                        },
                        per_table.order_column.clone(),
                    ),
                    _ => {
                        return Err(invalid(
                            "exactly one of join_table, mapped_by or per_table is required",
                        ))
                    }
                };

                let kind = match (collection, map_key) {
                    (CollectionKindDefinition::List, None) => CollectionKind::List { order_column },
                    (CollectionKindDefinition::Set, None) => CollectionKind::Set,
                    (CollectionKindDefinition::Map, Some(key)) => CollectionKind::Map {
                        key: match &key.target {
                            Some(key_target) => MapKeyType::Entity {
                                target: key_target.clone(),
                                column: key.column.clone(),
                            },
                            None => MapKeyType::Basic {
                                column: key.column.clone(),
                            },
                        },
                    },
                    (CollectionKindDefinition::Map, None) => {
                        return Err(invalid("map collections need a map_key"))
                    }
                    (_, Some(_)) => return Err(invalid("map_key is only valid on maps")),
                };

                let mapping = CollectionMapping {
                    target: target.clone(),
                    kind,
                    storage,
                };
                if in_embeddable {
                    AttributeKind::EmbeddedCollectionRelation(mapping)
                } else {
                    AttributeKind::CollectionRelation(mapping)
                }
            }
        };

        Ok(Attribute {
            name: self.name().to_string(),
            declaring_type: owner.to_string(),
            kind,
        })
    }
}

impl EntityCatalogConfig {
    /// Load catalog definitions from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|e| CatalogError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse catalog definitions from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        serde_yaml::from_str(yaml).map_err(|e| CatalogError::ConfigParseError {
            error: e.to_string(),
        })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|e| CatalogError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_json_str(&contents)
    }

    /// Same structure as the YAML form.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Resolves inherited settings and builds a validated catalog.
    pub fn build_catalog(&self) -> Result<EntityCatalog, CatalogError> {
        let by_name: HashMap<&str, &EntityDefinition> = self
            .entities
            .iter()
            .map(|def| (def.name.as_str(), def))
            .collect();

        let mut entities = Vec::with_capacity(self.entities.len());
        for def in &self.entities {
            let root = root_definition(def, &by_name)?;
            let strategy = root.strategy.unwrap_or(InheritanceStrategy::SingleTable);
            if let Some(declared) = def.strategy {
                if declared != strategy {
                    return Err(CatalogError::ConflictingStrategy {
                        name: def.name.clone(),
                        root: root.name.clone(),
                        declared,
                        inherited: strategy,
                    });
                }
            }

            let mut seen = HashSet::new();
            let mut attributes = Vec::with_capacity(def.attributes.len());
            for attr in &def.attributes {
                if !seen.insert(attr.name()) {
                    return Err(CatalogError::DuplicateAttribute {
                        owner: def.name.clone(),
                        attribute: attr.name().to_string(),
                    });
                }
                attributes.push(attr.to_attribute(&def.name, false)?);
            }

            let discriminator_value = match strategy {
                InheritanceStrategy::SingleTable if !def.is_abstract => Some(
                    def.discriminator_value
                        .clone()
                        .unwrap_or_else(|| def.name.clone()),
                ),
                _ => def.discriminator_value.clone(),
            };

            entities.push(EntityType {
                name: def.name.clone(),
                supertype: def.supertype.clone(),
                subtypes: vec![],
                is_abstract: def.is_abstract,
                attributes,
                table: def.table.as_ref().map(|table| TableMapping {
                    name: table.clone(),
                    discriminator_column: def.discriminator_column.clone(),
                }),
                id_column: match (&def.id_column, &def.supertype) {
                    (Some(column), _) => column.clone(),
                    (None, None) => "id".to_string(),
                    (None, Some(_)) => String::new(),
                },
                discriminator_value,
                strategy,
            });
        }

        let mut embeddables = Vec::with_capacity(self.embeddables.len());
        for def in &self.embeddables {
            let attributes = def
                .attributes
                .iter()
                .map(|attr| attr.to_attribute(&def.name, true))
                .collect::<Result<Vec<_>, _>>()?;
            embeddables.push(EmbeddableType {
                name: def.name.clone(),
                attributes,
            });
        }

        EntityCatalog::new(entities, embeddables)
    }
}

fn root_definition<'a>(
    def: &'a EntityDefinition,
    by_name: &HashMap<&str, &'a EntityDefinition>,
) -> Result<&'a EntityDefinition, CatalogError> {
    let mut current = def;
    let mut steps = 0;
    while let Some(parent) = &current.supertype {
        steps += 1;
        if steps > by_name.len() {
            return Err(CatalogError::CyclicHierarchy {
                name: def.name.clone(),
            });
        }
        current = by_name.get(parent.as_str()).copied().ok_or_else(|| {
            CatalogError::unknown_type_with_context(
                parent.clone(),
                format!("supertype of `{}`", current.name),
            )
        })?;
    }
    Ok(current)
}

/// `sub1Value` -> `sub1_value`
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
