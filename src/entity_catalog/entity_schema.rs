use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::join_plan::JoinKind;

/// How the rows of an entity hierarchy are laid out across tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceStrategy {
    /// One table per type, sharing the identifier of the root table.
    Joined,
    /// One table for the whole hierarchy plus a discriminator column.
    SingleTable,
    /// One self-contained table per concrete type.
    TablePerClass,
}

impl fmt::Display for InheritanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InheritanceStrategy::Joined => write!(f, "JOINED"),
            InheritanceStrategy::SingleTable => write!(f, "SINGLE_TABLE"),
            InheritanceStrategy::TablePerClass => write!(f, "TABLE_PER_CLASS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub name: String,
    /// Only set on the root of a single-table hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator_column: Option<String>,
}

impl TableMapping {
    pub fn new(name: impl Into<String>) -> Self {
        TableMapping {
            name: name.into(),
            discriminator_column: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyMode {
    #[default]
    Constraint,
    NoConstraint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTableMapping {
    pub name: String,
    pub owner_column: String,
    pub element_column: String,
}

/// Where the link rows of a collection live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionStorage {
    /// A single link table shared by every owner type.
    JoinTable(JoinTableMapping),
    /// No link table: the element table carries a to-one attribute back to the owner.
    MappedBy { attribute: String },
    /// One link table per concrete owner table, named `<owner table>_<suffix>`.
    PerConcreteTable {
        suffix: String,
        owner_column: String,
        element_column: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapKeyType {
    Basic { column: String },
    Entity { target: String, column: String },
}

impl MapKeyType {
    pub fn column(&self) -> &str {
        match self {
            MapKeyType::Basic { column } | MapKeyType::Entity { column, .. } => column,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            MapKeyType::Basic { .. } => None,
            MapKeyType::Entity { target, .. } => Some(target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    List { order_column: Option<String> },
    Set,
    Map { key: MapKeyType },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMapping {
    pub target: String,
    pub kind: CollectionKind,
    pub storage: CollectionStorage,
}

impl CollectionMapping {
    pub fn map_key(&self) -> Option<&MapKeyType> {
        match &self.kind {
            CollectionKind::Map { key } => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Scalar {
        column: String,
    },
    ToOneRelation {
        target: String,
        nullable: bool,
        join_column: String,
        #[serde(default)]
        foreign_key: ForeignKeyMode,
    },
    Embedded {
        target: String,
        /// Column renames applied to the embeddable's attributes, keyed by attribute name.
        #[serde(default)]
        column_overrides: BTreeMap<String, String>,
    },
    CollectionRelation(CollectionMapping),
    EmbeddedCollectionRelation(CollectionMapping),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub declaring_type: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn is_relation(&self) -> bool {
        matches!(
            self.kind,
            AttributeKind::ToOneRelation { .. }
                | AttributeKind::CollectionRelation(_)
                | AttributeKind::EmbeddedCollectionRelation(_)
        )
    }

    pub fn collection(&self) -> Option<&CollectionMapping> {
        match &self.kind {
            AttributeKind::CollectionRelation(mapping)
            | AttributeKind::EmbeddedCollectionRelation(mapping) => Some(mapping),
            _ => None,
        }
    }

    /// Entity type reached by navigating this attribute, if any.
    pub fn target_entity(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::ToOneRelation { target, .. } => Some(target),
            AttributeKind::CollectionRelation(mapping)
            | AttributeKind::EmbeddedCollectionRelation(mapping) => Some(&mapping.target),
            _ => None,
        }
    }

    /// Join kind of an implicit navigation through this attribute.
    ///
    /// Non-nullable to-one relations join inner; nullable ones and collections
    /// join left outer. `None` for attributes that never produce a join.
    pub fn natural_join_kind(&self) -> Option<JoinKind> {
        match &self.kind {
            AttributeKind::ToOneRelation { nullable: false, .. } => Some(JoinKind::Inner),
            AttributeKind::ToOneRelation { nullable: true, .. } => Some(JoinKind::Left),
            AttributeKind::CollectionRelation(_) | AttributeKind::EmbeddedCollectionRelation(_) => {
                Some(JoinKind::Left)
            }
            AttributeKind::Scalar { .. } | AttributeKind::Embedded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub supertype: Option<String>,
    /// Direct subtypes in declaration order. Filled in by the catalog.
    #[serde(default)]
    pub subtypes: Vec<String>,
    pub is_abstract: bool,
    /// Attributes declared on this type only.
    pub attributes: Vec<Attribute>,
    /// The table holding this type's own columns. For single-table
    /// hierarchies every type points at the root table.
    pub table: Option<TableMapping>,
    /// Identifier column, shared by every table of the hierarchy.
    pub id_column: String,
    pub discriminator_value: Option<String>,
    pub strategy: InheritanceStrategy,
}

impl EntityType {
    pub fn declared_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_ref().map(|table| table.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddableType {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl EmbeddableType {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }
}
