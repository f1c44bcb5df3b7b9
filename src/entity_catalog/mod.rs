pub mod catalog;
pub mod config;
pub mod entity_schema;
pub mod errors;
pub mod hierarchy;
pub mod schema_validator;

#[cfg(test)]
pub mod testing;

pub use catalog::{EntityCatalog, SchemaCatalog};
pub use config::EntityCatalogConfig;
pub use entity_schema::{
    Attribute, AttributeKind, CollectionKind, CollectionMapping, CollectionStorage,
    EmbeddableType, EntityType, ForeignKeyMode, InheritanceStrategy, JoinTableMapping,
    MapKeyType, TableMapping,
};
pub use errors::CatalogError;
pub use hierarchy::TypeHierarchyIndex;
