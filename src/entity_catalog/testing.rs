//! Catalog fixtures shared by unit tests.

use std::sync::Arc;

use super::catalog::EntityCatalog;
use super::config::EntityCatalogConfig;
use super::hierarchy::TypeHierarchyIndex;

pub const TREAT_ENTITIES_YAML: &str = include_str!("../../tests/fixtures/treat_entities.yaml");

/// The Base/Sub1/Sub2 model mapped once per inheritance strategy.
pub fn treat_catalog() -> EntityCatalog {
    EntityCatalogConfig::from_yaml_str(TREAT_ENTITIES_YAML)
        .and_then(|config| config.build_catalog())
        .expect("fixture catalog must load")
}

pub fn treat_index() -> Arc<TypeHierarchyIndex> {
    Arc::new(TypeHierarchyIndex::build(&treat_catalog()).expect("fixture index must build"))
}
