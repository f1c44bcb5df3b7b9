//! Shared fixtures for the integration tests: the treat entity catalog, the
//! four-instance data set and a reference evaluator that executes resolved
//! plans over in-memory tables.

pub mod data;
pub mod evaluator;

use std::path::PathBuf;
use std::sync::Arc;

use polytreat::entity_catalog::InheritanceStrategy;
use polytreat::{EntityCatalogConfig, ResolverConfig, Resolver, TypeHierarchyIndex};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/treat_entities.yaml")
}

pub fn treat_index() -> Arc<TypeHierarchyIndex> {
    let catalog = EntityCatalogConfig::from_yaml_file(fixture_path())
        .and_then(|config| config.build_catalog())
        .expect("fixture catalog must load");
    Arc::new(TypeHierarchyIndex::build(&catalog).expect("fixture index must build"))
}

pub fn resolver(config: ResolverConfig) -> Resolver {
    init_logging();
    Resolver::new(treat_index(), config)
}

/// Fixture type name for a strategy, e.g. `ty(Joined, "Sub1")` is `JoinedSub1`.
pub fn ty(strategy: InheritanceStrategy, suffix: &str) -> String {
    let prefix = match strategy {
        InheritanceStrategy::Joined => "Joined",
        InheritanceStrategy::SingleTable => "SingleTable",
        InheritanceStrategy::TablePerClass => "TablePerClass",
    };
    format!("{}{}", prefix, suffix)
}

pub fn path(text: &str) -> polytreat::PathExpression {
    text.parse().expect("test path must parse")
}
