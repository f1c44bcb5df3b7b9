//! Resolver configuration loaded from YAML.

use std::io::Write;

use polytreat::entity_catalog::InheritanceStrategy::Joined;
use polytreat::{ImplicitJoinSemantics, ResolverConfig, TreatQuery};

use crate::support::data::database;
use crate::support::evaluator::{int, Evaluator};
use crate::support::{path, resolver};

#[test]
fn yaml_config_drives_resolution() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "implicit_join_semantics: inner")?;
    writeln!(file, "supertype_join_elimination: false")?;

    let config = ResolverConfig::from_yaml_file(file.path())?;
    assert_eq!(config.implicit_join_semantics, ImplicitJoinSemantics::Inner);
    assert!(config.type_filter_pruning);
    assert_eq!(config.union_discriminator_column, "clazz_");

    let query =
        TreatQuery::new("JoinedBase", "b").select(path("TREAT(b.parent AS JoinedSub1).sub1Value"));
    let plan = resolver(config).resolve(&query)?;
    assert_eq!(
        Evaluator::new(&database(Joined)).column(&plan),
        vec![None, int(101)]
    );
    Ok(())
}

#[test]
fn invalid_yaml_config_is_rejected() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "alias_separator: \"--\"")?;
    assert!(ResolverConfig::from_yaml_file(file.path()).is_err());

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "implicit_join_semantics: sideways")?;
    assert!(ResolverConfig::from_yaml_file(file.path()).is_err());
    Ok(())
}
