//! Structured errors for queries that cannot be resolved.

use polytreat::entity_catalog::InheritanceStrategy::{self, Joined, SingleTable, TablePerClass};
use polytreat::{ResolveErrorKind, ResolverConfig, TreatQuery};
use test_case::test_case;

use crate::support::{path, resolver, ty};

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn unknown_treat_target(strategy: InheritanceStrategy) {
    let query = TreatQuery::new(ty(strategy, "Base"), "b").select(path("TREAT(b AS Sub3).value"));
    let err = resolver(ResolverConfig::default())
        .resolve(&query)
        .expect_err("Sub3 is not a type");
    assert_eq!(err.kind(), ResolveErrorKind::UnknownType);
    assert_eq!(err.segment(), Some("TREAT(b AS Sub3)"));
}

#[test]
fn treat_across_hierarchies() {
    let query = TreatQuery::new("JoinedBase", "b")
        .left_join(path("TREAT(b.parent AS SingleTableSub1)"), "s1");
    let err = resolver(ResolverConfig::default())
        .resolve(&query)
        .expect_err("SingleTableSub1 is not a JoinedBase");
    assert_eq!(err.kind(), ResolveErrorKind::TypeMismatch);
}

#[test]
fn treat_to_unrelated_subtype_of_narrowed_alias() {
    let query = TreatQuery::new("JoinedBase", "b")
        .left_join(path("TREAT(b.parent AS JoinedSub1)"), "s1")
        .select(path("TREAT(s1 AS JoinedSub2).sub2Value"));
    let err = resolver(ResolverConfig::default())
        .resolve(&query)
        .expect_err("s1 is already narrowed to JoinedSub1");
    assert_eq!(err.kind(), ResolveErrorKind::TypeMismatch);
}

#[test]
fn map_key_treat_over_several_link_tables() {
    let query = TreatQuery::new("TablePerClassBase", "b")
        .left_join(path("TREAT(KEY(b.map) AS TablePerClassSub1)"), "s1");
    let err = resolver(ResolverConfig::default())
        .resolve(&query)
        .expect_err("the map spans two link tables");
    assert_eq!(err.kind(), ResolveErrorKind::AmbiguousMapKeyTreat);
    assert!(err.to_string().contains("2 link tables"), "{}", err);
}

#[test]
fn constraint_into_table_per_class_hierarchy() -> anyhow::Result<()> {
    let yaml = r#"
name: constrained
entities:
  - name: Owner
    table: owner
    attributes:
      - { name: id, kind: scalar }
      - { name: target, kind: to_one, target: Base, foreign_key: no_constraint }
  - name: Base
    abstract: true
    strategy: table_per_class
    attributes:
      - { name: id, kind: scalar }
  - name: Sub1
    supertype: Base
    table: sub1
    attributes:
      - { name: value, kind: scalar }
  - name: Sub2
    supertype: Base
    table: sub2
    attributes:
      - { name: value, kind: scalar }
"#;
    let catalog = polytreat::EntityCatalogConfig::from_yaml_str(yaml)?.build_catalog()?;
    let index = std::sync::Arc::new(polytreat::TypeHierarchyIndex::build(&catalog)?);
    let resolver = polytreat::Resolver::new(index, ResolverConfig::default());
    let plan = resolver.resolve(
        &TreatQuery::new("Owner", "o").left_join(path("TREAT(o.target AS Sub1)"), "t"),
    )?;
    assert!(plan.tree.contains("t"));

    let constrained = yaml.replace("foreign_key: no_constraint", "foreign_key: constraint");
    let err = polytreat::EntityCatalogConfig::from_yaml_str(&constrained)?
        .build_catalog()
        .expect_err("no single table can carry the constraint");
    assert!(matches!(
        err,
        polytreat::CatalogError::UnsupportedForeignKey { .. }
    ));
    Ok(())
}

#[test]
fn subtype_attribute_without_treat() {
    let query = TreatQuery::new("SingleTableBase", "b").select(path("b.sub1Value"));
    let err = resolver(ResolverConfig::default())
        .resolve(&query)
        .expect_err("sub1Value is declared on a subtype");
    assert_eq!(err.kind(), ResolveErrorKind::UnknownAttribute);
    assert!(err.to_string().contains("use TREAT"), "{}", err);
}

#[test]
fn duplicate_join_alias() {
    let query = TreatQuery::new("JoinedBase", "b")
        .left_join(path("b.parent"), "p")
        .left_join(path("b.parent"), "p");
    let err = resolver(ResolverConfig::default())
        .resolve(&query)
        .expect_err("p is joined twice");
    assert_eq!(err.kind(), ResolveErrorKind::DuplicateAlias);
}

#[test]
fn malformed_path() {
    let err = "TREAT(b AS".parse::<polytreat::PathExpression>().unwrap_err();
    assert_eq!(err.kind(), ResolveErrorKind::PathSyntax);
}
