//! The documented treat scenarios, run once per inheritance strategy and
//! checked both on plan shape and on the rows the plan produces.

use polytreat::entity_catalog::InheritanceStrategy::{self, Joined, SingleTable, TablePerClass};
use polytreat::join_plan::{ColumnRef, JoinKind, JoinPredicate, PhysicalRelation};
use polytreat::{ImplicitJoinSemantics, ResolverConfig, TreatQuery};
use test_case::test_case;

use crate::support::data::{database, row, Database, Value};
use crate::support::evaluator::{int, Evaluator};
use crate::support::{path, resolver, ty};

fn base(strategy: InheritanceStrategy) -> TreatQuery {
    TreatQuery::new(ty(strategy, "Base"), "b")
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn root_treat_reads_subtype_value(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(strategy).select(path(&format!(
        "TREAT(b AS {}).sub1Value",
        ty(strategy, "Sub1")
    )));

    let without_select = resolver.resolve_unoptimized(&base(strategy))?;
    let plan = resolver.resolve_unoptimized(&query)?;
    assert_eq!(plan.tree.join_count(), without_select.tree.join_count());
    assert_eq!(plan.tree.root_treats.len(), 1);

    let db = database(strategy);
    let expected = vec![None, None, int(1), int(101)];
    assert_eq!(Evaluator::new(&db).column(&plan), expected);
    assert_eq!(Evaluator::new(&db).column(&resolver.resolve(&query)?), expected);
    Ok(())
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn independent_root_treats(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(strategy)
        .select(path(&format!("TREAT(b AS {}).sub1Value", ty(strategy, "Sub1"))))
        .select(path(&format!("TREAT(b AS {}).sub2Value", ty(strategy, "Sub2"))));
    let plan = resolver.resolve(&query)?;
    assert_eq!(plan.tree.root_treats.len(), 2);

    let db = database(strategy);
    assert_eq!(
        Evaluator::new(&db).run(&plan),
        vec![
            vec![None, int(2)],
            vec![None, int(102)],
            vec![int(1), None],
            vec![int(101), None],
        ]
    );
    Ok(())
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn left_treat_join_keeps_unmatched_rows(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(strategy)
        .left_join(
            path(&format!("TREAT(b.parent AS {})", ty(strategy, "Sub1"))),
            "s1",
        )
        .select(path("s1.sub1Value"));

    for plan in [resolver.resolve_unoptimized(&query)?, resolver.resolve(&query)?] {
        let s1 = plan.tree.find("s1").expect("s1 is joined");
        assert!(s1.nodes().iter().all(|node| node.kind == JoinKind::Left));

        let db = database(strategy);
        assert_eq!(
            Evaluator::new(&db).column(&plan),
            vec![None, None, None, int(101)]
        );
    }
    Ok(())
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn inner_treat_join_filters_rows(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(strategy)
        .inner_join(
            path(&format!("TREAT(b.parent AS {})", ty(strategy, "Sub1"))),
            "s1",
        )
        .select(path("s1.sub1Value"));
    let plan = resolver.resolve(&query)?;
    assert_eq!(plan.tree.find("s1").map(|n| n.kind), Some(JoinKind::Inner));

    let db = database(strategy);
    assert_eq!(Evaluator::new(&db).column(&plan), vec![int(101)]);
    Ok(())
}

#[test]
fn type_filter_drops_sibling_subtype_join() -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(Joined)
        .left_join(path("b.parent"), "s1")
        .select(path("TREAT(s1 AS JoinedSub1).sub1Value"))
        .where_type(path("s1"), ["JoinedSub1"]);

    let naive = resolver.resolve_unoptimized(&query)?;
    assert!(naive.tree.contains("s1_joined_sub1"));
    assert!(naive.tree.contains("s1_joined_sub2"));

    let plan = resolver.resolve(&query)?;
    assert!(plan.tree.contains("s1_joined_sub1"));
    assert!(!plan.tree.contains("s1_joined_sub2"));

    let db = database(Joined);
    assert_eq!(Evaluator::new(&db).column(&plan), vec![int(101)]);
    assert_eq!(
        Evaluator::new(&db).column(&naive),
        Evaluator::new(&db).column(&plan)
    );
    Ok(())
}

#[test]
fn type_filter_drops_union_branch() -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(TablePerClass)
        .left_join(path("b.parent"), "s1")
        .select(path("TREAT(s1 AS TablePerClassSub1).sub1Value"))
        .where_type(path("s1"), ["TablePerClassSub1"]);
    let plan = resolver.resolve(&query)?;

    match &plan.tree.find("s1").expect("s1 is joined").relation {
        PhysicalRelation::Union { branches, .. } => {
            let entities: Vec<_> = branches.iter().map(|b| b.entity.as_str()).collect();
            assert_eq!(entities, vec!["TablePerClassSub1"]);
        }
        other => panic!("expected a union, got {:?}", other),
    }

    let db = database(TablePerClass);
    assert_eq!(Evaluator::new(&db).column(&plan), vec![int(101)]);
    Ok(())
}

#[test_case(ImplicitJoinSemantics::Natural, vec![None, None, None, int(101)] ; "natural")]
#[test_case(ImplicitJoinSemantics::Inner, vec![None, int(101)] ; "inner")]
fn implicit_join_semantics(
    semantics: ImplicitJoinSemantics,
    expected: Vec<Option<crate::support::data::Value>>,
) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig {
        implicit_join_semantics: semantics,
        ..Default::default()
    });
    for strategy in [Joined, SingleTable, TablePerClass] {
        let query = base(strategy).select(path(&format!(
            "TREAT(b.parent AS {}).sub1Value",
            ty(strategy, "Sub1")
        )));
        let plan = resolver.resolve(&query)?;
        let db = database(strategy);
        assert_eq!(Evaluator::new(&db).column(&plan), expected, "{:?}", strategy);
    }
    Ok(())
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
fn map_key_treat_join(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(strategy)
        .left_join(
            path(&format!("TREAT(KEY(b.map) AS {})", ty(strategy, "Sub1"))),
            "s1",
        )
        .select(path("s1.sub1Value"));
    let plan = resolver.resolve(&query)?;
    assert!(plan.tree.contains("s1_map_jt"));

    let db = database(strategy);
    assert_eq!(
        Evaluator::new(&db).column(&plan),
        vec![None, None, int(1), int(101)]
    );
    Ok(())
}

#[test]
fn map_key_treat_through_narrowed_owner() -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let query = base(TablePerClass)
        .left_join(
            path("TREAT(KEY(TREAT(b AS TablePerClassSub1).map) AS TablePerClassSub1)"),
            "s1",
        )
        .select(path("s1.sub1Value"));
    let plan = resolver.resolve(&query)?;
    assert_eq!(
        plan.tree.find("s1_map_jt").map(|n| n.relation.clone()),
        Some(PhysicalRelation::table("table_per_class_sub1_map"))
    );

    let db = database(TablePerClass);
    assert_eq!(
        Evaluator::new(&db).column(&plan),
        vec![None, None, None, int(101)]
    );
    Ok(())
}

/// Runs `query` unoptimized and optimized, checks that every join under
/// `left` stays LEFT in both plans and that both plans return `expected`.
fn assert_left_join_rows(
    strategy: InheritanceStrategy,
    query: &TreatQuery,
    left: &str,
    expected: &[Option<Value>],
) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let db = database(strategy);
    let naive = resolver.resolve_unoptimized(query)?;
    let optimized = resolver.resolve(query)?;
    for plan in [&naive, &optimized] {
        let joined = plan.tree.find(left).expect("left join is planned");
        assert!(joined.nodes().iter().all(|node| node.kind == JoinKind::Left));
        assert_eq!(Evaluator::new(&db).column(plan), expected);
    }
    assert_eq!(
        Evaluator::new(&db).run(&naive),
        Evaluator::new(&db).run(&optimized)
    );
    Ok(())
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn inverse_collection_treat_join(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let query = base(strategy)
        .left_join(
            path(&format!("TREAT(b.children AS {})", ty(strategy, "Sub1"))),
            "c",
        )
        .select(path("c.sub1Value"));

    // The element table points back at the owner, no link table
    let plan = resolver(ResolverConfig::default()).resolve_unoptimized(&query)?;
    assert!(!plan.tree.contains("c_children_jt"));
    let c = plan.tree.find("c").expect("c is joined");
    assert!(matches!(
        &c.on[0],
        JoinPredicate::ColumnsEqual { right, .. } if right == &ColumnRef::new("b", "id")
    ));

    assert_left_join_rows(strategy, &query, "c", &[None, None, None, int(1)])
}

#[test_case(Joined, "b", vec![None, None, int(1), int(101)] ; "joined")]
#[test_case(SingleTable, "b", vec![None, None, int(1), int(101)] ; "single table")]
#[test_case(
    TablePerClass,
    "TREAT(b AS TablePerClassSub1)",
    vec![None, None, None, int(101)]
    ; "table per class through narrowed owner"
)]
fn map_value_treat_join(
    strategy: InheritanceStrategy,
    owner: &str,
    expected: Vec<Option<Value>>,
) -> anyhow::Result<()> {
    let query = base(strategy)
        .left_join(
            path(&format!("TREAT(VALUE({}.map) AS {})", owner, ty(strategy, "Sub1"))),
            "v",
        )
        .select(path("v.sub1Value"));
    let plan = resolver(ResolverConfig::default()).resolve_unoptimized(&query)?;
    let link = plan.tree.find("v_map_jt").expect("map link table is joined");
    assert_eq!(link.children[0].alias, "v");

    assert_left_join_rows(strategy, &query, "v_map_jt", &expected)
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn embedded_collection_treat_join(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let query = base(strategy)
        .left_join(
            path(&format!("TREAT(b.embeddable.list AS {})", ty(strategy, "Sub1"))),
            "l",
        )
        .select(path("l.sub1Value"));
    let plan = resolver(ResolverConfig::default()).resolve_unoptimized(&query)?;
    let link = plan
        .tree
        .find("l_embeddable_list_jt")
        .expect("embedded list link table is joined");
    let table = match strategy {
        Joined => "joined_embeddable_list",
        SingleTable => "single_table_embeddable_list",
        TablePerClass => "table_per_class_embeddable_list",
    };
    assert_eq!(link.relation, PhysicalRelation::table(table));

    // s1Parent owns both s1 and s2, s2Parent owns nothing
    assert_left_join_rows(
        strategy,
        &query,
        "l_embeddable_list_jt",
        &[None, None, None, int(1), int(101)],
    )
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn opaque_predicate_never_prunes(strategy: InheritanceStrategy) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let sub2 = ty(strategy, "Sub2");
    let query = base(strategy)
        .left_join(path("b.parent"), "p")
        .select(path(&format!("TREAT(p AS {}).sub2Value", sub2)))
        .where_opaque([path(&format!("TREAT(p AS {}).sub2Value", sub2))]);
    let plan = resolver.resolve(&query)?;
    assert!(plan.references.iter().all(|r| !r.always_null));

    let db = database(strategy);
    assert_eq!(
        Evaluator::new(&db).column(&plan),
        vec![None, None, None, int(102)]
    );
    Ok(())
}

#[test_case(Joined ; "joined")]
#[test_case(SingleTable ; "single table")]
#[test_case(TablePerClass ; "table per class")]
fn null_rejecting_comparison_prunes_other_subtypes(
    strategy: InheritanceStrategy,
) -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let sub1 = ty(strategy, "Sub1");
    let sub2 = ty(strategy, "Sub2");
    let query = base(strategy)
        .select(path(&format!("TREAT(b AS {}).sub1Value", sub1)))
        .select(path(&format!("TREAT(b AS {}).sub2Value", sub2)))
        .where_compare(
            path(&format!("TREAT(b AS {}).sub1Value", sub1)),
            polytreat::ComparisonOp::IsNotNull,
        );

    let plan = resolver.resolve(&query)?;
    assert!(plan.references[1].always_null);
    if strategy == Joined {
        assert!(!plan.tree.contains("b_joined_sub2"));
    }

    let db = database(strategy);
    let naive = resolver.resolve_unoptimized(&query)?;
    let expected = vec![vec![int(1), None], vec![int(101), None]];
    assert_eq!(Evaluator::new(&db).run(&plan), expected);
    assert_eq!(Evaluator::new(&db).run(&naive), expected);
    Ok(())
}

const KEYED_SUBTYPE_YAML: &str = r#"
name: keyed
entities:
  - name: Holder
    table: holder
    attributes:
      - { name: id, kind: scalar }
      - { name: target, kind: to_one, target: Base, join_column: target_id }
  - name: Base
    strategy: joined
    table: base_t
    attributes:
      - { name: id, kind: scalar }
      - { name: value, kind: scalar }
  - name: Sub
    supertype: Base
    table: sub_t
    id_column: sub_id
    attributes:
      - { name: subValue, kind: scalar }
"#;

fn keyed_database() -> Database {
    let mut db = Database::default();
    db.push("holder", row(&[("id", Value::Int(1)), ("target_id", Value::Int(10))]));
    db.push("holder", row(&[("id", Value::Int(2)), ("target_id", Value::Int(11))]));
    db.push("holder", row(&[("id", Value::Int(3))]));
    db.push("base_t", row(&[("id", Value::Int(10)), ("value", Value::Int(1))]));
    db.push("base_t", row(&[("id", Value::Int(11)), ("value", Value::Int(2))]));
    db.push("sub_t", row(&[("sub_id", Value::Int(11)), ("sub_value", Value::Int(7))]));
    db
}

#[test]
fn subtype_with_own_id_column() -> anyhow::Result<()> {
    let catalog = polytreat::EntityCatalogConfig::from_yaml_str(KEYED_SUBTYPE_YAML)?.build_catalog()?;
    let index = std::sync::Arc::new(polytreat::TypeHierarchyIndex::build(&catalog)?);
    let resolver = polytreat::Resolver::new(index, ResolverConfig::default());
    let db = keyed_database();

    let root_treat = TreatQuery::new("Base", "b").select(path("TREAT(b AS Sub).subValue"));
    let treat_join = TreatQuery::new("Holder", "h")
        .left_join(path("TREAT(h.target AS Sub)"), "t")
        .select(path("t.subValue"));

    for plan in [resolver.resolve_unoptimized(&root_treat)?, resolver.resolve(&root_treat)?] {
        let sub = plan.tree.find("b_sub").expect("subtype table is joined");
        assert_eq!(
            sub.on,
            vec![JoinPredicate::columns_equal(
                ColumnRef::new("b_sub", "sub_id"),
                ColumnRef::new("b", "id"),
            )]
        );
        assert_eq!(Evaluator::new(&db).column(&plan), vec![None, int(7)]);
    }

    for plan in [resolver.resolve_unoptimized(&treat_join)?, resolver.resolve(&treat_join)?] {
        let t = plan.tree.find("t").expect("t is joined");
        assert_eq!(t.relation, PhysicalRelation::table("base_t"));
        assert_eq!(
            t.on[0],
            JoinPredicate::columns_equal(ColumnRef::new("t", "id"), ColumnRef::new("h", "target_id"))
        );
        assert_eq!(Evaluator::new(&db).column(&plan), vec![None, None, int(7)]);
    }
    Ok(())
}
