//! Properties every plan must have, checked over a set of representative
//! queries for all three strategies.

use std::sync::Arc;
use std::thread;

use polytreat::entity_catalog::InheritanceStrategy::{self, Joined, SingleTable, TablePerClass};
use polytreat::join_plan::{JoinKind, JoinNode};
use polytreat::query_planner::normalizer::Normalizer;
use polytreat::query_planner::plan_ctx::{AliasValue, PlanCtx, TableCtx};
use polytreat::{Resolver, ResolverConfig, TreatQuery};

use crate::support::data::database;
use crate::support::evaluator::Evaluator;
use crate::support::{path, resolver, treat_index, ty};

fn queries(strategy: InheritanceStrategy) -> Vec<TreatQuery> {
    let base = ty(strategy, "Base");
    let sub1 = ty(strategy, "Sub1");
    let sub2 = ty(strategy, "Sub2");
    vec![
        TreatQuery::new(&base, "b").select(path(&format!("TREAT(b AS {}).sub1Value", sub1))),
        TreatQuery::new(&base, "b")
            .select(path(&format!("TREAT(b AS {}).sub1Value", sub1)))
            .select(path(&format!("TREAT(b AS {}).sub2Value", sub2))),
        TreatQuery::new(&base, "b")
            .left_join(path(&format!("TREAT(b.parent AS {})", sub1)), "s1")
            .select(path("s1.sub1Value"))
            .select(path("b.value")),
        TreatQuery::new(&base, "b")
            .inner_join(path(&format!("TREAT(b.parent AS {})", sub2)), "s2")
            .select(path("s2.sub2Value"))
            .select(path("s2.value")),
        TreatQuery::new(&base, "b")
            .select(path(&format!("TREAT(b.parent AS {}).sub1Value", sub1)))
            .select(path("b.parent.value")),
        TreatQuery::new(&base, "b")
            .left_join(path("b.parent"), "p")
            .select(path("p.value"))
            .where_type(path("p"), [sub2.clone()]),
        TreatQuery::new(&base, "b")
            .select(path("b.value"))
            .where_type(path("b"), [sub1.clone()]),
        TreatQuery::new(&base, "b")
            .left_join(path(&format!("TREAT(b.parent AS {})", sub1)), "s1")
            .select(path(&format!("TREAT(b AS {}).sub2Value", sub2)))
            .select(path("s1.name")),
        TreatQuery::new(&base, "b")
            .left_join(path(&format!("TREAT(b.children AS {})", sub1)), "c")
            .select(path("c.sub1Value"))
            .select(path("b.value")),
        // Per-table maps need a single owner table before their values can be treated
        TreatQuery::new(&base, "b")
            .left_join(
                path(&format!("TREAT(VALUE(TREAT(b AS {}).map) AS {})", sub1, sub1)),
                "v",
            )
            .select(path("v.sub1Value"))
            .where_type(path("b"), [sub1.clone()]),
        TreatQuery::new(&base, "b")
            .left_join(path(&format!("TREAT(b.embeddable.list AS {})", sub1)), "l")
            .select(path("l.sub1Value"))
            .select(path("b.value")),
    ]
}

fn assert_left_cascades(node: &JoinNode, under_left: bool) {
    if under_left {
        assert_eq!(node.kind, JoinKind::Left, "{} must be a LEFT join", node.alias);
    }
    let left = under_left || node.kind == JoinKind::Left;
    for child in node.hierarchy.iter().chain(node.children.iter()) {
        assert_left_cascades(child, left);
    }
}

#[test]
fn left_joins_cascade_to_descendants() -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    for strategy in [Joined, SingleTable, TablePerClass] {
        for query in queries(strategy) {
            for plan in [resolver.resolve_unoptimized(&query)?, resolver.resolve(&query)?] {
                for root in &plan.tree.roots {
                    assert_left_cascades(root, false);
                }
            }
        }
    }
    Ok(())
}

#[test]
fn strategies_agree_on_results() -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    let per_strategy: Vec<Vec<_>> = [Joined, SingleTable, TablePerClass]
        .into_iter()
        .map(|strategy| {
            let db = database(strategy);
            queries(strategy)
                .iter()
                .map(|query| {
                    let plan = resolver.resolve(query).expect("query resolves");
                    Evaluator::new(&db).run(&plan)
                })
                .collect()
        })
        .collect();

    assert_eq!(per_strategy[0], per_strategy[1]);
    assert_eq!(per_strategy[0], per_strategy[2]);
    Ok(())
}

#[test]
fn optimizer_preserves_results() -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::default());
    for strategy in [Joined, SingleTable, TablePerClass] {
        let db = database(strategy);
        for query in queries(strategy) {
            let naive = resolver.resolve_unoptimized(&query)?;
            let optimized = resolver.resolve(&query)?;
            assert!(optimized.tree.join_count() <= naive.tree.join_count());
            assert_eq!(
                Evaluator::new(&db).run(&naive),
                Evaluator::new(&db).run(&optimized),
                "{:?}: {:?}",
                strategy,
                query
            );
        }
    }
    Ok(())
}

#[test]
fn optimization_is_idempotent() -> anyhow::Result<()> {
    let index = treat_index();
    let config = ResolverConfig::default();
    let ctx = polytreat::query_planner::optimizer::OptimizerCtx::new(&index, &config);
    let resolver = Resolver::new(index.clone(), config.clone());
    for strategy in [Joined, SingleTable, TablePerClass] {
        for query in queries(strategy) {
            let once = resolver.resolve(&query)?;
            let twice = polytreat::query_planner::optimizer::optimize(once.clone(), &ctx)?;
            assert_eq!(once, twice);
        }
    }
    Ok(())
}

#[test]
fn root_treat_introduces_no_join() -> anyhow::Result<()> {
    let resolver = resolver(ResolverConfig::unoptimized());
    for strategy in [Joined, SingleTable, TablePerClass] {
        let plain = TreatQuery::new(ty(strategy, "Base"), "b").select(path("b.value"));
        let treated = TreatQuery::new(ty(strategy, "Base"), "b")
            .select(path(&format!("TREAT(b AS {}).sub1Value", ty(strategy, "Sub1"))))
            .select(path(&format!("TREAT(b AS {}).value", ty(strategy, "Sub2"))));
        assert_eq!(
            resolver.resolve(&plain)?.tree,
            polytreat::JoinTree {
                root_treats: vec![],
                ..resolver.resolve(&treated)?.tree
            }
        );
    }
    Ok(())
}

#[test]
fn normalizing_a_normalized_path_changes_nothing() -> anyhow::Result<()> {
    let index = treat_index();
    let config = ResolverConfig::default();
    let normalizer = Normalizer::new(&index, &config);
    let mut ctx = PlanCtx::new("_");
    ctx.insert_table_ctx(TableCtx::build(
        "b".to_string(),
        AliasValue::Entity {
            static_type: "JoinedBase".to_string(),
            declared_type: "JoinedBase".to_string(),
        },
        true,
    ))?;

    let nested = path("TREAT(TREAT(b AS JoinedSub1).parent1 AS JoinedSub1).sub1Value");
    let first = normalizer.normalize_reference(&nested, &mut ctx)?;
    assert!(!first.joins.is_empty());

    let flat = first.to_path_expression();
    let second = normalizer.normalize_reference(&flat, &mut ctx)?;
    assert!(second.joins.is_empty());
    assert_eq!(second.to_path_expression(), flat);

    for text in ["b.value", "TREAT(b AS JoinedSub2).sub2Value"] {
        let normalized = normalizer.normalize_reference(&path(text), &mut ctx)?;
        assert!(normalized.joins.is_empty());
        assert_eq!(normalized.to_path_expression().to_string(), text);
    }
    Ok(())
}

#[test]
fn concurrent_resolution_shares_one_index() {
    let resolver = Arc::new(resolver(ResolverConfig::default()));
    let handles: Vec<_> = [Joined, SingleTable, TablePerClass]
        .into_iter()
        .map(|strategy| {
            let resolver = Arc::clone(&resolver);
            thread::spawn(move || {
                let db = database(strategy);
                (0..20)
                    .map(|_| {
                        let query = TreatQuery::new(ty(strategy, "Base"), "b").left_join(
                            path(&format!("TREAT(b.parent AS {})", ty(strategy, "Sub1"))),
                            "s1",
                        )
                        .select(path("s1.sub1Value"));
                        let plan = resolver.resolve(&query).expect("query resolves");
                        Evaluator::new(&db).column(&plan)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.extend(handle.join().expect("resolver thread panicked"));
    }
    assert_eq!(results.len(), 60);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}
