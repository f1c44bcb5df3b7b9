//! Human-readable rendering of resolved plans, used by debug logging and
//! tests. The output reads like SQL but is not meant to be executed.

use std::fmt::{self, Write};

use super::{
    JoinNode, JoinTree, JoinPredicate, PhysicalRelation, ResolvedPath, ResolvedPlan, ResolvedPredicate,
    TypeTest,
};

pub fn render_relation(relation: &PhysicalRelation) -> String {
    match relation {
        PhysicalRelation::Table { name } => name.clone(),
        PhysicalRelation::Union {
            branches,
            discriminator_column,
        } => {
            if branches.is_empty() {
                return "(SELECT NULL WHERE FALSE)".to_string();
            }
            let selects: Vec<String> = branches
                .iter()
                .map(|branch| {
                    format!(
                        "SELECT *, '{}' AS {} FROM {}",
                        branch.entity, discriminator_column, branch.table
                    )
                })
                .collect();
            format!("({})", selects.join(" UNION ALL "))
        }
    }
}

pub fn render_type_test(test: &TypeTest) -> String {
    match test {
        TypeTest::Always => "TRUE".to_string(),
        TypeTest::Never => "FALSE".to_string(),
        TypeTest::Discriminator { column, values } => {
            let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
            format!("{} IN ({})", column, quoted.join(", "))
        }
        TypeTest::SubtypeRows { alternatives } => {
            let rendered: Vec<String> = alternatives
                .iter()
                .map(|alt| {
                    let mut parts = vec![format!("{} IS NOT NULL", alt.present)];
                    parts.extend(alt.absent.iter().map(|c| format!("{} IS NULL", c)));
                    format!("({})", parts.join(" AND "))
                })
                .collect();
            match rendered.len() {
                0 => "FALSE".to_string(),
                1 => rendered.into_iter().next().unwrap_or_default(),
                _ => format!("({})", rendered.join(" OR ")),
            }
        }
    }
}

pub fn render_predicate(predicate: &JoinPredicate) -> String {
    match predicate {
        JoinPredicate::ColumnsEqual { left, right } => format!("{} = {}", left, right),
        JoinPredicate::TypeRestriction { test, .. } => render_type_test(test),
    }
}

fn render_conjunction(predicates: &[JoinPredicate]) -> String {
    if predicates.is_empty() {
        return "TRUE".to_string();
    }
    predicates
        .iter()
        .map(render_predicate)
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn render_node(out: &mut String, node: &JoinNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let nested = node.hierarchy.len() + node.children.len();
    if nested == 0 {
        let _ = writeln!(
            out,
            "{}{} {} AS {} ON {}",
            indent,
            node.kind,
            render_relation(&node.relation),
            node.alias,
            render_conjunction(&node.on)
        );
        return;
    }
    let _ = writeln!(
        out,
        "{}{} ({} AS {}",
        indent,
        node.kind,
        render_relation(&node.relation),
        node.alias
    );
    for child in node.hierarchy.iter().chain(node.children.iter()) {
        render_node(out, child, depth + 1);
    }
    let _ = writeln!(out, "{}) ON {}", indent, render_conjunction(&node.on));
}

pub fn render_path(path: &ResolvedPath) -> String {
    if path.always_null {
        return "NULL".to_string();
    }
    let Some(column) = &path.column else {
        return format!("<{}>", path.expression);
    };
    match &path.guard {
        Some(guard) => format!("CASE WHEN {} THEN {} END", render_type_test(guard), column),
        None => column.to_string(),
    }
}

/// SQL-like rendering of a whole plan.
pub fn explain(plan: &ResolvedPlan) -> String {
    let mut out = String::new();
    let selects: Vec<String> = plan.references.iter().map(render_path).collect();
    let _ = writeln!(out, "SELECT {}", selects.join(", "));

    for (i, root) in plan.tree.roots.iter().enumerate() {
        let keyword = if i == 0 { "FROM" } else { "CROSS JOIN" };
        let _ = writeln!(
            out,
            "{} {} AS {}",
            keyword,
            render_relation(&root.relation),
            root.alias
        );
        for child in root.hierarchy.iter().chain(root.children.iter()) {
            render_node(&mut out, child, 1);
        }
    }

    let mut filters: Vec<String> = plan
        .tree
        .roots
        .iter()
        .flat_map(|root| root.on.iter().map(render_predicate))
        .collect();
    for predicate in &plan.predicates {
        match predicate {
            ResolvedPredicate::TypeIs { test, .. } => filters.push(render_type_test(test)),
            ResolvedPredicate::Comparison { path, op, .. } => {
                filters.push(format!("{} {}", render_path(path), op))
            }
            ResolvedPredicate::Opaque { paths, .. } => {
                let args: Vec<String> = paths.iter().map(render_path).collect();
                filters.push(format!("OPAQUE({})", args.join(", ")))
            }
        }
    }
    if !filters.is_empty() {
        let _ = writeln!(out, "WHERE {}", filters.join(" AND "));
    }
    out
}

impl fmt::Display for JoinTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in &self.roots {
            write_tree(f, root, 0)?;
        }
        for sub in &self.root_treats {
            writeln!(
                f,
                "TREAT({} AS {}) -> {}",
                sub.alias,
                sub.treat,
                sub.physical_alias.as_deref().unwrap_or("<pruned>")
            )?;
        }
        Ok(())
    }
}

fn write_tree(f: &mut fmt::Formatter<'_>, node: &JoinNode, depth: usize) -> fmt::Result {
    let marker = if node.materializes.is_hierarchy() { "~" } else { "" };
    writeln!(
        f,
        "{}{}{} [{}] {} ON {}",
        "  ".repeat(depth),
        marker,
        node.alias,
        node.kind,
        render_relation(&node.relation),
        render_conjunction(&node.on)
    )?;
    for child in node.hierarchy.iter().chain(node.children.iter()) {
        write_tree(f, child, depth + 1)?;
    }
    Ok(())
}

pub fn explain_json(plan: &ResolvedPlan) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(plan)
}
