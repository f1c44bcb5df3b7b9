//! The four-instance data set, laid out once per inheritance strategy.
//!
//! | name     | type | id | value | subtype value | parent   | map key -> value  | embeddable list |
//! |----------|------|----|-------|---------------|----------|-------------------|-----------------|
//! | s1       | Sub1 | 1  | 1     | 1             | s1Parent | s1Parent          | s1Parent        |
//! | s2       | Sub2 | 2  | 102   | 2             | s2Parent | s2Parent          | s2Parent        |
//! | s1Parent | Sub1 | 3  | 101   | 101           | -        | s2                | s1, s2          |
//! | s2Parent | Sub2 | 4  | 102   | 102           | -        | s1                | -               |

use std::collections::HashMap;

use polytreat::entity_catalog::InheritanceStrategy;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    pub fn render(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Text(v) => v.clone(),
        }
    }
}

pub type Row = HashMap<String, Value>;

#[derive(Debug, Default)]
pub struct Database {
    pub tables: HashMap<String, Vec<Row>>,
}

impl Database {
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }
}

struct Instance {
    id: i64,
    sub1: bool,
    value: i64,
    sub_value: i64,
    parent: Option<i64>,
    map_key: i64,
    embeddable_list: &'static [i64],
}

const INSTANCES: [Instance; 4] = [
    Instance {
        id: 1,
        sub1: true,
        value: 1,
        sub_value: 1,
        parent: Some(3),
        map_key: 3,
        embeddable_list: &[3],
    },
    Instance {
        id: 2,
        sub1: false,
        value: 102,
        sub_value: 2,
        parent: Some(4),
        map_key: 4,
        embeddable_list: &[4],
    },
    Instance {
        id: 3,
        sub1: true,
        value: 101,
        sub_value: 101,
        parent: None,
        map_key: 2,
        embeddable_list: &[1, 2],
    },
    Instance {
        id: 4,
        sub1: false,
        value: 102,
        sub_value: 102,
        parent: None,
        map_key: 1,
        embeddable_list: &[],
    },
];

pub fn row(columns: &[(&str, Value)]) -> Row {
    columns
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn base_columns(instance: &Instance) -> Row {
    let mut out = row(&[
        ("id", Value::Int(instance.id)),
        ("name", Value::Text(format!("entity{}", instance.id))),
        ("value", Value::Int(instance.value)),
    ]);
    if let Some(parent) = instance.parent {
        out.insert("parent_id".to_string(), Value::Int(parent));
    }
    out
}

fn sub_value_column(instance: &Instance) -> (&'static str, Value) {
    if instance.sub1 {
        ("sub1_value", Value::Int(instance.sub_value))
    } else {
        ("sub2_value", Value::Int(instance.sub_value))
    }
}

fn map_row(instance: &Instance) -> Row {
    row(&[
        ("base_id", Value::Int(instance.id)),
        ("map_id", Value::Int(instance.map_key)),
        ("map_key_id", Value::Int(instance.map_key)),
    ])
}

fn embeddable_list_rows(instance: &Instance) -> impl Iterator<Item = Row> + '_ {
    instance.embeddable_list.iter().map(|element| {
        row(&[
            ("base_id", Value::Int(instance.id)),
            ("list_id", Value::Int(*element)),
        ])
    })
}

pub fn database(strategy: InheritanceStrategy) -> Database {
    let mut db = Database::default();
    for instance in &INSTANCES {
        let (sub_column, sub_value) = sub_value_column(instance);
        match strategy {
            InheritanceStrategy::Joined => {
                db.push("joined_base", base_columns(instance));
                let table = if instance.sub1 {
                    "joined_sub1"
                } else {
                    "joined_sub2"
                };
                db.push(
                    table,
                    row(&[("id", Value::Int(instance.id)), (sub_column, sub_value)]),
                );
                db.push("joined_map", map_row(instance));
                for list_row in embeddable_list_rows(instance) {
                    db.push("joined_embeddable_list", list_row);
                }
            }
            InheritanceStrategy::SingleTable => {
                let mut base = base_columns(instance);
                let dtype = if instance.sub1 { "1" } else { "2" };
                base.insert("dtype".to_string(), Value::Text(dtype.to_string()));
                base.insert(sub_column.to_string(), sub_value);
                db.push("single_table_base", base);
                db.push("single_table_map", map_row(instance));
                for list_row in embeddable_list_rows(instance) {
                    db.push("single_table_embeddable_list", list_row);
                }
            }
            InheritanceStrategy::TablePerClass => {
                let mut base = base_columns(instance);
                base.insert(sub_column.to_string(), sub_value);
                let table = if instance.sub1 {
                    "table_per_class_sub1"
                } else {
                    "table_per_class_sub2"
                };
                db.push(table, base);
                db.push(&format!("{}_map", table), map_row(instance));
                for list_row in embeddable_list_rows(instance) {
                    db.push("table_per_class_embeddable_list", list_row);
                }
            }
        }
    }
    db
}
