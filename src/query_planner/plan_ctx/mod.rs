//! Resolution context.
//!
//! [`PlanCtx`] maintains state while one query is resolved:
//! - alias-to-[`TableCtx`] mappings for roots, explicit and implicit joins
//! - the implicit join registry, so repeated navigations share one join
//! - alias generation for implicit joins
//!
//! A context lives for exactly one resolution and is never shared.

mod table_ctx;

pub use table_ctx::{AliasValue, MapOrigin, TableCtx};

use std::collections::HashMap;
use std::fmt;

use crate::query_planner::errors::{ResolveError, ResolveResult};
use crate::query_planner::normalizer::JoinSide;

/// Identity of an implicit join: navigating the same attribute chain from
/// the same source (under the same treat) always yields the same join.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImplicitJoinKey {
    pub source: String,
    pub source_treat: Option<String>,
    pub attributes: Vec<String>,
    pub side: JoinSide,
}

#[derive(Debug, Clone)]
pub struct PlanCtx {
    alias_table_ctx_map: HashMap<String, TableCtx>,
    /// Registration order, for deterministic iteration and display
    alias_order: Vec<String>,
    implicit_joins: HashMap<ImplicitJoinKey, String>,
    separator: String,
}

impl PlanCtx {
    pub fn new(separator: impl Into<String>) -> Self {
        PlanCtx {
            alias_table_ctx_map: HashMap::new(),
            alias_order: Vec::new(),
            implicit_joins: HashMap::new(),
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn insert_table_ctx(&mut self, table_ctx: TableCtx) -> ResolveResult<()> {
        let alias = table_ctx.alias().to_string();
        if self.alias_table_ctx_map.contains_key(&alias) {
            return Err(ResolveError::DuplicateAlias { alias });
        }
        self.alias_order.push(alias.clone());
        self.alias_table_ctx_map.insert(alias, table_ctx);
        Ok(())
    }

    pub fn get_table_ctx(&self, alias: &str) -> Option<&TableCtx> {
        self.alias_table_ctx_map.get(alias)
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.alias_table_ctx_map.contains_key(alias)
    }

    pub fn implicit_join_alias(&self, key: &ImplicitJoinKey) -> Option<&str> {
        self.implicit_joins.get(key).map(String::as_str)
    }

    /// Picks a fresh alias for an implicit join and remembers it under `key`.
    ///
    /// Aliases read like the path they come from: `b.parent.map` with a key
    /// side becomes `b_parent_map_key`. A numeric suffix is appended when the
    /// name is taken.
    pub fn allocate_implicit_alias(&mut self, key: ImplicitJoinKey) -> String {
        let sep = self.separator.as_str();
        let mut base = format!("{}{}{}", key.source, sep, key.attributes.join(sep));
        match key.side {
            JoinSide::Element => {}
            JoinSide::MapKey => base = format!("{}{}key", base, sep),
            JoinSide::MapValue => base = format!("{}{}value", base, sep),
        }

        let mut alias = base.clone();
        let mut n = 2;
        while self.is_taken(&alias) {
            alias = format!("{}{}{}", base, sep, n);
            n += 1;
        }
        self.implicit_joins.insert(key, alias.clone());
        alias
    }

    fn is_taken(&self, alias: &str) -> bool {
        self.alias_table_ctx_map.contains_key(alias)
            || self.implicit_joins.values().any(|taken| taken == alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &TableCtx> {
        self.alias_order
            .iter()
            .filter_map(|alias| self.alias_table_ctx_map.get(alias))
    }
}

impl fmt::Display for PlanCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PlanCtx:")?;
        for table_ctx in self.aliases() {
            if table_ctx.is_explicit_alias() {
                writeln!(f, "  {}", table_ctx)?;
            } else {
                writeln!(f, "  {} (implicit)", table_ctx)?;
            }
        }
        Ok(())
    }
}
