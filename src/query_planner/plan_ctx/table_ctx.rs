//! Table context for query planning
//!
//! `TableCtx` tracks what the resolver knows about a single alias: the type
//! its rows are statically known to have, whether the user named it, and
//! where it came from when it was produced by `KEY(..)` / `VALUE(..)`.

use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AliasValue {
    Entity {
        /// Type the rows are known to have, narrowed by a treat join.
        static_type: String,
        /// Type declared by the attribute or FROM clause that introduced the alias.
        declared_type: String,
    },
    /// A basic map key; `column` lives on the alias's link table.
    Basic { column: String },
}

/// Origin of an alias produced by `KEY(..)` or `VALUE(..)`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MapOrigin {
    pub attribute: String,
    /// Number of link tables the map is spread over for this owner.
    pub link_tables: usize,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TableCtx {
    alias: String,
    value: AliasValue,
    explicit_alias: bool,
    map_origin: Option<MapOrigin>,
}

impl TableCtx {
    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn build(alias: String, value: AliasValue, explicit_alias: bool) -> Self {
        TableCtx {
            alias,
            value,
            explicit_alias,
            map_origin: None,
        }
    }

    pub fn with_map_origin(mut self, origin: MapOrigin) -> Self {
        self.map_origin = Some(origin);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn value(&self) -> &AliasValue {
        &self.value
    }

    pub fn is_explicit_alias(&self) -> bool {
        self.explicit_alias
    }

    pub fn map_origin(&self) -> Option<&MapOrigin> {
        self.map_origin.as_ref()
    }

    /// Static type of an entity alias, `None` for basic values.
    pub fn static_type(&self) -> Option<&str> {
        match &self.value {
            AliasValue::Entity { static_type, .. } => Some(static_type),
            AliasValue::Basic { .. } => None,
        }
    }

    pub fn declared_type(&self) -> Option<&str> {
        match &self.value {
            AliasValue::Entity { declared_type, .. } => Some(declared_type),
            AliasValue::Basic { .. } => None,
        }
    }
}

impl fmt::Display for TableCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            AliasValue::Entity {
                static_type,
                declared_type,
            } if static_type != declared_type => {
                write!(f, "{}: {} (declared {})", self.alias, static_type, declared_type)
            }
            AliasValue::Entity { static_type, .. } => write!(f, "{}: {}", self.alias, static_type),
            AliasValue::Basic { column } => write!(f, "{}: basic({})", self.alias, column),
        }
    }
}
