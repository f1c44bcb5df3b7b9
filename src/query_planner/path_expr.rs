//! Path expressions as they appear in FROM, SELECT and WHERE.
//!
//! ```text
//! path := primary ( '.' attribute )*
//! primary := alias
//!          | TREAT '(' path AS Type ')'
//!          | KEY '(' path ')'
//!          | VALUE '(' path ')'
//! ```
//!
//! Paths serialize to and from their textual form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::ResolveError;
use super::path_parser;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PathExpression {
    Root(String),
    Navigate {
        parent: Box<PathExpression>,
        attribute: String,
    },
    MapKey(Box<PathExpression>),
    MapValue(Box<PathExpression>),
    Treat {
        parent: Box<PathExpression>,
        target: String,
    },
}

impl PathExpression {
    pub fn root(alias: impl Into<String>) -> Self {
        PathExpression::Root(alias.into())
    }

    pub fn nav(self, attribute: impl Into<String>) -> Self {
        PathExpression::Navigate {
            parent: Box::new(self),
            attribute: attribute.into(),
        }
    }

    pub fn treat(self, target: impl Into<String>) -> Self {
        PathExpression::Treat {
            parent: Box::new(self),
            target: target.into(),
        }
    }

    pub fn key(self) -> Self {
        PathExpression::MapKey(Box::new(self))
    }

    pub fn value(self) -> Self {
        PathExpression::MapValue(Box::new(self))
    }

    pub fn root_alias(&self) -> &str {
        match self {
            PathExpression::Root(alias) => alias,
            PathExpression::Navigate { parent, .. }
            | PathExpression::Treat { parent, .. }
            | PathExpression::MapKey(parent)
            | PathExpression::MapValue(parent) => parent.root_alias(),
        }
    }

    pub fn contains_treat(&self) -> bool {
        match self {
            PathExpression::Root(_) => false,
            PathExpression::Treat { .. } => true,
            PathExpression::Navigate { parent, .. }
            | PathExpression::MapKey(parent)
            | PathExpression::MapValue(parent) => parent.contains_treat(),
        }
    }

    /// A flat path reads attributes straight off an alias, optionally
    /// through one root treat: `b.value`, `TREAT(b AS Sub1).sub1Value`.
    pub fn is_flat(&self) -> bool {
        fn flat_primary(expr: &PathExpression) -> bool {
            match expr {
                PathExpression::Root(_) => true,
                PathExpression::Treat { parent, .. } => {
                    matches!(parent.as_ref(), PathExpression::Root(_))
                }
                _ => false,
            }
        }
        match self {
            PathExpression::Navigate { parent, .. } => parent.is_flat(),
            other => flat_primary(other),
        }
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathExpression::Root(alias) => write!(f, "{}", alias),
            PathExpression::Navigate { parent, attribute } => write!(f, "{}.{}", parent, attribute),
            PathExpression::MapKey(parent) => write!(f, "KEY({})", parent),
            PathExpression::MapValue(parent) => write!(f, "VALUE({})", parent),
            PathExpression::Treat { parent, target } => write!(f, "TREAT({} AS {})", parent, target),
        }
    }
}

impl FromStr for PathExpression {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        path_parser::parse_path(s)
    }
}

impl TryFrom<String> for PathExpression {
    type Error = ResolveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PathExpression> for String {
    fn from(value: PathExpression) -> Self {
        value.to_string()
    }
}
