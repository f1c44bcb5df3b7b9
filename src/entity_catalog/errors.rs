//! # Entity Catalog Error Types
//!
//! Errors raised while loading an entity catalog definition and while
//! building the type hierarchy index over it.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: unknown entity or embeddable types
//! - **Structure Errors**: broken supertype chains, conflicting strategies, missing tables
//! - **Configuration Errors**: file I/O and YAML parsing issues during catalog loading
//!
//! When a lookup fails deep inside catalog construction, prefer the context
//! helpers so the message says which declaration triggered the lookup:
//!
//! ```ignore
//! CatalogError::unknown_type_with_context(
//!     "JoinedSub3",
//!     "target of attribute `JoinedBase.parent`"
//! )
//! ```

use thiserror::Error;

use super::entity_schema::InheritanceStrategy;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("No entity type named `{name}`")]
    UnknownType { name: String },
    #[error("No embeddable type named `{name}`")]
    UnknownEmbeddable { name: String },
    #[error("Type `{name}` is declared more than once")]
    DuplicateType { name: String },
    #[error("Attribute `{attribute}` is declared more than once on `{owner}`")]
    DuplicateAttribute { owner: String, attribute: String },
    #[error("Supertype chain of `{name}` forms a cycle")]
    CyclicHierarchy { name: String },
    #[error(
        "Type `{name}` declares strategy {declared} but its hierarchy root `{root}` uses {inherited}"
    )]
    ConflictingStrategy {
        name: String,
        root: String,
        declared: InheritanceStrategy,
        inherited: InheritanceStrategy,
    },
    #[error("Type `{name}` needs a table mapping under the {strategy} strategy")]
    MissingTable {
        name: String,
        strategy: InheritanceStrategy,
    },
    #[error("Single-table hierarchy rooted at `{root}` has subtypes but no discriminator column")]
    MissingDiscriminatorColumn { root: String },
    #[error("Concrete type `{name}` in a single-table hierarchy has no discriminator value")]
    MissingDiscriminatorValue { name: String },
    #[error("Invalid attribute `{owner}.{attribute}`: {message}")]
    InvalidAttribute {
        owner: String,
        attribute: String,
        message: String,
    },
    #[error(
        "Foreign key constraint on `{owner}.{attribute}` cannot reference `{target}`: \
         it spans {tables} table-per-class tables"
    )]
    UnsupportedForeignKey {
        owner: String,
        attribute: String,
        target: String,
        tables: usize,
    },
    #[error("Failed to read catalog file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse catalog: {error}")]
    ConfigParseError { error: String },
}

/// Helper methods for creating errors with context information
impl CatalogError {
    /// Create an UnknownType error naming the declaration that referenced it
    pub fn unknown_type_with_context(name: impl Into<String>, context: impl Into<String>) -> Self {
        CatalogError::UnknownType {
            name: format!("{}\n  Context: {}", name.into(), context.into()),
        }
    }

    pub fn invalid_attribute(
        owner: impl Into<String>,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CatalogError::InvalidAttribute {
            owner: owner.into(),
            attribute: attribute.into(),
            message: message.into(),
        }
    }
}
