//! Errors raised while resolving a treat query into a join plan.
//!
//! `segment` fields carry the rendered sub-expression that failed, e.g.
//! `TREAT(b.parent AS JoinedSub1)`, so callers can point at the offending
//! part of the query.

use thiserror::Error;

use crate::entity_catalog::{CatalogError, InheritanceStrategy};
use crate::query_planner::optimizer::errors::OptimizerError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("Unknown type `{name}` in `{segment}`")]
    UnknownType { name: String, segment: String },

    #[error("TREAT target `{target}` is not a subtype of `{static_type}` in `{segment}`")]
    TypeMismatch {
        target: String,
        static_type: String,
        segment: String,
    },

    #[error("Unsupported under {strategy}: {message} in `{segment}`")]
    UnsupportedStrategyCombination {
        strategy: InheritanceStrategy,
        message: String,
        segment: String,
    },

    #[error(
        "TREAT over `{segment}` is ambiguous: map `{attribute}` is stored in {tables} link tables"
    )]
    AmbiguousMapKeyTreat {
        attribute: String,
        tables: usize,
        segment: String,
    },

    #[error("Unknown alias `{alias}` in `{segment}`")]
    UnknownAlias { alias: String, segment: String },

    #[error("Alias `{alias}` is already defined")]
    DuplicateAlias { alias: String },

    #[error("`{entity}` has no attribute `{attribute}` in `{segment}`{hint}")]
    UnknownAttribute {
        entity: String,
        attribute: String,
        segment: String,
        /// Suggests a TREAT when subtypes declare the attribute.
        hint: String,
    },

    #[error("`{attribute}` is not a map in `{segment}`")]
    NotAMap { attribute: String, segment: String },

    #[error("Cannot navigate `{segment}`: {reason}")]
    InvalidNavigation { segment: String, reason: String },

    #[error("Cannot parse path `{input}`: {message}")]
    PathSyntax { input: String, message: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
}

/// Fieldless discriminant of [`ResolveError`], for callers that only branch
/// on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveErrorKind {
    UnknownType,
    TypeMismatch,
    UnsupportedStrategyCombination,
    AmbiguousMapKeyTreat,
    UnknownAlias,
    DuplicateAlias,
    UnknownAttribute,
    NotAMap,
    InvalidNavigation,
    PathSyntax,
    Catalog,
    Optimizer,
}

impl ResolveError {
    pub fn kind(&self) -> ResolveErrorKind {
        match self {
            ResolveError::UnknownType { .. } => ResolveErrorKind::UnknownType,
            ResolveError::TypeMismatch { .. } => ResolveErrorKind::TypeMismatch,
            ResolveError::UnsupportedStrategyCombination { .. } => {
                ResolveErrorKind::UnsupportedStrategyCombination
            }
            ResolveError::AmbiguousMapKeyTreat { .. } => ResolveErrorKind::AmbiguousMapKeyTreat,
            ResolveError::UnknownAlias { .. } => ResolveErrorKind::UnknownAlias,
            ResolveError::DuplicateAlias { .. } => ResolveErrorKind::DuplicateAlias,
            ResolveError::UnknownAttribute { .. } => ResolveErrorKind::UnknownAttribute,
            ResolveError::NotAMap { .. } => ResolveErrorKind::NotAMap,
            ResolveError::InvalidNavigation { .. } => ResolveErrorKind::InvalidNavigation,
            ResolveError::PathSyntax { .. } => ResolveErrorKind::PathSyntax,
            ResolveError::Catalog(_) => ResolveErrorKind::Catalog,
            ResolveError::Optimizer(_) => ResolveErrorKind::Optimizer,
        }
    }

    /// Rendered path segment the error points at, when it has one.
    pub fn segment(&self) -> Option<&str> {
        match self {
            ResolveError::UnknownType { segment, .. }
            | ResolveError::TypeMismatch { segment, .. }
            | ResolveError::UnsupportedStrategyCombination { segment, .. }
            | ResolveError::AmbiguousMapKeyTreat { segment, .. }
            | ResolveError::UnknownAlias { segment, .. }
            | ResolveError::UnknownAttribute { segment, .. }
            | ResolveError::NotAMap { segment, .. }
            | ResolveError::InvalidNavigation { segment, .. } => Some(segment),
            ResolveError::PathSyntax { input, .. } => Some(input),
            ResolveError::DuplicateAlias { .. }
            | ResolveError::Catalog(_)
            | ResolveError::Optimizer(_) => None,
        }
    }

    pub fn unknown_attribute(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        segment: impl Into<String>,
        declared_on: &[&str],
    ) -> Self {
        let hint = if declared_on.is_empty() {
            String::new()
        } else {
            format!(" (declared on {}; use TREAT)", declared_on.join(", "))
        };
        ResolveError::UnknownAttribute {
            entity: entity.into(),
            attribute: attribute.into(),
            segment: segment.into(),
            hint,
        }
    }

    pub fn invalid_navigation(segment: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolveError::InvalidNavigation {
            segment: segment.into(),
            reason: reason.into(),
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;
