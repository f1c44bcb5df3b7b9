use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Join kind used for joins implied by path navigation (`b.parent.value`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplicitJoinSemantics {
    /// Inner for non-nullable to-one relations, left outer for nullable ones
    /// and for collections.
    #[default]
    Natural,
    /// Always inner, as strict JPA path semantics prescribe.
    Inner,
}

#[derive(Debug, Error)]
#[error("unknown implicit join semantics `{0}` (expected `natural` or `inner`)")]
pub struct UnknownJoinSemantics(String);

impl FromStr for ImplicitJoinSemantics {
    type Err = UnknownJoinSemantics;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "natural" => Ok(ImplicitJoinSemantics::Natural),
            "inner" => Ok(ImplicitJoinSemantics::Inner),
            _ => Err(UnknownJoinSemantics(s.to_string())),
        }
    }
}

impl fmt::Display for ImplicitJoinSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImplicitJoinSemantics::Natural => write!(f, "natural"),
            ImplicitJoinSemantics::Inner => write!(f, "inner"),
        }
    }
}

/// Resolver configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub implicit_join_semantics: ImplicitJoinSemantics,

    /// Prune subtype joins excluded by `TYPE(..)` filters and treat joins
    pub type_filter_pruning: bool,

    /// Drop supertype joins nothing reads from and re-anchor treat joins
    /// onto the subtype table
    pub supertype_join_elimination: bool,

    /// Derive type restrictions from null-rejecting comparisons on treated paths
    pub unsatisfiable_subtype_pruning: bool,

    /// Column carrying the concrete type name in table-per-class unions
    #[validate(length(min = 1, message = "Union discriminator column cannot be empty"))]
    pub union_discriminator_column: String,

    /// Separator used when generating aliases for implicit and hierarchy joins
    #[validate(
        length(min = 1, max = 4, message = "Alias separator must be 1 to 4 characters"),
        custom(function = "validate_separator")
    )]
    pub alias_separator: String,
}

fn validate_separator(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c == '_' || c == '$') {
        Ok(())
    } else {
        Err(ValidationError::new("alias_separator")
            .with_message("Alias separator may only contain '_' and '$'".into()))
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            implicit_join_semantics: ImplicitJoinSemantics::Natural,
            type_filter_pruning: true,
            supertype_join_elimination: true,
            unsatisfiable_subtype_pruning: true,
            union_discriminator_column: "clazz_".to_string(),
            alias_separator: "_".to_string(),
        }
    }
}

impl ResolverConfig {
    /// Configuration with every optimizer pass switched off.
    pub fn unoptimized() -> Self {
        Self {
            type_filter_pruning: false,
            supertype_join_elimination: false,
            unsatisfiable_subtype_pruning: false,
            ..Default::default()
        }
    }

    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            implicit_join_semantics: parse_env_var("POLYTREAT_IMPLICIT_JOINS", "natural")?,
            type_filter_pruning: parse_env_var("POLYTREAT_TYPE_FILTER_PRUNING", "true")?,
            supertype_join_elimination: parse_env_var("POLYTREAT_SUPERTYPE_ELIMINATION", "true")?,
            unsatisfiable_subtype_pruning: parse_env_var(
                "POLYTREAT_UNSATISFIABLE_PRUNING",
                "true",
            )?,
            union_discriminator_column: env::var("POLYTREAT_UNION_DISCRIMINATOR")
                .unwrap_or_else(|_| "clazz_".to_string()),
            alias_separator: env::var("POLYTREAT_ALIAS_SEPARATOR")
                .unwrap_or_else(|_| "_".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
