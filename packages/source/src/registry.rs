//! Indicator registry: loads indicator definitions from TOML.
//!
//! Each `.toml` file in `packages/source/indicators/` is baked into the
//! binary at compile time via [`include_str!`]. A file on disk can replace
//! the embedded set entirely with [`load_indicators`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::indicator_def::IndicatorDefinition;

/// TOML configs embedded at compile time.
const INDICATOR_TOMLS: &[(&str, &str)] = &[
    ("nbb", include_str!("../indicators/nbb.toml")),
    ("dbnomics", include_str!("../indicators/dbnomics.toml")),
    ("fpb", include_str!("../indicators/fpb.toml")),
];

/// Errors raised while loading or validating indicator configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A config file is not valid TOML or does not match the schema.
    #[error("Failed to parse {name}: {source}")]
    Toml {
        /// Config name or path.
        name: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// A config file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An indicator definition is unusable.
    #[error("Invalid indicator {code}: {message}")]
    Invalid {
        /// Offending indicator code.
        code: String,
        /// Description of the problem.
        message: String,
    },

    /// Two definitions share the same code.
    #[error("Duplicate indicator code: {code}")]
    DuplicateCode {
        /// The repeated code.
        code: String,
    },

    /// The configuration yields no indicators at all.
    #[error("No indicators configured")]
    Empty,

    /// An environment variable holds an unusable value.
    #[error("Invalid value for {var}: {value:?}")]
    Env {
        /// Variable name.
        var: String,
        /// Raw value found.
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct IndicatorFile {
    #[serde(default)]
    indicators: Vec<IndicatorDefinition>,
}

/// Parses one TOML document holding an `[[indicators]]` array.
///
/// # Errors
///
/// Returns [`ConfigError::Toml`] if the document is malformed.
pub fn parse_indicators_toml(
    name: &str,
    toml_str: &str,
) -> Result<Vec<IndicatorDefinition>, ConfigError> {
    toml::de::from_str::<IndicatorFile>(toml_str)
        .map(|file| file.indicators)
        .map_err(|source| ConfigError::Toml {
            name: name.to_string(),
            source,
        })
}

/// Checks every definition and rejects duplicate codes.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found.
pub fn validate_indicators(indicators: &[IndicatorDefinition]) -> Result<(), ConfigError> {
    if indicators.is_empty() {
        return Err(ConfigError::Empty);
    }

    let mut seen = BTreeSet::new();
    for indicator in indicators {
        indicator.validate()?;
        if !seen.insert(indicator.code.as_str()) {
            return Err(ConfigError::DuplicateCode {
                code: indicator.code.clone(),
            });
        }
    }
    Ok(())
}

/// Returns all embedded indicator definitions, validated.
///
/// # Errors
///
/// Returns [`ConfigError`] if an embedded config is malformed or invalid.
pub fn all_indicators() -> Result<Vec<IndicatorDefinition>, ConfigError> {
    let mut indicators = Vec::new();
    for (name, toml_str) in INDICATOR_TOMLS {
        indicators.extend(parse_indicators_toml(name, toml_str)?);
    }
    validate_indicators(&indicators)?;
    Ok(indicators)
}

/// Loads and validates indicator definitions from a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read, parsed, or validated.
pub fn load_indicators(path: &Path) -> Result<Vec<IndicatorDefinition>, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let indicators = parse_indicators_toml(&path.display().to_string(), &toml_str)?;
    validate_indicators(&indicators)?;
    Ok(indicators)
}
