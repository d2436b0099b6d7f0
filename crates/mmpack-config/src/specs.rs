//! `mmpack/specs` parsing.
//!
//! The specs file describes the source package and optionally declares
//! custom binary packages:
//!
//! ```yaml
//! general:
//!   name: foo
//!   version: '1.2.3'
//!   description: |
//!     foo does things
//!
//! custom-pkgs:
//!   foo-tools:
//!     description: command line tools of foo
//!     depends:
//!       - libbar1 (>= 2.0)
//!       - libbaz: [1.0, 2.0]
//!     sysdepends-debian: [python3]
//!     files:
//!       - bin/foo-.*
//! ```
//!
//! Versions should be quoted: YAML reads an unquoted `1.10` as the number
//! `1.1`, and only a warning is logged.

use mmpack_core::Version;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Error type for specs operations.
#[derive(Debug, Error)]
pub enum SpecsError {
    #[error("failed to read specs: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse specs: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("invalid field {field} of package {package}: {message}")]
    InvalidField {
        package: String,
        field: String,
        message: String,
    },
}

impl From<SpecsError> for mmpack_core::Error {
    fn from(err: SpecsError) -> Self {
        match err {
            SpecsError::InvalidField {
                package,
                field,
                message,
            } => mmpack_core::Error::spec_field(package, field, message),
            other => mmpack_core::Error::spec(other.to_string()),
        }
    }
}

/// The `general` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralSpecs {
    /// Source package name
    pub name: String,
    /// Source package version
    pub version: Version,
    #[serde(default)]
    pub description: String,
    /// Every binary package of a ghost source is provided by the host system
    #[serde(default)]
    pub ghost: bool,
    /// License files, relative to the source tree
    #[serde(default)]
    pub licenses: Vec<String>,
}

/// One entry of a `depends` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependSpec {
    /// `name`, `name (>= v)`, `name (= v)` or `name (< v)`
    Plain(String),
    /// `name: [min, max]`
    Range(BTreeMap<String, Vec<Version>>),
}

/// A custom binary package declared in `custom-pkgs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomPkgSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends: Vec<DependSpec>,
    /// Regular expressions selecting the files of the package. `None` for
    /// meta-packages.
    #[serde(default)]
    pub files: Option<Vec<String>>,
    /// Remaining keys, among which `sysdepends-<dist>`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl CustomPkgSpec {
    /// System dependencies declared for the distribution `dist`.
    pub fn sysdepends(&self, pkgname: &str, dist: &str) -> Result<Vec<String>, SpecsError> {
        let field = format!("sysdepends-{dist}");
        match self.extra.get(&field) {
            None => Ok(Vec::new()),
            Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
                SpecsError::InvalidField {
                    package: pkgname.to_string(),
                    field,
                    message: e.to_string(),
                }
            }),
        }
    }
}

/// The parsed `mmpack/specs` file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpecs {
    pub general: GeneralSpecs,
    /// Custom packages, in declaration order
    #[serde(
        default,
        rename = "custom-pkgs",
        deserialize_with = "deserialize_ordered"
    )]
    pub custom_pkgs: Vec<(String, CustomPkgSpec)>,
}

impl SourceSpecs {
    /// Parse specs from a YAML string.
    pub fn parse(s: &str) -> Result<Self, SpecsError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Parse specs from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpecsError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Look up a custom package by name.
    pub fn custom_pkg(&self, name: &str) -> Option<&CustomPkgSpec> {
        self.custom_pkgs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }
}

fn deserialize_ordered<'de, D>(deserializer: D) -> Result<Vec<(String, CustomPkgSpec)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedVisitor;

    impl<'de> Visitor<'de> for OrderedVisitor {
        type Value = Vec<(String, CustomPkgSpec)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of package name to package specs")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut pkgs = Vec::new();
            while let Some((name, spec)) = map.next_entry::<String, Option<CustomPkgSpec>>()? {
                pkgs.push((name, spec.unwrap_or_default()));
            }
            Ok(pkgs)
        }
    }

    deserializer.deserialize_any(OrderedVisitor)
}
