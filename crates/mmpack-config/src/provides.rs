//! Hand-written provide specs.
//!
//! Maintainers can pin the versions at which the symbols of a library (or
//! the public names of a python module) appeared, so that dependent packages
//! do not require a newer version than needed. A provide spec maps a
//! soname to the package to depend on and to symbol versions:
//!
//! ```yaml
//! libfoo.so.1:
//!   depends: libfoo1
//!   symbols:
//!     foo_init@LIBFOO_1: 1.0
//!     (regex)foo_priv_.*: 1.1
//!     (optional)foo_legacy: 0.9
//! ```
//!
//! Files are named `<anything>.provides` for shared libraries, and
//! `<anything>.<type>.provides` for the other provide types (`pyobjects`,
//! `locales`).

use crate::specs::SpecsError;
use crate::{PROVIDE_TYPES, PROVIDES_EXT};
use mmpack_core::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Spec of one provider (one soname, one python module...).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvideSpec {
    /// Package to depend on when this provider is used
    #[serde(default)]
    pub depends: Option<String>,
    /// Symbol (possibly tagged) to the version it appeared in
    #[serde(default)]
    pub symbols: BTreeMap<String, Version>,
}

/// All provide specs of a source package, by provide type then soname.
#[derive(Debug, Clone, Default)]
pub struct ProvideSpecs {
    by_type: BTreeMap<String, BTreeMap<String, ProvideSpec>>,
}

impl ProvideSpecs {
    /// No specs at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spec of `soname` in the `provide_type` namespace.
    pub fn get(&self, provide_type: &str, soname: &str) -> Option<&ProvideSpec> {
        self.by_type.get(provide_type)?.get(soname)
    }

    /// Add or replace the spec of a provider.
    pub fn insert(&mut self, provide_type: &str, soname: impl Into<String>, spec: ProvideSpec) {
        self.by_type
            .entry(provide_type.to_string())
            .or_default()
            .insert(soname.into(), spec);
    }

    /// Merge a parsed provide spec document into the `provide_type` namespace.
    pub fn add_document(&mut self, provide_type: &str, content: &str) -> Result<(), SpecsError> {
        let doc: BTreeMap<String, ProvideSpec> = serde_yaml::from_str(content)?;
        for (soname, spec) in doc {
            self.insert(provide_type, soname, spec);
        }
        Ok(())
    }

    /// Load every `*.provides` file of a specs directory.
    ///
    /// A missing directory yields empty specs.
    pub fn load_dir(dir: &Path) -> Result<Self, SpecsError> {
        let mut specs = Self::new();
        if !dir.is_dir() {
            return Ok(specs);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == PROVIDES_EXT))
            .collect();
        paths.sort();

        for path in paths {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let provide_type = provide_type_of(&stem);
            debug!("Loading {} provide spec: {}", provide_type, path.display());
            let content = std::fs::read_to_string(&path)?;
            specs.add_document(provide_type, &content)?;
        }

        Ok(specs)
    }

    /// Whether no spec was loaded.
    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(BTreeMap::is_empty)
    }
}

fn provide_type_of(stem: &str) -> &'static str {
    PROVIDE_TYPES
        .iter()
        .copied()
        .find(|t| {
            stem.strip_suffix(t)
                .is_some_and(|rest| rest.ends_with('.'))
        })
        .unwrap_or("sharedlib")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_provide_type_of() {
        assert_eq!(provide_type_of("libfoo"), "sharedlib");
        assert_eq!(provide_type_of("libfoo.so.1"), "sharedlib");
        assert_eq!(provide_type_of("foo.pyobjects"), "pyobjects");
        assert_eq!(provide_type_of("foo.locales"), "locales");
        assert_eq!(provide_type_of("pyobjects"), "sharedlib");
    }

    #[test]
    fn test_add_document() {
        let mut specs = ProvideSpecs::new();
        specs
            .add_document(
                "sharedlib",
                r#"
libfoo.so.1:
  depends: libfoo1
  symbols:
    foo_init@LIBFOO_1: 1.0
    (regex)foo_priv_.*: "1.1"
"#,
            )
            .unwrap();

        let spec = specs.get("sharedlib", "libfoo.so.1").unwrap();
        assert_eq!(spec.depends.as_deref(), Some("libfoo1"));
        assert_eq!(spec.symbols["foo_init@LIBFOO_1"].to_string(), "1.0");
        assert_eq!(spec.symbols["(regex)foo_priv_.*"].to_string(), "1.1");
        assert!(specs.get("pyobjects", "libfoo.so.1").is_none());
    }

    #[test]
    fn test_load_dir() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join("libfoo.provides"),
            "libfoo.so.1:\n  symbols:\n    foo_init: 1.0\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join("foo.pyobjects.provides"),
            "foo:\n  symbols:\n    foo.run: 1.0\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("specs"), "general: {}\n").unwrap();

        let specs = ProvideSpecs::load_dir(temp.path()).unwrap();
        assert!(specs.get("sharedlib", "libfoo.so.1").is_some());
        assert!(specs.get("pyobjects", "foo").is_some());
        assert!(!specs.is_empty());
    }

    #[test]
    fn test_load_missing_dir() {
        let specs = ProvideSpecs::load_dir(Path::new("/nonexistent/mmpack")).unwrap();
        assert!(specs.is_empty());
    }
}
