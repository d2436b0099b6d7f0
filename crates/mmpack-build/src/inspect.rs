//! File introspection.
//!
//! Reading ELF/PE headers and python sources is done by an external
//! collaborator; the build engine only relies on the [`Introspector`] trait.
//! [`StaticIntrospector`] serves results known up front, e.g. exported by a
//! previous analysis run or written by hand in tests.

use mmpack_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Capability to inspect installed files.
///
/// Paths are absolute paths inside the local install tree. ELF and PE
/// inputs share the same contract.
pub trait Introspector: Send + Sync {
    /// Whether `path` is a dynamic library for the host executable format.
    fn is_dynamic_library(&self, path: &Path) -> bool;

    /// Whether `path` is an executable program for the host executable format.
    fn is_executable(&self, path: &Path) -> bool;

    /// Runtime identity of a dynamic library (ELF SONAME, or DLL name).
    fn soname(&self, path: &Path) -> Result<String>;

    /// Symbols exported by a dynamic library.
    fn exported_symbols(&self, path: &Path) -> Result<BTreeSet<String>>;

    /// Symbols a binary expects other libraries to provide.
    fn undefined_symbols(&self, path: &Path) -> Result<BTreeSet<String>>;

    /// Sonames a binary is linked against.
    fn needed_sonames(&self, path: &Path) -> Result<BTreeSet<String>>;

    /// Public names (`module.attr`) of the top-level python module `module`
    /// made of `files`.
    fn python_public_names(&self, module: &str, files: &[PathBuf]) -> Result<BTreeSet<String>>;

    /// Names imported by python `files`: bare module names and `module.attr`
    /// for attributes used. Modules of the interpreter standard library are
    /// not reported.
    fn python_imports(&self, files: &[PathBuf]) -> Result<BTreeSet<String>>;
}

/// What is known of one binary.
#[derive(Debug, Clone, Default)]
pub struct BinaryInfo {
    /// Set for dynamic libraries
    pub soname: Option<String>,
    pub exported: BTreeSet<String>,
    pub undefined: BTreeSet<String>,
    pub needed: BTreeSet<String>,
}

impl BinaryInfo {
    /// A dynamic library exporting `exported`.
    pub fn library<I, S>(soname: &str, exported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            soname: Some(soname.to_string()),
            exported: exported.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// An executable with no requirement yet.
    pub fn executable() -> Self {
        Self::default()
    }

    /// Add needed sonames.
    pub fn needs<I, S>(mut self, sonames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needed.extend(sonames.into_iter().map(Into::into));
        self
    }

    /// Add undefined symbols.
    pub fn uses<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.undefined.extend(symbols.into_iter().map(Into::into));
        self
    }
}

/// Introspection results keyed by path relative to the install tree.
#[derive(Debug, Clone, Default)]
pub struct StaticIntrospector {
    binaries: BTreeMap<String, BinaryInfo>,
    py_public: BTreeMap<String, BTreeSet<String>>,
    py_imports: BTreeMap<String, BTreeSet<String>>,
}

impl StaticIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binary (library or executable) at `relpath`.
    pub fn with_binary(mut self, relpath: &str, info: BinaryInfo) -> Self {
        self.binaries.insert(relpath.to_string(), info);
        self
    }

    /// Record the public names of a python module.
    pub fn with_python_module<I, S>(mut self, module: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.py_public
            .entry(module.to_string())
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Record the names imported by the python file at `relpath`.
    pub fn with_python_imports<I, S>(mut self, relpath: &str, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.py_imports
            .entry(relpath.to_string())
            .or_default()
            .extend(imports.into_iter().map(Into::into));
        self
    }

    fn lookup<'a, T>(map: &'a BTreeMap<String, T>, path: &Path) -> Option<&'a T> {
        map.iter()
            .find(|(rel, _)| path.ends_with(rel.as_str()))
            .map(|(_, v)| v)
    }

    fn binary(&self, path: &Path) -> Result<&BinaryInfo> {
        Self::lookup(&self.binaries, path)
            .ok_or_else(|| Error::introspection(path, "not a known binary"))
    }
}

impl Introspector for StaticIntrospector {
    fn is_dynamic_library(&self, path: &Path) -> bool {
        Self::lookup(&self.binaries, path).is_some_and(|b| b.soname.is_some())
    }

    fn is_executable(&self, path: &Path) -> bool {
        Self::lookup(&self.binaries, path).is_some_and(|b| b.soname.is_none())
    }

    fn soname(&self, path: &Path) -> Result<String> {
        self.binary(path)?
            .soname
            .clone()
            .ok_or_else(|| Error::introspection(path, "not a dynamic library"))
    }

    fn exported_symbols(&self, path: &Path) -> Result<BTreeSet<String>> {
        Ok(self.binary(path)?.exported.clone())
    }

    fn undefined_symbols(&self, path: &Path) -> Result<BTreeSet<String>> {
        Ok(self.binary(path)?.undefined.clone())
    }

    fn needed_sonames(&self, path: &Path) -> Result<BTreeSet<String>> {
        Ok(self.binary(path)?.needed.clone())
    }

    fn python_public_names(&self, module: &str, _files: &[PathBuf]) -> Result<BTreeSet<String>> {
        Ok(self.py_public.get(module).cloned().unwrap_or_default())
    }

    fn python_imports(&self, files: &[PathBuf]) -> Result<BTreeSet<String>> {
        Ok(files
            .iter()
            .filter_map(|f| Self::lookup(&self.py_imports, f))
            .flatten()
            .cloned()
            .collect())
    }
}
