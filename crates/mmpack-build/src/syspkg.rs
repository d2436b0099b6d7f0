//! Host system package manager capability.
//!
//! The last resolution tier. Real backends (dpkg, pacman, ...) live outside
//! this crate and plug in through [`SysPkgManager`].

use mmpack_core::Result;
use std::collections::{BTreeMap, BTreeSet};

/// Lookup of dependencies provided by the host system.
pub trait SysPkgManager: Send + Sync {
    /// System package providing the shared library `soname`.
    ///
    /// Symbols satisfied by that package are removed from `symbols`.
    fn find_sharedlib_sysdep(
        &self,
        soname: &str,
        symbols: &mut BTreeSet<String>,
    ) -> Result<Option<String>>;

    /// System package providing the python package `name`.
    fn find_pypkg_sysdep(&self, name: &str) -> Result<Option<String>>;
}

/// A host with no package manager: nothing is ever provided.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSysPkgManager;

impl SysPkgManager for NullSysPkgManager {
    fn find_sharedlib_sysdep(
        &self,
        _soname: &str,
        _symbols: &mut BTreeSet<String>,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    fn find_pypkg_sysdep(&self, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
struct SysLib {
    sysdep: String,
    symbols: BTreeSet<String>,
}

/// In-memory table of what the host system provides.
#[derive(Debug, Clone, Default)]
pub struct SysPkgTable {
    sharedlibs: BTreeMap<String, SysLib>,
    pypkgs: BTreeMap<String, String>,
}

impl SysPkgTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `sysdep` provides `soname` with the given symbols.
    pub fn with_sharedlib<I, S>(mut self, soname: &str, sysdep: &str, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sharedlibs.insert(
            soname.to_string(),
            SysLib {
                sysdep: sysdep.to_string(),
                symbols: symbols.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Declare that `sysdep` provides the python package `name`.
    pub fn with_pypkg(mut self, name: &str, sysdep: &str) -> Self {
        self.pypkgs.insert(name.to_string(), sysdep.to_string());
        self
    }
}

impl SysPkgManager for SysPkgTable {
    fn find_sharedlib_sysdep(
        &self,
        soname: &str,
        symbols: &mut BTreeSet<String>,
    ) -> Result<Option<String>> {
        Ok(self.sharedlibs.get(soname).map(|lib| {
            symbols.retain(|sym| !lib.symbols.contains(sym));
            lib.sysdep.clone()
        }))
    }

    fn find_pypkg_sysdep(&self, name: &str) -> Result<Option<String>> {
        Ok(self.pypkgs.get(name).cloned())
    }
}
