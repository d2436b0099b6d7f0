//! Build hooks.
//!
//! A hook handles one kind of file (shared libraries, python modules, locale
//! catalogs). The build driver calls every hook, in list order, at each step
//! of the pipeline:
//!
//! 1. [`Hook::post_local_install`] once the project is installed locally
//! 2. [`Hook::dispatch`] to claim files into packages
//! 3. [`Hook::update_provides`] for each package
//! 4. [`Hook::update_depends`] for each package, once every package has
//!    its provides
//!
//! Every step has a no-op default, so a hook only implements what it needs.

mod locales;
mod python;
mod sharedlib;

pub use locales::LocalesHook;
pub use python::PythonHook;
pub use sharedlib::{SharedLibHook, sharedlib_pkgname};

use crate::dispatch::DispatchData;
use crate::inspect::Introspector;
use crate::package_info::PackageInfo;
use crate::prefix::InstalledPrefix;
use crate::provide::NeededSet;
use crate::syspkg::SysPkgManager;
use mmpack_config::{ProvideSpecs, ResolvedConfig};
use mmpack_core::{Result, Version};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Constant context shared by the hooks of one build.
#[derive(Clone)]
pub struct HookContext {
    /// Source package name
    pub srcname: String,
    /// Source package version, also the version of every binary package
    pub version: Version,
    /// Source package description
    pub description: String,
    pub config: ResolvedConfig,
    /// Root of the local install tree
    pub install_root: PathBuf,
    pub introspector: Arc<dyn Introspector>,
    pub syspkg: Arc<dyn SysPkgManager>,
    /// Installed packages, when building against a prefix
    pub prefix: Option<Arc<InstalledPrefix>>,
}

impl std::fmt::Debug for HookContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookContext")
            .field("srcname", &self.srcname)
            .field("version", &self.version)
            .field("install_root", &self.install_root)
            .field("host_arch", &self.config.host_arch)
            .field("host_dist", &self.config.host_dist)
            .finish_non_exhaustive()
    }
}

impl HookContext {
    /// Absolute path of an installed file.
    pub fn path_of(&self, relpath: &str) -> PathBuf {
        self.install_root.join(relpath)
    }

    /// Description given to generated packages.
    pub(crate) fn pkg_description(&self, what: &str) -> String {
        let base = self.description.trim_end();
        if base.is_empty() {
            what.to_string()
        } else {
            format!("{base}\n\n{what}")
        }
    }

    /// Resolve `needed` against mmpack packages: `pkg` itself, the packages
    /// built alongside it, then the installed prefix.
    ///
    /// What `pkg` provides needs no dependency. Packages of the same build
    /// are depended upon at their exact version.
    pub(crate) fn resolve_mmpack_tiers(
        &self,
        provide_type: &str,
        pkg: &mut PackageInfo,
        others: &[&PackageInfo],
        needed: &mut NeededSet,
    ) {
        if let Some(own) = pkg.provide_list(provide_type) {
            let own_deps = own.resolve_deps(needed, None);
            trace!("{}: {} needs resolved internally", pkg.name, own_deps.len());
        }

        let pin = pkg.version.clone();
        for other in others {
            if needed.sonames.is_empty() {
                return;
            }
            if let Some(list) = other.provide_list(provide_type) {
                for dep in list.resolve_deps(needed, Some(&pin)) {
                    pkg.add_to_deplist(dep.name, dep.minver, dep.maxver);
                }
            }
        }

        let installed = self
            .prefix
            .as_ref()
            .and_then(|prefix| prefix.provides(provide_type));
        if let Some(list) = installed {
            for dep in list.resolve_deps(needed, None) {
                pkg.add_to_deplist(dep.name, dep.minver, dep.maxver);
            }
        }
    }
}

/// A pluggable step handler for one kind of file.
pub trait Hook: Send + Sync {
    /// Name of the hook, for logs.
    fn name(&self) -> &str;

    /// Provide type this hook fills in `PackageInfo::provides`.
    fn provide_type(&self) -> &str;

    /// Adjust the local install tree after the project is installed.
    fn post_local_install(&self, _install_root: &Path) -> Result<()> {
        Ok(())
    }

    /// Claim unassigned files into packages.
    fn dispatch(&self, _data: &mut DispatchData) -> Result<()> {
        Ok(())
    }

    /// Fill what `pkg` provides.
    fn update_provides(&self, _pkg: &mut PackageInfo, _specs: &ProvideSpecs) -> Result<()> {
        Ok(())
    }

    /// Write the provide file of `pkg` for this hook's type in `folder`.
    fn store_provides(&self, pkg: &PackageInfo, folder: &Path) -> Result<()> {
        match pkg.provide_list(self.provide_type()) {
            Some(list) if !list.is_empty() => {
                let path = folder.join(format!("{}.{}", pkg.name, self.provide_type()));
                list.save(&path)
            }
            _ => Ok(()),
        }
    }

    /// Add the dependencies of `pkg`, given the other packages of the build.
    fn update_depends(&self, _pkg: &mut PackageInfo, _others: &[&PackageInfo]) -> Result<()> {
        Ok(())
    }
}

/// Hooks of a regular build, in invocation order.
pub fn default_hooks(ctx: &HookContext) -> Vec<Box<dyn Hook>> {
    vec![
        Box::new(SharedLibHook::new(ctx.clone())),
        Box::new(PythonHook::new(ctx.clone())),
        Box::new(LocalesHook::new(ctx.clone())),
    ]
}

/// Whether a file only holds debug information.
pub(crate) fn is_debug_file(relpath: &str) -> bool {
    relpath.ends_with(".debug") || relpath.starts_with("lib/debug/")
}

/// Split a shared object name around its `.so` marker: `libfoo.so.1.2`
/// gives `("libfoo", ".1.2")`.
///
/// Only a `.so` ending the name or followed by a dot counts, so
/// `libfoo.sock.so.1` gives `("libfoo.sock", ".1")`.
pub(crate) fn split_soname(name: &str) -> Option<(&str, &str)> {
    name.match_indices(".so")
        .map(|(idx, marker)| (&name[..idx], &name[idx + marker.len()..]))
        .find(|(_, rest)| rest.is_empty() || rest.starts_with('.'))
}

/// File name of a relative path.
pub(crate) fn file_name(relpath: &str) -> &str {
    relpath.rsplit_once('/').map_or(relpath, |(_, name)| name)
}
