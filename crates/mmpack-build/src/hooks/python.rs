//! Python 3 modules.

use super::{Hook, HookContext};
use crate::dispatch::DispatchData;
use crate::package_info::PackageInfo;
use crate::provide::{NeededSet, Provide, ProvideList};
use mmpack_config::ProvideSpecs;
use mmpack_core::{Error, Result, Version};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};
use walkdir::WalkDir;

const PROVIDE_TYPE: &str = "pyobjects";

fn site_packages_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^lib/python3(?:\.\d+)?/(?:site|dist)-packages/([^/]+)")
            .expect("Invalid regex pattern")
    })
}

/// Top-level module a site-packages entry belongs to.
///
/// `foo.py`, `foo/`, `foo-1.0.dist-info/` and
/// `_foo.cpython-311-x86_64-linux-gnu.so` all belong to `foo`.
fn top_module(entry: &str) -> &str {
    let entry = entry
        .strip_suffix(".dist-info")
        .or_else(|| entry.strip_suffix(".egg-info"))
        .map_or(entry, |meta| meta.split_once('-').map_or(meta, |(name, _)| name));
    let entry = entry.split_once('.').map_or(entry, |(name, _)| name);
    entry.trim_start_matches('_')
}

/// Top-level module of an installed file, if it is a python module file.
pub(crate) fn module_of(relpath: &str) -> Option<&str> {
    site_packages_regex()
        .captures(relpath)
        .and_then(|caps| caps.get(1))
        .map(|m| top_module(m.as_str()))
        .filter(|m| !m.is_empty())
}

/// mmpack package name of a python module.
pub(crate) fn python_pkgname(module: &str) -> String {
    format!("python3-{}", module.to_lowercase().replace('_', "-"))
}

/// Hook handling python 3 modules.
pub struct PythonHook {
    ctx: HookContext,
}

impl PythonHook {
    pub fn new(ctx: HookContext) -> Self {
        Self { ctx }
    }

    fn modules_of(&self, pkg: &PackageInfo) -> BTreeMap<String, Vec<PathBuf>> {
        let mut modules: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for file in &pkg.files {
            if let Some(module) = module_of(file) {
                modules
                    .entry(module.to_string())
                    .or_default()
                    .push(self.ctx.path_of(file));
            }
        }
        modules
    }
}

impl Hook for PythonHook {
    fn name(&self) -> &str {
        "python"
    }

    fn provide_type(&self) -> &str {
        PROVIDE_TYPE
    }

    fn post_local_install(&self, install_root: &Path) -> Result<()> {
        let libdir = install_root.join("lib");
        if !libdir.is_dir() {
            return Ok(());
        }

        let mut it = WalkDir::new(&libdir).into_iter();
        while let Some(entry) = it.next() {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if entry.file_type().is_dir() && entry.file_name() == "__pycache__" {
                debug!("Removing {}", path.display());
                std::fs::remove_dir_all(path)
                    .map_err(|e| Error::io("failed to remove python cache", path, e))?;
                it.skip_current_dir();
            } else if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "pyc")
            {
                std::fs::remove_file(path)
                    .map_err(|e| Error::io("failed to remove compiled python file", path, e))?;
            }
        }
        Ok(())
    }

    fn dispatch(&self, data: &mut DispatchData) -> Result<()> {
        let mut by_pkg: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in data.unassigned_files() {
            if let Some(module) = module_of(file) {
                by_pkg
                    .entry(python_pkgname(module))
                    .or_default()
                    .push(file.clone());
            }
        }

        for (pkgname, files) in by_pkg {
            let pkg = data.assign_to_pkg(&pkgname, files);
            if pkg.description.is_empty() {
                pkg.description = self
                    .ctx
                    .pkg_description(&format!("This package provides the python3 module {pkgname}."));
            }
        }
        Ok(())
    }

    fn update_provides(&self, pkg: &mut PackageInfo, specs: &ProvideSpecs) -> Result<()> {
        let mut list = ProvideList::new(PROVIDE_TYPE);
        for (module, files) in self.modules_of(pkg) {
            let names = self.ctx.introspector.python_public_names(&module, &files)?;
            let mut provide = Provide::new(&pkg.name, &module);
            provide.add_symbols(names, Version::any());
            provide.update_from_specs(specs.get(PROVIDE_TYPE, &module), pkg)?;
            list.add(provide);
        }

        if !list.is_empty() {
            pkg.provides.insert(PROVIDE_TYPE.to_string(), list);
        }
        Ok(())
    }

    fn update_depends(&self, pkg: &mut PackageInfo, others: &[&PackageInfo]) -> Result<()> {
        if pkg.ghost {
            return Ok(());
        }

        let sources: Vec<PathBuf> = pkg
            .files
            .iter()
            .filter(|f| f.ends_with(".py"))
            .map(|f| self.ctx.path_of(f))
            .collect();
        if sources.is_empty() {
            return Ok(());
        }

        let mut needed = NeededSet::new();
        for name in self.ctx.introspector.python_imports(&sources)? {
            match name.split_once('.') {
                Some((module, _)) => {
                    needed.sonames.insert(module.to_string());
                    needed.symbols.insert(name);
                }
                None => {
                    needed.sonames.insert(name);
                }
            }
        }

        self.ctx
            .resolve_mmpack_tiers(PROVIDE_TYPE, pkg, others, &mut needed);

        let modules: Vec<String> = needed.sonames.iter().cloned().collect();
        for module in modules {
            match self.ctx.syspkg.find_pypkg_sysdep(&module)? {
                Some(sysdep) => {
                    info!("{}: python module {} provided by {}", pkg.name, module, sysdep);
                    pkg.add_sysdep(sysdep);
                    needed.sonames.remove(&module);
                }
                None => return Err(Error::unresolved(&pkg.name, "python module", module)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::tests::context;
    use crate::inspect::StaticIntrospector;
    use crate::syspkg::SysPkgTable;
    use std::sync::Arc;

    #[test]
    fn test_module_of() {
        assert_eq!(module_of("lib/python3/site-packages/foo/__init__.py"), Some("foo"));
        assert_eq!(module_of("lib/python3.11/dist-packages/foo.py"), Some("foo"));
        assert_eq!(
            module_of("lib/python3/site-packages/foo-1.0.dist-info/METADATA"),
            Some("foo")
        );
        assert_eq!(
            module_of("lib/python3/site-packages/_foo.cpython-311-x86_64-linux-gnu.so"),
            Some("foo")
        );
        assert_eq!(module_of("lib/python2.7/site-packages/foo.py"), None);
        assert_eq!(module_of("bin/foo"), None);
    }

    #[test]
    fn test_pkgname() {
        assert_eq!(python_pkgname("Foo_Bar"), "python3-foo-bar");
    }

    #[test]
    fn test_dispatch_groups_by_module() {
        let hook = PythonHook::new(context(StaticIntrospector::new()));
        let mut data = DispatchData::new(
            [
                "lib/python3/site-packages/foo/__init__.py",
                "lib/python3/site-packages/foo/core.py",
                "lib/python3/site-packages/foo-1.0.dist-info/METADATA",
                "bin/foo",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            Version::new("1.0"),
            false,
        );

        hook.dispatch(&mut data).unwrap();
        assert_eq!(data.pkg("python3-foo").unwrap().files.len(), 3);
        assert_eq!(data.unassigned_files().len(), 1);
    }

    #[test]
    fn test_provides_and_depends() {
        let introspector = StaticIntrospector::new()
            .with_python_module("foo", ["foo.run", "foo.Config"])
            .with_python_imports("lib/python3/site-packages/bar.py", ["foo", "foo.run", "yaml"]);
        let mut ctx = context(introspector);
        ctx.syspkg = Arc::new(SysPkgTable::new().with_pypkg("yaml", "python3-yaml"));
        let hook = PythonHook::new(ctx);

        let mut foo = PackageInfo::new("python3-foo", Version::new("1.0"));
        foo.files.insert("lib/python3/site-packages/foo/__init__.py".to_string());
        hook.update_provides(&mut foo, &ProvideSpecs::new()).unwrap();
        let provide = foo.provide_list(PROVIDE_TYPE).unwrap().get("foo").unwrap();
        assert_eq!(provide.symbols.len(), 2);

        let mut bar = PackageInfo::new("python3-bar", Version::new("1.0"));
        bar.files.insert("lib/python3/site-packages/bar.py".to_string());
        hook.update_depends(&mut bar, &[&foo]).unwrap();

        assert_eq!(bar.deplist.len(), 1);
        assert_eq!(bar.deplist[0].name, "python3-foo");
        assert!(bar.sysdeps.contains("python3-yaml"));
    }

    #[test]
    fn test_unresolved_import_is_fatal() {
        let introspector = StaticIntrospector::new()
            .with_python_imports("lib/python3/site-packages/bar.py", ["nowhere"]);
        let hook = PythonHook::new(context(introspector));
        let mut bar = PackageInfo::new("python3-bar", Version::new("1.0"));
        bar.files.insert("lib/python3/site-packages/bar.py".to_string());

        let err = hook.update_depends(&mut bar, &[]).unwrap_err();
        assert!(err.to_string().contains("python module nowhere"));
    }

    #[test]
    fn test_post_local_install_removes_bytecode() {
        let temp = tempfile::tempdir().unwrap();
        let pkgdir = temp.path().join("lib/python3/site-packages/foo");
        std::fs::create_dir_all(pkgdir.join("__pycache__")).unwrap();
        std::fs::write(pkgdir.join("__pycache__/core.cpython-311.pyc"), "").unwrap();
        std::fs::write(pkgdir.join("old.pyc"), "").unwrap();
        std::fs::write(pkgdir.join("core.py"), "").unwrap();

        let hook = PythonHook::new(context(StaticIntrospector::new()));
        hook.post_local_install(temp.path()).unwrap();

        assert!(!pkgdir.join("__pycache__").exists());
        assert!(!pkgdir.join("old.pyc").exists());
        assert!(pkgdir.join("core.py").exists());
    }
}
