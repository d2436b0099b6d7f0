//! Shared libraries (ELF and PE).

use super::python::module_of;
use super::{Hook, HookContext, file_name, is_debug_file, split_soname};
use crate::dispatch::DispatchData;
use crate::package_info::PackageInfo;
use crate::provide::{NeededSet, Provide, ProvideList};
use mmpack_config::ProvideSpecs;
use mmpack_core::{Error, Result, Version};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

const PROVIDE_TYPE: &str = "sharedlib";

/// Package name of a shared library, from its soname.
///
/// The ABI version is appended to the library name, separated by a dash
/// when the name ends with a digit: `libfoo.so.1` gives `libfoo1`,
/// `libfoo2.so.1` gives `libfoo2-1`, `libfoo-1.dll` gives `libfoo1`.
pub fn sharedlib_pkgname(soname: &str) -> String {
    let (base, abi) = if let Some((base, abi)) = split_soname(soname) {
        (base, abi.trim_start_matches('.'))
    } else {
        let stem = strip_suffix_ignore_case(soname, ".dll").unwrap_or(soname);
        match stem.rsplit_once('-') {
            Some((base, abi)) if !abi.is_empty() && abi.chars().all(|c| c.is_ascii_digit()) => {
                (base, abi)
            }
            _ => (stem, ""),
        }
    };

    let name = if abi.is_empty() {
        base.to_string()
    } else if base.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{base}-{abi}")
    } else {
        format!("{base}{abi}")
    };
    name.to_lowercase().replace('_', "-")
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    let (head, tail) = (s.get(..split)?, s.get(split..)?);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// Development symlinks and soname links of the library at `lib`.
fn aliases_of<'a>(lib: &str, candidates: &'a std::collections::BTreeSet<String>) -> Vec<&'a String> {
    let (dir, name) = match lib.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, lib),
    };
    let Some((base, _)) = split_soname(name) else {
        return Vec::new();
    };
    let prefix = &name[..base.len() + ".so".len()];

    candidates
        .iter()
        .filter(|c| c.as_str() != lib)
        .filter(|c| {
            let (cdir, cname) = match c.rsplit_once('/') {
                Some((d, n)) => (Some(d), n),
                None => (None, c.as_str()),
            };
            cdir == dir && cname.starts_with(prefix) && name.starts_with(cname)
        })
        .collect()
}

/// Hook handling dynamic libraries.
pub struct SharedLibHook {
    ctx: HookContext,
}

impl SharedLibHook {
    pub fn new(ctx: HookContext) -> Self {
        Self { ctx }
    }

    /// Dynamic libraries other than python extension modules, which belong
    /// to their python package.
    fn is_library(&self, relpath: &str) -> bool {
        !is_debug_file(relpath)
            && module_of(relpath).is_none()
            && self.ctx.introspector.is_dynamic_library(&self.ctx.path_of(relpath))
    }

    /// Needed sonames and symbols of every binary of `pkg`.
    fn collect_needs(&self, pkg: &PackageInfo) -> Result<NeededSet> {
        let inspector = &self.ctx.introspector;
        let mut needed = NeededSet::new();
        for file in pkg.files.iter().filter(|f| !is_debug_file(f)) {
            let path = self.ctx.path_of(file);
            if !inspector.is_dynamic_library(&path) && !inspector.is_executable(&path) {
                continue;
            }
            needed.sonames.extend(inspector.needed_sonames(&path)?);
            needed.symbols.extend(inspector.undefined_symbols(&path)?);
        }
        Ok(needed)
    }

    /// Resolve DLL imports by file name against the packages of the build.
    fn resolve_dlls(&self, pkg: &mut PackageInfo, others: &[&PackageInfo], needed: &mut NeededSet) {
        let sonames: Vec<String> = needed.sonames.iter().cloned().collect();
        for soname in sonames {
            let owns = |p: &PackageInfo| {
                p.files
                    .iter()
                    .any(|f| file_name(f).eq_ignore_ascii_case(&soname))
            };
            if owns(pkg) {
                needed.sonames.remove(&soname);
            } else if let Some(other) = others.iter().find(|p| owns(p)) {
                debug!("{}: {} found in {}", pkg.name, soname, other.name);
                let version = pkg.version.clone();
                pkg.add_to_deplist(other.name.clone(), version.clone(), version);
                needed.sonames.remove(&soname);
            }
        }
    }
}

impl Hook for SharedLibHook {
    fn name(&self) -> &str {
        "sharedlib"
    }

    fn provide_type(&self) -> &str {
        PROVIDE_TYPE
    }

    fn post_local_install(&self, install_root: &Path) -> Result<()> {
        let libdir = install_root.join("lib");
        if !libdir.is_dir() {
            return Ok(());
        }

        for entry in WalkDir::new(&libdir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "la") {
                debug!("Removing libtool archive {}", path.display());
                std::fs::remove_file(path)
                    .map_err(|e| Error::io("failed to remove libtool archive", path, e))?;
            }
        }
        Ok(())
    }

    fn dispatch(&self, data: &mut DispatchData) -> Result<()> {
        let libs: Vec<String> = data
            .unassigned_files()
            .iter()
            .filter(|f| self.is_library(f))
            .cloned()
            .collect();

        for lib in libs {
            if !data.unassigned_files().contains(&lib) {
                continue;
            }
            let soname = self.ctx.introspector.soname(&self.ctx.path_of(&lib))?;
            let pkgname = sharedlib_pkgname(&soname);

            let mut files = vec![lib.clone()];
            files.extend(aliases_of(&lib, data.unassigned_files()).into_iter().cloned());

            let pkg = data.assign_to_pkg(&pkgname, files);
            if pkg.description.is_empty() {
                pkg.description = self
                    .ctx
                    .pkg_description(&format!("This package provides the shared library {soname}."));
            }
        }
        Ok(())
    }

    fn update_provides(&self, pkg: &mut PackageInfo, specs: &ProvideSpecs) -> Result<()> {
        let mut list = ProvideList::new(PROVIDE_TYPE);
        for file in pkg.files.iter().filter(|f| self.is_library(f)) {
            let path = self.ctx.path_of(file);
            let soname = self.ctx.introspector.soname(&path)?;
            let symbols = self.ctx.introspector.exported_symbols(&path)?;

            let mut provide = Provide::new(&pkg.name, &soname);
            provide.add_symbols(symbols, Version::any());
            provide.update_from_specs(specs.get(PROVIDE_TYPE, &soname), pkg)?;
            debug!("{} provides {} ({} symbols)", pkg.name, soname, provide.symbols.len());
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

        let mut needed = self.collect_needs(pkg)?;
        if needed.sonames.is_empty() {
            return Ok(());
        }

        if self.ctx.config.is_pe_host() {
            self.resolve_dlls(pkg, others, &mut needed);
        }
        self.ctx
            .resolve_mmpack_tiers(PROVIDE_TYPE, pkg, others, &mut needed);

        let sonames: Vec<String> = needed.sonames.iter().cloned().collect();
        for soname in sonames {
            match self
                .ctx
                .syspkg
                .find_sharedlib_sysdep(&soname, &mut needed.symbols)?
            {
                Some(sysdep) => {
                    info!("{}: {} provided by system package {}", pkg.name, soname, sysdep);
                    pkg.add_sysdep(sysdep);
                    needed.sonames.remove(&soname);
                }
                None => return Err(Error::unresolved(&pkg.name, "soname", soname)),
            }
        }

        if !needed.symbols.is_empty() {
            debug!(
                "{}: {} symbols without known provider",
                pkg.name,
                needed.symbols.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::tests::context;
    use crate::inspect::{BinaryInfo, StaticIntrospector};
    use std::collections::BTreeSet;

    fn files(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pkgname() {
        assert_eq!(sharedlib_pkgname("libfoo.so.1"), "libfoo1");
        assert_eq!(sharedlib_pkgname("libfoo2.so.1"), "libfoo2-1");
        assert_eq!(sharedlib_pkgname("libfoo-1.dll"), "libfoo1");
        assert_eq!(sharedlib_pkgname("libfoo2-3.DLL"), "libfoo2-3");
        assert_eq!(sharedlib_pkgname("libfoo.so"), "libfoo");
        assert_eq!(sharedlib_pkgname("libFoo_bar.so.0"), "libfoo-bar0");
        assert_eq!(sharedlib_pkgname("libfoo.sock.so.1"), "libfoo.sock1");
        assert_eq!(sharedlib_pkgname("libsolv.so.1"), "libsolv1");
    }

    #[test]
    fn test_aliases() {
        let pool = files(&[
            "lib/libfoo.so",
            "lib/libfoo.so.1",
            "lib/libfoo.so.1.2.3",
            "lib/libfoobar.so",
            "lib/other/libfoo.so",
        ]);
        let aliases: Vec<_> = aliases_of("lib/libfoo.so.1.2.3", &pool)
            .into_iter()
            .map(String::as_str)
            .collect();
        assert_eq!(aliases, vec!["lib/libfoo.so", "lib/libfoo.so.1"]);
    }

    #[test]
    fn test_aliases_with_so_inside_name() {
        let pool = files(&[
            "lib/libfoo.sock.so",
            "lib/libfoo.sock.so.1",
            "lib/libfoo.sock.so.1.2",
            "lib/libfoo.so.1",
        ]);
        let aliases: Vec<_> = aliases_of("lib/libfoo.sock.so.1.2", &pool)
            .into_iter()
            .map(String::as_str)
            .collect();
        assert_eq!(aliases, vec!["lib/libfoo.sock.so", "lib/libfoo.sock.so.1"]);
    }

    #[test]
    fn test_python_extension_left_to_python_hook() {
        let ext = "lib/python3/site-packages/_foo.cpython-311-x86_64-linux-gnu.so";
        let ctx = context(
            StaticIntrospector::new()
                .with_binary(ext, BinaryInfo::library("_foo.cpython-311-x86_64-linux-gnu.so", ["PyInit__foo"]))
                .with_binary("lib/libfoo.so.1", BinaryInfo::library("libfoo.so.1", ["foo_init"])),
        );
        let hook = SharedLibHook::new(ctx);
        let mut data = DispatchData::new(
            files(&[ext, "lib/libfoo.so.1"]),
            Version::new("1.0"),
            false,
        );

        hook.dispatch(&mut data).unwrap();

        assert!(data.pkg("libfoo1").is_some());
        assert_eq!(data.unassigned_files(), &files(&[ext]));

        let mut pkg = PackageInfo::new("python3-foo", Version::new("1.0"));
        pkg.files.insert(ext.to_string());
        hook.update_provides(&mut pkg, &ProvideSpecs::new()).unwrap();
        assert!(pkg.provide_list(PROVIDE_TYPE).is_none());
    }

    #[test]
    fn test_dispatch_assigns_library_and_aliases() {
        let ctx = context(
            StaticIntrospector::new()
                .with_binary("lib/libfoo.so.1.2.3", BinaryInfo::library("libfoo.so.1", ["foo_init"])),
        );
        let hook = SharedLibHook::new(ctx);
        let mut data = DispatchData::new(
            files(&["lib/libfoo.so.1.2.3", "lib/libfoo.so", "bin/fooapp"]),
            Version::new("1.0"),
            false,
        );

        hook.dispatch(&mut data).unwrap();

        let pkg = data.pkg("libfoo1").unwrap();
        assert_eq!(pkg.files, files(&["lib/libfoo.so", "lib/libfoo.so.1.2.3"]));
        assert!(pkg.description.contains("libfoo.so.1"));
        assert_eq!(data.unassigned_files(), &files(&["bin/fooapp"]));
    }

    #[test]
    fn test_update_depends_unresolved_soname() {
        let ctx = context(
            StaticIntrospector::new()
                .with_binary("bin/fooapp", BinaryInfo::executable().needs(["libmissing.so.3"])),
        );
        let hook = SharedLibHook::new(ctx);
        let mut pkg = PackageInfo::new("foo", Version::new("1.0"));
        pkg.files.insert("bin/fooapp".to_string());

        let err = hook.update_depends(&mut pkg, &[]).unwrap_err();
        assert_eq!(err.code(), mmpack_core::ErrorCode::UnresolvedDependency);
        assert!(err.to_string().contains("libmissing.so.3"));
    }

    #[test]
    fn test_ghost_package_has_no_dependency() {
        let ctx = context(
            StaticIntrospector::new()
                .with_binary("bin/fooapp", BinaryInfo::executable().needs(["libmissing.so.3"])),
        );
        let hook = SharedLibHook::new(ctx);
        let mut pkg = PackageInfo::new("foo", Version::new("1.0"));
        pkg.ghost = true;
        pkg.files.insert("bin/fooapp".to_string());

        hook.update_depends(&mut pkg, &[]).unwrap();
        assert!(pkg.deplist.is_empty());
    }

    #[test]
    fn test_dll_resolved_by_name() {
        let mut ctx = context(
            StaticIntrospector::new()
                .with_binary("bin/foo.exe", BinaryInfo::executable().needs(["LIBFOO-1.DLL"])),
        );
        ctx.config.host_dist = "windows".to_string();
        let hook = SharedLibHook::new(ctx);

        let mut lib = PackageInfo::new("libfoo1", Version::new("1.0"));
        lib.files.insert("bin/libfoo-1.dll".to_string());
        let mut app = PackageInfo::new("foo", Version::new("1.0"));
        app.files.insert("bin/foo.exe".to_string());

        hook.update_depends(&mut app, &[&lib]).unwrap();
        assert_eq!(app.deplist.len(), 1);
        assert_eq!(app.deplist[0].name, "libfoo1");
        assert_eq!(app.deplist[0].minver.as_str(), "1.0");
    }

    #[test]
    fn test_post_local_install_removes_la() {
        let temp = tempfile::tempdir().unwrap();
        let libdir = temp.path().join("lib");
        std::fs::create_dir_all(&libdir).unwrap();
        std::fs::write(libdir.join("libfoo.la"), "# libtool").unwrap();
        std::fs::write(libdir.join("libfoo.so.1"), "").unwrap();

        let hook = SharedLibHook::new(context(StaticIntrospector::new()));
        hook.post_local_install(temp.path()).unwrap();

        assert!(!libdir.join("libfoo.la").exists());
        assert!(libdir.join("libfoo.so.1").exists());
    }
}
