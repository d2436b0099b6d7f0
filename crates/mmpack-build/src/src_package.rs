//! Source package build driver.
//!
//! Turns the local install tree of a built project into binary packages:
//!
//! ```text
//! post-install -> ventilate -> provides -> depends -> finalize
//! ```
//!
//! Ventilation assigns every installed file to exactly one package: custom
//! packages from the specs first, then the hooks, then fallback rules on the
//! file location, and whatever remains goes to a catch-all package. Provides
//! of every package are computed before any dependency, so that packages
//! built together can depend on each other.

use crate::binary_package::BinaryPackage;
use crate::checksum::sha256_file;
use crate::dispatch::DispatchData;
use crate::hooks::{Hook, HookContext, default_hooks, is_debug_file};
use crate::inspect::Introspector;
use crate::manifest::{FileEntry, Manifest};
use crate::package_info::{Dependency, PackageInfo};
use crate::prefix::InstalledPrefix;
use crate::syspkg::{NullSysPkgManager, SysPkgManager};
use mmpack_config::{ProvideSpecs, ResolvedConfig, SPECS_DIR, SPECS_FILENAME, SourceSpecs};
use mmpack_core::{Error, Result};
use mmpack_telemetry::{Phase, PhaseGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Progress of a build. Steps only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    /// Project installed in the local install tree
    Installed,
    /// Install tree adjusted by the hooks
    PostInstalled,
    /// Every file assigned to a package
    Ventilated,
    /// Provides of every package known
    ProvidesGenerated,
    /// Dependencies of every package known
    DependsGenerated,
}

/// What a build wrote in the output directory.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Package archives
    pub packages: Vec<PathBuf>,
    /// Provide files, one per package and provide type
    pub provide_files: Vec<PathBuf>,
    pub manifest: PathBuf,
}

/// Build of binary packages from one source package.
pub struct SrcPackage {
    specs: SourceSpecs,
    provide_specs: ProvideSpecs,
    srcdir: PathBuf,
    source_archive: PathBuf,
    ctx: HookContext,
    hooks: Vec<Box<dyn Hook>>,
    pkgs: BTreeMap<String, PackageInfo>,
    state: BuildState,
}

impl SrcPackage {
    /// Prepare the build of the project installed in `install_root`.
    ///
    /// `srcdir` is the unpacked source tree, `source_archive` the source
    /// tarball it comes from. The installed prefix of `config` is loaded when
    /// set.
    pub fn new(
        specs: SourceSpecs,
        provide_specs: ProvideSpecs,
        srcdir: &Path,
        source_archive: &Path,
        install_root: &Path,
        config: ResolvedConfig,
        introspector: Arc<dyn Introspector>,
    ) -> Result<Self> {
        let prefix = match &config.prefix {
            Some(root) => Some(Arc::new(InstalledPrefix::load(root)?)),
            None => None,
        };

        let ctx = HookContext {
            srcname: specs.general.name.clone(),
            version: specs.general.version.clone(),
            description: specs.general.description.clone(),
            config,
            install_root: install_root.to_path_buf(),
            introspector,
            syspkg: Arc::new(NullSysPkgManager),
            prefix,
        };

        Ok(Self {
            hooks: default_hooks(&ctx),
            specs,
            provide_specs,
            srcdir: srcdir.to_path_buf(),
            source_archive: source_archive.to_path_buf(),
            ctx,
            pkgs: BTreeMap::new(),
            state: BuildState::Installed,
        })
    }

    /// Prepare a build reading `mmpack/specs` and `mmpack/*.provides` from
    /// the source tree.
    pub fn load(
        srcdir: &Path,
        source_archive: &Path,
        install_root: &Path,
        config: ResolvedConfig,
        introspector: Arc<dyn Introspector>,
    ) -> Result<Self> {
        let specs_dir = srcdir.join(SPECS_DIR);
        let specs = SourceSpecs::from_file(specs_dir.join(SPECS_FILENAME))?;
        let provide_specs = ProvideSpecs::load_dir(&specs_dir)?;
        Self::new(
            specs,
            provide_specs,
            srcdir,
            source_archive,
            install_root,
            config,
            introspector,
        )
    }

    /// Use `syspkg` as the system resolution tier. Resets the hooks to the
    /// default ones.
    pub fn with_syspkg(mut self, syspkg: Arc<dyn SysPkgManager>) -> Self {
        self.ctx.syspkg = syspkg;
        self.hooks = default_hooks(&self.ctx);
        self
    }

    /// Replace the hooks run by the build.
    pub fn with_hooks(mut self, hooks: Vec<Box<dyn Hook>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Context given to the hooks.
    pub fn context(&self) -> &HookContext {
        &self.ctx
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Packages built so far.
    pub fn packages(&self) -> &BTreeMap<String, PackageInfo> {
        &self.pkgs
    }

    fn srcname(&self) -> &str {
        &self.specs.general.name
    }

    /// Let every hook adjust the install tree.
    pub fn post_local_install(&mut self) -> Result<()> {
        if self.state >= BuildState::PostInstalled {
            return Ok(());
        }
        let _guard = PhaseGuard::start(self.srcname(), Phase::PostInstall);
        for hook in &self.hooks {
            debug!("Running {} post-install", hook.name());
            hook.post_local_install(&self.ctx.install_root)?;
        }
        self.state = BuildState::PostInstalled;
        Ok(())
    }

    /// Assign every installed file to a package.
    pub fn ventilate(&mut self) -> Result<()> {
        if self.state >= BuildState::Ventilated {
            return Ok(());
        }
        self.post_local_install()?;
        let _guard = PhaseGuard::start(self.srcname(), Phase::Ventilate);

        let files = install_files(&self.ctx.install_root)?;
        info!("Ventilating {} installed files", files.len());
        let mut data = DispatchData::new(
            files,
            self.specs.general.version.clone(),
            self.specs.general.ghost,
        );

        for (name, spec) in &self.specs.custom_pkgs {
            let claim = data.init_custom_pkg(name, spec, &self.ctx.config.host_dist)?;
            if claim.explicit_files && claim.claimed == 0 {
                return Err(Error::spec_field(
                    name,
                    "files",
                    "no installed file matches the file patterns",
                ));
            }
        }

        for hook in &self.hooks {
            hook.dispatch(&mut data)?;
        }

        self.dispatch_fallback(&mut data);
        self.dispatch_catch_all(&mut data);
        self.add_devel_depends(&mut data);

        let (pkgs, unassigned) = data.into_parts();
        debug_assert!(unassigned.is_empty());
        info!("{} binary packages: {}", pkgs.len(), pkgs.keys().cloned().collect::<Vec<_>>().join(", "));
        self.pkgs = pkgs;
        self.state = BuildState::Ventilated;
        Ok(())
    }

    /// Package of a file no hook claimed, by its location.
    fn fallback_pkg(&self, relpath: &str) -> Option<String> {
        let src = self.srcname();
        let under = |dir: &str| relpath.starts_with(dir);

        if is_debug_file(relpath) {
            return Some(format!("{src}-debug"));
        }

        let devel_suffix = [".a", ".la", ".lib"].iter().any(|ext| relpath.ends_with(ext));
        let devel_dir = [
            "include/",
            "lib/pkgconfig/",
            "share/pkgconfig/",
            "lib/cmake/",
            "share/aclocal/",
        ]
        .iter()
        .any(|dir| under(dir));
        if devel_suffix || devel_dir {
            return Some(format!("{src}-devel"));
        }

        if ["share/doc/", "share/man/", "share/info/"].iter().any(|dir| under(dir)) {
            return Some(format!("{src}-doc"));
        }

        let exec_dir = ["bin/", "sbin/", "libexec/"].iter().any(|dir| under(dir));
        if exec_dir || self.ctx.introspector.is_executable(&self.ctx.path_of(relpath)) {
            return Some(src.to_string());
        }

        None
    }

    fn dispatch_fallback(&self, data: &mut DispatchData) {
        let mut by_pkg: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in data.unassigned_files() {
            if let Some(pkgname) = self.fallback_pkg(file) {
                by_pkg.entry(pkgname).or_default().push(file.clone());
            }
        }
        for (pkgname, files) in by_pkg {
            data.assign_to_pkg(&pkgname, files);
        }
    }

    fn library_pkgs(&self, data: &DispatchData) -> Vec<String> {
        data.pkgs()
            .values()
            .filter(|pkg| {
                pkg.files.iter().any(|f| {
                    !is_debug_file(f)
                        && self.ctx.introspector.is_dynamic_library(&self.ctx.path_of(f))
                })
            })
            .map(|pkg| pkg.name.clone())
            .collect()
    }

    fn dispatch_catch_all(&self, data: &mut DispatchData) {
        if data.unassigned_files().is_empty() {
            return;
        }

        let src = self.srcname().to_string();
        let target = if data.pkg(&src).is_some() {
            src
        } else {
            match self.library_pkgs(data).as_slice() {
                [single] => single.clone(),
                _ => src,
            }
        };

        let rest: Vec<String> = data.unassigned_files().iter().cloned().collect();
        debug!("{} remaining files go to {}", rest.len(), target);
        data.assign_to_pkg(&target, rest);
    }

    fn add_devel_depends(&self, data: &mut DispatchData) {
        let devel = format!("{}-devel", self.srcname());
        if data.pkg(&devel).is_none() {
            return;
        }

        let libs = self.library_pkgs(data);
        let version = self.specs.general.version.clone();
        if let Some(pkg) = data.pkg_mut(&devel) {
            for lib in libs.into_iter().filter(|lib| *lib != devel) {
                pkg.add_to_deplist(lib, version.clone(), version.clone());
            }
        }
    }

    /// Compute what every package provides.
    pub fn gen_provides(&mut self) -> Result<()> {
        if self.state >= BuildState::ProvidesGenerated {
            return Ok(());
        }
        self.ventilate()?;
        let _guard = PhaseGuard::start(self.srcname(), Phase::Provides);

        for pkg in self.pkgs.values_mut() {
            for hook in &self.hooks {
                hook.update_provides(pkg, &self.provide_specs)?;
            }
        }
        self.state = BuildState::ProvidesGenerated;
        Ok(())
    }

    /// Compute the dependencies of every package.
    pub fn gen_dependencies(&mut self) -> Result<()> {
        if self.state >= BuildState::DependsGenerated {
            return Ok(());
        }
        self.gen_provides()?;
        let _guard = PhaseGuard::start(self.srcname(), Phase::Depends);

        // Dependencies from ventilation, kept so a failed attempt can be retried
        let before: Vec<(String, Vec<Dependency>, BTreeSet<String>)> = self
            .pkgs
            .values()
            .map(|pkg| (pkg.name.clone(), pkg.deplist.clone(), pkg.sysdeps.clone()))
            .collect();

        if let Err(err) = self.resolve_depends() {
            for (name, deplist, sysdeps) in before {
                if let Some(pkg) = self.pkgs.get_mut(&name) {
                    pkg.deplist = deplist;
                    pkg.sysdeps = sysdeps;
                }
            }
            return Err(err);
        }
        self.state = BuildState::DependsGenerated;
        Ok(())
    }

    fn resolve_depends(&mut self) -> Result<()> {
        let names: Vec<String> = self.pkgs.keys().cloned().collect();
        for name in names {
            let Some(mut pkg) = self.pkgs.remove(&name) else {
                continue;
            };
            let result = {
                let others: Vec<&PackageInfo> = self.pkgs.values().collect();
                self.hooks
                    .iter()
                    .try_for_each(|hook| hook.update_depends(&mut pkg, &others))
            };
            self.pkgs.insert(name, pkg);
            result?;
        }
        Ok(())
    }

    /// License files of the source tree.
    fn license_files(&self) -> Vec<PathBuf> {
        let names: BTreeSet<&str> = self
            .ctx
            .config
            .license_files
            .iter()
            .chain(&self.specs.general.licenses)
            .map(String::as_str)
            .collect();
        names
            .into_iter()
            .map(|name| self.srcdir.join(name))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Binary packages ready to be written. Dependencies must be generated.
    pub fn finalize(&self) -> Result<Vec<BinaryPackage>> {
        if self.state < BuildState::DependsGenerated {
            return Err(anyhow::anyhow!(
                "{}: dependencies must be generated before finalizing",
                self.srcname()
            )
            .into());
        }
        let srcsha256 = sha256_file(&self.source_archive)?;
        let licenses = self.license_files();

        Ok(self
            .pkgs
            .values()
            .map(|pkg| {
                let mut binpkg = BinaryPackage::from_info(
                    pkg,
                    self.srcname(),
                    &self.ctx.config.host_arch,
                    &srcsha256,
                );
                binpkg.licenses = licenses.clone();
                binpkg
            })
            .collect())
    }

    /// Run the whole pipeline and write packages, provide files and the
    /// manifest in the output directory.
    ///
    /// Nothing is written before dependencies are resolved. Outputs are
    /// staged in a hidden directory of `outdir` and only moved in place once
    /// every one of them was written, so a failed build publishes nothing.
    pub fn build(&mut self) -> Result<BuildOutput> {
        self.gen_dependencies()?;
        let binpkgs = self.finalize()?;
        let _guard = PhaseGuard::start(self.srcname(), Phase::Finalize);

        let outdir = self.ctx.config.outdir.clone();
        let staging = outdir.join(format!(".{}.staging", self.srcname()));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)
                .map_err(|e| Error::io("failed to clear staging directory", &staging, e))?;
        }
        std::fs::create_dir_all(&staging)
            .map_err(|e| Error::io("failed to create output directory", &staging, e))?;

        let staged = match self.write_outputs(&binpkgs, &staging, &outdir) {
            Ok(staged) => staged,
            Err(err) => {
                if let Err(e) = std::fs::remove_dir_all(&staging) {
                    debug!("Could not remove {}: {}", staging.display(), e);
                }
                return Err(err);
            }
        };

        let publish = |path: PathBuf| -> Result<PathBuf> {
            let target = outdir.join(path.file_name().unwrap_or_default());
            std::fs::rename(&path, &target)
                .map_err(|e| Error::io("failed to publish build output", &target, e))?;
            Ok(target)
        };
        let output = BuildOutput {
            packages: staged
                .packages
                .into_iter()
                .map(publish)
                .collect::<Result<_>>()?,
            provide_files: staged
                .provide_files
                .into_iter()
                .map(publish)
                .collect::<Result<_>>()?,
            manifest: publish(staged.manifest)?,
        };
        std::fs::remove_dir_all(&staging)
            .map_err(|e| Error::io("failed to remove staging directory", &staging, e))?;

        info!("Wrote {} packages to {}", output.packages.len(), outdir.display());
        Ok(output)
    }

    /// Write every output in `staging`. The manifest is merged with the one
    /// already published in `outdir`, if any.
    fn write_outputs(
        &self,
        binpkgs: &[BinaryPackage],
        staging: &Path,
        outdir: &Path,
    ) -> Result<BuildOutput> {
        let mut provide_files = Vec::new();
        for pkg in self.pkgs.values() {
            for hook in &self.hooks {
                hook.store_provides(pkg, staging)?;
                let path = staging.join(format!("{}.{}", pkg.name, hook.provide_type()));
                if pkg.provide_list(hook.provide_type()).is_some() && path.exists() {
                    provide_files.push(path);
                }
            }
        }

        let mut manifest = Manifest::new(
            self.srcname(),
            self.specs.general.version.clone(),
            FileEntry::from_path(&self.source_archive)?,
        );
        let mut packages = Vec::new();
        for binpkg in binpkgs {
            let path = binpkg.create(&self.ctx.install_root, staging)?;
            manifest.add_binpkg(&binpkg.arch, &binpkg.name, FileEntry::from_path(&path)?);
            packages.push(path);
        }

        let published = outdir.join(manifest.filename());
        if published.exists() {
            let mut existing = Manifest::load(&published)?;
            existing.merge(manifest)?;
            manifest = existing;
        }
        let manifest_path = staging.join(manifest.filename());
        manifest.save(&manifest_path)?;

        Ok(BuildOutput {
            packages,
            provide_files,
            manifest: manifest_path,
        })
    }
}

/// Files and symlinks of an install tree, as `/`-separated relative paths.
pub fn install_files(install_root: &Path) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(install_root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(install_root).to_path_buf();
            Error::io(
                "failed to walk install tree",
                path,
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            )
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(install_root) else {
            continue;
        };
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.insert(rel.join("/"));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_install_files_are_relative() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("share/doc/foo")).unwrap();
        std::fs::write(temp.path().join("share/doc/foo/README"), "").unwrap();
        std::fs::create_dir_all(temp.path().join("bin")).unwrap();
        std::fs::write(temp.path().join("bin/foo"), "").unwrap();

        let files = install_files(temp.path()).unwrap();
        let files: Vec<_> = files.iter().map(String::as_str).collect();
        assert_eq!(files, vec!["bin/foo", "share/doc/foo/README"]);
    }

    #[test]
    fn test_build_states_are_ordered() {
        assert!(BuildState::Installed < BuildState::Ventilated);
        assert!(BuildState::ProvidesGenerated < BuildState::DependsGenerated);
    }
}
