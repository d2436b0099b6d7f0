//! Shared fixtures for the build integration tests.

#![allow(dead_code)]

use mmpack_build::{SrcPackage, StaticIntrospector, SysPkgManager, SysPkgTable};
use mmpack_config::{BuildConfig, ResolvedConfig};
use mmpack_core::Result;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A source tree, its install tree and an output directory.
pub struct Fixture {
    _temp: TempDir,
    pub srcdir: PathBuf,
    pub install_root: PathBuf,
    pub outdir: PathBuf,
    pub source_archive: PathBuf,
    pub prefix: Option<PathBuf>,
}

impl Fixture {
    /// A source package with the given `mmpack/specs`.
    pub fn new(specs: &str) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let srcdir = temp.path().join("src");
        let install_root = temp.path().join("install");
        let outdir = temp.path().join("out");
        fs::create_dir_all(srcdir.join("mmpack")).unwrap();
        fs::create_dir_all(&install_root).unwrap();
        fs::write(srcdir.join("mmpack/specs"), specs).unwrap();

        let source_archive = temp.path().join("src.tar.xz");
        fs::write(&source_archive, b"source archive").unwrap();

        Self {
            _temp: temp,
            srcdir,
            install_root,
            outdir,
            source_archive,
            prefix: None,
        }
    }

    /// Install a regular file.
    pub fn install(&self, relpath: &str, content: &str) {
        let path = self.install_root.join(relpath);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Install a symbolic link (a copy where links are not supported).
    pub fn install_link(&self, relpath: &str, target: &str) {
        let path = self.install_root.join(relpath);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, &path).unwrap();
        #[cfg(not(unix))]
        fs::write(&path, target).unwrap();
    }

    /// Write a file in the source tree.
    pub fn write_src(&self, relpath: &str, content: &str) {
        let path = self.srcdir.join(relpath);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Declare provide files of packages installed in a prefix.
    pub fn with_installed(mut self, pkgname: &str, provide_type: &str, content: &str) -> Self {
        let prefix = self.srcdir.parent().unwrap().join("prefix");
        let metadata = prefix.join(mmpack_build::prefix::METADATA_DIR);
        fs::create_dir_all(&metadata).unwrap();
        fs::write(metadata.join(format!("{pkgname}.{provide_type}")), content).unwrap();
        self.prefix = Some(prefix);
        self
    }

    pub fn config(&self) -> ResolvedConfig {
        BuildConfig {
            host_arch: Some("amd64".to_string()),
            host_dist: Some("debian".to_string()),
            prefix: self.prefix.clone(),
            outdir: Some(self.outdir.clone()),
            ..Default::default()
        }
        .resolve(&self.srcdir)
    }

    pub fn src_package(&self, introspector: StaticIntrospector) -> Result<SrcPackage> {
        SrcPackage::load(
            &self.srcdir,
            &self.source_archive,
            &self.install_root,
            self.config(),
            Arc::new(introspector),
        )
    }

    /// Every file of the install tree.
    pub fn installed(&self) -> BTreeSet<String> {
        mmpack_build::install_files(&self.install_root).unwrap()
    }

    /// Names of the files written in the output directory.
    pub fn outputs(&self) -> BTreeSet<String> {
        match fs::read_dir(&self.outdir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => BTreeSet::new(),
        }
    }
}

/// System package manager recording every soname it is asked about.
pub struct RecordingSysPkg {
    table: SysPkgTable,
    pub queries: Mutex<Vec<String>>,
}

impl RecordingSysPkg {
    pub fn new(table: SysPkgTable) -> Self {
        Self {
            table,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queried(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl SysPkgManager for RecordingSysPkg {
    fn find_sharedlib_sysdep(
        &self,
        soname: &str,
        symbols: &mut BTreeSet<String>,
    ) -> Result<Option<String>> {
        self.queries.lock().unwrap().push(soname.to_string());
        self.table.find_sharedlib_sysdep(soname, symbols)
    }

    fn find_pypkg_sysdep(&self, name: &str) -> Result<Option<String>> {
        self.queries.lock().unwrap().push(name.to_string());
        self.table.find_pypkg_sysdep(name)
    }
}

/// Read a file of the output directory.
pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
