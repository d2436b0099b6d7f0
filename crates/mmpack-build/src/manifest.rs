//! Build manifests.
//!
//! A manifest lists the source archive and every binary package produced
//! from it, per architecture. Builds of the same source on several hosts
//! produce manifests that are merged before publication.
//!
//! ```yaml
//! name: foo
//! version: 1.0
//! source:
//!   file: foo_1.0_src.tar.xz
//!   size: 10240
//!   sha256: 5e2b...
//! binpkgs:
//!   amd64:
//!     libfoo1:
//!       file: libfoo1_1.0_amd64.mpk
//!       size: 4096
//!       sha256: 9f86...
//! ```

use crate::checksum::sha256_file;
use mmpack_core::{Error, Result, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Extension of manifest files.
pub const MANIFEST_EXT: &str = "mmpack-manifest";

/// A file referenced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name
    pub file: String,
    pub size: u64,
    pub sha256: String,
}

impl FileEntry {
    /// Describe the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta =
            std::fs::metadata(path).map_err(|e| Error::io("failed to stat file", path, e))?;
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::io(
                "not a file",
                path,
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            ))?;
        Ok(Self {
            file,
            size: meta.len(),
            sha256: sha256_file(path)?,
        })
    }
}

/// Source archive and binary packages of one source package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: Version,
    pub source: FileEntry,
    /// Architecture to package name to archive
    #[serde(default)]
    pub binpkgs: BTreeMap<String, BTreeMap<String, FileEntry>>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, version: Version, source: FileEntry) -> Self {
        Self {
            name: name.into(),
            version,
            source,
            binpkgs: BTreeMap::new(),
        }
    }

    /// Record a binary package built for `arch`.
    pub fn add_binpkg(&mut self, arch: &str, pkgname: &str, entry: FileEntry) {
        self.binpkgs
            .entry(arch.to_string())
            .or_default()
            .insert(pkgname.to_string(), entry);
    }

    /// Name of the manifest file.
    pub fn filename(&self) -> String {
        format!("{}_{}.{}", self.name, self.version, MANIFEST_EXT)
    }

    /// Union the binary packages of `other`, which must describe the same
    /// source package.
    pub fn merge(&mut self, other: Manifest) -> Result<()> {
        if self.name != other.name {
            return Err(Error::manifest(format!(
                "name differs: {} != {}",
                self.name, other.name
            )));
        }
        if self.version.as_str() != other.version.as_str() {
            return Err(Error::manifest(format!(
                "version of {} differs: {} != {}",
                self.name, self.version, other.version
            )));
        }
        if self.source != other.source {
            return Err(Error::manifest(format!(
                "source archive of {} {} differs",
                self.name, self.version
            )));
        }

        for (arch, pkgs) in other.binpkgs {
            debug!("Merging {} {} packages", pkgs.len(), arch);
            self.binpkgs.entry(arch).or_default().extend(pkgs);
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io("failed to read manifest", path, e))?;
        serde_yaml::from_str(&content).map_err(|e| {
            Error::manifest(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(anyhow::Error::from)?;
        std::fs::write(path, content).map_err(|e| Error::io("failed to write manifest", path, e))
    }
}
