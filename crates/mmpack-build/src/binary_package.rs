//! Finalized binary packages and their `.mpk` archives.

use crate::checksum::{file_entry_checksum, sha256_bytes, sha256_file};
use crate::package_info::PackageInfo;
use mmpack_core::{Error, Result, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use xz2::write::XzEncoder;

/// Extension of binary package archives.
pub const MPK_EXT: &str = "mpk";

/// Where license files are placed inside a package.
const LICENSES_DIR: &str = "share/licenses";

const INFO_PATH: &str = "MMPACK/info";
const SUMS_PATH: &str = "MMPACK/sha256sums";

/// Content of the `MMPACK/info` document of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub version: Version,
    pub source: String,
    pub description: String,
    pub ghost: bool,
    pub srcsha256: String,
    pub sumsha256sums: String,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub sysdepends: Vec<String>,
}

/// A package ready to be archived.
#[derive(Debug, Clone)]
pub struct BinaryPackage {
    pub name: String,
    pub version: Version,
    /// Source package name
    pub source: String,
    pub arch: String,
    pub description: String,
    pub ghost: bool,
    /// SHA-256 of the source archive
    pub srcsha256: String,
    /// Paths relative to the install root
    pub files: BTreeSet<String>,
    /// License files from the source tree
    pub licenses: Vec<PathBuf>,
    pub sysdeps: BTreeSet<String>,
    /// Merged dependency ranges
    depends: BTreeMap<String, (Version, Version)>,
}

impl BinaryPackage {
    /// Finalize a package, merging its dependency candidates.
    pub fn from_info(info: &PackageInfo, source: &str, arch: &str, srcsha256: &str) -> Self {
        let mut pkg = Self {
            name: info.name.clone(),
            version: info.version.clone(),
            source: source.to_string(),
            arch: arch.to_string(),
            description: info.description.clone(),
            ghost: info.ghost,
            srcsha256: srcsha256.to_string(),
            files: info.files.clone(),
            licenses: Vec::new(),
            sysdeps: info.sysdeps.clone(),
            depends: BTreeMap::new(),
        };
        for dep in &info.deplist {
            pkg.add_depend(&dep.name, dep.minver.clone(), dep.maxver.clone());
        }
        pkg
    }

    /// Add a dependency; repeated names are intersected.
    pub fn add_depend(&mut self, name: &str, minver: Version, maxver: Version) {
        if name == self.name {
            return;
        }
        match self.depends.get_mut(name) {
            Some((min, max)) => {
                *min = std::mem::take(min).newest(minver);
                *max = std::mem::take(max).oldest(maxver);
            }
            None => {
                self.depends.insert(name.to_string(), (minver, maxver));
            }
        }
    }

    /// Merged range of a dependency.
    pub fn depend(&self, name: &str) -> Option<&(Version, Version)> {
        self.depends.get(name)
    }

    /// Dependencies as `name`, `name (>= v)`, `name (< v)` or `name (= v)`.
    pub fn render_depends(&self) -> Vec<String> {
        let mut rendered = Vec::new();
        for (name, (min, max)) in &self.depends {
            match (min.is_any(), max.is_any()) {
                (true, true) => rendered.push(name.clone()),
                (false, true) => rendered.push(format!("{name} (>= {min})")),
                (true, false) => rendered.push(format!("{name} (< {max})")),
                (false, false) if min.as_str() == max.as_str() => {
                    rendered.push(format!("{name} (= {min})"))
                }
                (false, false) => {
                    rendered.push(format!("{name} (>= {min})"));
                    rendered.push(format!("{name} (< {max})"));
                }
            }
        }
        rendered
    }

    /// File name of the archive.
    pub fn archive_name(&self) -> String {
        format!("{}_{}_{}.{}", self.name, self.version, self.arch, MPK_EXT)
    }

    fn license_path(&self, license: &Path) -> String {
        let name = license
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}/{}", LICENSES_DIR, self.source, name)
    }

    /// The `MMPACK/sha256sums` document.
    pub fn sha256sums(&self, install_root: &Path) -> Result<String> {
        let mut sums = BTreeMap::new();
        for file in &self.files {
            sums.insert(file.clone(), file_entry_checksum(&install_root.join(file))?);
        }
        for license in &self.licenses {
            sums.insert(self.license_path(license), sha256_file(license)?);
        }
        serde_yaml::to_string(&sums).map_err(|e| anyhow::anyhow!(e).into())
    }

    /// The `MMPACK/info` document.
    pub fn metadata(&self, sumsha256sums: String) -> PackageMetadata {
        PackageMetadata {
            version: self.version.clone(),
            source: self.source.clone(),
            description: self.description.clone(),
            ghost: self.ghost,
            srcsha256: self.srcsha256.clone(),
            sumsha256sums,
            depends: self.render_depends(),
            sysdepends: self.sysdeps.iter().cloned().collect(),
        }
    }

    /// Write the `.mpk` archive in `outdir` and return its path.
    pub fn create(&self, install_root: &Path, outdir: &Path) -> Result<PathBuf> {
        let sums = self.sha256sums(install_root)?;
        let metadata = self.metadata(sha256_bytes(sums.as_bytes()));
        let info: BTreeMap<&str, &PackageMetadata> = BTreeMap::from([(self.name.as_str(), &metadata)]);
        let info = serde_yaml::to_string(&info).map_err(anyhow::Error::from)?;

        let archive_path = outdir.join(self.archive_name());
        info!("Creating {}", archive_path.display());
        self.write_archive(install_root, &archive_path, &info, &sums)
            .map_err(|e| Error::io("failed to write package archive", &archive_path, e))?;
        Ok(archive_path)
    }

    fn write_archive(
        &self,
        install_root: &Path,
        archive_path: &Path,
        info: &str,
        sums: &str,
    ) -> std::io::Result<()> {
        let file = File::create(archive_path)?;
        let enc = XzEncoder::new(file, 6);
        let mut tar = tar::Builder::new(enc);
        tar.follow_symlinks(false);

        for file in &self.files {
            debug!("Adding {} to {}", file, self.name);
            tar.append_path_with_name(install_root.join(file), file)?;
        }
        for license in &self.licenses {
            tar.append_path_with_name(license, self.license_path(license))?;
        }
        for (path, content) in [(INFO_PATH, info), (SUMS_PATH, sums)] {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, path, content.as_bytes())?;
        }

        tar.into_inner()?.finish()?;
        Ok(())
    }
}
