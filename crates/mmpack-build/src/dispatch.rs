//! File assignment ledger used during ventilation.

use crate::package_info::{CustomClaim, PackageInfo};
use mmpack_config::CustomPkgSpec;
use mmpack_core::{Result, Version};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Files not yet assigned, and the packages built so far.
///
/// Every file is either in `unassigned_files` or in the files of exactly one
/// package; [`DispatchData::assign_to_pkg`] is the only way files move.
#[derive(Debug, Clone)]
pub struct DispatchData {
    unassigned_files: BTreeSet<String>,
    pkgs: BTreeMap<String, PackageInfo>,
    version: Version,
    ghost: bool,
}

impl DispatchData {
    /// Start ventilation of `files`, creating packages at `version`.
    pub fn new(files: BTreeSet<String>, version: Version, ghost: bool) -> Self {
        Self {
            unassigned_files: files,
            pkgs: BTreeMap::new(),
            version,
            ghost,
        }
    }

    pub fn unassigned_files(&self) -> &BTreeSet<String> {
        &self.unassigned_files
    }

    /// Create the custom package `name` and let it claim files from the pool.
    pub fn init_custom_pkg(
        &mut self,
        name: &str,
        spec: &CustomPkgSpec,
        host_dist: &str,
    ) -> Result<CustomClaim> {
        let Self {
            unassigned_files,
            pkgs,
            version,
            ghost,
        } = self;
        let pkg = pkgs.entry(name.to_string()).or_insert_with(|| {
            let mut pkg = PackageInfo::new(name, version.clone());
            pkg.ghost = *ghost;
            pkg
        });
        pkg.init_from_specs(spec, host_dist, unassigned_files)
    }

    pub fn pkgs(&self) -> &BTreeMap<String, PackageInfo> {
        &self.pkgs
    }

    pub fn pkg(&self, name: &str) -> Option<&PackageInfo> {
        self.pkgs.get(name)
    }

    pub fn pkg_mut(&mut self, name: &str) -> Option<&mut PackageInfo> {
        self.pkgs.get_mut(name)
    }

    /// Look up a package, creating it empty if needed.
    pub fn get_or_create(&mut self, name: &str) -> &mut PackageInfo {
        let (version, ghost) = (&self.version, self.ghost);
        self.pkgs.entry(name.to_string()).or_insert_with(|| {
            debug!("Creating package {}", name);
            let mut pkg = PackageInfo::new(name, version.clone());
            pkg.ghost = ghost;
            pkg
        })
    }

    /// Move `files` to package `name`, creating it if needed.
    ///
    /// Files already assigned to some package are left where they are.
    pub fn assign_to_pkg<I, S>(&mut self, name: &str, files: I) -> &mut PackageInfo
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let moved: Vec<String> = files
            .into_iter()
            .filter_map(|f| self.unassigned_files.take(f.as_ref()))
            .collect();

        let pkg = self.get_or_create(name);
        for file in moved {
            debug!("{} -> {}", file, name);
            pkg.files.insert(file);
        }
        pkg
    }

    /// End ventilation, yielding the packages and the files left over.
    pub fn into_parts(self) -> (BTreeMap<String, PackageInfo>, BTreeSet<String>) {
        (self.pkgs, self.unassigned_files)
    }
}
