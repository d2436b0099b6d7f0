//! Packages installed in an mmpack prefix, the second resolution tier.

use crate::provide::ProvideList;
use mmpack_config::PROVIDE_TYPES;
use mmpack_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where installed packages keep their provide files, relative to the prefix.
pub const METADATA_DIR: &str = "var/lib/mmpack/metadata";

/// Provides of every package installed in a prefix.
#[derive(Debug, Clone, Default)]
pub struct InstalledPrefix {
    lists: BTreeMap<String, ProvideList>,
}

impl InstalledPrefix {
    /// Read every `<pkgname>.<type>` provide file of `root`.
    ///
    /// A prefix without metadata directory has nothing installed.
    pub fn load(root: &Path) -> Result<Self> {
        let mut prefix = Self::default();

        let dir = root.join(METADATA_DIR);
        if !dir.is_dir() {
            debug!("No installed package metadata in {}", root.display());
            return Ok(prefix);
        }

        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::io("failed to list prefix metadata", &dir, e))?;
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        paths.sort();

        for path in paths {
            let Some(provide_type) = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| PROVIDE_TYPES.iter().find(|t| **t == ext))
            else {
                continue;
            };
            let list = ProvideList::load(provide_type, &path)?;
            prefix.add(list);
        }

        info!(
            "Loaded {} provides from prefix {}",
            prefix.lists.values().map(ProvideList::len).sum::<usize>(),
            root.display()
        );
        Ok(prefix)
    }

    /// Register the provides of an installed package.
    pub fn add(&mut self, list: ProvideList) {
        match self.lists.get_mut(list.provide_type()) {
            Some(existing) => existing.extend(list),
            None => {
                self.lists.insert(list.provide_type().to_string(), list);
            }
        }
    }

    /// All installed providers of a type.
    pub fn provides(&self, provide_type: &str) -> Option<&ProvideList> {
        self.lists.get(provide_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_aggregates_by_type() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(METADATA_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("libbar2.sharedlib"),
            "libbar.so.2:\n  depends: libbar2\n  symbols:\n    bar_open: '2.0'\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("libbaz1.sharedlib"),
            "libbaz.so.1:\n  depends: libbaz1\n  symbols: {}\n",
        )
        .unwrap();
        std::fs::write(dir.join("libbar2.info"), "ignored: true\n").unwrap();

        let prefix = InstalledPrefix::load(temp.path()).unwrap();
        let libs = prefix.provides("sharedlib").unwrap();
        assert_eq!(libs.len(), 2);
        assert_eq!(libs.get("libbar.so.2").unwrap().symbols["bar_open"].as_str(), "2.0");
        assert!(prefix.provides("pyobjects").is_none());
    }

    #[test]
    fn test_empty_prefix() {
        let temp = tempdir().unwrap();
        let prefix = InstalledPrefix::load(temp.path()).unwrap();
        assert!(prefix.provides("sharedlib").is_none());
    }
}
