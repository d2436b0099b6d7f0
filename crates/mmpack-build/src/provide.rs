//! What packages provide, and resolution of what they need against it.
//!
//! A [`Provide`] describes one provider (a shared library soname, a python
//! module, a gettext domain) and the version each of its symbols appeared
//! in. Providers of the same type are grouped in a [`ProvideList`], which
//! resolves the needs of a consumer into package dependencies.

use crate::package_info::PackageInfo;
use mmpack_config::ProvideSpec;
use mmpack_core::{Error, Result, Version};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, trace, warn};

const TAG_REGEX: &str = "regex";
const TAG_OPTIONAL: &str = "optional";

/// One provider and its symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct Provide {
    /// ABI-stable key (e.g. `libfoo1`)
    pub name: String,
    /// Exact runtime identity (e.g. `libfoo.so.1`)
    pub soname: String,
    /// Package to depend on when this provider is used
    pub pkgdepends: String,
    /// Symbol to the minimal version providing it
    pub symbols: BTreeMap<String, Version>,
}

/// Differences between extracted symbols and a provide spec.
///
/// Advisory only: extracted data is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecReport {
    /// Symbols available earlier than the provide spec states
    pub before_expected: Vec<String>,
    /// Symbols available later than the provide spec states
    pub later_than_expected: Vec<String>,
    /// Exported symbols missing from the provide spec
    pub added: Vec<String>,
    /// Spec entries matching no exported symbol
    pub removed: Vec<String>,
}

impl SpecReport {
    /// Whether extracted symbols and spec fully agree.
    pub fn is_clean(&self) -> bool {
        self.before_expected.is_empty()
            && self.later_than_expected.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
    }

    fn log(&self, soname: &str) {
        if !self.before_expected.is_empty() {
            warn!(
                "{}: symbols introduced before expected: {}",
                soname,
                self.before_expected.join(", ")
            );
        }
        if !self.later_than_expected.is_empty() {
            warn!(
                "{}: symbols introduced later than expected: {}",
                soname,
                self.later_than_expected.join(", ")
            );
        }
        if !self.added.is_empty() {
            warn!("{}: new symbols: {}", soname, self.added.join(", "));
        }
        if !self.removed.is_empty() {
            warn!("{}: symbols removed: {}", soname, self.removed.join(", "));
        }
    }
}

/// Split `(tag1,tag2)name` into its tags and name.
fn split_tags(key: &str) -> (BTreeSet<&str>, &str) {
    if let Some(rest) = key.strip_prefix('(') {
        if let Some((tags, name)) = rest.split_once(')') {
            let tags = tags.split(',').map(str::trim).filter(|t| !t.is_empty());
            return (tags.collect(), name);
        }
    }
    (BTreeSet::new(), key)
}

/// Symbol name without its version suffix (`foo@LIBFOO_1` -> `foo`).
fn base_name(symbol: &str) -> &str {
    symbol.split_once('@').map_or(symbol, |(base, _)| base)
}

impl Provide {
    /// A provider with no symbol yet, depended upon through package `name`.
    pub fn new(name: impl Into<String>, soname: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            pkgdepends: name.clone(),
            name,
            soname: soname.into(),
            symbols: BTreeMap::new(),
        }
    }

    /// Record `symbols` as available since `version`.
    pub fn add_symbols<I, S>(&mut self, symbols: I, version: Version)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for sym in symbols {
            self.symbols.insert(sym.into(), version.clone());
        }
    }

    /// Reconcile extracted symbols with the hand-written spec of this provider.
    ///
    /// Symbols whose version is still pending (`any`) get the provide spec version,
    /// or the version of `pkg` when the provide spec does not mention them.
    pub fn update_from_specs(
        &mut self,
        spec: Option<&ProvideSpec>,
        pkg: &PackageInfo,
    ) -> Result<SpecReport> {
        let mut report = SpecReport::default();

        let Some(spec) = spec else {
            for version in self.symbols.values_mut() {
                if version.is_any() {
                    *version = pkg.version.clone();
                }
            }
            return Ok(report);
        };

        if let Some(depends) = &spec.depends {
            self.pkgdepends = depends.clone();
        }

        let mut used = BTreeSet::new();
        for (key, spec_version) in &spec.symbols {
            let (tags, name) = split_tags(key);
            let matches = self.match_spec_symbol(&tags, name, &pkg.name)?;

            if matches.is_empty() {
                let future = *spec_version > pkg.version;
                if !tags.contains(TAG_OPTIONAL) && !future {
                    report.removed.push(name.to_string());
                }
                continue;
            }

            for sym in matches {
                let Some(recorded) = self.symbols.get_mut(&sym) else {
                    continue;
                };
                if recorded.is_any() {
                    *recorded = spec_version.clone();
                } else if *recorded < *spec_version {
                    report.before_expected.push(sym.clone());
                } else if *recorded > *spec_version {
                    report.later_than_expected.push(sym.clone());
                }
                used.insert(sym);
            }
        }

        for (sym, version) in self.symbols.iter_mut() {
            if !used.contains(sym) {
                report.added.push(sym.clone());
                *version = pkg.version.clone();
            }
        }

        report.log(&self.soname);
        Ok(report)
    }

    fn match_spec_symbol(
        &self,
        tags: &BTreeSet<&str>,
        name: &str,
        pkgname: &str,
    ) -> Result<Vec<String>> {
        if tags.contains(TAG_REGEX) {
            let re = Regex::new(&format!("^(?:{name})$")).map_err(|e| {
                Error::spec_field(pkgname, "symbols", format!("invalid symbol pattern {name}: {e}"))
            })?;
            return Ok(self
                .symbols
                .keys()
                .filter(|s| re.is_match(s))
                .cloned()
                .collect());
        }

        if self.symbols.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }

        let base = base_name(name);
        Ok(self
            .symbols
            .keys()
            .filter(|s| base_name(s) == base)
            .cloned()
            .collect())
    }
}

/// What a consumer still needs. Drained in place by [`ProvideList::resolve_deps`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeededSet {
    pub sonames: BTreeSet<String>,
    pub symbols: BTreeSet<String>,
}

impl NeededSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every soname has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.sonames.is_empty()
    }
}

/// A soname resolved to a package dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDep {
    /// Package to depend on
    pub name: String,
    /// Soname that was resolved
    pub soname: String,
    pub minver: Version,
    pub maxver: Version,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProvideEntry {
    depends: String,
    #[serde(default)]
    symbols: BTreeMap<String, Version>,
}

/// All providers of one type, by soname.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvideList {
    provide_type: String,
    provides: BTreeMap<String, Provide>,
}

impl ProvideList {
    /// An empty list of the given type (`sharedlib`, `pyobjects`, `locales`).
    pub fn new(provide_type: impl Into<String>) -> Self {
        Self {
            provide_type: provide_type.into(),
            provides: BTreeMap::new(),
        }
    }

    pub fn provide_type(&self) -> &str {
        &self.provide_type
    }

    /// Add a provider, replacing any provider of the same soname.
    pub fn add(&mut self, provide: Provide) {
        self.provides.insert(provide.soname.clone(), provide);
    }

    pub fn get(&self, soname: &str) -> Option<&Provide> {
        self.provides.get(soname)
    }

    pub fn len(&self) -> usize {
        self.provides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provides.is_empty()
    }

    /// Add every provider of `other`. Providers of `other` win on conflicts.
    pub fn extend(&mut self, other: ProvideList) {
        self.provides.extend(other.provides);
    }

    /// Resolve needed sonames against the providers of this list.
    ///
    /// Resolved sonames and the symbols their providers export are removed
    /// from `needed`; the caller must only reuse what remains. With `pin`
    /// set (providers built from the same source), dependencies are pinned to
    /// that exact version. Otherwise the minimal version is the newest among
    /// the symbols actually used.
    pub fn resolve_deps(&self, needed: &mut NeededSet, pin: Option<&Version>) -> Vec<ResolvedDep> {
        let sonames: Vec<String> = needed
            .sonames
            .iter()
            .filter(|s| self.provides.contains_key(*s))
            .cloned()
            .collect();

        let mut resolved = Vec::with_capacity(sonames.len());
        for soname in sonames {
            let provide = &self.provides[&soname];

            let (minver, maxver) = match pin {
                Some(version) => (version.clone(), version.clone()),
                None => {
                    let used = needed
                        .symbols
                        .iter()
                        .filter_map(|sym| provide.symbols.get(sym))
                        .cloned();
                    (Version::newest_of(used), Version::any())
                }
            };

            needed.symbols.retain(|sym| !provide.symbols.contains_key(sym));
            needed.sonames.remove(&soname);

            trace!(
                "{} resolved by {} ({} .. {})",
                soname, provide.pkgdepends, minver, maxver
            );
            resolved.push(ResolvedDep {
                name: provide.pkgdepends.clone(),
                soname,
                minver,
                maxver,
            });
        }

        resolved
    }

    /// Serialize as a provide file document.
    pub fn to_yaml(&self) -> Result<String> {
        let doc: BTreeMap<&str, ProvideEntry> = self
            .provides
            .values()
            .map(|p| {
                (
                    p.soname.as_str(),
                    ProvideEntry {
                        depends: p.pkgdepends.clone(),
                        symbols: p.symbols.clone(),
                    },
                )
            })
            .collect();
        serde_yaml::to_string(&doc).map_err(|e| anyhow::anyhow!(e).into())
    }

    /// Parse a provide file document.
    pub fn from_yaml(provide_type: &str, content: &str) -> Result<Self> {
        let doc: BTreeMap<String, ProvideEntry> =
            serde_yaml::from_str(content).map_err(|e| anyhow::anyhow!(e))?;

        let mut list = Self::new(provide_type);
        for (soname, entry) in doc {
            list.add(Provide {
                name: entry.depends.clone(),
                pkgdepends: entry.depends,
                soname,
                symbols: entry.symbols,
            });
        }
        Ok(list)
    }

    /// Write the provide file `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        debug!("Writing {} provides to {}", self.provide_type, path.display());
        std::fs::write(path, self.to_yaml()?)
            .map_err(|e| Error::io("failed to write provide file", path, e))
    }

    /// Read the provide file `path`.
    pub fn load(provide_type: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io("failed to read provide file", path, e))?;
        Self::from_yaml(provide_type, &content)
    }
}
