//! Binary packages under construction.

use crate::provide::ProvideList;
use mmpack_config::{CustomPkgSpec, DependSpec};
use mmpack_core::{Error, Result, Version};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::debug;

/// A dependency candidate, before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub name: String,
    pub minver: Version,
    pub maxver: Version,
}

/// Outcome of claiming files for a custom package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomClaim {
    /// Whether the package specs listed file patterns
    pub explicit_files: bool,
    /// Number of files moved into the package
    pub claimed: usize,
}

/// A binary package being built.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    pub version: Version,
    pub description: String,
    /// Payload supplied by the host system
    pub ghost: bool,
    /// Paths relative to the install root
    pub files: BTreeSet<String>,
    /// Provide lists by type
    pub provides: BTreeMap<String, ProvideList>,
    /// Candidate dependencies; duplicates are merged at finalization
    pub deplist: Vec<Dependency>,
    pub sysdeps: BTreeSet<String>,
}

fn depend_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9_.+-]+)\s*(?:\(\s*(>=|=|<)\s*([^\s)]+)\s*\))?\s*$")
            .expect("Invalid regex pattern")
    })
}

impl PackageInfo {
    /// An empty package.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: String::new(),
            ghost: false,
            files: BTreeSet::new(),
            provides: BTreeMap::new(),
            deplist: Vec::new(),
            sysdeps: BTreeSet::new(),
        }
    }

    /// Append a dependency candidate.
    pub fn add_to_deplist(&mut self, pkgname: impl Into<String>, minver: Version, maxver: Version) {
        self.deplist.push(Dependency {
            name: pkgname.into(),
            minver,
            maxver,
        });
    }

    pub fn add_sysdep(&mut self, sysdep: impl Into<String>) {
        self.sysdeps.insert(sysdep.into());
    }

    /// Provide list of a type, if the package provides anything of it.
    pub fn provide_list(&self, provide_type: &str) -> Option<&ProvideList> {
        self.provides.get(provide_type)
    }

    /// Apply a custom package spec.
    ///
    /// Files of `install_files` matching one of the `files` patterns (full
    /// match on the relative path) are moved into this package.
    pub fn init_from_specs(
        &mut self,
        specs: &CustomPkgSpec,
        host_dist: &str,
        install_files: &mut BTreeSet<String>,
    ) -> Result<CustomClaim> {
        if let Some(description) = &specs.description {
            self.description = description.clone();
        }

        for depend in &specs.depends {
            let dep = self.parse_depend(depend)?;
            self.deplist.push(dep);
        }

        for sysdep in specs.sysdepends(&self.name, host_dist)? {
            self.add_sysdep(sysdep);
        }

        let Some(patterns) = &specs.files else {
            return Ok(CustomClaim {
                explicit_files: false,
                claimed: 0,
            });
        };

        let mut claimed = 0;
        for pattern in patterns {
            let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                Error::spec_field(&self.name, "files", format!("invalid pattern {pattern}: {e}"))
            })?;
            let matched: Vec<String> = install_files
                .iter()
                .filter(|f| re.is_match(f))
                .cloned()
                .collect();
            for file in matched {
                debug!("{} claimed by {}", file, self.name);
                install_files.remove(&file);
                self.files.insert(file);
                claimed += 1;
            }
        }

        Ok(CustomClaim {
            explicit_files: true,
            claimed,
        })
    }

    fn parse_depend(&self, depend: &DependSpec) -> Result<Dependency> {
        match depend {
            DependSpec::Plain(s) => {
                let caps = depend_regex().captures(s).ok_or_else(|| {
                    Error::spec_field(&self.name, "depends", format!("invalid dependency: {s}"))
                })?;
                let name = caps[1].to_string();
                let version = caps.get(3).map(|m| Version::new(m.as_str()));
                let (minver, maxver) = match (caps.get(2).map(|m| m.as_str()), version) {
                    (Some(">="), Some(v)) => (v, Version::any()),
                    (Some("="), Some(v)) => (v.clone(), v),
                    (Some("<"), Some(v)) => (Version::any(), v),
                    _ => (Version::any(), Version::any()),
                };
                Ok(Dependency {
                    name,
                    minver,
                    maxver,
                })
            }
            DependSpec::Range(map) => {
                let mut entries = map.iter();
                match (entries.next(), entries.next()) {
                    (Some((name, range)), None) if range.len() == 2 => Ok(Dependency {
                        name: name.clone(),
                        minver: range[0].clone(),
                        maxver: range[1].clone(),
                    }),
                    _ => Err(Error::spec_field(
                        &self.name,
                        "depends",
                        "a dependency mapping must be `name: [min, max]`",
                    )),
                }
            }
        }
    }
}
