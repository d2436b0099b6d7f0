//! Gettext message catalogs.

use super::{Hook, HookContext, file_name, is_debug_file, split_soname};
use crate::dispatch::DispatchData;
use crate::package_info::PackageInfo;
use crate::provide::{NeededSet, Provide, ProvideList};
use mmpack_config::ProvideSpecs;
use mmpack_core::{Result, Version};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::debug;

const PROVIDE_TYPE: &str = "locales";

fn catalog_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^share/locale/([^/]+)/LC_MESSAGES/([^/]+)\.mo$").expect("Invalid regex pattern")
    })
}

/// `(language, domain)` of a message catalog.
fn catalog_of(relpath: &str) -> Option<(&str, &str)> {
    let caps = catalog_regex().captures(relpath)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Text domains a binary may load: the program name, or the library name
/// with and without its `lib` prefix.
fn domains_of(relpath: &str) -> Vec<String> {
    let name = file_name(relpath);
    let base = split_soname(name).map(|(base, _)| base).or_else(|| {
        let idx = name.to_ascii_lowercase().find(".dll")?;
        name.get(..idx)
    });
    if let Some(base) = base {
        let mut domains = vec![base.to_string()];
        if let Some(short) = base.strip_prefix("lib").filter(|s| !s.is_empty()) {
            domains.push(short.to_string());
        }
        return domains;
    }
    let stem = name
        .strip_suffix(".exe")
        .or_else(|| name.strip_suffix(".EXE"))
        .unwrap_or(name);
    vec![stem.to_string()]
}

/// Hook handling translations.
pub struct LocalesHook {
    ctx: HookContext,
}

impl LocalesHook {
    pub fn new(ctx: HookContext) -> Self {
        Self { ctx }
    }

    fn is_binary(&self, relpath: &str) -> bool {
        if is_debug_file(relpath) {
            return false;
        }
        let path = self.ctx.path_of(relpath);
        self.ctx.introspector.is_dynamic_library(&path) || self.ctx.introspector.is_executable(&path)
    }
}

impl Hook for LocalesHook {
    fn name(&self) -> &str {
        "locales"
    }

    fn provide_type(&self) -> &str {
        PROVIDE_TYPE
    }

    fn dispatch(&self, data: &mut DispatchData) -> Result<()> {
        let catalogs: Vec<String> = data
            .unassigned_files()
            .iter()
            .filter(|f| catalog_of(f).is_some())
            .cloned()
            .collect();
        if catalogs.is_empty() {
            return Ok(());
        }

        let pkgname = format!("{}-locales", self.ctx.srcname);
        let pkg = data.assign_to_pkg(&pkgname, catalogs);
        if pkg.description.is_empty() {
            pkg.description = self
                .ctx
                .pkg_description(&format!("This package provides the translations of {}.", self.ctx.srcname));
        }
        Ok(())
    }

    fn update_provides(&self, pkg: &mut PackageInfo, specs: &ProvideSpecs) -> Result<()> {
        let mut domains: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (lang, domain) in pkg.files.iter().filter_map(|f| catalog_of(f)) {
            domains.entry(domain).or_default().insert(lang);
        }

        let mut list = ProvideList::new(PROVIDE_TYPE);
        for (domain, langs) in domains {
            let mut provide = Provide::new(&pkg.name, domain);
            provide.add_symbols(langs, Version::any());
            provide.update_from_specs(specs.get(PROVIDE_TYPE, domain), pkg)?;
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

        let mut needed = NeededSet::new();
        for file in pkg.files.iter().filter(|f| self.is_binary(f)) {
            needed.sonames.extend(domains_of(file));
        }
        if needed.sonames.is_empty() {
            return Ok(());
        }

        self.ctx
            .resolve_mmpack_tiers(PROVIDE_TYPE, pkg, others, &mut needed);

        // Programs are not required to be translated
        if !needed.sonames.is_empty() {
            debug!(
                "{}: no translations for {}",
                pkg.name,
                needed.sonames.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(())
    }
}
