//! Build configuration.
//!
//! A project may carry a `mmpack-build.toml` next to its sources, and a global
//! config lives at `~/.config/mmpack/config.toml` (or platform equivalent).
//! Project values win over global ones, which win over the detected defaults.
//!
//! ```toml
//! host_arch = "amd64"
//! host_dist = "debian"
//! prefix = "/home/user/mmpack-prefix"
//! outdir = "/home/user/mmpack-packages"
//! ```

use crate::{CONFIG_FILENAME, Combine};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read build config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse build config: {0}")]
    ParseError(#[from] toml::de::Error),
}

impl From<ConfigError> for mmpack_core::Error {
    fn from(err: ConfigError) -> Self {
        mmpack_core::Error::Config {
            message: err.to_string(),
            path: None,
            source: Some(Box::new(err)),
            fixes: vec![],
        }
    }
}

/// One layer of build configuration. Unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Architecture packages are built for (e.g. `amd64`)
    pub host_arch: Option<String>,

    /// Host distribution, selects the `sysdepends-<dist>` entries
    pub host_dist: Option<String>,

    /// mmpack prefix used as the installed-packages resolution tier
    pub prefix: Option<PathBuf>,

    /// Where packages, provide files and manifests are written
    pub outdir: Option<PathBuf>,

    /// Source tree files copied into every package as license material
    pub license_files: Vec<String>,
}

impl BuildConfig {
    /// Parse a configuration layer from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Parse a configuration layer from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Fill every remaining gap and produce the configuration used by a build.
    ///
    /// Host architecture and distribution are only detected when no layer
    /// set them. The default license files follow any configured ones.
    pub fn resolve(self, srcdir: &Path) -> ResolvedConfig {
        let Self {
            host_arch,
            host_dist,
            prefix,
            outdir,
            license_files,
        } = self;

        ResolvedConfig {
            host_arch: host_arch.unwrap_or_else(|| detect_host_arch().to_string()),
            host_dist: host_dist.unwrap_or_else(detect_host_dist),
            prefix,
            outdir: outdir.unwrap_or_else(|| srcdir.join("mmpack-packages")),
            license_files: license_files.combine(default_license_files()),
        }
    }
}

fn default_license_files() -> Vec<String> {
    ["COPYING", "COPYRIGHT", "LICENSE"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Fully resolved build configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub host_arch: String,
    pub host_dist: String,
    pub prefix: Option<PathBuf>,
    pub outdir: PathBuf,
    pub license_files: Vec<String>,
}

impl ResolvedConfig {
    /// Whether the host produces PE (Windows) binaries.
    pub fn is_pe_host(&self) -> bool {
        self.host_dist == "windows"
    }
}

/// Path of the global configuration file, if a home directory is known.
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "mmpack", "mmpack").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load the build configuration for a source tree.
///
/// The project file and the global file are both optional; a file that
/// exists but does not parse is an error.
pub fn load_build_config(srcdir: &Path) -> Result<BuildConfig, ConfigError> {
    let mut config = BuildConfig::default();

    let project_file = srcdir.join(CONFIG_FILENAME);
    if project_file.exists() {
        debug!("Loading project config from: {}", project_file.display());
        config = config.combine(BuildConfig::from_file(&project_file)?);
    }

    match global_config_path() {
        Some(path) if path.exists() => {
            debug!("Loading global config from: {}", path.display());
            config = config.combine(BuildConfig::from_file(&path)?);
        }
        Some(path) => debug!("Global config file does not exist: {}", path.display()),
        None => debug!("Could not determine global config path"),
    }

    Ok(config)
}

fn detect_host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "i386",
        other => other,
    }
}

fn detect_host_dist() -> String {
    if cfg!(windows) {
        return "windows".to_string();
    }

    std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|content| parse_os_release_id(&content))
        .unwrap_or_else(|| "unknown".to_string())
}

fn parse_os_release_id(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("ID="))
        .map(|id| id.trim().trim_matches('"').to_string())
        .filter(|id| !id.is_empty())
}
