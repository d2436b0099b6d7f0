//! Configuration and package specifications for mmpack-build.
//!
//! This crate handles:
//! - Parsing the `mmpack-build.toml` build configuration (global and per project)
//! - Merging configuration layers
//! - Parsing the `mmpack/specs` source package specification
//! - Loading hand-written provide specs (`mmpack/*.provides`)

pub mod combine;
pub mod config;
pub mod provides;
pub mod specs;

pub use combine::Combine;
pub use config::{BuildConfig, ConfigError, ResolvedConfig, load_build_config};
pub use provides::{ProvideSpec, ProvideSpecs};
pub use specs::{CustomPkgSpec, DependSpec, GeneralSpecs, SourceSpecs, SpecsError};

/// The per-project build configuration filename.
pub const CONFIG_FILENAME: &str = "mmpack-build.toml";

/// Directory of a source tree holding the package specifications.
pub const SPECS_DIR: &str = "mmpack";

/// The source package specification file inside [`SPECS_DIR`].
pub const SPECS_FILENAME: &str = "specs";

/// Extension of hand-written provide spec files inside [`SPECS_DIR`].
pub const PROVIDES_EXT: &str = "provides";

/// Provide namespaces known to mmpack-build.
pub const PROVIDE_TYPES: &[&str] = &["sharedlib", "pyobjects", "locales"];
