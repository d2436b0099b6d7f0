//! Configuration merging utilities.
//!
//! The build configuration is assembled from several layers (command line,
//! project `mmpack-build.toml`, global config, built-in defaults):
//!
//! - Scalars and `Option<T>`: first `Some` value wins
//! - Arrays: merged with higher precedence items placed earlier

use crate::BuildConfig;

/// Trait for combining configuration values.
///
/// The convention is that `self` has higher precedence than `other`.
pub trait Combine {
    /// Combine two values, preferring values in `self`.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

impl<T> Combine for Option<T> {
    fn combine(self, other: Self) -> Self {
        self.or(other)
    }
}

impl<T: PartialEq> Combine for Vec<T> {
    fn combine(mut self, other: Self) -> Self {
        for item in other {
            if !self.contains(&item) {
                self.push(item);
            }
        }
        self
    }
}

impl Combine for BuildConfig {
    fn combine(self, other: Self) -> Self {
        Self {
            host_arch: self.host_arch.combine(other.host_arch),
            host_dist: self.host_dist.combine(other.host_dist),
            prefix: self.prefix.combine(other.prefix),
            outdir: self.outdir.combine(other.outdir),
            license_files: self.license_files.combine(other.license_files),
        }
    }
}
