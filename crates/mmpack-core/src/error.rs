//! Error types for mmpack-build.

use std::path::PathBuf;

/// Result type alias using mmpack Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes for categorizing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed package specification
    SpecError,
    /// Inconsistent manifests
    ManifestMismatch,
    /// A needed soname or import has no provider
    UnresolvedDependency,
    /// Inspecting a built file failed
    IntrospectionFailure,
    /// Invalid configuration
    ConfigError,
    /// I/O error
    IoError,
}

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct Fix {
    /// Description of what this fix does
    pub description: String,
}

impl Fix {
    /// Create a fix with a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Structured error type for mmpack-build.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid specs{}: {message}", .package.as_ref().map(|p| format!(" for package {p}")).unwrap_or_default())]
    Spec {
        package: Option<String>,
        field: Option<String>,
        message: String,
        fixes: Vec<Fix>,
    },

    #[error("inconsistent manifests: {message}")]
    Manifest { message: String },

    #[error("{package}: no package provides {kind} {name}")]
    Unresolved {
        package: String,
        kind: String,
        name: String,
        fixes: Vec<Fix>,
    },

    #[error("failed to inspect {}: {message}", .path.display())]
    Introspection { path: PathBuf, message: String },

    #[error("configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        fixes: Vec<Fix>,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Get the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Spec { .. } => ErrorCode::SpecError,
            Error::Manifest { .. } => ErrorCode::ManifestMismatch,
            Error::Unresolved { .. } => ErrorCode::UnresolvedDependency,
            Error::Introspection { .. } => ErrorCode::IntrospectionFailure,
            Error::Config { .. } => ErrorCode::ConfigError,
            Error::Io { .. } | Error::Other(_) => ErrorCode::IoError,
        }
    }

    /// Get suggested fixes for this error.
    pub fn fixes(&self) -> &[Fix] {
        match self {
            Error::Spec { fixes, .. } => fixes,
            Error::Unresolved { fixes, .. } => fixes,
            Error::Config { fixes, .. } => fixes,
            Error::Manifest { .. }
            | Error::Introspection { .. }
            | Error::Io { .. }
            | Error::Other(_) => &[],
        }
    }

    /// Create a spec error not tied to a package.
    pub fn spec(message: impl Into<String>) -> Self {
        Error::Spec {
            package: None,
            field: None,
            message: message.into(),
            fixes: vec![],
        }
    }

    /// Create a spec error for a field of a package.
    pub fn spec_field(
        package: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Spec {
            package: Some(package.into()),
            field: Some(field.into()),
            message: message.into(),
            fixes: vec![],
        }
    }

    /// Create an unresolved dependency error.
    pub fn unresolved(
        package: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Error::Unresolved {
            package: package.into(),
            kind: kind.into(),
            fixes: vec![Fix::new(format!(
                "Install the package providing {name} in the prefix or on the host system"
            ))],
            name,
        }
    }

    /// Create a manifest consistency error.
    pub fn manifest(message: impl Into<String>) -> Self {
        Error::Manifest {
            message: message.into(),
        }
    }

    /// Create an introspection error.
    pub fn introspection(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Introspection {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            path: None,
            source: None,
            fixes: vec![],
        }
    }

    /// Create a config error with a path.
    pub fn config_at(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::Config {
            message: message.into(),
            path: Some(path.into()),
            source: None,
            fixes: vec![],
        }
    }

    /// Create an I/O error for a path.
    pub fn io(message: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            message: message.into(),
            path: Some(path.into()),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_error_names_package() {
        let err = Error::spec_field("foo-tools", "depends", "invalid dependency: bar (> 1)");
        assert_eq!(err.code(), ErrorCode::SpecError);
        assert_eq!(
            err.to_string(),
            "invalid specs for package foo-tools: invalid dependency: bar (> 1)"
        );
    }

    #[test]
    fn test_unresolved_has_fix() {
        let err = Error::unresolved("fooapp", "soname", "libbar.so.2");
        assert_eq!(err.code(), ErrorCode::UnresolvedDependency);
        assert_eq!(err.to_string(), "fooapp: no package provides soname libbar.so.2");
        assert_eq!(err.fixes().len(), 1);
    }
}
