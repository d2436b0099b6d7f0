//! Binary package creation for mmpack.
//!
//! This crate turns the local installation of a built project into mmpack
//! binary packages. It splits installed files into packages, computes what
//! each package provides (shared libraries, python modules, translations)
//! and resolves what each package needs against, in order:
//!
//! 1. the packages built from the same source,
//! 2. the packages installed in an mmpack prefix,
//! 3. the host system package manager.
//!
//! Dependencies are tracked per symbol, so a package only requires the
//! oldest version of a provider that has every symbol it uses.
//!
//! Inspecting binaries and querying the host package manager are external
//! capabilities, plugged in through [`Introspector`] and [`SysPkgManager`].

pub mod binary_package;
pub mod checksum;
pub mod dispatch;
pub mod hooks;
pub mod inspect;
pub mod manifest;
pub mod package_info;
pub mod prefix;
pub mod provide;
pub mod src_package;
pub mod syspkg;

pub use binary_package::{BinaryPackage, PackageMetadata};
pub use dispatch::DispatchData;
pub use hooks::{Hook, HookContext, default_hooks};
pub use inspect::{BinaryInfo, Introspector, StaticIntrospector};
pub use manifest::{FileEntry, Manifest};
pub use package_info::{CustomClaim, Dependency, PackageInfo};
pub use prefix::InstalledPrefix;
pub use provide::{NeededSet, Provide, ProvideList, ResolvedDep, SpecReport};
pub use src_package::{BuildOutput, BuildState, SrcPackage, install_files};
pub use syspkg::{NullSysPkgManager, SysPkgManager, SysPkgTable};
