//! Dependency resolution across cobuilt, installed and system packages.

mod common;

use common::{Fixture, RecordingSysPkg};
use mmpack_build::{BinaryInfo, Manifest, StaticIntrospector, SysPkgTable};
use mmpack_core::ErrorCode;
use std::sync::Arc;

const SPECS: &str = r#"
general:
  name: fooapp
  version: 1.0
  maintainer: Jane Doe <jane@example.com>
  description: fooapp does things
"#;

fn libfoo_tree(fixture: &Fixture) {
    fixture.install("lib/libfoo.so.1.2.3", "ELF libfoo");
    fixture.install_link("lib/libfoo.so", "libfoo.so.1.2.3");
    fixture.install("bin/fooapp", "ELF fooapp");
}

#[test]
fn test_end_to_end_libfoo() {
    let fixture = Fixture::new(SPECS);
    fixture.write_src("COPYING", "GPL");
    libfoo_tree(&fixture);
    let introspector = StaticIntrospector::new()
        .with_binary(
            "lib/libfoo.so.1.2.3",
            BinaryInfo::library("libfoo.so.1", ["foo_init@1.0"]),
        )
        .with_binary(
            "bin/fooapp",
            BinaryInfo::executable()
                .needs(["libfoo.so.1"])
                .uses(["foo_init@1.0"]),
        );

    let mut srcpkg = fixture.src_package(introspector).unwrap();
    let output = srcpkg.build().unwrap();

    let pkgs = srcpkg.packages();
    assert_eq!(pkgs.keys().cloned().collect::<Vec<_>>(), vec!["fooapp", "libfoo1"]);

    let libfoo = &pkgs["libfoo1"];
    assert!(libfoo.files.contains("lib/libfoo.so.1.2.3"));
    assert!(libfoo.files.contains("lib/libfoo.so"));
    let provide = libfoo
        .provide_list("sharedlib")
        .and_then(|list| list.get("libfoo.so.1"))
        .unwrap();
    assert_eq!(provide.symbols["foo_init@1.0"].as_str(), "1.0");

    let app = &pkgs["fooapp"];
    assert_eq!(app.deplist.len(), 1);
    assert_eq!(app.deplist[0].name, "libfoo1");
    assert!(app.deplist[0].minver >= mmpack_core::Version::new("1.0"));
    assert_eq!(app.deplist[0].minver.as_str(), "1.0");

    let outputs = fixture.outputs();
    assert!(outputs.contains("fooapp_1.0_amd64.mpk"));
    assert!(outputs.contains("libfoo1_1.0_amd64.mpk"));
    assert!(outputs.contains("libfoo1.sharedlib"));
    assert!(outputs.contains("fooapp_1.0.mmpack-manifest"));
    assert_eq!(output.packages.len(), 2);

    let manifest = Manifest::load(&output.manifest).unwrap();
    assert_eq!(manifest.name, "fooapp");
    assert_eq!(manifest.binpkgs["amd64"].len(), 2);
    assert_eq!(manifest.source.file, "src.tar.xz");
}

#[test]
fn test_cobuilt_wins_over_system() {
    let fixture = Fixture::new(SPECS);
    libfoo_tree(&fixture);
    let introspector = StaticIntrospector::new()
        .with_binary(
            "lib/libfoo.so.1.2.3",
            BinaryInfo::library("libfoo.so.1", ["foo_init"]),
        )
        .with_binary(
            "bin/fooapp",
            BinaryInfo::executable()
                .needs(["libfoo.so.1", "libc.so.6"])
                .uses(["foo_init", "printf"]),
        );
    let syspkg = Arc::new(RecordingSysPkg::new(
        SysPkgTable::new()
            .with_sharedlib("libfoo.so.1", "libfoo1-system", ["foo_init"])
            .with_sharedlib("libc.so.6", "libc6", ["printf"]),
    ));

    let mut srcpkg = fixture
        .src_package(introspector)
        .unwrap()
        .with_syspkg(syspkg.clone());
    srcpkg.gen_dependencies().unwrap();

    let app = &srcpkg.packages()["fooapp"];
    assert_eq!(app.deplist.len(), 1);
    assert_eq!(app.deplist[0].name, "libfoo1");
    assert!(app.sysdeps.contains("libc6"));
    assert!(!app.sysdeps.contains("libfoo1-system"));
    assert_eq!(syspkg.queried(), vec!["libc.so.6".to_string()]);
}

#[test]
fn test_installed_prefix_before_system() {
    let fixture = Fixture::new(SPECS).with_installed(
        "libbar2",
        "sharedlib",
        "libbar.so.2:\n  depends: libbar2\n  symbols:\n    bar_open: '2.0'\n    bar_close: '2.1'\n",
    );
    fixture.install("bin/fooapp", "");
    let introspector = StaticIntrospector::new().with_binary(
        "bin/fooapp",
        BinaryInfo::executable()
            .needs(["libbar.so.2"])
            .uses(["bar_open"]),
    );
    let syspkg = Arc::new(RecordingSysPkg::new(
        SysPkgTable::new().with_sharedlib("libbar.so.2", "libbar2-system", ["bar_open"]),
    ));

    let mut srcpkg = fixture
        .src_package(introspector)
        .unwrap()
        .with_syspkg(syspkg.clone());
    srcpkg.gen_dependencies().unwrap();

    let app = &srcpkg.packages()["fooapp"];
    assert_eq!(app.deplist.len(), 1);
    assert_eq!(app.deplist[0].name, "libbar2");
    // Only bar_open is used
    assert_eq!(app.deplist[0].minver.as_str(), "2.0");
    assert!(app.deplist[0].maxver.is_any());
    assert!(syspkg.queried().is_empty());
}

#[test]
fn test_unresolved_soname_writes_nothing() {
    let fixture = Fixture::new(SPECS);
    fixture.install("bin/fooapp", "");
    let introspector = StaticIntrospector::new().with_binary(
        "bin/fooapp",
        BinaryInfo::executable().needs(["libnothere.so.1"]),
    );

    let mut srcpkg = fixture.src_package(introspector).unwrap();
    let err = srcpkg.build().unwrap_err();

    assert_eq!(err.code(), ErrorCode::UnresolvedDependency);
    assert!(err.to_string().contains("fooapp"));
    assert!(err.to_string().contains("libnothere.so.1"));
    assert!(fixture.outputs().is_empty());
}

#[test]
fn test_provide_spec_from_source_tree() {
    let fixture = Fixture::new(&SPECS.replace("version: 1.0", "version: 2.1"));
    fixture.write_src(
        "mmpack/libfoo.provides",
        "libfoo.so.1:\n  symbols:\n    foo_init: 1.0\n    foo_run: 2.0\n",
    );
    libfoo_tree(&fixture);
    let introspector = StaticIntrospector::new()
        .with_binary(
            "lib/libfoo.so.1.2.3",
            BinaryInfo::library("libfoo.so.1", ["foo_init", "foo_run", "foo_new"]),
        )
        .with_binary("bin/fooapp", BinaryInfo::executable());

    let mut srcpkg = fixture.src_package(introspector).unwrap();
    srcpkg.gen_provides().unwrap();

    let provide = srcpkg.packages()["libfoo1"]
        .provide_list("sharedlib")
        .and_then(|list| list.get("libfoo.so.1"))
        .cloned()
        .unwrap();
    assert_eq!(provide.symbols["foo_init"].as_str(), "1.0");
    assert_eq!(provide.symbols["foo_run"].as_str(), "2.0");
    // Missing from the specs: introduced by this version
    assert_eq!(provide.symbols["foo_new"].as_str(), "2.1");
}

#[test]
fn test_ghost_packages_skip_resolution() {
    let fixture = Fixture::new(&SPECS.replace("version: 1.0", "version: 1.0\n  ghost: true"));
    fixture.install("bin/fooapp", "");
    let introspector = StaticIntrospector::new().with_binary(
        "bin/fooapp",
        BinaryInfo::executable().needs(["libnothere.so.1"]),
    );

    let mut srcpkg = fixture.src_package(introspector).unwrap();
    srcpkg.gen_dependencies().unwrap();
    assert!(srcpkg.packages()["fooapp"].deplist.is_empty());
}

#[test]
fn test_second_build_merges_manifest() {
    let fixture = Fixture::new(SPECS);
    fixture.install("bin/fooapp", "");
    let introspector = StaticIntrospector::new().with_binary("bin/fooapp", BinaryInfo::executable());

    let output = fixture
        .src_package(introspector.clone())
        .unwrap()
        .build()
        .unwrap();
    let mut manifest = Manifest::load(&output.manifest).unwrap();
    manifest.binpkgs.insert("arm64".to_string(), manifest.binpkgs["amd64"].clone());
    manifest.save(&output.manifest).unwrap();

    let output = fixture.src_package(introspector).unwrap().build().unwrap();
    let merged = Manifest::load(&output.manifest).unwrap();
    assert!(merged.binpkgs.contains_key("amd64"));
    assert!(merged.binpkgs.contains_key("arm64"));
}

#[test]
fn test_failed_archive_publishes_nothing() {
    let fixture = Fixture::new(SPECS);
    fixture.install("lib/libfoo.so.1.2.3", "ELF libfoo");
    fixture.install("bin/fooapp", "ELF fooapp");
    let introspector = StaticIntrospector::new()
        .with_binary(
            "lib/libfoo.so.1.2.3",
            BinaryInfo::library("libfoo.so.1", ["foo_init"]),
        )
        .with_binary(
            "bin/fooapp",
            BinaryInfo::executable()
                .needs(["libfoo.so.1"])
                .uses(["foo_init"]),
        );

    let mut srcpkg = fixture.src_package(introspector).unwrap();
    srcpkg.gen_dependencies().unwrap();
    // fooapp is archived first, libfoo1 then fails
    std::fs::remove_file(fixture.install_root.join("lib/libfoo.so.1.2.3")).unwrap();

    assert!(srcpkg.build().is_err());
    assert!(fixture.outputs().is_empty(), "{:?}", fixture.outputs());
}

#[test]
fn test_failed_resolution_can_be_retried() {
    let fixture = Fixture::new(SPECS);
    fixture.install("lib/libfoo.so.1.2.3", "");
    fixture.install("bin/fooapp", "");
    let introspector = StaticIntrospector::new()
        .with_binary(
            "lib/libfoo.so.1.2.3",
            BinaryInfo::library("libfoo.so.1", ["foo_init"]).needs(["libz.so.1"]),
        )
        .with_binary(
            "bin/fooapp",
            BinaryInfo::executable().needs(["libfoo.so.1"]),
        );

    let mut srcpkg = fixture.src_package(introspector).unwrap();
    for _ in 0..2 {
        let err = srcpkg.gen_dependencies().unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnresolvedDependency);
        // fooapp resolved before libfoo1 failed, and was rolled back
        assert!(srcpkg.packages()["fooapp"].deplist.is_empty());
    }

    let mut srcpkg = srcpkg.with_syspkg(Arc::new(
        SysPkgTable::new().with_sharedlib("libz.so.1", "zlib1g", Vec::<String>::new()),
    ));
    srcpkg.gen_dependencies().unwrap();

    let pkgs = srcpkg.packages();
    assert_eq!(pkgs["fooapp"].deplist.len(), 1);
    assert_eq!(pkgs["fooapp"].deplist[0].name, "libfoo1");
    assert!(pkgs["libfoo1"].sysdeps.contains("zlib1g"));
}
