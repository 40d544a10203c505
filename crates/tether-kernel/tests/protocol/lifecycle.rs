//! Loading packages, releasing objects, and assembly-level queries

use serde_json::json;

use super::fixtures::Fixture;
use super::harness::{byref, Session};

#[test]
fn test_load_reports_type_count() {
    let fixture = Fixture::new();
    let mut session = Session::start(&fixture);

    let summary = session.ok(fixture.load_request());
    assert_eq!(summary, json!({"assembly": "lib", "types": 2}));
    assert!(fixture.install_dir().join("lib").join(".tether.json").is_file());
}

#[test]
fn test_repeated_load_does_not_rerun_module_code() {
    let fixture = Fixture::new();
    let mut session = Session::start(&fixture);

    let first = session.ok(fixture.load_request());
    let second = session.ok(fixture.load_request());
    assert_eq!(first, second);
    assert_eq!(fixture.load_count(), 1);
}

#[test]
fn test_load_of_other_version_conflicts() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    let name = session.error(json!({"api": "load", "name": "lib", "version": "2.0.0", "tarball": fixture.tarball}));
    assert_eq!(name, "VersionConflict");
    assert_eq!(fixture.load_count(), 1);
}

#[test]
fn test_load_of_missing_tarball_fails_cleanly() {
    let fixture = Fixture::new();
    let mut session = Session::start(&fixture);

    let name = session.error(json!({"api": "load", "name": "lib", "version": "1.0.0", "tarball": "/nonexistent/lib.tgz"}));
    assert_eq!(name, "ArchiveError");
    // the kernel is still usable
    session.ok(fixture.load_request());
}

#[test]
fn test_load_name_cannot_leave_install_dir() {
    let fixture = Fixture::new();
    let victim = fixture.install_dir().parent().unwrap().join("victim");
    std::fs::create_dir_all(&victim).unwrap();
    std::fs::write(victim.join("keep.txt"), "keep").unwrap();
    let mut session = Session::start(&fixture);

    let name = session.error(json!({"api": "load", "name": "../victim", "version": "1.0.0", "tarball": fixture.tarball}));
    assert_eq!(name, "MalformedRequest");
    assert!(victim.join("keep.txt").is_file());
    assert!(!victim.join(".tether.json").exists());
}

#[test]
fn test_mismatched_load_installs_nothing() {
    let fixture = Fixture::new();
    let mut session = Session::start(&fixture);

    // the tarball holds lib, not other
    let name = session.error(json!({"api": "load", "name": "other", "version": "1.0.0", "tarball": fixture.tarball}));
    assert_eq!(name, "MalformedRequest");
    let leftovers: Vec<_> = std::fs::read_dir(fixture.install_dir()).unwrap().collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
    assert_eq!(fixture.load_count(), 0);

    session.ok(fixture.load_request());
}

#[test]
fn test_deleted_reference_is_gone() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));
    assert_eq!(session.ok(json!({"api": "stats"})), json!({"objectCount": 1}));

    session.ok(json!({"api": "del", "objref": r}));
    let name = session.error(json!({"api": "get", "objref": r, "property": "value"}));
    assert_eq!(name, "ReferenceNotFound");
    assert_eq!(session.error(json!({"api": "del", "objref": r})), "ReferenceNotFound");
    assert_eq!(session.ok(json!({"api": "stats"})), json!({"objectCount": 0}));
}

#[test]
fn test_unknown_reference_token() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    let name = session.error(json!({"api": "invoke", "objref": byref("lib.Adder@99999"), "method": "sum"}));
    assert_eq!(name, "ReferenceNotFound");
}

#[test]
fn test_naming_returns_targets() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    assert_eq!(
        session.ok(json!({"api": "naming", "assembly": "lib"})),
        json!({"naming": {"python": {"module": "lib"}}})
    );
    assert_eq!(session.error(json!({"api": "naming", "assembly": "nope"})), "AssemblyNotFound");
}

#[cfg(unix)]
#[test]
fn test_invoke_bin_script() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    let out = session.ok(json!({"api": "invokeBinScript", "assembly": "lib", "script": "hello", "args": ["world"]}));
    assert_eq!(out["stdout"], json!("hello world\n"));
    assert_eq!(out["status"], json!(0));
    assert_eq!(out["signal"], json!(null));

    let name = session.error(json!({"api": "invokeBinScript", "assembly": "lib", "script": "missing"}));
    assert_eq!(name, "MalformedRequest");
}
