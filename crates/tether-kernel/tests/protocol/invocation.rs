//! Creating objects and calling their members

use serde_json::json;

use super::fixtures::Fixture;
use super::harness::{byref, Session};

#[test]
fn test_create_then_invoke() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));
    assert_eq!(r, byref("lib.Adder@10000"));
    assert_eq!(session.ok(json!({"api": "invoke", "objref": r, "method": "sum"})), json!({"result": 3}));
}

#[test]
fn test_returning_self_reuses_reference() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));
    let first = session.ok(json!({"api": "invoke", "objref": r, "method": "me"}));
    let second = session.ok(json!({"api": "invoke", "objref": r, "method": "me"}));
    assert_eq!(first["result"], r);
    assert_eq!(second["result"], r);
    assert_eq!(session.ok(json!({"api": "stats"})), json!({"objectCount": 1}));
}

#[test]
fn test_property_access() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));

    assert_eq!(session.ok(json!({"api": "get", "objref": r, "property": "value"})), json!({"value": 0}));
    session.ok(json!({"api": "set", "objref": r, "property": "value", "value": 42}));
    assert_eq!(
        session.ok(json!({"api": "invoke", "objref": r, "method": "describe"})),
        json!({"result": "value=42"})
    );

    let name = session.error(json!({"api": "set", "objref": r, "property": "label", "value": "x"}));
    assert_eq!(name, "ImmutablePropertyWrite");
    let name = session.error(json!({"api": "get", "objref": r, "property": "nope"}));
    assert_eq!(name, "MemberNotFound");
}

#[test]
fn test_union_picks_first_matching_member() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));

    let kind = |session: &mut Session, value| {
        session.request(json!({"api": "invoke", "objref": r, "method": "kind", "args": [value]}))
    };
    assert_eq!(kind(&mut session, json!({"$kernel.date": "2024-05-01T12:00:00.000Z"}))["ok"]["result"], json!("date"));
    assert_eq!(kind(&mut session, json!(7))["ok"]["result"], json!("number"));
    assert_eq!(kind(&mut session, json!("seven"))["ok"]["result"], json!("string"));

    let failed = kind(&mut session, json!(true));
    assert_eq!(failed["name"], json!("NoMatchingUnionMember"));
}

#[test]
fn test_argument_validation() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));

    // optional trailing parameter may be omitted
    assert_eq!(
        session.ok(json!({"api": "invoke", "objref": r, "method": "scale", "args": [2]})),
        json!({"result": 6})
    );
    assert_eq!(
        session.ok(json!({"api": "invoke", "objref": r, "method": "scale", "args": [2, 1]})),
        json!({"result": 7})
    );

    let invoke = |args| json!({"api": "invoke", "objref": r, "method": "scale", "args": args});
    assert_eq!(session.error(invoke(json!([]))), "MissingRequiredArgument");
    assert_eq!(session.error(invoke(json!([null]))), "MissingRequiredArgument");
    assert_eq!(session.error(invoke(json!([1, 2, 3]))), "TooManyArguments");
    assert_eq!(session.error(invoke(json!(["two"]))), "TypeMismatch");
}

#[test]
fn test_create_argument_validation() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    assert_eq!(session.error(json!({"api": "create", "fqn": "lib.Adder", "args": [1]})), "MissingRequiredArgument");
    assert_eq!(session.error(json!({"api": "create", "fqn": "lib.Point"})), "NotConstructible");
    assert_eq!(session.error(json!({"api": "create", "fqn": "lib.Nope"})), "TypeNotFound");
    assert_eq!(session.error(json!({"api": "create", "fqn": "Object", "args": [1]})), "TooManyArguments");
    assert_eq!(session.ok(json!({"api": "create", "fqn": "Object"})), byref("Object@10000"));
}

#[test]
fn test_structs_pass_by_value() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));

    assert_eq!(
        session.ok(json!({"api": "invoke", "objref": r, "method": "origin"})),
        json!({"result": {"$kernel.struct": {"fqn": "lib.Point", "data": {"x": 0, "y": 0}}}})
    );
    assert_eq!(
        session.ok(json!({"api": "invoke", "objref": r, "method": "area", "args": [{"x": 2, "y": 3}]})),
        json!({"result": 6})
    );
    let name = session.error(json!({"api": "invoke", "objref": r, "method": "area", "args": [{"x": 2}]}));
    assert_eq!(name, "MissingRequiredProperty");
}

#[test]
fn test_async_method_requires_begin() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));

    assert_eq!(session.error(json!({"api": "invoke", "objref": r, "method": "compute"})), "WrongCallStyle");
    assert_eq!(session.error(json!({"api": "begin", "objref": r, "method": "sum"})), "WrongCallStyle");
}
