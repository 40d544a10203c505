//! Host-implemented members and synchronous callbacks

use std::time::Duration;

use serde_json::json;

use super::fixtures::Fixture;
use super::harness::{byref, Session};

const ADDER: &str = "lib.Adder@10000";

fn create_with(session: &mut Session, overrides: serde_json::Value) {
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2], "overrides": overrides}));
    assert_eq!(r, byref(ADDER));
}

#[test]
fn test_uncompleted_callback_blocks_response() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"property": "value"}]));

    let callback = session.request(json!({"api": "get", "objref": byref(ADDER), "property": "value"}));
    assert_eq!(
        callback,
        json!({"callback": {"cbid": "kernel::callback::20000", "get": {"objref": byref(ADDER), "property": "value"}}})
    );
    // no response and no error while the callback is outstanding
    session.assert_silent(Duration::from_millis(300));
}

#[test]
fn test_property_override_round_trip() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"property": "value", "cookie": "v"}]));

    let callback = session.request(json!({"api": "get", "objref": byref(ADDER), "property": "value"}));
    assert_eq!(callback["callback"]["cookie"], json!("v"));
    let cbid = callback["callback"]["cbid"].clone();
    let response = session.request(json!({"complete": {"cbid": cbid, "result": 5}}));
    assert_eq!(response, json!({"ok": {"value": 5}}));

    let callback = session.request(json!({"api": "set", "objref": byref(ADDER), "property": "value", "value": 9}));
    assert_eq!(callback["callback"]["set"]["value"], json!(9));
    let cbid = callback["callback"]["cbid"].clone();
    assert_eq!(session.request(json!({"complete": {"cbid": cbid}})), json!({"ok": {}}));
}

#[test]
fn test_native_code_reaches_method_override() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"property": "value"}]));

    // describe reads this.value, which is now host-implemented
    let callback = session.request(json!({"api": "invoke", "objref": byref(ADDER), "method": "describe"}));
    let cbid = callback["callback"]["cbid"].clone();
    let response = session.request(json!({"complete": {"cbid": cbid, "result": 11}}));
    assert_eq!(response, json!({"ok": {"result": "value=11"}}));
}

#[test]
fn test_host_reaches_native_member_while_its_override_runs() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"method": "sum"}]));

    let callback = session.request(json!({"api": "invoke", "objref": byref(ADDER), "method": "sum"}));
    assert_eq!(callback["callback"]["invoke"], json!({"objref": byref(ADDER), "method": "sum", "args": []}));
    let cbid = callback["callback"]["cbid"].clone();

    // nested invoke of the same member runs the native implementation
    let native = session.ok(json!({"api": "invoke", "objref": byref(ADDER), "method": "sum"}));
    assert_eq!(native, json!({"result": 3}));

    let response = session.request(json!({"complete": {"cbid": cbid, "result": 30}}));
    assert_eq!(response, json!({"ok": {"result": 30}}));
}

#[test]
fn test_async_requests_refused_during_sync_callback() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"method": "sum"}]));

    let callback = session.request(json!({"api": "invoke", "objref": byref(ADDER), "method": "sum"}));
    let cbid = callback["callback"]["cbid"].clone();

    let name = session.error(json!({"api": "begin", "objref": byref(ADDER), "method": "compute"}));
    assert_eq!(name, "AsyncWhileSyncCallback");
    let name = session.error(json!({"api": "end", "futureid": "kernel::future::1"}));
    assert_eq!(name, "NestedAsyncNotAllowed");
    let name = session.error(json!({"api": "complete", "cbid": "kernel::callback::1"}));
    assert_eq!(name, "NestedAsyncNotAllowed");
    // synchronous requests are still served
    assert_eq!(session.ok(json!({"api": "stats"})), json!({"objectCount": 1}));

    let response = session.request(json!({"complete": {"cbid": cbid, "result": 1}}));
    assert_eq!(response, json!({"ok": {"result": 1}}));
}

#[test]
fn test_host_error_surfaces_with_its_name() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"method": "sum"}]));

    let callback = session.request(json!({"api": "invoke", "objref": byref(ADDER), "method": "sum"}));
    let cbid = callback["callback"]["cbid"].clone();
    let response = session.request(json!({"complete": {"cbid": cbid, "err": "host says no", "name": "HostError"}}));
    assert_eq!(response["error"], json!("host says no"));
    assert_eq!(response["name"], json!("HostError"));
}

#[test]
fn test_callback_result_is_type_checked() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"method": "sum"}]));

    let callback = session.request(json!({"api": "invoke", "objref": byref(ADDER), "method": "sum"}));
    let cbid = callback["callback"]["cbid"].clone();
    let response = session.request(json!({"complete": {"cbid": cbid, "result": "three"}}));
    assert_eq!(response["name"], json!("TypeMismatch"));
}

#[test]
fn test_override_validation() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let create = |overrides| json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2], "overrides": overrides});

    assert_eq!(session.error(create(json!([{"method": "sum"}, {"method": "sum"}]))), "DuplicateOverride");
    assert_eq!(session.error(create(json!([{"property": "sum"}]))), "OverrideKindConflict");
    assert_eq!(session.error(create(json!([{"method": "value"}]))), "OverrideKindConflict");
    assert_eq!(session.error(create(json!([{"method": "sum", "property": "value"}]))), "OverrideKindConflict");
    // failed creations leave nothing behind
    assert_eq!(session.ok(json!({"api": "stats"})), json!({"objectCount": 0}));

    // overrides of members nobody declares are ignored
    let r = session.ok(create(json!([{"method": "notDeclared"}])));
    assert_eq!(session.ok(json!({"api": "invoke", "objref": r, "method": "sum"})), json!({"result": 3}));
}

#[test]
fn test_exit_while_waiting_for_callback() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"method": "sum"}]));

    session.request(json!({"api": "invoke", "objref": byref(ADDER), "method": "sum"}));
    session.send(json!({"exit": 4}));
    let response = session.recv();
    assert_eq!(response["name"], json!("Interrupted"));
    assert_eq!(session.finish(), 4);
}

#[test]
fn test_exit_while_waiting_in_nested_callback() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    create_with(&mut session, json!([{"property": "value"}]));

    let describe = json!({"api": "invoke", "objref": byref(ADDER), "method": "describe"});
    let outer = session.request(describe.clone());
    assert_eq!(outer["callback"]["cbid"], json!("kernel::callback::20000"));
    let inner = session.request(describe);
    assert_eq!(inner["callback"]["cbid"], json!("kernel::callback::20001"));

    session.send(json!({"exit": 5}));
    session.send(json!({"api": "stats"}));
    assert_eq!(session.recv()["name"], json!("Interrupted"));
    // the outer request is answered too, and stats is never served
    assert!(session.recv().get("error").is_some());
    assert_eq!(session.finish(), 5);
}
