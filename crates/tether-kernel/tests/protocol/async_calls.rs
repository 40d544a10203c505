//! begin/end futures and polled async callbacks

use serde_json::json;

use super::fixtures::Fixture;
use super::harness::{byref, Session};

#[test]
fn test_begin_end_native_method() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));

    let begun = session.ok(json!({"api": "begin", "objref": r, "method": "compute"}));
    assert_eq!(begun, json!({"futureid": "kernel::future::20000"}));
    assert_eq!(session.ok(json!({"api": "end", "futureid": "kernel::future::20000"})), json!({"result": 3}));

    // a future is consumed by end
    let name = session.error(json!({"api": "end", "futureid": "kernel::future::20000"}));
    assert_eq!(name, "FutureNotFound");
}

#[test]
fn test_end_of_unsettled_future_keeps_it() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({"api": "create", "fqn": "lib.Adder", "args": [1, 2]}));

    let begun = session.ok(json!({"api": "begin", "objref": r, "method": "stall"}));
    let end = json!({"api": "end", "futureid": begun["futureid"]});
    assert_eq!(session.error(end.clone()), "FuturePending");
    assert_eq!(session.error(end), "FuturePending");
}

#[test]
fn test_async_override_is_polled_and_completed() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({
        "api": "create", "fqn": "lib.Adder", "args": [1, 2],
        "overrides": [{"method": "compute", "cookie": "cc"}]
    }));

    // fetch awaits this.compute(), which the host now implements
    let begun = session.ok(json!({"api": "begin", "objref": r, "method": "fetch"}));
    let end = json!({"api": "end", "futureid": begun["futureid"]});
    assert_eq!(session.error(end.clone()), "FuturePending");

    let polled = session.ok(json!({"api": "callbacks"}));
    assert_eq!(
        polled,
        json!({"callbacks": [{
            "cbid": "kernel::callback::20000",
            "cookie": "cc",
            "invoke": {"objref": r, "method": "compute", "args": []}
        }]})
    );
    // handed out only once
    assert_eq!(session.ok(json!({"api": "callbacks"})), json!({"callbacks": []}));

    let done = session.ok(json!({"api": "complete", "cbid": "kernel::callback::20000", "result": 4}));
    assert_eq!(done, json!({"cbid": "kernel::callback::20000"}));
    assert_eq!(session.ok(end), json!({"result": 40}));
}

#[test]
fn test_async_override_rejection() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);
    let r = session.ok(json!({
        "api": "create", "fqn": "lib.Adder", "args": [1, 2],
        "overrides": [{"method": "compute"}]
    }));

    let begun = session.ok(json!({"api": "begin", "objref": r, "method": "compute"}));
    let polled = session.ok(json!({"api": "callbacks"}));
    let cbid = polled["callbacks"][0]["cbid"].clone();
    session.ok(json!({"api": "complete", "cbid": cbid, "err": "offline", "name": "NetworkError"}));

    let response = session.request(json!({"api": "end", "futureid": begun["futureid"]}));
    assert_eq!(response["name"], json!("NetworkError"));
    assert_eq!(response["error"], json!("offline"));
}

#[test]
fn test_unknown_callback_and_future() {
    let fixture = Fixture::new();
    let mut session = Session::loaded(&fixture);

    let name = session.error(json!({"api": "complete", "cbid": "kernel::callback::5", "result": 1}));
    assert_eq!(name, "CallbackNotFound");
    let name = session.error(json!({"api": "end", "futureid": "kernel::future::5"}));
    assert_eq!(name, "FutureNotFound");
}
