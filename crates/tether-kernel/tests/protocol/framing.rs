//! Greeting, message framing, malformed input, and shutdown

use serde_json::json;

use super::fixtures::Fixture;
use super::harness::Session;

#[test]
fn test_greeting_names_kernel_version() {
    let fixture = Fixture::new();
    let session = Session::start(&fixture);

    let hello = session.hello["hello"].as_str().unwrap().to_string();
    assert_eq!(hello, format!("tether-kernel@{}", env!("CARGO_PKG_VERSION")));
    assert_eq!(session.finish(), 0);
}

#[test]
fn test_malformed_input_gets_error_and_loop_continues() {
    let fixture = Fixture::new();
    let mut session = Session::start(&fixture);

    session.send_raw(b"{not json\n");
    assert_eq!(session.recv()["name"], json!("MalformedRequest"));
    session.send_raw(b"\"just a string\"\n");
    assert_eq!(session.recv()["name"], json!("MalformedRequest"));
    session.send_raw(b"\xff\xfe\n");
    assert_eq!(session.recv()["name"], json!("MalformedRequest"));

    assert_eq!(session.error(json!({"fqn": "lib.Adder"})), "MalformedRequest");
    assert_eq!(session.error(json!({"api": "teleport"})), "MalformedRequest");
    assert_eq!(session.error(json!({"api": "get", "property": "value"})), "MalformedRequest");

    assert_eq!(session.ok(json!({"api": "stats"})), json!({"objectCount": 0}));
}

#[test]
fn test_blank_lines_are_ignored() {
    let fixture = Fixture::new();
    let mut session = Session::start(&fixture);

    session.send_raw(b"\n   \n");
    session.send_raw(b"{\"api\":\"stats\"}\n");
    assert_eq!(session.recv(), json!({"ok": {"objectCount": 0}}));
}

#[test]
fn test_completion_outside_a_callback() {
    let fixture = Fixture::new();
    let mut session = Session::start(&fixture);

    let response = session.request(json!({"complete": {"cbid": "kernel::callback::20000", "result": 1}}));
    assert_eq!(response["name"], json!("CallbackNotFound"));
}

#[test]
fn test_exit_code() {
    let fixture = Fixture::new();
    let session = Session::loaded(&fixture);
    assert_eq!(session.exit(9), 9);
}
