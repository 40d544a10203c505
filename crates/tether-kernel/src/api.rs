//! Wire vocabulary
//!
//! Requests are JSON objects tagged by their `api` field; every request
//! gets exactly one `{ok}` or `{error}` response. Callbacks flow the other
//! way while the host is waiting on a response.
//!
//! Special values use reserved keys so they cannot be confused with plain
//! JSON objects:
//!
//! | key                   | meaning                                    |
//! |-----------------------|--------------------------------------------|
//! | `$kernel.byref`       | object reference token                     |
//! | `$kernel.interfaces`  | extra interfaces carried by a reference    |
//! | `$kernel.date`        | ISO-8601 instant                           |
//! | `$kernel.enum`        | `<fqn>/<member>`                           |
//! | `$kernel.map`         | string-keyed map                           |
//! | `$kernel.struct`      | `{fqn, data}` struct passed by value       |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub const TOKEN_REF: &str = "$kernel.byref";
pub const TOKEN_INTERFACES: &str = "$kernel.interfaces";
pub const TOKEN_DATE: &str = "$kernel.date";
pub const TOKEN_ENUM: &str = "$kernel.enum";
pub const TOKEN_MAP: &str = "$kernel.map";
pub const TOKEN_STRUCT: &str = "$kernel.struct";

/// Fqn of objects that have no catalogued class.
pub const EMPTY_OBJECT_FQN: &str = "Object";

// ============================================================================
// Object references
// ============================================================================

/// Reference to an object living in the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjRef {
    #[serde(rename = "$kernel.byref")]
    pub ref_id: String,
    #[serde(
        rename = "$kernel.interfaces",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub interfaces: Vec<String>,
}

impl ObjRef {
    pub fn new(ref_id: impl Into<String>, interfaces: Vec<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            interfaces,
        }
    }

    /// Fqn part of the token (`lib.Foo@10001` -> `lib.Foo`).
    pub fn fqn(&self) -> &str {
        self.ref_id
            .rsplit_once('@')
            .map(|(fqn, _)| fqn)
            .unwrap_or(&self.ref_id)
    }

    /// Parse a wire object carrying `$kernel.byref`.
    pub fn from_wire(value: &Json) -> Option<ObjRef> {
        let token = value.get(TOKEN_REF)?.as_str()?;
        let interfaces = value
            .get(TOKEN_INTERFACES)
            .and_then(Json::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Some(ObjRef::new(token, interfaces))
    }

    pub fn to_wire(&self) -> Json {
        let mut map = serde_json::Map::new();
        map.insert(TOKEN_REF.to_string(), Json::String(self.ref_id.clone()));
        if !self.interfaces.is_empty() {
            map.insert(
                TOKEN_INTERFACES.to_string(),
                Json::Array(self.interfaces.iter().cloned().map(Json::String).collect()),
            );
        }
        Json::Object(map)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Host-to-kernel request, tagged by `api`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "api")]
pub enum Request {
    #[serde(rename = "load")]
    Load(LoadRequest),
    #[serde(rename = "create")]
    Create(CreateRequest),
    #[serde(rename = "del")]
    Del(DelRequest),
    #[serde(rename = "get")]
    Get(GetRequest),
    #[serde(rename = "set")]
    Set(SetRequest),
    #[serde(rename = "sget")]
    StaticGet(StaticGetRequest),
    #[serde(rename = "sset")]
    StaticSet(StaticSetRequest),
    #[serde(rename = "invoke")]
    Invoke(InvokeRequest),
    #[serde(rename = "sinvoke")]
    StaticInvoke(StaticInvokeRequest),
    #[serde(rename = "begin")]
    Begin(BeginRequest),
    #[serde(rename = "end")]
    End(EndRequest),
    #[serde(rename = "callbacks")]
    Callbacks(CallbacksRequest),
    #[serde(rename = "complete")]
    Complete(CompleteRequest),
    #[serde(rename = "naming")]
    Naming(NamingRequest),
    #[serde(rename = "stats")]
    Stats(StatsRequest),
    #[serde(rename = "invokeBinScript")]
    InvokeBinScript(InvokeScriptRequest),
}

impl Request {
    /// Wire name of the request.
    pub fn api(&self) -> &'static str {
        match self {
            Request::Load(_) => "load",
            Request::Create(_) => "create",
            Request::Del(_) => "del",
            Request::Get(_) => "get",
            Request::Set(_) => "set",
            Request::StaticGet(_) => "sget",
            Request::StaticSet(_) => "sset",
            Request::Invoke(_) => "invoke",
            Request::StaticInvoke(_) => "sinvoke",
            Request::Begin(_) => "begin",
            Request::End(_) => "end",
            Request::Callbacks(_) => "callbacks",
            Request::Complete(_) => "complete",
            Request::Naming(_) => "naming",
            Request::Stats(_) => "stats",
            Request::InvokeBinScript(_) => "invokeBinScript",
        }
    }

    /// Requests that drive asynchronous state and must not run nested
    /// inside a synchronous callback.
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Request::Begin(_) | Request::End(_) | Request::Complete(_)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    pub name: String,
    pub version: String,
    pub tarball: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub fqn: String,
    #[serde(default)]
    pub args: Vec<Json>,
    #[serde(default)]
    pub overrides: Vec<Override>,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// A host-implemented replacement for one member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Override {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Opaque host data echoed back in callbacks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl Override {
    pub fn method(name: &str) -> Self {
        Self {
            method: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn property(name: &str) -> Self {
        Self {
            property: Some(name.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelRequest {
    pub objref: ObjRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub objref: ObjRef,
    pub property: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub objref: ObjRef,
    pub property: String,
    #[serde(default)]
    pub value: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticGetRequest {
    pub fqn: String,
    pub property: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSetRequest {
    pub fqn: String,
    pub property: String,
    #[serde(default)]
    pub value: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub objref: ObjRef,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticInvokeRequest {
    pub fqn: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginRequest {
    pub objref: ObjRef,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndRequest {
    pub futureid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbacksRequest {}

/// Completion of a callback; also the body of the `{complete: ...}` message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub cbid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// Error class name reported by the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingRequest {
    pub assembly: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeScriptRequest {
    pub assembly: String,
    pub script: String,
    #[serde(default)]
    pub args: Vec<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadResponse {
    pub assembly: String,
    pub types: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub result: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginResponse {
    pub futureid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbacksResponse {
    pub callbacks: Vec<Callback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub cbid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingResponse {
    pub naming: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(rename = "objectCount")]
    pub object_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeScriptResponse {
    pub stdout: String,
    pub stderr: String,
    pub status: Option<i32>,
    pub signal: Option<i32>,
}

// ============================================================================
// Callbacks
// ============================================================================

/// Kernel-to-host request to run an override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Callback {
    pub cbid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(flatten)]
    pub request: CallbackRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackRequest {
    Invoke(InvokeCallback),
    Get(GetCallback),
    Set(SetCallback),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeCallback {
    pub objref: ObjRef,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetCallback {
    pub objref: ObjRef,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetCallback {
    pub objref: ObjRef,
    pub property: String,
    pub value: Json,
}
