//! The `lib` fixture package: a manifest, a tarball, and its native module.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value as Json};
use tempfile::TempDir;
use tether_engine::{arg, ClassBuilder, EngineResult, Interp, ModuleRegistry, NativeModule, ObjectRef, Promise, Value};

pub const MANIFEST: &str = r#"{
    "name": "lib",
    "version": "1.0.0",
    "targets": {"python": {"module": "lib"}},
    "bin": {"hello": "bin/hello.sh"},
    "types": {
        "lib.Adder": {
            "kind": "class",
            "fqn": "lib.Adder",
            "initializer": {"parameters": [
                {"name": "a", "type": {"primitive": "number"}},
                {"name": "b", "type": {"primitive": "number"}}
            ]},
            "methods": [
                {"name": "sum", "returns": {"type": {"primitive": "number"}}},
                {"name": "me", "returns": {"type": {"fqn": "lib.Adder"}}},
                {"name": "describe", "returns": {"type": {"primitive": "string"}}},
                {"name": "kind", "parameters": [{"name": "value", "type": {"union": {"types": [
                    {"primitive": "string"}, {"primitive": "date"}, {"primitive": "number"}
                ]}}}], "returns": {"type": {"primitive": "string"}}},
                {"name": "scale", "parameters": [
                    {"name": "factor", "type": {"primitive": "number"}},
                    {"name": "offset", "type": {"primitive": "number"}, "optional": true}
                ], "returns": {"type": {"primitive": "number"}}},
                {"name": "origin", "returns": {"type": {"fqn": "lib.Point"}}},
                {"name": "area", "parameters": [{"name": "p", "type": {"fqn": "lib.Point"}}],
                 "returns": {"type": {"primitive": "number"}}},
                {"name": "compute", "async": true, "returns": {"type": {"primitive": "number"}}},
                {"name": "fetch", "async": true, "returns": {"type": {"primitive": "number"}}},
                {"name": "stall", "async": true, "returns": {"type": {"primitive": "number"}}}
            ],
            "properties": [
                {"name": "value", "type": {"primitive": "number"}},
                {"name": "label", "type": {"primitive": "string"}, "immutable": true}
            ]
        },
        "lib.Point": {
            "kind": "interface",
            "fqn": "lib.Point",
            "datatype": true,
            "properties": [
                {"name": "x", "type": {"primitive": "number"}, "immutable": true},
                {"name": "y", "type": {"primitive": "number"}, "immutable": true}
            ]
        }
    }
}"#;

/// A package tarball on disk plus the module's load counter.
pub struct Fixture {
    dir: TempDir,
    pub tarball: PathBuf,
    pub loads: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn new() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("lib-1.0.0.tgz");

        let mut builder = tar::Builder::new(GzEncoder::new(File::create(&tarball).unwrap(), Compression::default()));
        for (path, body, mode) in [
            ("package/.tether.json", MANIFEST, 0o644),
            ("package/bin/hello.sh", "#!/bin/sh\necho \"hello $1\"\n", 0o755),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(mode);
            header.set_cksum();
            builder.append_data(&mut header, path, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();

        Fixture {
            dir,
            tarball,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn install_dir(&self) -> PathBuf {
        self.dir.path().join("node_modules")
    }

    pub fn load_request(&self) -> Json {
        json!({"api": "load", "name": "lib", "version": "1.0.0", "tarball": self.tarball})
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

fn number(interp: &mut Interp<'_>, this: &Value, key: &str) -> EngineResult<f64> {
    Ok(interp.get(this, key)?.as_number().unwrap_or(0.0))
}

/// Registry holding the native side of `lib`.
pub fn registry(loads: Arc<AtomicUsize>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(NativeModule::new("lib", "1.0.0", move |ns| {
        loads.fetch_add(1, Ordering::SeqCst);

        let adder = ClassBuilder::new("lib.Adder")
            .constructor(|interp, this, args| {
                interp.set(this, "a", arg(args, 0))?;
                interp.set(this, "b", arg(args, 1))?;
                interp.set(this, "value", Value::from(0))?;
                interp.set(this, "label", Value::from("adder"))?;
                Ok(())
            })
            .method("sum", |interp, this, _| {
                Ok(Value::from(number(interp, this, "a")? + number(interp, this, "b")?))
            })
            .method("me", |_, this, _| Ok(this.clone()))
            .method("describe", |interp, this, _| {
                let value = interp.get(this, "value")?;
                Ok(Value::from(format!("value={}", value)))
            })
            .method("kind", |_, _, args| Ok(Value::from(arg(args, 0).type_name())))
            .method("scale", |interp, this, args| {
                let sum = number(interp, this, "a")? + number(interp, this, "b")?;
                let factor = arg(args, 0).as_number().unwrap_or(0.0);
                let offset = arg(args, 1).as_number().unwrap_or(0.0);
                Ok(Value::from(sum * factor + offset))
            })
            .method("origin", |_, _, _| {
                let point = ObjectRef::new_ordinary(None);
                point.set_data("x", Value::from(0));
                point.set_data("y", Value::from(0));
                Ok(Value::from(point))
            })
            .method("area", |interp, _, args| {
                let p = arg(args, 0);
                Ok(Value::from(number(interp, &p, "x")? * number(interp, &p, "y")?))
            })
            .method("compute", |interp, this, _| {
                let sum = number(interp, this, "a")? + number(interp, this, "b")?;
                Ok(Value::from(Promise::resolved(Value::from(sum))))
            })
            .method("fetch", |interp, this, _| {
                let pending = interp.call_method(this, "compute", &[])?;
                match pending.as_promise() {
                    Some(promise) => Ok(Value::from(promise.map(interp, |_, value| {
                        Ok(Value::from(value.as_number().unwrap_or(0.0) * 10.0))
                    }))),
                    None => Ok(pending),
                }
            })
            .method("stall", |_, _, _| Ok(Value::from(Promise::new())))
            .build();
        ns.class(&adder);
        Ok(())
    }));
    registry
}
