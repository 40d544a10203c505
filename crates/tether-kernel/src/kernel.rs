//! Invocation dispatcher
//!
//! [`Kernel`] owns every piece of bridge state: the type catalog, the object
//! table, loaded module closures, pending futures and pending callbacks. A
//! request enters through [`Kernel::dispatch`], runs to completion (possibly
//! re-entering the host through a [`CallbackChannel`]), and the engine job
//! queue is drained before the response leaves.
//!
//! ## Re-entrancy
//!
//! Native code runs on an [`Interp`] borrowed from a private `Scope` that
//! holds `&mut Kernel` and the channel. When native code touches an
//! overridden member, the scope hands the trap back to the kernel, which
//! either round-trips a callback through the channel (sync) or queues it
//! for `callbacks` polling (async). The channel receives `&mut Kernel` so
//! nested host requests are dispatched on the same state.

use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, ExitStatus};

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value as Json;
use tempfile::TempDir;
use tether_engine::{
    lookup_path, Class, EngineResult, Exception, Host, Interp, JobQueue, ObjectRef, Promise, PromiseState,
    Trap, Value,
};

use crate::api::{
    BeginRequest, BeginResponse, Callback, CallbacksResponse, CompleteRequest, CompleteResponse, CreateRequest,
    DelRequest, EmptyResponse, EndRequest, GetRequest, GetResponse, InvokeRequest, InvokeResponse,
    InvokeScriptRequest, InvokeScriptResponse, LoadRequest, LoadResponse, NamingRequest, NamingResponse, ObjRef,
    Request, SetRequest, StaticGetRequest, StaticInvokeRequest, StaticSetRequest, StatsResponse, EMPTY_OBJECT_FQN,
};
use crate::assembly::{Method, OptionalValue, Parameter, TypeDef, TypeReference};
use crate::catalog::TypeCatalog;
use crate::config::KernelOptions;
use crate::error::{KernelError, KernelResult};
use crate::loader::{read_assembly, ArchiveExtractor, ModuleLoader, TarballExtractor};
use crate::objects::{ObjectEntry, ObjectTable};
use crate::serialize::Serializer;

/// First value of the callback/future id counter.
const FIRST_TOKEN_ID: u64 = 20000;

// ============================================================================
// Channel
// ============================================================================

/// The kernel's way back to the host while a request is being served.
pub trait CallbackChannel {
    /// Deliver `callback` and wait for its completion, dispatching any
    /// nested host requests on `kernel` in the meantime. Returns the raw
    /// wire result.
    fn round_trip(&mut self, kernel: &mut Kernel, callback: Callback) -> KernelResult<Json>;
}

/// A channel with nobody on the other end. Every round trip is interrupted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedChannel;

impl CallbackChannel for DetachedChannel {
    fn round_trip(&mut self, _kernel: &mut Kernel, callback: Callback) -> KernelResult<Json> {
        Err(KernelError::Interrupted(callback.cbid))
    }
}

// ============================================================================
// State
// ============================================================================

pub(crate) struct LoadedModule {
    pub(crate) version: String,
    pub(crate) closure: ObjectRef,
    pub(crate) package_dir: PathBuf,
}

pub(crate) struct PendingFuture {
    pub(crate) promise: Promise,
    pub(crate) method: Method,
}

/// An async override waiting to be picked up and completed by the host.
pub(crate) struct PendingCallback {
    pub(crate) callback: Callback,
    pub(crate) returns: Option<OptionalValue>,
    pub(crate) promise: Promise,
}

/// The bridge kernel.
pub struct Kernel {
    pub(crate) options: KernelOptions,
    pub(crate) catalog: TypeCatalog,
    pub(crate) objects: ObjectTable,
    pub(crate) modules: FxHashMap<String, LoadedModule>,
    loader: Box<dyn ModuleLoader>,
    extractor: Box<dyn ArchiveExtractor>,
    scratch: Option<TempDir>,
    pub(crate) futures: FxHashMap<String, PendingFuture>,
    /// Async callbacks not yet handed out by `callbacks`
    pub(crate) queued: VecDeque<PendingCallback>,
    /// Async callbacks handed out and awaiting `complete`
    pub(crate) waiting: FxHashMap<String, PendingCallback>,
    next_id: u64,
    /// Descriptions of synchronous native calls currently on the stack
    pub(crate) sync_in_progress: Vec<String>,
    /// (object token, member) of synchronous callbacks awaiting completion
    pub(crate) in_flight: Vec<(String, String)>,
    jobs: JobQueue,
}

impl Kernel {
    pub fn new(options: KernelOptions, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            options,
            catalog: TypeCatalog::new(),
            objects: ObjectTable::new(),
            modules: FxHashMap::default(),
            loader: Box::new(loader),
            extractor: Box::new(TarballExtractor),
            scratch: None,
            futures: FxHashMap::default(),
            queued: VecDeque::new(),
            waiting: FxHashMap::default(),
            next_id: FIRST_TOKEN_ID,
            sync_in_progress: Vec::new(),
            in_flight: Vec::new(),
            jobs: JobQueue::new(),
        }
    }

    /// Replace the package extractor.
    pub fn with_extractor(mut self, extractor: impl ArchiveExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn options(&self) -> &KernelOptions {
        &self.options
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    /// Package directory of a loaded assembly.
    pub fn package_dir(&self, assembly: &str) -> Option<&Path> {
        self.modules.get(assembly).map(|m| m.package_dir.as_path())
    }

    /// Innermost synchronous native call, if any.
    pub fn sync_in_progress(&self) -> Option<&str> {
        self.sync_in_progress.last().map(String::as_str)
    }

    /// Serve one request.
    pub fn dispatch(&mut self, channel: &mut dyn CallbackChannel, request: Request) -> KernelResult<Json> {
        tracing::debug!(api = request.api(), "dispatch");
        let result = match request {
            Request::Load(req) => self.load(req),
            Request::Create(req) => self.create(channel, req),
            Request::Del(req) => self.del(req),
            Request::Get(req) => self.get(channel, req),
            Request::Set(req) => self.set(channel, req),
            Request::StaticGet(req) => self.static_get(channel, req),
            Request::StaticSet(req) => self.static_set(channel, req),
            Request::Invoke(req) => self.invoke(channel, req),
            Request::StaticInvoke(req) => self.static_invoke(channel, req),
            Request::Begin(req) => self.begin(channel, req),
            Request::End(req) => self.end(channel, req),
            Request::Callbacks(_) => self.callbacks(),
            Request::Complete(req) => self.complete(channel, req),
            Request::Naming(req) => self.naming(req),
            Request::Stats(_) => respond(StatsResponse {
                object_count: self.objects.len(),
            }),
            Request::InvokeBinScript(req) => self.invoke_script(req),
        };
        self.drain_jobs(channel);
        result
    }

    // ------------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------------

    fn load(&mut self, req: LoadRequest) -> KernelResult<Json> {
        if let Some(loaded) = self.modules.get(&req.name) {
            if loaded.version != req.version {
                return Err(KernelError::VersionConflict {
                    name: req.name,
                    loaded: loaded.version.clone(),
                    requested: req.version,
                });
            }
            let types = self.catalog.assembly(&req.name).map_or(0, |a| a.types.len());
            return respond(LoadResponse {
                assembly: req.name,
                types,
            });
        }

        semver::Version::parse(&req.version).map_err(|e| {
            KernelError::MalformedRequest(format!("invalid version '{}' for '{}': {}", req.version, req.name, e))
        })?;

        let mut components = Path::new(&req.name).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(KernelError::MalformedRequest(format!(
                "assembly name '{}' is not a single path component",
                req.name
            )));
        }

        // unpack beside the final location; only a verified package moves in
        let root = self.install_root()?;
        let staging = tempfile::Builder::new().prefix(".tether-staging-").tempdir_in(&root)?;
        let unpacked = staging.path().join("package");
        self.extractor.extract(&req.tarball, &unpacked)?;
        let assembly = read_assembly(&unpacked)?;
        if assembly.name != req.name || assembly.version != req.version {
            return Err(KernelError::MalformedRequest(format!(
                "tarball contains {}@{}, expected {}@{}",
                assembly.name, assembly.version, req.name, req.version
            )));
        }

        let package_dir = root.join(&req.name);
        if package_dir.exists() {
            std::fs::remove_dir_all(&package_dir)?;
        }
        std::fs::rename(&unpacked, &package_dir)?;
        drop(staging);

        let closure = match self.loader.load(&assembly, &package_dir) {
            Ok(closure) => closure,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&package_dir) {
                    tracing::warn!(path = %package_dir.display(), error = %cleanup, "failed to remove package");
                }
                return Err(e);
            }
        };
        let types = assembly.types.len();
        self.catalog.add(assembly);
        tracing::info!(assembly = %req.name, version = %req.version, types, "loaded assembly");
        self.modules.insert(
            req.name.clone(),
            LoadedModule {
                version: req.version,
                closure,
                package_dir,
            },
        );
        respond(LoadResponse {
            assembly: req.name,
            types,
        })
    }

    fn install_root(&mut self) -> KernelResult<PathBuf> {
        if let Some(dir) = &self.options.install_dir {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }
        let scratch = match self.scratch.take() {
            Some(dir) => dir,
            None => tempfile::Builder::new().prefix("tether-kernel-").tempdir()?,
        };
        let root = scratch.path().to_path_buf();
        self.scratch = Some(scratch);
        Ok(root)
    }

    /// Class object for a catalogued fqn, from its module's closure.
    fn find_class(&self, fqn: &str) -> KernelResult<Class> {
        let (name, module) = self
            .modules
            .iter()
            .filter(|(name, _)| fqn.len() > name.len() && fqn.starts_with(name.as_str()) && fqn[name.len()..].starts_with('.'))
            .max_by_key(|(name, _)| name.len())
            .ok_or_else(|| KernelError::TypeNotFound(fqn.to_string()))?;
        lookup_path(&module.closure, &fqn[name.len() + 1..])
            .and_then(|v| v.as_object().cloned())
            .and_then(Class::from_object)
            .ok_or_else(|| KernelError::TypeNotFound(fqn.to_string()))
    }

    fn naming(&self, req: NamingRequest) -> KernelResult<Json> {
        let assembly = self
            .catalog
            .assembly(&req.assembly)
            .ok_or(KernelError::AssemblyNotFound(req.assembly))?;
        respond(NamingResponse {
            naming: assembly
                .targets
                .clone()
                .unwrap_or_else(|| Json::Object(Default::default())),
        })
    }

    fn invoke_script(&self, req: InvokeScriptRequest) -> KernelResult<Json> {
        let module = self
            .modules
            .get(&req.assembly)
            .ok_or_else(|| KernelError::AssemblyNotFound(req.assembly.clone()))?;
        let script = self
            .catalog
            .assembly(&req.assembly)
            .and_then(|a| a.bin.get(&req.script))
            .ok_or_else(|| {
                KernelError::MalformedRequest(format!("assembly '{}' has no script '{}'", req.assembly, req.script))
            })?;

        tracing::debug!(assembly = %req.assembly, script = %req.script, "running script");
        let output = Command::new(module.package_dir.join(script))
            .args(&req.args)
            .current_dir(&module.package_dir)
            .output()?;
        respond(InvokeScriptResponse {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
            signal: exit_signal(&output.status),
        })
    }

    // ------------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------------

    fn create(&mut self, channel: &mut dyn CallbackChannel, req: CreateRequest) -> KernelResult<Json> {
        let instance = if req.fqn == EMPTY_OBJECT_FQN {
            if !req.args.is_empty() {
                return Err(KernelError::TooManyArguments {
                    method: EMPTY_OBJECT_FQN.to_string(),
                    expected: 0,
                    actual: req.args.len(),
                });
            }
            ObjectRef::new_ordinary(None)
        } else {
            let initializer = match self.catalog.type_of(&req.fqn)? {
                TypeDef::Class(class) => class.initializer.clone().unwrap_or_default(),
                _ => return Err(KernelError::NotConstructible(req.fqn)),
            };
            let args = self.args_to_native(&req.fqn, &initializer.parameters, initializer.variadic, &req.args)?;
            let class = self.find_class(&req.fqn)?;
            self.ensure_sync(channel, format!("new {}", req.fqn), |interp| interp.construct(&class, &args))?
        };

        let objref = self.objects.register(&instance, &req.fqn, &req.interfaces, &self.catalog);
        if let Err(e) = self.apply_overrides(&objref, &instance, &req.overrides) {
            self.objects.release(&objref)?;
            return Err(e);
        }
        tracing::debug!(objref = %objref.ref_id, "created");
        Ok(objref.to_wire())
    }

    fn del(&mut self, req: DelRequest) -> KernelResult<Json> {
        self.objects.release(&req.objref)?;
        respond(EmptyResponse {})
    }

    fn get(&mut self, channel: &mut dyn CallbackChannel, req: GetRequest) -> KernelResult<Json> {
        let entry = self.objects.resolve(&req.objref)?.clone();
        let property = self
            .catalog
            .require_property(&req.property, &entry.fqn, &entry.interfaces)?
            .clone();
        let key = self.member_target(&req.objref, &entry, &req.property);
        let target = Value::Object(entry.instance);

        let value = self.ensure_sync(channel, format!("get {}", req.property), |interp| interp.get(&target, &key))?;
        let value = self.serializer().to_wire(&value, Some(&property.declared()))?;
        respond(GetResponse { value })
    }

    fn set(&mut self, channel: &mut dyn CallbackChannel, req: SetRequest) -> KernelResult<Json> {
        let entry = self.objects.resolve(&req.objref)?.clone();
        let property = self
            .catalog
            .require_property(&req.property, &entry.fqn, &entry.interfaces)?
            .clone();
        if property.immutable {
            return Err(KernelError::ImmutablePropertyWrite {
                fqn: entry.fqn,
                property: req.property,
            });
        }
        let value = self.serializer().to_native(&req.value, Some(&property.declared()))?;
        let key = self.member_target(&req.objref, &entry, &req.property);
        let target = Value::Object(entry.instance);

        self.ensure_sync(channel, format!("set {}", req.property), |interp| interp.set(&target, &key, value))?;
        respond(EmptyResponse {})
    }

    fn static_get(&mut self, channel: &mut dyn CallbackChannel, req: StaticGetRequest) -> KernelResult<Json> {
        let property = self.catalog.require_property(&req.property, &req.fqn, &[])?.clone();
        if !property.is_static {
            return Err(KernelError::NotStatic {
                fqn: req.fqn,
                member: req.property,
            });
        }
        let class = Value::Object(self.find_class(&req.fqn)?.object().clone());

        let value = self.ensure_sync(channel, format!("get {}.{}", req.fqn, req.property), |interp| {
            interp.get(&class, &req.property)
        })?;
        let value = self.serializer().to_wire(&value, Some(&property.declared()))?;
        respond(GetResponse { value })
    }

    fn static_set(&mut self, channel: &mut dyn CallbackChannel, req: StaticSetRequest) -> KernelResult<Json> {
        let property = self.catalog.require_property(&req.property, &req.fqn, &[])?.clone();
        if !property.is_static {
            return Err(KernelError::NotStatic {
                fqn: req.fqn,
                member: req.property,
            });
        }
        if property.immutable {
            return Err(KernelError::ImmutablePropertyWrite {
                fqn: req.fqn,
                property: req.property,
            });
        }
        let value = self.serializer().to_native(&req.value, Some(&property.declared()))?;
        let class = Value::Object(self.find_class(&req.fqn)?.object().clone());

        self.ensure_sync(channel, format!("set {}.{}", req.fqn, req.property), |interp| {
            interp.set(&class, &req.property, value)
        })?;
        respond(EmptyResponse {})
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    fn invoke(&mut self, channel: &mut dyn CallbackChannel, req: InvokeRequest) -> KernelResult<Json> {
        let entry = self.objects.resolve(&req.objref)?.clone();
        let method = self
            .catalog
            .require_method(&req.method, &entry.fqn, &entry.interfaces)?
            .clone();
        if method.is_async {
            return Err(KernelError::WrongCallStyle(format!(
                "method '{}' is async and must be called with begin/end",
                req.method
            )));
        }
        let args = self.args_to_native(&req.method, &method.parameters, method.is_variadic(), &req.args)?;
        let key = self.member_target(&req.objref, &entry, &req.method);
        let target = Value::Object(entry.instance);

        let result = self.ensure_sync(channel, format!("invoke {}", req.method), |interp| {
            interp.call_method(&target, &key, &args)
        })?;
        let result = self.serializer().to_wire(&result, method.returns.as_ref())?;
        respond(InvokeResponse { result })
    }

    fn static_invoke(&mut self, channel: &mut dyn CallbackChannel, req: StaticInvokeRequest) -> KernelResult<Json> {
        let method = self.catalog.require_method(&req.method, &req.fqn, &[])?.clone();
        if !method.is_static {
            return Err(KernelError::NotStatic {
                fqn: req.fqn,
                member: req.method,
            });
        }
        if method.is_async {
            return Err(KernelError::WrongCallStyle(format!(
                "static method '{}' is async and cannot be called with sinvoke",
                req.method
            )));
        }
        let args = self.args_to_native(&req.method, &method.parameters, method.is_variadic(), &req.args)?;
        let class = Value::Object(self.find_class(&req.fqn)?.object().clone());

        let result = self.ensure_sync(channel, format!("invoke {}.{}", req.fqn, req.method), |interp| {
            interp.call_method(&class, &req.method, &args)
        })?;
        let result = self.serializer().to_wire(&result, method.returns.as_ref())?;
        respond(InvokeResponse { result })
    }

    fn begin(&mut self, channel: &mut dyn CallbackChannel, req: BeginRequest) -> KernelResult<Json> {
        if let Some(sync) = self.sync_in_progress() {
            return Err(KernelError::AsyncWhileSyncCallback {
                method: req.method,
                sync: sync.to_string(),
            });
        }
        let entry = self.objects.resolve(&req.objref)?.clone();
        let method = self
            .catalog
            .require_method(&req.method, &entry.fqn, &entry.interfaces)?
            .clone();
        if !method.is_async {
            return Err(KernelError::WrongCallStyle(format!(
                "method '{}' is not async and must be called with invoke",
                req.method
            )));
        }
        let args = self.args_to_native(&req.method, &method.parameters, method.is_variadic(), &req.args)?;
        let key = self.member_target(&req.objref, &entry, &req.method);
        let target = Value::Object(entry.instance);

        let outcome = self.with_interp(channel, |interp| interp.call_method(&target, &key, &args));
        let promise = match outcome {
            Ok(value) => value.as_promise().unwrap_or_else(|| Promise::resolved(value)),
            Err(e) => Promise::rejected(e),
        };
        let futureid = self.next_token("future");
        tracing::debug!(futureid = %futureid, method = %req.method, "begin");
        self.futures.insert(futureid.clone(), PendingFuture { promise, method });
        respond(BeginResponse { futureid })
    }

    fn end(&mut self, channel: &mut dyn CallbackChannel, req: EndRequest) -> KernelResult<Json> {
        self.drain_jobs(channel);
        let state = self
            .futures
            .get(&req.futureid)
            .map(|f| f.promise.state())
            .ok_or_else(|| KernelError::FutureNotFound(req.futureid.clone()))?;
        if matches!(state, PromiseState::Pending) {
            return Err(KernelError::FuturePending(req.futureid));
        }
        let future = self
            .futures
            .remove(&req.futureid)
            .ok_or_else(|| KernelError::FutureNotFound(req.futureid.clone()))?;
        match state {
            PromiseState::Fulfilled(value) => {
                let result = self.serializer().to_wire(&value, future.method.returns.as_ref())?;
                respond(InvokeResponse { result })
            }
            PromiseState::Rejected(e) => Err(KernelError::Thrown(e)),
            PromiseState::Pending => Err(KernelError::FuturePending(req.futureid)),
        }
    }

    fn callbacks(&mut self) -> KernelResult<Json> {
        let mut callbacks = Vec::with_capacity(self.queued.len());
        while let Some(pending) = self.queued.pop_front() {
            callbacks.push(pending.callback.clone());
            self.waiting.insert(pending.callback.cbid.clone(), pending);
        }
        respond(CallbacksResponse { callbacks })
    }

    fn complete(&mut self, channel: &mut dyn CallbackChannel, req: CompleteRequest) -> KernelResult<Json> {
        let pending = self
            .waiting
            .remove(&req.cbid)
            .ok_or_else(|| KernelError::CallbackNotFound(req.cbid.clone()))?;

        let mut failure = None;
        let outcome = match req.err {
            Some(message) => Err(Exception::new(req.name.unwrap_or_else(|| "Error".to_string()), message)),
            None => {
                let wire = req.result.unwrap_or(Json::Null);
                match self.serializer().to_native(&wire, pending.returns.as_ref()) {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        let exception = Exception::new(e.name().to_string(), e.to_string());
                        failure = Some(e);
                        Err(exception)
                    }
                }
            }
        };
        tracing::debug!(cbid = %req.cbid, ok = outcome.is_ok(), "completed async callback");
        self.with_interp(channel, |interp| pending.promise.settle(interp, outcome));

        match failure {
            Some(e) => Err(e),
            None => respond(CompleteResponse { cbid: req.cbid }),
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    pub(crate) fn serializer(&mut self) -> Serializer<'_> {
        Serializer::new(&mut self.objects, &self.catalog)
    }

    pub(crate) fn next_token(&mut self, kind: &str) -> String {
        let token = format!("kernel::{}::{}", kind, self.next_id);
        self.next_id += 1;
        token
    }

    fn with_interp<T>(&mut self, channel: &mut dyn CallbackChannel, f: impl FnOnce(&mut Interp<'_>) -> T) -> T {
        let mut scope = Scope { kernel: self, channel };
        let mut interp = Interp::new(&mut scope);
        f(&mut interp)
    }

    fn drain_jobs(&mut self, channel: &mut dyn CallbackChannel) {
        if !self.jobs.is_empty() {
            self.with_interp(channel, |interp| interp.run_jobs());
        }
    }

    /// Run a synchronous native call with `syncInProgress` set.
    fn ensure_sync<T>(
        &mut self,
        channel: &mut dyn CallbackChannel,
        description: String,
        f: impl FnOnce(&mut Interp<'_>) -> EngineResult<T>,
    ) -> KernelResult<T> {
        self.sync_in_progress.push(description);
        let result = self.with_interp(channel, f);
        self.sync_in_progress.pop();
        result.map_err(KernelError::from)
    }

    /// Property key a host request should use: the super slot while a
    /// callback for the same object and member is in flight, else the
    /// member itself.
    fn member_target(&self, objref: &ObjRef, entry: &ObjectEntry, member: &str) -> String {
        let in_flight = self
            .in_flight
            .iter()
            .any(|(ref_id, name)| *ref_id == objref.ref_id && name == member);
        let slot = super_key(member);
        if in_flight && entry.instance.has_own(&slot) {
            slot
        } else {
            member.to_string()
        }
    }

    fn args_to_native(
        &mut self,
        method: &str,
        params: &[Parameter],
        variadic: bool,
        args: &[Json],
    ) -> KernelResult<Vec<Value>> {
        validate_arguments(method, params, variadic, args.len())?;
        let any = OptionalValue::optional(TypeReference::any());
        let mut out = Vec::with_capacity(args.len());
        for (index, wire) in args.iter().enumerate() {
            let declared = match parameter_at(params, variadic, index) {
                Some(param) if wire.is_null() && !param.optional => {
                    return Err(KernelError::MissingRequiredArgument(format!(
                        "argument '{}' of '{}' is required",
                        param.name, method
                    )));
                }
                Some(param) => param.declared(),
                None => any.clone(),
            };
            out.push(self.serializer().to_native(wire, Some(&declared))?);
        }
        Ok(out)
    }

    pub(crate) fn args_to_wire(&mut self, method: &Method, args: &[Value]) -> KernelResult<Vec<Json>> {
        let any = OptionalValue::optional(TypeReference::any());
        args.iter()
            .enumerate()
            .map(|(index, value)| {
                let declared = parameter_at(&method.parameters, method.is_variadic(), index)
                    .map(Parameter::declared)
                    .unwrap_or_else(|| any.clone());
                self.serializer().to_wire(value, Some(&declared))
            })
            .collect()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if let Some(dir) = self.scratch.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove install directory");
            }
        }
    }
}

/// Private slot holding a member's pre-override descriptor.
pub(crate) fn super_key(member: &str) -> String {
    format!("$kernel$super${}$", member)
}

fn respond<T: Serialize>(payload: T) -> KernelResult<Json> {
    Ok(serde_json::to_value(payload)?)
}

fn parameter_at(params: &[Parameter], variadic: bool, index: usize) -> Option<&Parameter> {
    match params.get(index) {
        Some(param) => Some(param),
        None if variadic => params.last(),
        None => None,
    }
}

fn validate_arguments(method: &str, params: &[Parameter], variadic: bool, count: usize) -> KernelResult<()> {
    if !variadic && count > params.len() {
        return Err(KernelError::TooManyArguments {
            method: method.to_string(),
            expected: params.len(),
            actual: count,
        });
    }
    if let Some(missing) = params
        .iter()
        .skip(count)
        .find(|p| !p.optional && !p.variadic)
    {
        return Err(KernelError::MissingRequiredArgument(format!(
            "argument '{}' of '{}' is required",
            missing.name, method
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

// ============================================================================
// Scope
// ============================================================================

/// The interpreter's host while the kernel serves a request.
struct Scope<'k> {
    kernel: &'k mut Kernel,
    channel: &'k mut dyn CallbackChannel,
}

impl Host for Scope<'_> {
    fn jobs(&mut self) -> &mut JobQueue {
        &mut self.kernel.jobs
    }

    fn trap(&mut self, trap: Trap) -> EngineResult<Value> {
        self.kernel.sync_trap(&mut *self.channel, trap)
    }

    fn trap_deferred(&mut self, trap: Trap) -> EngineResult<Promise> {
        self.kernel.queue_trap(trap)
    }
}
